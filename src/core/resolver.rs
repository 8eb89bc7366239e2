//! Maps logical key names to vault records.
//!
//! Two kinds of tagged items are understood:
//! - `SSH_KEY`: one section holding a `KeyName` string field and a
//!   `Passphrase` concealed field.
//! - `SSH_KEY_FILE`: a document item whose section holds a `KeyName` field;
//!   the attached file is the private key.
//!
//! Duplicate names resolve last-write-wins in catalog order.

use crate::constants::{FIELD_KEY_NAME, FIELD_PASSPHRASE, SSH_KEY_FILE_TAG, SSH_KEY_TAG};
use crate::core::catalog::VaultAccess;
use crate::error::VaultError;
use crate::models::item::{Field, FieldKind, VaultItem};
use crate::models::key::{SshKeyFileRecord, SshKeyRecord};
use crate::util::console::Console;
use anyhow::Result;
use std::collections::BTreeMap;
use tracing::{debug, warn};
use zeroize::Zeroizing;

pub struct KeyResolver<V> {
    vault: V,
    console: Console,
    keys: Option<BTreeMap<String, SshKeyRecord>>,
    key_files: Option<BTreeMap<String, SshKeyFileRecord>>,
}

impl<V: VaultAccess> KeyResolver<V> {
    pub fn new(vault: V, console: Console) -> Self {
        Self {
            vault,
            console,
            keys: None,
            key_files: None,
        }
    }

    pub fn vault(&self) -> &V {
        &self.vault
    }

    pub fn vault_mut(&mut self) -> &mut V {
        &mut self.vault
    }

    /// Key records by name. Fetched once, then served from cache.
    pub fn resolve_keys(&mut self) -> Result<&BTreeMap<String, SshKeyRecord>> {
        if self.keys.is_none() {
            let uuids = self.vault.find_by_tag(SSH_KEY_TAG);
            let items = self.vault.fetch_items(&uuids)?;
            let mut keys = BTreeMap::new();
            for item in &items {
                match parse_key_record(item)? {
                    Some(record) => {
                        debug!(uuid = %item.uuid, name = %record.name, "found SSH key");
                        self.console.detail(format!(
                            "Found SSH key uuid=\"{}\" name=\"{}\"",
                            item.uuid, record.name
                        ));
                        if keys.contains_key(&record.name) {
                            warn!(name = %record.name, uuid = %item.uuid, "duplicate key name, later item wins");
                        }
                        keys.insert(record.name.clone(), record);
                    }
                    None => self.console.warn(format!(
                        "Error parsing key information (uuid=\"{}\"), skipping",
                        item.uuid
                    )),
                }
            }
            self.keys = Some(keys);
        }
        Ok(self.keys.get_or_insert_with(BTreeMap::new))
    }

    /// Key file records by name. Fetched once, then served from cache.
    pub fn resolve_private_key_files(&mut self) -> Result<&BTreeMap<String, SshKeyFileRecord>> {
        if self.key_files.is_none() {
            let uuids = self.vault.find_by_tag(SSH_KEY_FILE_TAG);
            let items = self.vault.fetch_items(&uuids)?;
            let mut files = BTreeMap::new();
            for item in &items {
                match parse_key_file_record(item)? {
                    Some(record) => {
                        debug!(uuid = %item.uuid, name = %record.name, "found SSH key file");
                        if files.contains_key(&record.name) {
                            warn!(name = %record.name, uuid = %item.uuid, "duplicate key file name, later item wins");
                        }
                        files.insert(record.name.clone(), record);
                    }
                    None => {
                        debug!(uuid = %item.uuid, "skipping incomplete key file item");
                        self.console.warn(format!(
                            "Skipping incomplete key file item (uuid=\"{}\")",
                            item.uuid
                        ));
                    }
                }
            }
            self.key_files = Some(files);
        }
        Ok(self.key_files.get_or_insert_with(BTreeMap::new))
    }

    /// Passphrase for a key, looked up by name or by passphrase item UUID.
    pub fn passphrase(&mut self, id: &str) -> Result<Zeroizing<String>> {
        let keys = self.resolve_keys()?;
        keys.get(id)
            .or_else(|| keys.values().find(|r| r.passphrase_uuid == id))
            .map(|r| r.passphrase.clone())
            .ok_or_else(|| VaultError::KeyNotFound(id.to_string()).into())
    }

    /// The key file record for `name` and its private key bytes.
    pub fn private_key(&mut self, name: &str) -> Result<(SshKeyFileRecord, Zeroizing<Vec<u8>>)> {
        let record = self
            .resolve_private_key_files()?
            .get(name)
            .cloned()
            .ok_or_else(|| VaultError::KeyNotFound(name.to_string()))?;
        let bytes = self.vault.fetch_document(&record.uuid)?;
        Ok((record, bytes))
    }
}

/// Extract a key record from an `SSH_KEY` item.
///
/// `Err(MalformedKeyItem)` unless exactly one section carries fields, or when a
/// field type repeats; `Ok(None)` when the section lacks the name or passphrase.
pub fn parse_key_record(item: &VaultItem) -> Result<Option<SshKeyRecord>> {
    let sections = item.field_sections().unwrap_or_default();
    if sections.len() != 1 {
        return Err(malformed(
            item,
            format!("expected one section with fields, found {}", sections.len()),
        ));
    }
    let fields = sections[0];

    let name = single(item, fields, FIELD_KEY_NAME, FieldKind::String)?;
    let passphrase = single(item, fields, FIELD_PASSPHRASE, FieldKind::Concealed)?;
    match (name, passphrase) {
        (Some(name), Some(passphrase)) => Ok(Some(SshKeyRecord {
            name,
            passphrase_uuid: item.uuid.clone(),
            passphrase: Zeroizing::new(passphrase),
        })),
        _ => Ok(None),
    }
}

/// Extract a key file record from an `SSH_KEY_FILE` item.
///
/// Items without sections, without exactly one `KeyName` field, or without an
/// attached file name yield `Ok(None)`.
pub fn parse_key_file_record(item: &VaultItem) -> Result<Option<SshKeyFileRecord>> {
    let Some(sections) = item.field_sections() else {
        return Ok(None);
    };
    let mut names = sections
        .iter()
        .flat_map(|s| s.iter())
        .filter(|f| f.is(FIELD_KEY_NAME, FieldKind::String));
    let first = names.next();
    if names.next().is_some() {
        warn!(uuid = %item.uuid, "key file item has more than one KeyName field");
        return Ok(None);
    }
    let Some(name) = first.and_then(Field::text) else {
        return Ok(None);
    };
    let Some(filename) = item.file_name() else {
        return Ok(None);
    };
    Ok(Some(SshKeyFileRecord {
        name,
        uuid: item.uuid.clone(),
        filename: filename.to_string(),
    }))
}

fn single(
    item: &VaultItem,
    fields: &[Field],
    type_tag: &str,
    kind: FieldKind,
) -> Result<Option<String>> {
    let mut matching = fields.iter().filter(|f| f.is(type_tag, kind));
    let first = matching.next();
    if matching.next().is_some() {
        return Err(malformed(item, format!("more than one {} field", type_tag)));
    }
    Ok(first.and_then(Field::text))
}

fn malformed(item: &VaultItem, reason: String) -> anyhow::Error {
    VaultError::MalformedKeyItem {
        uuid: item.uuid.clone(),
        reason,
    }
    .into()
}
