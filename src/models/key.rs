//! SSH key records derived from tagged vault items.

use serde::Serialize;
use std::fmt;
use zeroize::Zeroizing;

/// A key name paired with its passphrase, from an item tagged `SSH_KEY`.
#[derive(Clone)]
pub struct SshKeyRecord {
    pub name: String,
    /// UUID of the vault item holding the passphrase.
    pub passphrase_uuid: String,
    pub passphrase: Zeroizing<String>,
}

impl fmt::Debug for SshKeyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SshKeyRecord")
            .field("name", &self.name)
            .field("passphrase_uuid", &self.passphrase_uuid)
            .finish_non_exhaustive()
    }
}

/// A private key document, from an item tagged `SSH_KEY_FILE`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SshKeyFileRecord {
    pub name: String,
    pub uuid: String,
    pub filename: String,
}
