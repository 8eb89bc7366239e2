use crate::cli::CliContext;
use crate::core::catalog::VaultAccess;
use crate::core::resolver::KeyResolver;
use crate::util::env::ReadEnv;
use crate::util::process::CommandRunner;
use anyhow::{bail, Context, Result};
use clap::Args;
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Table};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Output format: table|json
    #[arg(long, default_value = "table")]
    pub format: String,
}

/// One logical key, merged from its passphrase and key-file items.
#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub struct KeyListing {
    pub name: String,
    pub passphrase_uuid: Option<String>,
    pub file_uuid: Option<String>,
    pub filename: Option<String>,
}

pub fn run<R: CommandRunner>(
    ctx: &CliContext,
    args: ListArgs,
    runner: R,
    env: &impl ReadEnv,
) -> Result<()> {
    if args.format != "table" && args.format != "json" {
        bail!("invalid format: {} (use table|json)", args.format);
    }

    let catalog = ctx.open_catalog(runner, env)?;
    let mut resolver = KeyResolver::new(catalog, ctx.console);
    let items = listing(&mut resolver)?;

    if args.format == "json" {
        let json = serde_json::to_string_pretty(&items).context("serialize list")?;
        println!("{}", json);
        return Ok(());
    }

    if items.is_empty() {
        println!("No SSH keys found");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec![
        Cell::new("Name").add_attribute(Attribute::Bold),
        Cell::new("Passphrase item").add_attribute(Attribute::Bold),
        Cell::new("Key file").add_attribute(Attribute::Bold),
        Cell::new("Key file item").add_attribute(Attribute::Bold),
    ]);
    let dash = || "-".to_string();
    for item in items {
        table.add_row(vec![
            item.name,
            item.passphrase_uuid.unwrap_or_else(dash),
            item.filename.unwrap_or_else(dash),
            item.file_uuid.unwrap_or_else(dash),
        ]);
    }

    println!("{}", table);
    Ok(())
}

/// Keys sorted by name; secrets are not included.
pub fn listing<V: VaultAccess>(resolver: &mut KeyResolver<V>) -> Result<Vec<KeyListing>> {
    let mut merged: BTreeMap<String, KeyListing> = BTreeMap::new();

    for (name, record) in resolver.resolve_keys()? {
        let entry = merged.entry(name.clone()).or_default();
        entry.name = name.clone();
        entry.passphrase_uuid = Some(record.passphrase_uuid.clone());
    }
    for (name, record) in resolver.resolve_private_key_files()? {
        let entry = merged.entry(name.clone()).or_default();
        entry.name = name.clone();
        entry.file_uuid = Some(record.uuid.clone());
        entry.filename = Some(record.filename.clone());
    }

    Ok(merged.into_values().collect())
}
