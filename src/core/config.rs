//! Optional `config.toml` loading.

use crate::models::settings::Settings;
use crate::util::env::{non_empty, ReadEnv};
use crate::util::path::home_dir;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// `$XDG_CONFIG_HOME/opssh/config.toml`, falling back to `~/.config/opssh/config.toml`.
pub fn default_path(env: &impl ReadEnv) -> Option<PathBuf> {
    let base = match non_empty(env, "XDG_CONFIG_HOME") {
        Some(dir) => PathBuf::from(dir),
        None => home_dir(env)?.join(".config"),
    };
    Some(base.join("opssh").join("config.toml"))
}

/// Parse settings from `path`. A missing file yields defaults.
pub fn load(path: &Path) -> Result<Settings> {
    if !path.exists() {
        return Ok(Settings::default());
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
    let settings: Settings =
        toml::from_str(&content).with_context(|| format!("parse config {}", path.display()))?;
    Ok(settings)
}
