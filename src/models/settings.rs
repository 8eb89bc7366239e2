//! Optional `config.toml` model.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub vault: VaultSection,
    #[serde(default)]
    pub ssh: SshSection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VaultSection {
    /// Account subdomain (`op signin <subdomain>`).
    #[serde(default)]
    pub subdomain: Option<String>,

    /// Per-command timeout in seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,

    /// Interactive sign-in attempts before giving up.
    #[serde(default)]
    pub login_tries: Option<u32>,

    /// Cap on re-authentications for a single command (unset = retry until success).
    #[serde(default)]
    pub max_reauth_attempts: Option<u32>,

    /// Vault CLI program.
    #[serde(default)]
    pub op_program: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SshSection {
    /// Directory private keys are read from and written to.
    #[serde(default)]
    pub keys_path: Option<PathBuf>,

    #[serde(default)]
    pub ssh_add_program: Option<String>,

    #[serde(default)]
    pub ssh_keygen_program: Option<String>,

    /// Program ssh runs to obtain a passphrase.
    #[serde(default)]
    pub askpass_program: Option<String>,
}
