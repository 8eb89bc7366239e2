//! Centralized constants for vault commands, environment contract, and file modes.

/// Default 1Password account subdomain.
pub const DEFAULT_SUBDOMAIN: &str = "my";

/// Default timeout for a single external command, in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Default number of interactive sign-in attempts.
pub const DEFAULT_LOGIN_TRIES: u32 = 5;

/// Timeout used by the askpass callback when none was exported.
pub const ASKPASS_DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Tag marking an item that carries a key name and its passphrase.
pub const SSH_KEY_TAG: &str = "SSH_KEY";

/// Tag marking a document item that carries a private key file.
pub const SSH_KEY_FILE_TAG: &str = "SSH_KEY_FILE";

/// Field type holding the logical key name.
pub const FIELD_KEY_NAME: &str = "KeyName";

/// Field type holding the key passphrase.
pub const FIELD_PASSPHRASE: &str = "Passphrase";

/// Prefix of the per-subdomain session token variable (`OP_SESSION_<subdomain>`).
pub const SESSION_VAR_PREFIX: &str = "OP_SESSION_";

pub const SESSION_SUBDOMAIN_VAR: &str = "OP_SESSION_SUBDOMAIN";
pub const SESSION_TIMEOUT_VAR: &str = "OP_SESSION_TIMEOUT";

/// Identifier of the key whose passphrase the callback must print.
pub const KEY_ID_VAR: &str = "SSH_KEY_ID";

/// Vault CLI program the callback should use.
pub const OP_PROGRAM_VAR: &str = "OPSSH_OP_PROGRAM";

pub const SSH_ASKPASS_VAR: &str = "SSH_ASKPASS";
pub const SSH_ASKPASS_REQUIRE_VAR: &str = "SSH_ASKPASS_REQUIRE";
pub const DISPLAY_VAR: &str = "DISPLAY";

/// ssh only consults `SSH_ASKPASS` when `DISPLAY` is set; the value is never used.
pub const DISPLAY_PLACEHOLDER: &str = "opssh:0";

pub const DEFAULT_OP_PROGRAM: &str = "op";
pub const DEFAULT_SSH_ADD_PROGRAM: &str = "ssh-add";
pub const DEFAULT_SSH_KEYGEN_PROGRAM: &str = "ssh-keygen";
pub const DEFAULT_ASKPASS_PROGRAM: &str = "opssh-askpass";

/// Permission mode for the keys directory when it has to be created.
pub const KEYS_DIR_MODE: u32 = 0o700;

/// Permission mode for private key files.
pub const PRIVATE_KEY_MODE: u32 = 0o600;

/// Permission mode for public key files.
pub const PUBLIC_KEY_MODE: u32 = 0o644;

/// Suffix appended to a private key file name for its public half.
pub const PUBLIC_KEY_EXTENSION: &str = ".pub";

/// Width of the dotted progress column on the console.
pub const PROGRESS_WIDTH: usize = 65;
