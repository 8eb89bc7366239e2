//! Error kinds raised by the vault and SSH layers.
//!
//! Functions return `anyhow::Result`; callers that need to branch on a kind
//! use `err.downcast_ref::<VaultError>()`, which also sees through `.context()`.

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("{program} did not finish within {}s", .timeout.as_secs())]
    ProcessTimeout { program: String, timeout: Duration },

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("unable to sign in to vault \"{subdomain}\" after {attempts} attempt(s)")]
    LoginFailed { subdomain: String, attempts: u32 },

    #[error("vault command still failing after {attempts} re-authentication(s)")]
    ReauthExhausted { attempts: u32 },

    #[error("vault catalog unavailable: {0}")]
    CatalogUnavailable(String),

    #[error("malformed SSH key item {uuid}: {reason}")]
    MalformedKeyItem { uuid: String, reason: String },

    #[error("environment variable {0} is not set")]
    MissingEnvironment(&'static str),

    #[error("key \"{0}\" not found in vault")]
    KeyNotFound(String),
}

/// Return the vault error kind carried by `err`, if any.
pub fn kind(err: &anyhow::Error) -> Option<&VaultError> {
    err.downcast_ref::<VaultError>()
}
