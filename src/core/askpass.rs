//! Passphrase callback run by `ssh-add` / `ssh-keygen` through `SSH_ASKPASS`.
//!
//! Everything it needs arrives in the environment exported by the parent:
//! the key id, the subdomain, the session token and the command timeout.
//! It never prompts. A session that cannot be reused is an error.

use crate::constants;
use crate::core::catalog::VaultCatalog;
use crate::core::resolver::KeyResolver;
use crate::core::session::{SessionConfig, SessionManager};
use crate::error::VaultError;
use crate::util::console::{Console, Verbosity};
use crate::util::env::{non_empty, ReadEnv};
use crate::util::process::CommandRunner;
use anyhow::{Context, Result};
use std::io::Write;
use std::time::Duration;
use tracing::debug;

/// Inputs read from the callback's environment.
#[derive(Debug, Clone)]
pub struct PassphraseCallback {
    key_id: String,
    config: SessionConfig,
}

impl PassphraseCallback {
    pub fn from_env(env: &impl ReadEnv) -> Result<Self> {
        let key_id = non_empty(env, constants::KEY_ID_VAR)
            .ok_or(VaultError::MissingEnvironment(constants::KEY_ID_VAR))?;
        let subdomain = non_empty(env, constants::SESSION_SUBDOMAIN_VAR)
            .ok_or(VaultError::MissingEnvironment(constants::SESSION_SUBDOMAIN_VAR))?;

        let timeout = match non_empty(env, constants::SESSION_TIMEOUT_VAR) {
            Some(raw) => raw.trim().parse::<u64>().with_context(|| {
                format!("invalid {} value \"{}\"", constants::SESSION_TIMEOUT_VAR, raw)
            })?,
            None => constants::ASKPASS_DEFAULT_TIMEOUT_SECS,
        };

        let mut config = SessionConfig::new(subdomain);
        config.timeout = Duration::from_secs(timeout);
        config.verbosity = Verbosity::Quiet;
        config.interactive = false;
        if let Some(program) = non_empty(env, constants::OP_PROGRAM_VAR) {
            config.op_program = program;
        }

        Ok(Self { key_id, config })
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Look up the passphrase and write it to `out`, without a trailing newline.
    pub fn run<R: CommandRunner>(
        &self,
        runner: R,
        env: &impl ReadEnv,
        out: &mut impl Write,
    ) -> Result<()> {
        let session = SessionManager::from_env(self.config.clone(), runner, env);
        let catalog = VaultCatalog::load(session)?;
        let mut resolver = KeyResolver::new(catalog, Console::new(Verbosity::Quiet));
        let passphrase = resolver.passphrase(&self.key_id)?;
        debug!(key = %self.key_id, "passphrase resolved");

        out.write_all(passphrase.as_bytes())
            .context("write passphrase")?;
        out.flush().context("flush passphrase")?;
        Ok(())
    }
}
