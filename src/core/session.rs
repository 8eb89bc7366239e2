//! Vault session: sign-in, token ownership, and the re-authentication loop.
//!
//! ```text
//! Unauthenticated -> Authenticating -> Authenticated
//!                         ^                 |
//!                         +---- Expired <---+   (vault command exited non-zero)
//! ```
//!
//! The token travels to `op` on stdin and to child programs through
//! [`SessionExport`], never through argv.

use crate::constants;
use crate::error::VaultError;
use crate::util::console::{Console, Verbosity};
use crate::util::env::{non_empty, ReadEnv};
use crate::util::process::{CommandRunner, CommandSpec, ProcessOutput, StdinMode};
use anyhow::Result;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};
use zeroize::Zeroizing;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub subdomain: String,
    pub timeout: Duration,
    pub max_login_retries: u32,
    /// `None` retries a failing command until it succeeds.
    pub max_reauth_attempts: Option<u32>,
    pub verbosity: Verbosity,
    /// Whether sign-in may prompt on the terminal.
    pub interactive: bool,
    pub op_program: String,
}

impl SessionConfig {
    pub fn new(subdomain: impl Into<String>) -> Self {
        Self {
            subdomain: subdomain.into(),
            timeout: Duration::from_secs(constants::DEFAULT_TIMEOUT_SECS),
            max_login_retries: constants::DEFAULT_LOGIN_TRIES,
            max_reauth_attempts: None,
            verbosity: Verbosity::Normal,
            interactive: true,
            op_program: constants::DEFAULT_OP_PROGRAM.to_string(),
        }
    }

    /// `OP_SESSION_<subdomain>`.
    pub fn token_var(&self) -> String {
        token_var(&self.subdomain)
    }
}

pub fn token_var(subdomain: &str) -> String {
    format!("{}{}", constants::SESSION_VAR_PREFIX, subdomain)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticating,
    Authenticated,
    Expired,
}

/// Session context handed to child processes through their environment.
#[derive(Clone)]
pub struct SessionExport {
    pub subdomain: String,
    pub token: Option<Zeroizing<String>>,
    pub timeout: Duration,
    pub op_program: String,
}

impl SessionExport {
    /// Environment additions: token (when held), subdomain, timeout, vault program.
    pub fn vars(&self) -> Vec<(String, String)> {
        let mut vars = Vec::with_capacity(4);
        if let Some(token) = &self.token {
            vars.push((token_var(&self.subdomain), token.to_string()));
        }
        vars.push((
            constants::SESSION_SUBDOMAIN_VAR.to_string(),
            self.subdomain.clone(),
        ));
        vars.push((
            constants::SESSION_TIMEOUT_VAR.to_string(),
            self.timeout.as_secs().to_string(),
        ));
        vars.push((constants::OP_PROGRAM_VAR.to_string(), self.op_program.clone()));
        vars
    }

    pub fn apply(&self, spec: CommandSpec) -> CommandSpec {
        self.vars()
            .into_iter()
            .fold(spec, |spec, (key, value)| spec.env(key, value))
    }
}

impl fmt::Debug for SessionExport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionExport")
            .field("subdomain", &self.subdomain)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

pub struct SessionManager<R> {
    config: SessionConfig,
    runner: R,
    token: Option<Zeroizing<Vec<u8>>>,
    state: SessionState,
    console: Console,
    logins: u32,
}

impl<R: CommandRunner> SessionManager<R> {
    pub fn new(config: SessionConfig, runner: R) -> Self {
        let console = Console::new(config.verbosity);
        Self {
            config,
            runner,
            token: None,
            state: SessionState::Unauthenticated,
            console,
            logins: 0,
        }
    }

    /// Pick up a token left in `OP_SESSION_<subdomain>` by an earlier sign-in.
    pub fn from_env(config: SessionConfig, runner: R, env: &impl ReadEnv) -> Self {
        let inherited = non_empty(env, &config.token_var());
        let session = Self::new(config, runner);
        match inherited {
            Some(token) => {
                session
                    .console
                    .detail("Using previous vault authentication");
                session.with_token(token.into_bytes())
            }
            None => session,
        }
    }

    pub fn with_token(mut self, token: Vec<u8>) -> Self {
        self.token = Some(Zeroizing::new(token));
        self.state = SessionState::Authenticated;
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    /// Number of successful sign-ins performed by this manager.
    pub fn login_count(&self) -> u32 {
        self.logins
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Sign in unless a token is already held.
    pub fn ensure_authenticated(&mut self) -> Result<()> {
        if self.token.is_some() {
            return Ok(());
        }
        self.login()
    }

    /// Run a vault command, re-authenticating and retrying while it fails.
    pub fn run_authenticated(&mut self, spec: CommandSpec) -> Result<ProcessOutput> {
        let mut reauths = 0u32;
        loop {
            let output = self.runner.execute(&self.with_session(&spec))?;
            if output.success() {
                self.state = SessionState::Authenticated;
                return Ok(output);
            }

            self.state = SessionState::Expired;
            debug!(
                command = %spec.display(),
                detail = %output.failure_detail(),
                "vault command failed, treating session as expired"
            );
            self.console
                .detail(format!("Vault CLI failed ({})", output.failure_detail()));

            if let Some(max) = self.config.max_reauth_attempts {
                if reauths >= max {
                    return Err(VaultError::ReauthExhausted { attempts: reauths }.into());
                }
            }
            reauths += 1;
            self.token = None;
            self.login()?;
        }
    }

    /// Snapshot of the session for child processes.
    pub fn export(&self) -> SessionExport {
        SessionExport {
            subdomain: self.config.subdomain.clone(),
            token: self
                .token
                .as_ref()
                .map(|t| Zeroizing::new(String::from_utf8_lossy(t).into_owned())),
            timeout: self.config.timeout,
            op_program: self.config.op_program.clone(),
        }
    }

    fn with_session(&self, spec: &CommandSpec) -> CommandSpec {
        let stdin = match &self.token {
            Some(token) => StdinMode::Bytes(token.clone()),
            None => StdinMode::Null,
        };
        spec.clone().stdin(stdin)
    }

    fn login(&mut self) -> Result<()> {
        let subdomain = self.config.subdomain.clone();
        if !self.config.interactive {
            self.state = SessionState::Unauthenticated;
            return Err(VaultError::LoginFailed {
                subdomain,
                attempts: 0,
            }
            .into());
        }

        self.state = SessionState::Authenticating;
        self.console
            .info(format!("Authenticating with vault \"{}\"", subdomain));

        let spec = CommandSpec::new(&self.config.op_program)
            .args(["signin", subdomain.as_str(), "--output=raw"])
            .env_remove(self.config.token_var())
            .stdin(StdinMode::Inherit)
            .inherit_stderr();

        for attempt in 1..=self.config.max_login_retries {
            let output = self.runner.execute(&spec)?;
            if output.success() {
                let token = output.stdout.trim_ascii();
                if !token.is_empty() {
                    self.token = Some(Zeroizing::new(token.to_vec()));
                    self.state = SessionState::Authenticated;
                    self.logins += 1;
                    debug!(attempt, "signed in");
                    return Ok(());
                }
                warn!(attempt, "sign-in succeeded but returned no token");
            } else {
                debug!(attempt, code = ?output.code, "sign-in failed");
            }
        }

        self.state = SessionState::Unauthenticated;
        Err(VaultError::LoginFailed {
            subdomain,
            attempts: self.config.max_login_retries,
        }
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error;
    use crate::testing::FakeOp;
    use std::collections::HashMap;

    fn config() -> SessionConfig {
        let mut config = SessionConfig::new("my");
        config.verbosity = Verbosity::Quiet;
        config
    }

    fn list() -> CommandSpec {
        CommandSpec::new("op").args(["list", "items"])
    }

    #[test]
    fn test_inherits_token_from_env() {
        let op = FakeOp::new();
        let env: HashMap<String, String> =
            [("OP_SESSION_my".to_string(), FakeOp::TOKEN.to_string())]
                .into_iter()
                .collect();
        let mut session = SessionManager::from_env(config(), &op, &env);
        assert_eq!(session.state(), SessionState::Authenticated);
        session.run_authenticated(list()).unwrap();
        assert_eq!(op.signins(), 0);
    }

    #[test]
    fn test_ensure_authenticated_signs_in_and_trims() {
        let op = FakeOp::new();
        let mut session = SessionManager::new(config(), &op);
        assert_eq!(session.state(), SessionState::Unauthenticated);
        session.ensure_authenticated().unwrap();
        assert_eq!(session.state(), SessionState::Authenticated);
        let export = session.export();
        assert_eq!(export.token.as_deref().map(String::as_str), Some(FakeOp::TOKEN));
        session.ensure_authenticated().unwrap();
        assert_eq!(op.signins(), 1);
    }

    #[test]
    fn test_login_retries_then_succeeds() {
        let op = FakeOp::new().failing_signins(2);
        let mut session = SessionManager::new(config(), &op);
        session.ensure_authenticated().unwrap();
        assert_eq!(op.signins(), 3);
    }

    #[test]
    fn test_login_exhausts_retries() {
        let op = FakeOp::new().failing_signins(10);
        let mut cfg = config();
        cfg.max_login_retries = 3;
        let mut session = SessionManager::new(cfg, &op);
        let err = session.ensure_authenticated().unwrap_err();
        assert!(matches!(
            error::kind(&err),
            Some(VaultError::LoginFailed { attempts: 3, .. })
        ));
        assert_eq!(op.signins(), 3);
        assert_eq!(session.state(), SessionState::Unauthenticated);
    }

    #[test]
    fn test_signin_drops_stale_token_and_uses_terminal() {
        let op = FakeOp::new();
        let mut session = SessionManager::new(config(), &op);
        session.ensure_authenticated().unwrap();
        let calls = op.calls();
        let signin = &calls[0];
        assert_eq!(signin.args, ["signin", "my", "--output=raw"]);
        assert!(signin.env_remove.iter().any(|k| k == "OP_SESSION_my"));
        assert!(matches!(signin.stdin, StdinMode::Inherit));
    }

    #[test]
    fn test_reauth_once_per_expiry() {
        let op = FakeOp::new().expiring(3);
        let mut session = SessionManager::new(config(), &op).with_token(b"stale".to_vec());
        let out = session.run_authenticated(list()).unwrap();
        assert!(out.success());
        assert_eq!(op.signins(), 3);
        assert_eq!(session.login_count(), 3);
        assert_eq!(session.state(), SessionState::Authenticated);
    }

    #[test]
    fn test_token_passed_on_stdin_not_argv() {
        let op = FakeOp::new();
        let mut session = SessionManager::new(config(), &op).with_token(FakeOp::TOKEN.into());
        session.run_authenticated(list()).unwrap();
        let calls = op.calls();
        let call = calls.last().unwrap();
        assert!(!call.args.iter().any(|a| a.contains(FakeOp::TOKEN)));
        match &call.stdin {
            StdinMode::Bytes(bytes) => assert_eq!(bytes.as_slice(), FakeOp::TOKEN.as_bytes()),
            other => panic!("unexpected stdin {:?}", other),
        }
    }

    #[test]
    fn test_reauth_cap() {
        let op = FakeOp::new().expiring(5);
        let mut cfg = config();
        cfg.max_reauth_attempts = Some(2);
        let mut session = SessionManager::new(cfg, &op).with_token(b"stale".to_vec());
        let err = session.run_authenticated(list()).unwrap_err();
        assert!(matches!(
            error::kind(&err),
            Some(VaultError::ReauthExhausted { attempts: 2 })
        ));
        assert_eq!(op.signins(), 2);
    }

    #[test]
    fn test_non_interactive_never_prompts() {
        let op = FakeOp::new().expiring(1);
        let mut cfg = config();
        cfg.interactive = false;
        let mut session = SessionManager::new(cfg, &op).with_token(b"stale".to_vec());
        let err = session.run_authenticated(list()).unwrap_err();
        assert!(matches!(
            error::kind(&err),
            Some(VaultError::LoginFailed { attempts: 0, .. })
        ));
        assert_eq!(op.signins(), 0);
    }

    #[test]
    fn test_export_vars() {
        let op = FakeOp::new();
        let session = SessionManager::new(config(), &op).with_token(b"tok".to_vec());
        let spec = session.export().apply(CommandSpec::new("ssh-add"));
        assert_eq!(spec.env_value("OP_SESSION_my"), Some("tok"));
        assert_eq!(spec.env_value("OP_SESSION_SUBDOMAIN"), Some("my"));
        assert_eq!(spec.env_value("OP_SESSION_TIMEOUT"), Some("60"));
        assert_eq!(spec.env_value("OPSSH_OP_PROGRAM"), Some("op"));
    }

    #[test]
    fn test_export_without_token() {
        let op = FakeOp::new();
        let session = SessionManager::new(config(), &op);
        let spec = session.export().apply(CommandSpec::new("ssh-add"));
        assert_eq!(spec.env_value("OP_SESSION_my"), None);
        assert_eq!(spec.env_value("OP_SESSION_SUBDOMAIN"), Some("my"));
    }
}
