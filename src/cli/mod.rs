//! CLI routing and command dispatch.

use crate::constants;
use crate::core::agent::{AgentBridge, AgentTools, BatchReport, KeyOutcome};
use crate::core::catalog::VaultCatalog;
use crate::core::config;
use crate::core::resolver::KeyResolver;
use crate::core::session::{SessionConfig, SessionManager};
use crate::models::settings::Settings;
use crate::util::console::{Console, Verbosity};
use crate::util::env::{ReadEnv, SystemEnv};
use crate::util::logging;
use crate::util::path::home_dir;
use crate::util::process::{CommandRunner, VaultProcessRunner};
use anyhow::{bail, Result};
use clap::{ArgGroup, Args, Parser, Subcommand};
use std::collections::BTreeSet;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub mod add;
pub mod doctor;
pub mod download;
pub mod list;

/// Shared context passed to all command handlers.
pub struct CliContext {
    pub session: SessionConfig,
    pub tools: AgentTools,
    pub keys_path: PathBuf,
    pub console: Console,
    pub config_path: Option<PathBuf>,
    pub config_load_warning: Option<String>,
}

impl CliContext {
    /// Merge flags, environment and `config.toml` into one context.
    pub fn resolve(cli: &Cli, env: &impl ReadEnv) -> Result<Self> {
        let verbosity = Verbosity::from_flags(cli.verbose, cli.quiet);
        let console = Console::new(verbosity);

        // Best-effort: an unreadable config falls back to defaults with a warning.
        let config_path = cli.config.clone().or_else(|| config::default_path(env));
        let mut config_load_warning = None;
        let settings = match &config_path {
            Some(path) => match config::load(path) {
                Ok(settings) => settings,
                Err(e) => {
                    config_load_warning = Some(format!("{:#}", e));
                    Settings::default()
                }
            },
            None => Settings::default(),
        };

        let vault = settings.vault;
        let mut session = SessionConfig::new(
            cli.domain
                .clone()
                .or(vault.subdomain)
                .unwrap_or_else(|| constants::DEFAULT_SUBDOMAIN.to_string()),
        );
        session.timeout = Duration::from_secs(
            cli.timeout
                .or(vault.timeout_secs)
                .unwrap_or(constants::DEFAULT_TIMEOUT_SECS),
        );
        if let Some(tries) = vault.login_tries {
            session.max_login_retries = tries.max(1);
        }
        session.max_reauth_attempts = vault.max_reauth_attempts;
        session.verbosity = verbosity;
        if let Some(program) = vault.op_program {
            session.op_program = program;
        }

        let ssh = settings.ssh;
        let keys_path = match cli.ssh_keys.clone().or(ssh.keys_path) {
            Some(path) => path,
            None => match home_dir(env) {
                Some(home) => home.join(".ssh"),
                None => bail!("cannot determine home directory; pass --ssh-keys"),
            },
        };

        let mut tools = AgentTools::default();
        if let Some(program) = ssh.ssh_add_program {
            tools.ssh_add = program;
        }
        if let Some(program) = ssh.ssh_keygen_program {
            tools.ssh_keygen = program;
        }
        tools.askpass = ssh.askpass_program.unwrap_or_else(default_askpass);

        Ok(Self {
            session,
            tools,
            keys_path,
            console,
            config_path,
            config_load_warning,
        })
    }

    pub fn runner(&self) -> VaultProcessRunner {
        VaultProcessRunner::new(self.session.timeout)
            .echo_stderr(self.console.verbosity() >= Verbosity::Verbose)
    }

    /// Session (reusing an inherited token) and item listing.
    pub fn open_catalog<R: CommandRunner>(
        &self,
        runner: R,
        env: &impl ReadEnv,
    ) -> Result<VaultCatalog<R>> {
        let session = SessionManager::from_env(self.session.clone(), runner, env);
        VaultCatalog::load(session)
    }

    pub fn bridge<R: CommandRunner + Clone>(
        &self,
        runner: R,
        env: &impl ReadEnv,
    ) -> Result<AgentBridge<VaultCatalog<R>, R>> {
        let catalog = self.open_catalog(runner.clone(), env)?;
        let resolver = KeyResolver::new(catalog, self.console);
        Ok(AgentBridge::new(
            resolver,
            runner,
            self.tools.clone(),
            self.keys_path.clone(),
            self.console,
        ))
    }
}

/// The callback binary installed next to this one, else whatever `PATH` resolves.
fn default_askpass() -> String {
    env::current_exe()
        .ok()
        .map(|exe| exe.with_file_name(constants::DEFAULT_ASKPASS_PROGRAM))
        .filter(|candidate| candidate.is_file())
        .map(|candidate| candidate.display().to_string())
        .unwrap_or_else(|| constants::DEFAULT_ASKPASS_PROGRAM.to_string())
}

#[derive(Parser, Debug)]
#[command(
    name = "opssh",
    version,
    about = "Load SSH keys and passphrases from a 1Password vault into ssh-agent"
)]
pub struct Cli {
    /// 1Password account subdomain
    #[arg(short = 'd', long = "domain", global = true, env = "OPSSH_DOMAIN", value_name = "SUBDOMAIN")]
    pub domain: Option<String>,

    /// Timeout for each vault command, in seconds
    #[arg(short = 't', long, global = true, env = "OPSSH_TIMEOUT", value_name = "SECONDS")]
    pub timeout: Option<u64>,

    /// Directory holding private keys (default: ~/.ssh)
    #[arg(short = 's', long = "ssh-keys", global = true, env = "OPSSH_KEYS_PATH", value_name = "PATH")]
    pub ssh_keys: Option<PathBuf>,

    /// Show every step
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Only report failures
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (default: $XDG_CONFIG_HOME/opssh/config.toml)
    #[arg(long, global = true, env = "OPSSH_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        logging::init(Verbosity::from_flags(self.verbose, self.quiet));

        let env = SystemEnv;
        let ctx = CliContext::resolve(&self, &env)?;
        if let Some(w) = &ctx.config_load_warning {
            ctx.console.warn(format!("ignoring config: {}", w));
        }

        let runner = ctx.runner();
        match self.command {
            Commands::Add(args) => add::run(&ctx, args, &runner, &env),
            Commands::Download(args) => download::run(&ctx, args, &runner, &env),
            Commands::List(args) => list::run(&ctx, args, &runner, &env),
            Commands::Doctor(args) => doctor::run(&ctx, args, &env),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Add keys to ssh-agent, passphrases served from the vault
    Add(add::AddArgs),
    /// Write private key files from the vault and derive their public keys
    Download(download::DownloadArgs),
    /// List SSH key records found in the vault
    List(list::ListArgs),
    /// Diagnose installation and configuration (safe, read-only)
    Doctor(doctor::DoctorArgs),
}

/// `--all` or one or more key names.
#[derive(Args, Debug)]
#[command(group(ArgGroup::new("selection").required(true).args(["all", "names"])))]
pub struct KeySelection {
    /// Every key in the vault
    #[arg(short, long)]
    pub all: bool,

    /// Key names to process
    #[arg(value_name = "NAME")]
    pub names: Vec<String>,
}

impl KeySelection {
    /// `None` selects everything.
    pub fn selected(&self) -> Option<BTreeSet<String>> {
        if self.all {
            None
        } else {
            Some(self.names.iter().cloned().collect())
        }
    }
}

/// Print failures, then turn them into a non-zero exit.
pub(crate) fn finish_batch(console: &Console, report: &BatchReport, action: &str) -> Result<()> {
    let failures: Vec<&KeyOutcome> = report.failures().collect();
    if failures.is_empty() {
        console.detail(format!("{}: {} step(s) ok", action, report.outcomes.len()));
        return Ok(());
    }
    for failure in &failures {
        console.detail(format!("{} ({}): {}", failure.name, failure.target, failure.outcome));
    }
    bail!("{}: {} of {} step(s) failed", action, failures.len(), report.outcomes.len());
}
