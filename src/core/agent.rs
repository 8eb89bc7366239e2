//! Drives `ssh-add` and `ssh-keygen` with passphrases served by the askpass callback.
//!
//! Passphrases never appear on a command line or on a child's stdin: each child
//! gets `SSH_ASKPASS` pointing at `opssh-askpass`, the exported session, and the
//! `SSH_KEY_ID` of the key it is working on. The child runs the callback, which
//! prints the passphrase.

use crate::constants;
use crate::core::catalog::VaultAccess;
use crate::core::resolver::KeyResolver;
use crate::core::session::SessionExport;
use crate::util::console::{Console, Progress};
use crate::util::fs as key_fs;
use crate::util::path::join_within;
use crate::util::process::{CommandRunner, CommandSpec, StdinMode};
use anyhow::{bail, Result};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// External programs the bridge runs.
#[derive(Debug, Clone)]
pub struct AgentTools {
    pub ssh_add: String,
    pub ssh_keygen: String,
    pub askpass: String,
}

impl Default for AgentTools {
    fn default() -> Self {
        Self {
            ssh_add: constants::DEFAULT_SSH_ADD_PROGRAM.to_string(),
            ssh_keygen: constants::DEFAULT_SSH_KEYGEN_PROGRAM.to_string(),
            askpass: constants::DEFAULT_ASKPASS_PROGRAM.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum Outcome {
    Done,
    /// Target file already present and overwriting was not requested.
    Exists,
    /// No vault record for a requested name.
    Missing,
    Failed(String),
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Done => f.write_str("done"),
            Outcome::Exists => f.write_str("exists"),
            Outcome::Missing => f.write_str("missing"),
            Outcome::Failed(detail) => write!(f, "failed: {}", detail),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyOutcome {
    pub name: String,
    /// What the step acted on: `ssh-agent` or a file path.
    pub target: String,
    pub outcome: Outcome,
}

/// Per-item results of a batch operation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub outcomes: Vec<KeyOutcome>,
}

impl BatchReport {
    fn push(&mut self, name: &str, target: impl Into<String>, outcome: Outcome) {
        self.outcomes.push(KeyOutcome {
            name: name.to_string(),
            target: target.into(),
            outcome,
        });
    }

    /// Outcomes that should make the front door exit non-zero.
    pub fn failures(&self) -> impl Iterator<Item = &KeyOutcome> {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.outcome, Outcome::Failed(_) | Outcome::Missing))
    }

    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }

    pub fn outcome_for(&self, name: &str, target: &str) -> Option<&Outcome> {
        self.outcomes
            .iter()
            .find(|o| o.name == name && o.target == target)
            .map(|o| &o.outcome)
    }
}

const AGENT_TARGET: &str = "ssh-agent";

pub struct AgentBridge<V, R> {
    resolver: KeyResolver<V>,
    runner: R,
    tools: AgentTools,
    keys_path: PathBuf,
    console: Console,
}

impl<V: VaultAccess, R: CommandRunner> AgentBridge<V, R> {
    pub fn new(
        resolver: KeyResolver<V>,
        runner: R,
        tools: AgentTools,
        keys_path: PathBuf,
        console: Console,
    ) -> Self {
        console.detail(format!("Using SSH path \"{}\"", keys_path.display()));
        Self {
            resolver,
            runner,
            tools,
            keys_path,
            console,
        }
    }

    pub fn resolver_mut(&mut self) -> &mut KeyResolver<V> {
        &mut self.resolver
    }

    pub fn keys_path(&self) -> &Path {
        &self.keys_path
    }

    /// Remove every identity from the agent (`ssh-add -D`). Returns whether it succeeded.
    pub fn delete_all(&self) -> bool {
        let progress = self
            .console
            .progress("Calling ssh-add to delete current keys");
        let spec = CommandSpec::new(&self.tools.ssh_add).arg("-D");
        match self.runner.execute(&spec) {
            Ok(output) if output.success() => {
                progress.done();
                true
            }
            Ok(output) => {
                progress.failed(output.failure_detail());
                false
            }
            Err(err) => {
                progress.failed(format!("{:#}", err));
                false
            }
        }
    }

    /// Add the selected keys (all when `selected` is `None`) to the agent.
    pub fn add_keys_to_agent(
        &mut self,
        selected: Option<&BTreeSet<String>>,
        delete_first: bool,
    ) -> Result<BatchReport> {
        let names: Vec<String> = self.resolver.resolve_keys()?.keys().cloned().collect();
        let export = self.resolver.vault().session_export();

        if delete_first {
            self.delete_all();
        }

        let mut report = BatchReport::default();
        self.report_missing(&mut report, selected, &names, AGENT_TARGET);

        for name in names.iter().filter(|n| is_selected(selected, n)) {
            let progress = self
                .console
                .progress(format!("Adding key \"{}\" to ssh-agent", name));
            let outcome = match join_within(&self.keys_path, name) {
                Ok(path) => {
                    let spec = self.askpass_command(&self.tools.ssh_add, &export, name).args([
                        "-q".to_string(),
                        path.display().to_string(),
                    ]);
                    self.run_step(&spec)
                }
                Err(err) => Outcome::Failed(err.to_string()),
            };
            finish(progress, &outcome);
            report.push(name, AGENT_TARGET, outcome);
        }
        Ok(report)
    }

    /// Write the selected private keys to the keys directory and derive their public halves.
    pub fn materialize_key_files(
        &mut self,
        selected: Option<&BTreeSet<String>>,
        overwrite: bool,
    ) -> Result<BatchReport> {
        let files: Vec<String> = self
            .resolver
            .resolve_private_key_files()?
            .keys()
            .cloned()
            .collect();
        let with_passphrase: BTreeSet<String> =
            self.resolver.resolve_keys()?.keys().cloned().collect();

        let mut report = BatchReport::default();
        self.report_missing(&mut report, selected, &files, "key file");

        let wanted: Vec<&String> = files.iter().filter(|n| is_selected(selected, n)).collect();
        if wanted.is_empty() {
            return Ok(report);
        }
        key_fs::ensure_dir(&self.keys_path, constants::KEYS_DIR_MODE)?;

        for name in wanted {
            let private = match self.write_private_key(name, overwrite) {
                Ok(step) => step,
                Err(err) => {
                    let outcome = Outcome::Failed(format!("{:#}", err));
                    self.console
                        .warn(format!("private key \"{}\": {}", name, outcome));
                    report.push(name, "private key", outcome);
                    continue;
                }
            };
            let written = private.outcome == Outcome::Done;
            let private_path = private.path.clone();
            report.push(name, private.path.display().to_string(), private.outcome);

            if !written {
                continue;
            }
            if !with_passphrase.contains(name) {
                debug!(name = %name, "no passphrase record, skipping public key");
                self.console
                    .detail(format!("No passphrase for \"{}\", not deriving public key", name));
                continue;
            }
            let (target, outcome) = self.write_public_key(name, &private_path, overwrite);
            report.push(name, target.display().to_string(), outcome);
        }
        Ok(report)
    }

    fn write_private_key(&mut self, name: &str, overwrite: bool) -> Result<FileStep> {
        let filename = match self.resolver.resolve_private_key_files()?.get(name) {
            Some(record) => record.filename.clone(),
            None => bail!("no key file record for \"{}\"", name),
        };
        let path = join_within(&self.keys_path, &filename)?;

        if path.exists() && !overwrite {
            self.console.info(format!(
                "File \"{}\" exists, not overwriting",
                path.display()
            ));
            return Ok(FileStep {
                path,
                outcome: Outcome::Exists,
            });
        }

        let verb = if path.exists() { "Overwriting" } else { "Writing" };
        let progress = self.console.progress(format!(
            "{} \"{}\" as private key \"{}\"",
            verb,
            path.display(),
            name
        ));
        let outcome = match self.resolver.private_key(name) {
            Ok((_, bytes)) => store(&path, &bytes, constants::PRIVATE_KEY_MODE, overwrite),
            Err(err) => Outcome::Failed(format!("{:#}", err)),
        };
        finish(progress, &outcome);
        Ok(FileStep { path, outcome })
    }

    fn write_public_key(&self, name: &str, private: &Path, overwrite: bool) -> (PathBuf, Outcome) {
        let mut target = private.as_os_str().to_owned();
        target.push(constants::PUBLIC_KEY_EXTENSION);
        let target = PathBuf::from(target);

        if target.exists() && !overwrite {
            self.console.info(format!(
                "File \"{}\" exists, not overwriting",
                target.display()
            ));
            return (target, Outcome::Exists);
        }

        let progress = self
            .console
            .progress(format!("Deriving public key \"{}\"", target.display()));
        let export = self.resolver.vault().session_export();
        let spec = self
            .askpass_command(&self.tools.ssh_keygen, &export, name)
            .args(["-y".to_string(), "-f".to_string(), private.display().to_string()]);

        let outcome = match self.runner.execute(&spec) {
            Ok(output) if output.success() && !output.stdout.is_empty() => {
                store(&target, &output.stdout, constants::PUBLIC_KEY_MODE, overwrite)
            }
            Ok(output) => Outcome::Failed(output.failure_detail()),
            Err(err) => Outcome::Failed(format!("{:#}", err)),
        };
        finish(progress, &outcome);
        (target, outcome)
    }

    /// `program` with the askpass environment for `key_id`.
    fn askpass_command(&self, program: &str, export: &SessionExport, key_id: &str) -> CommandSpec {
        export
            .apply(CommandSpec::new(program))
            .env(constants::SSH_ASKPASS_VAR, self.tools.askpass.as_str())
            .env(constants::SSH_ASKPASS_REQUIRE_VAR, "force")
            .env(constants::DISPLAY_VAR, constants::DISPLAY_PLACEHOLDER)
            .env(constants::KEY_ID_VAR, key_id)
            .stdin(StdinMode::Null)
    }

    fn run_step(&self, spec: &CommandSpec) -> Outcome {
        match self.runner.execute(spec) {
            Ok(output) if output.success() => Outcome::Done,
            Ok(output) => Outcome::Failed(output.failure_detail()),
            Err(err) => Outcome::Failed(format!("{:#}", err)),
        }
    }

    fn report_missing(
        &self,
        report: &mut BatchReport,
        selected: Option<&BTreeSet<String>>,
        known: &[String],
        target: &str,
    ) {
        let Some(selected) = selected else {
            return;
        };
        for name in selected.iter().filter(|n| !known.contains(n)) {
            warn!(name = %name, "requested key not found in vault");
            self.console
                .warn(format!("Unable to find key \"{}\" in vault", name));
            report.push(name, target, Outcome::Missing);
        }
    }
}

struct FileStep {
    path: PathBuf,
    outcome: Outcome,
}

/// Atomic write; without `overwrite` a file that appeared meanwhile is kept.
fn store(path: &Path, data: &[u8], mode: u32, overwrite: bool) -> Outcome {
    let written = if overwrite {
        key_fs::write_atomic(path, data, mode).map(|()| true)
    } else {
        key_fs::write_atomic_new(path, data, mode)
    };
    match written {
        Ok(true) => Outcome::Done,
        Ok(false) => {
            debug!(path = %path.display(), "file appeared before write, kept");
            Outcome::Exists
        }
        Err(err) => Outcome::Failed(format!("{:#}", err)),
    }
}

fn is_selected(selected: Option<&BTreeSet<String>>, name: &str) -> bool {
    selected.map_or(true, |s| s.contains(name))
}

fn finish(progress: Progress, outcome: &Outcome) {
    match outcome {
        Outcome::Done => progress.done(),
        Outcome::Exists => progress.skipped("exists"),
        Outcome::Missing => progress.skipped("missing"),
        Outcome::Failed(detail) => progress.failed(detail),
    }
}
