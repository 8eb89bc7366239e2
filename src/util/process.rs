//! Bounded execution of external programs (`op`, `ssh-add`, `ssh-keygen`).
//!
//! Commands are argv vectors; nothing goes through a shell. Environment
//! additions and stdin payloads may carry a session token, so [`CommandSpec`]
//! never prints them in its `Debug` output.

use crate::error::VaultError;
use anyhow::{Context, Result};
use std::fmt;
use std::io::{Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::debug;
use zeroize::Zeroizing;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Clone, Default)]
pub enum StdinMode {
    #[default]
    Null,
    /// Share the terminal, for programs that prompt.
    Inherit,
    Bytes(Zeroizing<Vec<u8>>),
}

impl fmt::Debug for StdinMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StdinMode::Null => f.write_str("Null"),
            StdinMode::Inherit => f.write_str("Inherit"),
            StdinMode::Bytes(b) => write!(f, "Bytes(<{} bytes>)", b.len()),
        }
    }
}

#[derive(Clone, Default)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub env_remove: Vec<String>,
    pub stdin: StdinMode,
    /// Let stderr go straight to the terminal instead of capturing it.
    pub inherit_stderr: bool,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn env_remove(mut self, key: impl Into<String>) -> Self {
        self.env_remove.push(key.into());
        self
    }

    pub fn stdin(mut self, stdin: StdinMode) -> Self {
        self.stdin = stdin;
        self
    }

    pub fn inherit_stderr(mut self) -> Self {
        self.inherit_stderr = true;
        self
    }

    /// Value of an environment addition; the last one wins, as with `Command::env`.
    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// `program arg1 arg2`, safe to log.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let env_keys: Vec<&str> = self.env.iter().map(|(k, _)| k.as_str()).collect();
        f.debug_struct("CommandSpec")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("env", &env_keys)
            .field("env_remove", &self.env_remove)
            .field("stdin", &self.stdin)
            .finish()
    }
}

#[derive(Clone, Default)]
pub struct ProcessOutput {
    pub stdout: Zeroizing<Vec<u8>>,
    pub stderr: Vec<u8>,
    /// Exit code; `None` when the process was killed by a signal.
    pub code: Option<i32>,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim_end().to_string()
    }

    /// Short failure description for diagnostics.
    pub fn failure_detail(&self) -> String {
        let status = match self.code {
            Some(code) => format!("exit status {}", code),
            None => "terminated by signal".to_string(),
        };
        let stderr = self.stderr_text();
        if stderr.is_empty() {
            status
        } else {
            format!("{}: {}", status, stderr)
        }
    }
}

impl fmt::Debug for ProcessOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessOutput")
            .field("stdout", &format_args!("<{} bytes>", self.stdout.len()))
            .field("stderr", &self.stderr_text())
            .field("code", &self.code)
            .finish()
    }
}

/// Runs one external command to completion.
pub trait CommandRunner {
    fn execute(&self, spec: &CommandSpec) -> Result<ProcessOutput>;
}

impl<T: CommandRunner + ?Sized> CommandRunner for &T {
    fn execute(&self, spec: &CommandSpec) -> Result<ProcessOutput> {
        (**self).execute(spec)
    }
}

/// Production runner: spawns the program and kills it once `timeout` elapses.
#[derive(Debug, Clone)]
pub struct VaultProcessRunner {
    timeout: Duration,
    echo_stderr: bool,
}

impl VaultProcessRunner {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            echo_stderr: false,
        }
    }

    /// Copy captured stderr to our own stderr after each command.
    pub fn echo_stderr(mut self, echo: bool) -> Self {
        self.echo_stderr = echo;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn echoes_stderr(&self) -> bool {
        self.echo_stderr
    }
}

impl CommandRunner for VaultProcessRunner {
    fn execute(&self, spec: &CommandSpec) -> Result<ProcessOutput> {
        debug!(command = %spec.display(), "running");

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args);
        for key in &spec.env_remove {
            cmd.env_remove(key);
        }
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }
        cmd.stdout(Stdio::piped());
        cmd.stderr(if spec.inherit_stderr {
            Stdio::inherit()
        } else {
            Stdio::piped()
        });
        cmd.stdin(match spec.stdin {
            StdinMode::Null => Stdio::null(),
            StdinMode::Inherit => Stdio::inherit(),
            StdinMode::Bytes(_) => Stdio::piped(),
        });

        let mut child = cmd.spawn().map_err(|source| VaultError::Spawn {
            program: spec.program.clone(),
            source,
        })?;

        // Feed stdin from a thread so a child that fills its stdout pipe
        // before reading input cannot deadlock us.
        let writer = match (&spec.stdin, child.stdin.take()) {
            (StdinMode::Bytes(bytes), Some(mut pipe)) => {
                let bytes = bytes.clone();
                Some(thread::spawn(move || {
                    let _ = pipe.write_all(&bytes);
                }))
            }
            _ => None,
        };
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let deadline = Instant::now() + self.timeout;
        let status = match wait_until(&mut child, deadline)? {
            Some(status) => status,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                debug!(program = %spec.program, "killed after timeout");
                return Err(VaultError::ProcessTimeout {
                    program: spec.program.clone(),
                    timeout: self.timeout,
                }
                .into());
            }
        };

        if let Some(writer) = writer {
            let _ = writer.join();
        }
        // A grandchild may still hold the pipes open after the child exits.
        let (Some(stdout), Some(stderr)) = (collect(stdout, deadline), collect(stderr, deadline))
        else {
            debug!(program = %spec.program, "output pipes still open at deadline");
            return Err(VaultError::ProcessTimeout {
                program: spec.program.clone(),
                timeout: self.timeout,
            }
            .into());
        };
        let output = ProcessOutput {
            stdout: Zeroizing::new(stdout),
            stderr,
            code: status.code(),
        };

        if self.echo_stderr && !output.stderr.is_empty() {
            eprint!("{}", String::from_utf8_lossy(&output.stderr));
        }
        debug!(program = %spec.program, code = ?output.code, "finished");
        Ok(output)
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

/// Output of a drain thread, or `None` if it is still reading at `deadline`.
fn collect(handle: Option<JoinHandle<Vec<u8>>>, deadline: Instant) -> Option<Vec<u8>> {
    let Some(handle) = handle else {
        return Some(Vec::new());
    };
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            return None;
        }
        thread::sleep(POLL_INTERVAL);
    }
    Some(handle.join().unwrap_or_default())
}

fn wait_until(child: &mut Child, deadline: Instant) -> Result<Option<ExitStatus>> {
    loop {
        if let Some(status) = child.try_wait().context("poll child process")? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}
