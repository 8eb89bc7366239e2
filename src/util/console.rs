//! Operator-facing progress output on stderr.
//!
//! Progress lines look like `Adding key "work" to ssh-agent ......... Done.`
//! and are gated by [`Verbosity`]. Failures are always shown.

use crate::constants::PROGRESS_WIDTH;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    Quiet,
    #[default]
    Normal,
    Verbose,
}

impl Verbosity {
    pub fn from_flags(verbose: bool, quiet: bool) -> Self {
        match (verbose, quiet) {
            (_, true) => Verbosity::Quiet,
            (true, false) => Verbosity::Verbose,
            (false, false) => Verbosity::Normal,
        }
    }

    /// Default tracing filter for this verbosity when `RUST_LOG` is unset.
    pub fn log_filter(self) -> &'static str {
        match self {
            Verbosity::Quiet => "error",
            Verbosity::Normal => "warn",
            Verbosity::Verbose => "debug",
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Console {
    verbosity: Verbosity,
}

impl Console {
    pub fn new(verbosity: Verbosity) -> Self {
        Self { verbosity }
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    /// Status line shown at normal verbosity and above.
    pub fn info(&self, message: impl Display) {
        if self.verbosity >= Verbosity::Normal {
            eprintln!("{} ....", message);
        }
    }

    /// Status line shown only when verbose.
    pub fn detail(&self, message: impl Display) {
        if self.verbosity >= Verbosity::Verbose {
            eprintln!("{} ....", message);
        }
    }

    pub fn warn(&self, message: impl Display) {
        eprintln!("warning: {}", message);
    }

    /// Start a dotted progress line; finish it with [`Progress::done`] or [`Progress::failed`].
    pub fn progress(&self, message: impl Display) -> Progress {
        let message = message.to_string();
        let shown = self.verbosity >= Verbosity::Normal;
        if shown {
            eprint!("{}", pad(&message));
            std::io::stderr().flush().ok();
        }
        Progress { message, shown }
    }
}

fn pad(message: &str) -> String {
    format!("{:.<width$} ", format!("{} ", message), width = PROGRESS_WIDTH)
}

#[must_use]
pub struct Progress {
    message: String,
    shown: bool,
}

impl Progress {
    pub fn done(self) {
        if self.shown {
            eprintln!("Done.");
        }
    }

    pub fn skipped(self, reason: impl Display) {
        if self.shown {
            eprintln!("Skipped ({}).", reason);
        }
    }

    pub fn failed(self, detail: impl Display) {
        if self.shown {
            eprintln!("FAILED.");
            eprintln!("ERR = {}", detail.to_string().trim_end());
        } else {
            eprintln!("{}: FAILED ({})", self.message, detail.to_string().trim_end());
        }
    }
}
