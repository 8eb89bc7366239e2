//! Tracing subscriber setup shared by both binaries.

use crate::util::console::Verbosity;

/// Install a stderr `fmt` subscriber. `RUST_LOG` overrides the verbosity-derived level.
pub fn init(verbosity: Verbosity) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(verbosity.log_filter())),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
