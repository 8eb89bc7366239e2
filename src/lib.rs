//! Load SSH keys and their passphrases from a 1Password vault.
//!
//! Drives the `op` CLI for vault access, then `ssh-add` / `ssh-keygen` with
//! passphrases served by the `opssh-askpass` callback, so secrets never reach
//! a command line.
//!
//! ## Modules
//! - `cli`: Command-line handlers
//! - `core`: Session, catalog, key resolution, agent bridge, askpass callback
//! - `models`: Vault items, key records, settings
//! - `util`: Console, environment, filesystem, subprocesses

pub mod cli;
pub mod constants;
pub mod core;
pub mod error;
pub mod models;
pub mod util;

#[cfg(test)]
mod testing;
