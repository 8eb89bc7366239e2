//! Utility modules: console output, environment, filesystem, logging, paths, subprocesses.

pub mod console;
pub mod env;
pub mod fs;
pub mod logging;
pub mod path;
pub mod process;
