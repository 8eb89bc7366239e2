//! Read-only environment access, swappable for a map in tests.

use std::collections::HashMap;
use std::env::{self, VarError};

pub trait ReadEnv {
    fn var(&self, key: &str) -> Result<String, VarError>;
}

/// Zero-sized type; delegates to `std::env`.
pub struct SystemEnv;

impl ReadEnv for SystemEnv {
    #[inline]
    fn var(&self, key: &str) -> Result<String, VarError> {
        env::var(key)
    }
}

impl ReadEnv for HashMap<String, String> {
    fn var(&self, key: &str) -> Result<String, VarError> {
        self.get(key).cloned().ok_or(VarError::NotPresent)
    }
}

/// Non-empty value of `key`, if set.
pub fn non_empty(env: &impl ReadEnv, key: &str) -> Option<String> {
    env.var(key).ok().filter(|v| !v.is_empty())
}
