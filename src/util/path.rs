//! Path helpers: normalization without filesystem access and home lookup.

use crate::util::env::ReadEnv;
use anyhow::{bail, Result};
use std::path::{Component, Path, PathBuf};

/// Normalize a path by resolving `.` and `..` components without filesystem access.
pub fn normalize(path: &Path) -> PathBuf {
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                components.pop();
            }
            Component::CurDir => {}
            other => components.push(other),
        }
    }
    components.iter().collect()
}

/// Check if `path` is contained within `root` after normalization.
pub fn is_within(path: &Path, root: &Path) -> bool {
    normalize(path).starts_with(normalize(root))
}

/// Join a vault-supplied file name onto `root`, refusing anything that escapes it.
pub fn join_within(root: &Path, name: &str) -> Result<PathBuf> {
    let candidate = Path::new(name);
    if name.is_empty() || candidate.is_absolute() {
        bail!("refusing key file name \"{}\"", name);
    }
    let joined = root.join(candidate);
    if !is_within(&joined, root) || normalize(&joined) == normalize(root) {
        bail!("key file name \"{}\" escapes {}", name, root.display());
    }
    Ok(joined)
}

/// Home directory from `$HOME`, falling back to the password database.
pub fn home_dir(env: &impl ReadEnv) -> Option<PathBuf> {
    if let Ok(home) = env.var("HOME") {
        if !home.is_empty() {
            return Some(PathBuf::from(home));
        }
    }
    nix::unistd::User::from_uid(nix::unistd::getuid())
        .ok()
        .flatten()
        .map(|user| user.dir)
}
