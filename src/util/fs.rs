use anyhow::{Context, Result};
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use tempfile::NamedTempFile;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

pub fn ensure_dir(path: &Path, mode: u32) -> Result<()> {
    if path.exists() {
        return Ok(());
    }
    fs::create_dir_all(path).with_context(|| format!("create directory {}", path.display()))?;
    set_permissions(path, mode)
}

pub fn set_permissions(path: &Path, mode: u32) -> Result<()> {
    #[cfg(unix)]
    {
        let perm = fs::Permissions::from_mode(mode);
        fs::set_permissions(path, perm)
            .with_context(|| format!("set permissions {:o} on {}", mode, path.display()))?;
    }
    Ok(())
}

/// Write `data` to `path` through a temp file in the same directory.
///
/// The temp file gets `mode` before any byte is written, so a private key is
/// never readable by others, not even briefly.
pub fn write_atomic(path: &Path, data: &[u8], mode: u32) -> Result<()> {
    staged(path, data, mode)?
        .persist(path)
        .map_err(|err| anyhow::anyhow!("persist {}: {}", path.display(), err.error))?;
    Ok(())
}

/// Like [`write_atomic`], but never replaces an existing `path`.
///
/// Returns `false` when `path` already existed at the moment of the rename.
pub fn write_atomic_new(path: &Path, data: &[u8], mode: u32) -> Result<bool> {
    match staged(path, data, mode)?.persist_noclobber(path) {
        Ok(_) => Ok(true),
        Err(err) if err.error.kind() == io::ErrorKind::AlreadyExists => Ok(false),
        Err(err) => Err(anyhow::anyhow!("persist {}: {}", path.display(), err.error)),
    }
}

fn staged(path: &Path, data: &[u8], mode: u32) -> Result<NamedTempFile> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::Builder::new()
        .prefix(".opssh-")
        .tempfile_in(dir)
        .with_context(|| format!("create temp file in {}", dir.display()))?;

    #[cfg(unix)]
    {
        tmp.as_file()
            .set_permissions(fs::Permissions::from_mode(mode))
            .context("set permissions on temp file")?;
    }

    tmp.write_all(data)
        .with_context(|| format!("write {}", path.display()))?;
    tmp.as_file().sync_all().ok();
    Ok(tmp)
}

#[cfg(unix)]
pub fn mode_of(path: &Path) -> Option<u32> {
    fs::metadata(path)
        .ok()
        .map(|m| m.permissions().mode() & 0o777)
}

#[cfg(not(unix))]
pub fn mode_of(_path: &Path) -> Option<u32> {
    None
}
