//! Single-instance process lock (engine §4.6 step 1, §5, §6).
//!
//! Generalizes the teacher's `core/lock.rs` `RecipeLock` — there, an
//! advisory lock over a single recipe file; here, the one exclusive lock
//! held for an entire install/uninstall run, keyed off the prefix.

use crate::error::RedpillError;
use anyhow::{Context, Result};
use fs2::FileExt;
use sha1::{Digest, Sha1};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

/// `/tmp/redpill-{first-8-hex-of-sha1(environ)}` (engine §6).
pub fn working_dir_for(environ: &Path) -> PathBuf {
    let mut hasher = Sha1::new();
    hasher.update(environ.to_string_lossy().as_bytes());
    let digest = hex::encode(hasher.finalize());
    std::env::temp_dir().join(format!("redpill-{}", &digest[..8]))
}

/// RAII guard for the install lock; releases on drop.
#[derive(Debug)]
pub struct InstallLock {
    _file: File,
}

/// Acquire the single-instance exclusive lock for `working_dir`. Contention
/// is an immediate `RedpillError::FatalConcurrency`.
pub fn acquire(working_dir: &Path) -> Result<InstallLock> {
    let lock_path = lock_path_for(working_dir);
    if let Some(parent) = lock_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }

    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .open(&lock_path)
        .with_context(|| format!("opening lock file {}", lock_path.display()))?;

    file.try_lock_exclusive()
        .map_err(|_| RedpillError::FatalConcurrency)?;

    Ok(InstallLock { _file: file })
}

fn lock_path_for(working_dir: &Path) -> PathBuf {
    let mut name = working_dir
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".lock");
    working_dir
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(name)
}
