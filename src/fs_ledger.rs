//! Filesystem Ledger (engine §4.1).
//!
//! Enumerates files under the managed prefix, computes set differences, and
//! writes/reads per-install receipts. Generalizes the teacher's recursive
//! `gather_local_filelisting`-style walk (now backed by `walkdir`, already a
//! teacher dependency) to the receipt bookkeeping described in engine §3.

use crate::error::RedpillError;
use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::path::Path;
use walkdir::WalkDir;

/// Recursively list every path under `prefix`, relative to it. Directories
/// are suffixed with `/`; files (including symlinks, which are never
/// followed) are listed as-is.
pub fn listing(prefix: &Path) -> Result<BTreeSet<String>> {
    let mut out = BTreeSet::new();
    if !prefix.is_dir() {
        return Ok(out);
    }

    for entry in WalkDir::new(prefix)
        .follow_links(false)
        .min_depth(1)
        .into_iter()
    {
        let entry = entry.with_context(|| format!("walking {}", prefix.display()))?;
        let relative = entry
            .path()
            .strip_prefix(prefix)
            .expect("walkdir yields paths under prefix")
            .to_string_lossy()
            .replace(std::path::MAIN_SEPARATOR, "/");

        if entry.file_type().is_dir() {
            out.insert(format!("{relative}/"));
        } else {
            out.insert(relative);
        }
    }

    Ok(out)
}

/// `after \ before`: the paths introduced since `before` was captured.
pub fn diff(before: &BTreeSet<String>, after: &BTreeSet<String>) -> BTreeSet<String> {
    after.difference(before).cloned().collect()
}

/// Write a receipt: `paths` sorted and newline-joined, overwriting any
/// existing receipt of the same name.
pub fn write_receipt(receipts_dir: &Path, name: &str, paths: &BTreeSet<String>) -> Result<()> {
    let sorted: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
    let content = sorted.join("\n");
    let path = receipts_dir.join(name);
    std::fs::write(&path, content).with_context(|| format!("writing receipt {}", path.display()))
}

/// Read a receipt's paths. Rejects an absolute path with a fatal error:
/// receipts must only ever contain prefix-relative paths; an absolute one
/// indicates corruption.
pub fn read_receipt(receipts_dir: &Path, name: &str) -> Result<Vec<String>> {
    let path = receipts_dir.join(name);
    let content =
        std::fs::read_to_string(&path).with_context(|| format!("reading receipt {}", path.display()))?;

    let mut paths = Vec::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if Path::new(line).is_absolute() {
            return Err(RedpillError::Uninstall(format!(
                "got an absolute path in receipt {}",
                path.display()
            ))
            .into());
        }
        paths.push(line.to_string());
    }
    Ok(paths)
}

/// List every receipt file name present in `receipts_dir`.
pub fn list_receipts(receipts_dir: &Path) -> Result<Vec<String>> {
    if !receipts_dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut names = Vec::new();
    for entry in std::fs::read_dir(receipts_dir)
        .with_context(|| format!("reading receipts dir {}", receipts_dir.display()))?
    {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    Ok(names)
}

/// Delete every relative path under `prefix`: files and symlinks first, then
/// any directory left empty, processed in reverse-sorted order so children
/// are removed before their parents.
pub fn prune(prefix: &Path, paths: &[String]) -> Result<()> {
    let mut directories = BTreeSet::new();

    for rel in paths {
        let full = prefix.join(rel.trim_end_matches('/'));
        let is_dir_entry = rel.ends_with('/');

        if is_dir_entry {
            directories.insert(full);
            continue;
        }

        let meta = std::fs::symlink_metadata(&full);
        match meta {
            Ok(_) => {
                std::fs::remove_file(&full)
                    .with_context(|| format!("removing {}", full.display()))?;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e).with_context(|| format!("stat {}", full.display())),
        }
    }

    for dir in directories.iter().rev() {
        if dir.is_dir() && std::fs::read_dir(dir)?.next().is_none() {
            std::fs::remove_dir(dir).with_context(|| format!("removing directory {}", dir.display()))?;
        }
    }

    Ok(())
}
