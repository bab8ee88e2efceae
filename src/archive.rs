//! Native archive extraction (engine §4.5 "unpack the distfile").
//!
//! Ported from the teacher's `helpers/build/extract.rs`: same format
//! detection and the same tar/zip crates, with the `rhai::EvalAltResult`
//! plumbing replaced by `anyhow::Result` and the path-traversal rejection
//! kept as-is.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Component, Path};

fn extract_tar<R: Read>(reader: R, dest: &Path) -> Result<()> {
    let mut archive = tar::Archive::new(reader);

    for entry in archive.entries().context("reading tar entries")? {
        let mut entry = entry.context("reading tar entry")?;
        let path = entry.path().context("reading tar entry path")?.into_owned();

        if path.is_absolute() || path.components().any(|c| c == Component::ParentDir) {
            anyhow::bail!("archive contains unsafe path: {}", path.display());
        }

        let full_path = dest.join(&path);
        if let Some(parent) = full_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }

        entry
            .unpack(&full_path)
            .with_context(|| format!("unpacking {}", path.display()))?;
    }

    Ok(())
}

fn extract_tar_gz(archive_path: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive_path).with_context(|| format!("opening {}", archive_path.display()))?;
    let decoder = flate2::read::GzDecoder::new(BufReader::new(file));
    extract_tar(decoder, dest)
}

fn extract_tar_xz(archive_path: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive_path).with_context(|| format!("opening {}", archive_path.display()))?;
    let decoder = xz2::read::XzDecoder::new(BufReader::new(file));
    extract_tar(decoder, dest)
}

fn extract_tar_bz2(archive_path: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive_path).with_context(|| format!("opening {}", archive_path.display()))?;
    let decoder = bzip2::read::BzDecoder::new(BufReader::new(file));
    extract_tar(decoder, dest)
}

fn extract_tar_zst(archive_path: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive_path).with_context(|| format!("opening {}", archive_path.display()))?;
    let decoder = zstd::stream::read::Decoder::new(BufReader::new(file)).context("zstd init error")?;
    extract_tar(decoder, dest)
}

fn extract_tar_plain(archive_path: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive_path).with_context(|| format!("opening {}", archive_path.display()))?;
    extract_tar(BufReader::new(file), dest)
}

fn extract_zip(archive_path: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive_path).with_context(|| format!("opening {}", archive_path.display()))?;
    let mut archive = zip::ZipArchive::new(file).context("reading zip archive")?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).context("reading zip entry")?;
        let outpath = match entry.enclosed_name() {
            Some(path) => dest.join(path),
            None => continue,
        };

        if entry.is_dir() {
            std::fs::create_dir_all(&outpath)
                .with_context(|| format!("creating {}", outpath.display()))?;
        } else {
            if let Some(parent) = outpath.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
            let mut outfile = std::fs::File::create(&outpath)
                .with_context(|| format!("creating {}", outpath.display()))?;
            std::io::copy(&mut entry, &mut outfile)
                .with_context(|| format!("writing {}", outpath.display()))?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Some(mode) = entry.unix_mode() {
                    std::fs::set_permissions(&outpath, std::fs::Permissions::from_mode(mode)).ok();
                }
            }
        }
    }

    Ok(())
}

/// Detect an archive's format from its filename extension.
pub fn detect_format(archive: &str) -> Option<&'static str> {
    let lower = archive.to_lowercase();
    if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
        Some("tar.gz")
    } else if lower.ends_with(".tar.xz") || lower.ends_with(".txz") {
        Some("tar.xz")
    } else if lower.ends_with(".tar.bz2") || lower.ends_with(".tbz2") {
        Some("tar.bz2")
    } else if lower.ends_with(".tar.zst") || lower.ends_with(".tzst") {
        Some("tar.zst")
    } else if lower.ends_with(".zip") {
        Some("zip")
    } else if lower.ends_with(".tar") {
        Some("tar")
    } else {
        None
    }
}

/// Extract an archive to `dest`, auto-detecting its format from the
/// filename extension. Supports tar.gz, tar.xz, tar.bz2, tar.zst, zip, tar.
pub fn extract(archive: &Path, dest: &Path) -> Result<()> {
    let filename = archive.to_string_lossy();
    let format = detect_format(&filename)
        .ok_or_else(|| anyhow::anyhow!("cannot detect archive format: {}", filename))?;
    extract_with_format(archive, dest, format)
}

/// Extract an archive to `dest` with an explicit format, bypassing
/// extension sniffing.
pub fn extract_with_format(archive: &Path, dest: &Path, format: &str) -> Result<()> {
    std::fs::create_dir_all(dest).with_context(|| format!("creating {}", dest.display()))?;

    match format {
        "tar.gz" | "tgz" => extract_tar_gz(archive, dest),
        "tar.xz" | "txz" => extract_tar_xz(archive, dest),
        "tar.bz2" | "tbz2" => extract_tar_bz2(archive, dest),
        "tar.zst" | "tzst" => extract_tar_zst(archive, dest),
        "tar" => extract_tar_plain(archive, dest),
        "zip" => extract_zip(archive, dest),
        other => anyhow::bail!("unknown archive format: {other}"),
    }
}
