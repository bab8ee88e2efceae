//! Distfile Fetcher (engine §4.3, §5 "Background task coordination").
//!
//! Downloads archives to the working directory and verifies a SHA-256
//! digest. Uses `ureq` for the blocking HTTP GET (as the teacher's
//! `helpers/acquire/http.rs` does), driven from a `tokio` background task so
//! the one-package-ahead pipelining contract can be satisfied with a single
//! capacity-one slot, per the design note on background task coordination.

use crate::error::RedpillError;
use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::{Path, PathBuf};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

/// One synchronous fetch (engine §4.3 steps 1-4).
pub fn fetch(name: &str, url: &str, expected_sha256: Option<&str>, dest: &Path) -> Result<()> {
    if dest.is_file() {
        let existing = std::fs::read(dest).with_context(|| format!("reading {}", dest.display()))?;
        if digest_matches(&existing, expected_sha256) {
            return Ok(());
        }
        std::fs::remove_file(dest).with_context(|| format!("removing stale {}", dest.display()))?;
    }

    let bytes = http_get(url).map_err(|e| RedpillError::Download {
        package: name.to_string(),
        reason: e.to_string(),
    })?;

    if !digest_matches(&bytes, expected_sha256) {
        return Err(RedpillError::Download {
            package: name.to_string(),
            reason: format!("Got an invalid hash digest for {name}"),
        }
        .into());
    }

    write_atomic(dest, &bytes).map_err(|e| RedpillError::Download {
        package: name.to_string(),
        reason: format!("write failed: {e}"),
    })?;

    Ok(())
}

fn digest_matches(bytes: &[u8], expected_sha256: Option<&str>) -> bool {
    match expected_sha256 {
        None => true,
        Some(expected) => {
            let mut hasher = Sha256::new();
            hasher.update(bytes);
            hex::encode(hasher.finalize()).eq_ignore_ascii_case(expected)
        }
    }
}

fn http_get(url: &str) -> Result<Vec<u8>> {
    let response = ureq::get(url)
        .call()
        .with_context(|| format!("GET {url}"))?;
    let mut bytes = Vec::new();
    response
        .into_reader()
        .read_to_end(&mut bytes)
        .with_context(|| format!("reading response body for {url}"))?;
    Ok(bytes)
}

fn write_atomic(dest: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = dest.with_extension("part");
    std::fs::write(&tmp, bytes).with_context(|| format!("writing {}", tmp.display()))?;
    std::fs::rename(&tmp, dest).with_context(|| format!("renaming to {}", dest.display()))?;
    Ok(())
}

/// What the executor is told about a pending fetch at a step boundary
/// (engine §5 suspension points).
pub struct PendingFetch {
    name: String,
    handle: JoinHandle<Result<(), RedpillError>>,
}

/// Drives the one-ahead pipelining contract: the executor enqueues the next
/// item's fetch before processing the current one, and waits for the
/// current item's fetch (already enqueued on a previous iteration, or
/// enqueued synchronously for the first item) before unpacking.
pub struct Fetcher {
    working_dir: PathBuf,
    runtime: Handle,
}

impl Fetcher {
    pub fn new(working_dir: PathBuf, runtime: Handle) -> Self {
        Self { working_dir, runtime }
    }

    pub fn dest_for(&self, distfile: &str) -> PathBuf {
        self.working_dir.join(distfile)
    }

    /// Enqueue a background fetch, returning a handle the caller must
    /// eventually `wait` on. At most one such handle should be outstanding
    /// at a time, per the one-slot design.
    pub fn enqueue(&self, name: String, url: String, expected_sha256: Option<String>) -> PendingFetch {
        let dest = self.dest_for(&self.distfile_basename(&url));
        let name_for_task = name.clone();
        let handle = self.runtime.spawn_blocking(move || {
            fetch(&name_for_task, &url, expected_sha256.as_deref(), &dest).map_err(|e| {
                match e.downcast::<RedpillError>() {
                    Ok(inner) => inner,
                    Err(other) => RedpillError::Download {
                        package: name_for_task.clone(),
                        reason: other.to_string(),
                    },
                }
            })
        });
        PendingFetch { name, handle }
    }

    fn distfile_basename(&self, url: &str) -> String {
        url.rsplit('/').next().unwrap_or(url).to_string()
    }

    /// Block until `pending` resolves, converting any failure into the
    /// fetcher's error list semantics: a `RedpillError::Download`.
    pub fn wait(&self, pending: PendingFetch) -> Result<()> {
        self.runtime
            .block_on(pending.handle)
            .with_context(|| format!("joining fetch task for {}", pending.name))?
            .map_err(anyhow::Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn sha256_hex(bytes: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        hex::encode(hasher.finalize())
    }

    #[tokio::test]
    async fn fetch_succeeds_on_matching_digest() {
        let server = MockServer::start().await;
        let body = b"distfile-contents".to_vec();
        Mock::given(method("GET"))
            .and(path("/pkg-1.0.tar.bz2"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .mount(&server)
            .await;

        let dir = tempfile::TempDir::new().unwrap();
        let dest = dir.path().join("pkg-1.0.tar.bz2");
        let url = format!("{}/pkg-1.0.tar.bz2", server.uri());

        fetch("pkg", &url, Some(&sha256_hex(&body)), &dest).unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), body);
    }

    #[tokio::test]
    async fn fetch_rejects_digest_mismatch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pkg-1.0.tar.bz2"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"wrong-bytes".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::TempDir::new().unwrap();
        let dest = dir.path().join("pkg-1.0.tar.bz2");
        let url = format!("{}/pkg-1.0.tar.bz2", server.uri());

        let err = fetch("pkg", &url, Some(&sha256_hex(b"expected")), &dest).unwrap_err();
        assert!(err.to_string().contains("invalid hash digest"));
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn fetch_reports_transport_failure() {
        let dir = tempfile::TempDir::new().unwrap();
        let dest = dir.path().join("pkg-1.0.tar.bz2");
        let err = fetch("pkg", "http://127.0.0.1:9/no-such-file", None, &dest).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RedpillError>(),
            Some(RedpillError::Download { .. })
        ));
    }

    #[tokio::test]
    async fn fetch_skips_redownload_when_existing_matches() {
        let dir = tempfile::TempDir::new().unwrap();
        let dest = dir.path().join("pkg-1.0.tar.bz2");
        let body = b"already-here".to_vec();
        std::fs::write(&dest, &body).unwrap();

        // No server is running; a no-op return proves no GET was attempted.
        fetch("pkg", "http://127.0.0.1:9/unused", Some(&sha256_hex(&body)), &dest).unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), body);
    }

    #[tokio::test]
    async fn pipelined_fetch_resolves_via_wait() {
        let server = MockServer::start().await;
        let body = b"distfile-contents".to_vec();
        Mock::given(method("GET"))
            .and(path("/pkg-1.0.tar.bz2"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .mount(&server)
            .await;

        let dir = tempfile::TempDir::new().unwrap();
        let fetcher = Fetcher::new(dir.path().to_path_buf(), Handle::current());
        let url = format!("{}/pkg-1.0.tar.bz2", server.uri());

        let pending = fetcher.enqueue("pkg".to_string(), url, Some(sha256_hex(&body)));
        fetcher.wait(pending).unwrap();
        assert_eq!(
            std::fs::read(dir.path().join("pkg-1.0.tar.bz2")).unwrap(),
            body
        );
    }
}
