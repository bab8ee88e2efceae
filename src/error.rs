//! Structured error categories for the engine.
//!
//! Most functions return `anyhow::Result<T>` with `.context(...)` attached at
//! each fallible boundary. Where a caller needs to branch on *why* something
//! failed (tests, mostly), a `RedpillError` is the innermost error and can be
//! recovered with `anyhow::Error::downcast_ref`.

use thiserror::Error;

/// The error categories from the error handling design (engine §7).
#[derive(Debug, Error)]
pub enum RedpillError {
    /// Missing prefix, missing config key, unreadable recipe/role file.
    #[error("configuration error: {0}")]
    FatalConfig(String),

    /// The single-instance install lock is already held by another process.
    #[error("another redpill process is already running")]
    FatalConcurrency,

    /// Unknown package, or a cycle in `requires`.
    #[error("recipe error: {0}")]
    FatalRecipe(String),

    /// Transport failure or digest mismatch while fetching a distfile.
    #[error("download error for {package}: {reason}")]
    Download { package: String, reason: String },

    /// Nonzero subprocess exit or callable error during a package build.
    #[error("build failed for {package} {version}: {reason}")]
    Build {
        package: String,
        version: String,
        reason: String,
    },

    /// Absolute path in a receipt, or a missing receipt file.
    #[error("uninstall error: {0}")]
    Uninstall(String),
}

pub type Result<T> = anyhow::Result<T>;
