//! Already-parsed configuration surface (engine §6).
//!
//! Config-file decoding (YAML/JSON) is an external collaborator; the engine
//! only ever sees a [`Config`] value the host application has already built.

use std::collections::BTreeMap;

/// The subset of `redpill.yaml` the engine itself consults.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Prepended to distfile names to form download URLs. Required.
    pub distfiles_url_base: String,
    /// Default role name; defaults to `"default"` when absent.
    pub role: Option<String>,
    /// `tool -> version-spec` assertions, e.g. `"gcc" -> "4.0"`.
    pub ensure: BTreeMap<String, String>,
    /// Used only by the external `check` command; the engine never reads it.
    pub repo_check_url: Option<String>,
}

impl Config {
    pub fn new(distfiles_url_base: impl Into<String>) -> Self {
        Self {
            distfiles_url_base: distfiles_url_base.into(),
            role: None,
            ensure: BTreeMap::new(),
            repo_check_url: None,
        }
    }

    /// The role to build when none is specified explicitly.
    pub fn default_role(&self) -> &str {
        self.role.as_deref().unwrap_or("default")
    }
}
