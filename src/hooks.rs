//! Registered extensions (engine §6): tool-version checks and pre-install
//! hooks.
//!
//! Replaces the original's `globals()['ensure_%s_version']` lookup and
//! `execfile(path, BUILTINS)` pre-install script with typed registrations,
//! per the design notes "Pre-install hook execution model" and "Global
//! mutable state".

use crate::config::Config;
use crate::error::RedpillError;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::process::Command;
use std::sync::Arc;

/// A minimum-version check for an external tool. Returns `Ok(())` when the
/// installed tool meets or exceeds `minimum`. `extra` is the free-form text
/// following the version in an `ensure: {tool: "X.Y.Z extra"}` entry (only
/// the `java` check uses it, as a custom error-message title).
pub type ToolCheck = Arc<dyn Fn(&[u32], Option<&str>) -> Result<()> + Send + Sync>;

/// A hook run once before any package is built or installed.
pub type PreInstallHook = Arc<dyn Fn(&Config) -> Result<()> + Send + Sync>;

/// The set of named tool-version checks the engine can invoke for a
/// recipe's `ensure` requirements (`SPEC_FULL.md` §6).
pub struct ToolCheckRegistry {
    checks: BTreeMap<String, ToolCheck>,
}

impl Default for ToolCheckRegistry {
    fn default() -> Self {
        let mut registry = Self { checks: BTreeMap::new() };
        registry.register("gcc", Arc::new(ensure_gcc_version));
        registry.register("git", Arc::new(ensure_git_version));
        registry.register("java", Arc::new(ensure_java_version));
        registry.register("node", Arc::new(ensure_node_version));
        registry.register("ruby", Arc::new(ensure_ruby_version));
        registry
    }
}

impl ToolCheckRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, check: ToolCheck) {
        self.checks.insert(name.into(), check);
    }

    /// Run the named check against `minimum`, with an optional `extra`
    /// string. An unregistered name is a fatal configuration error, distinct
    /// from the check itself failing.
    pub fn ensure(&self, name: &str, minimum: &[u32], extra: Option<&str>) -> Result<()> {
        let check = self
            .checks
            .get(name)
            .ok_or_else(|| RedpillError::FatalConfig(format!("no tool check registered for '{name}'")))?;
        check(minimum, extra)
    }
}

pub(crate) fn parse_version(text: &str) -> Option<Vec<u32>> {
    let digits: String = text
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    if digits.is_empty() {
        return None;
    }
    digits.split('.').map(|p| p.parse::<u32>().ok()).collect()
}

/// Split an `ensure: {tool: "X.Y[.Z] [extra]"}` value into its version
/// prefix and the optional free-form text after the first space.
pub(crate) fn split_version_and_extra(text: &str) -> (&str, Option<&str>) {
    match text.split_once(' ') {
        Some((version, extra)) => (version, Some(extra)),
        None => (text, None),
    }
}

fn format_version(version: &[u32]) -> String {
    version.iter().map(u32::to_string).collect::<Vec<_>>().join(".")
}

fn ensure_gcc_version(minimum: &[u32], _extra: Option<&str>) -> Result<()> {
    let cc = std::env::var("CC").unwrap_or_else(|_| "gcc".to_string());
    let output = Command::new(&cc).arg("-dumpversion").output();
    let ver = output.ok().and_then(|o| {
        if o.status.success() {
            parse_version(String::from_utf8_lossy(&o.stdout).trim())
        } else {
            None
        }
    });

    match ver {
        Some(v) if v >= minimum.to_vec() => Ok(()),
        _ => Err(RedpillError::FatalConfig(format!("GCC {}+ not found", format_version(minimum))).into()),
    }
}

fn ensure_git_version(minimum: &[u32], _extra: Option<&str>) -> Result<()> {
    let output = Command::new("git").arg("--version").output();
    let ver = output.ok().and_then(|o| {
        let stdout = String::from_utf8_lossy(&o.stdout).to_string();
        stdout.split_whitespace().nth(2).and_then(parse_version)
    });

    match ver {
        Some(v) if v >= minimum.to_vec() => Ok(()),
        _ => Err(RedpillError::FatalConfig(format!("Git {}+ not found", format_version(minimum))).into()),
    }
}

fn ensure_java_version(minimum: &[u32], extra: Option<&str>) -> Result<()> {
    let output = Command::new("java").arg("-version").output();
    let ver = output.ok().and_then(|o| {
        let stderr = String::from_utf8_lossy(&o.stderr).to_string();
        let first_line = stderr.lines().next()?;
        let quoted = first_line.split('"').nth(1)?;
        parse_version(quoted)
    });

    let title = extra
        .map(str::to_string)
        .unwrap_or_else(|| format!("Java {}+ runtime", format_version(minimum)));

    match ver {
        Some(v) if v >= minimum.to_vec() => Ok(()),
        _ => Err(RedpillError::FatalConfig(format!("{title} not found")).into()),
    }
}

fn ensure_node_version(minimum: &[u32], _extra: Option<&str>) -> Result<()> {
    let output = Command::new("node").arg("-v").output();
    let ver = output.ok().and_then(|o| {
        let stdout = String::from_utf8_lossy(&o.stdout).trim().to_string();
        parse_version(stdout.trim_start_matches('v'))
    });

    match ver {
        Some(v) if v >= minimum.to_vec() => Ok(()),
        _ => Err(RedpillError::FatalConfig(format!("Node.js {}+ not found", format_version(minimum))).into()),
    }
}

fn ensure_ruby_version(minimum: &[u32], _extra: Option<&str>) -> Result<()> {
    let output = Command::new("ruby").arg("-v").output();
    let ver = output.ok().and_then(|o| {
        let stdout = String::from_utf8_lossy(&o.stdout).to_string();
        stdout.split_whitespace().nth(1).and_then(parse_version)
    });

    match ver {
        Some(v) if v >= minimum.to_vec() => Ok(()),
        _ => Err(RedpillError::FatalConfig(format!("Ruby {}+ not found", format_version(minimum))).into()),
    }
}

/// Run every registered pre-install hook in order, stopping at the first
/// failure (engine §6, "pre-install hook execution model").
pub fn run_pre_install_hooks(hooks: &[PreInstallHook], config: &Config) -> Result<()> {
    for hook in hooks {
        hook(config).context("pre-install hook failed")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_version_reads_leading_digits() {
        assert_eq!(parse_version("11.2.0"), Some(vec![11, 2, 0]));
        assert_eq!(parse_version("v18.16.0").as_deref(), None); // leading 'v' not stripped here
    }

    #[test]
    fn format_version_joins_with_dots() {
        assert_eq!(format_version(&[4, 0]), "4.0");
    }

    #[test]
    fn unregistered_tool_check_is_fatal_config_error() {
        let registry = ToolCheckRegistry::new();
        let err = registry.ensure("nonexistent-tool", &[1, 0], None).unwrap_err();
        assert!(err.downcast_ref::<RedpillError>().is_some());
    }

    #[test]
    fn split_version_and_extra_separates_on_first_space() {
        assert_eq!(split_version_and_extra("1.6"), ("1.6", None));
        assert_eq!(
            split_version_and_extra("1.6 Java 6+ runtime"),
            ("1.6", Some("Java 6+ runtime"))
        );
    }

    #[test]
    fn builtin_checks_are_registered() {
        let registry = ToolCheckRegistry::new();
        assert!(registry.checks.contains_key("gcc"));
        assert!(registry.checks.contains_key("git"));
        assert!(registry.checks.contains_key("java"));
        assert!(registry.checks.contains_key("node"));
        assert!(registry.checks.contains_key("ruby"));
    }

    #[test]
    fn pre_install_hooks_run_in_order_and_stop_on_failure() {
        let config = Config::new("https://example.invalid/distfiles");
        let log: std::sync::Arc<std::sync::Mutex<Vec<i32>>> = std::sync::Arc::new(std::sync::Mutex::new(Vec::new()));

        let log1 = log.clone();
        let log2 = log.clone();
        let hooks: Vec<PreInstallHook> = vec![
            Arc::new(move |_cfg| {
                log1.lock().unwrap().push(1);
                Ok(())
            }),
            Arc::new(move |_cfg| {
                log2.lock().unwrap().push(2);
                anyhow::bail!("boom")
            }),
        ];

        let err = run_pre_install_hooks(&hooks, &config).unwrap_err();
        assert!(err.to_string().contains("pre-install hook failed"));
        assert_eq!(*log.lock().unwrap(), vec![1, 2]);
    }
}
