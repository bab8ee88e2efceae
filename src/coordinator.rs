//! Install Coordinator (engine §4.6).
//!
//! Owns one run of the engine: takes the single-instance lock, runs
//! pre-install hooks and tool-version assertions, resolves a plan, drives
//! pipelined fetch + build + install per package, and reconciles the
//! prefix against every current receipt afterward.

use crate::config::Config;
use crate::deps;
use crate::error::RedpillError;
use crate::executor;
use crate::fetcher::Fetcher;
use crate::fs_ledger;
use crate::hooks::{self, PreInstallHook, ToolCheckRegistry};
use crate::lock;
use crate::output;
use crate::recipe::Recipe;
use crate::recipe_store::RecipeStore;
use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::path::PathBuf;
use tokio::runtime::Handle;

pub struct Coordinator {
    pub config: Config,
    pub prefix: PathBuf,
    pub receipts_dir: PathBuf,
    pub working_dir: PathBuf,
    pub store: RecipeStore,
    pub tool_checks: ToolCheckRegistry,
    pub pre_install_hooks: Vec<PreInstallHook>,
    runtime: Handle,
}

impl Coordinator {
    pub fn new(
        config: Config,
        prefix: PathBuf,
        receipts_dir: PathBuf,
        working_dir: PathBuf,
        store: RecipeStore,
        runtime: Handle,
    ) -> Self {
        Self {
            config,
            prefix,
            receipts_dir,
            working_dir,
            store,
            tool_checks: ToolCheckRegistry::new(),
            pre_install_hooks: Vec::new(),
            runtime,
        }
    }

    /// Install `requested` packages (engine §4.6 steps 1-7).
    pub fn install(&self, requested: &[String]) -> Result<()> {
        let _lock = lock::acquire(&self.working_dir)?;
        self.prepare_directories()?;

        hooks::run_pre_install_hooks(&self.pre_install_hooks, &self.config)?;
        self.assert_tool_versions()?;

        let installed = deps::installed_packages(&self.store, &self.receipts_dir)?;
        let plan = deps::classify(&self.store, requested, &installed)?;

        output::action("resolving plan");
        self.uninstall_ordered(&plan.to_uninstall)?;
        self.install_ordered(&plan.to_install)?;

        self.reconcile()?;
        Ok(())
    }

    /// Uninstall `requested` packages and their installed reverse-dependents
    /// (engine §4.6, same cascade rule as an install-time version change).
    pub fn uninstall_packages(&self, requested: &[String]) -> Result<()> {
        let _lock = lock::acquire(&self.working_dir)?;
        let installed = deps::installed_packages(&self.store, &self.receipts_dir)?;
        let inv = deps::inverse_deps(&self.store);

        let mut set = BTreeSet::new();
        for package in requested {
            deps::cascade_uninstall(package, &self.store, &installed, &inv, &mut set)?;
        }

        let order = deps::topo_sort(&self.store, &set.into_iter().collect::<Vec<_>>())?;
        let uninstall_order: Vec<String> = order.into_iter().rev().collect();
        self.uninstall_ordered(&uninstall_order)?;
        self.reconcile()
    }

    fn prepare_directories(&self) -> Result<()> {
        for dir in [&self.prefix, &self.receipts_dir, &self.working_dir] {
            std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }
        Ok(())
    }

    fn assert_tool_versions(&self) -> Result<()> {
        for (tool, spec) in &self.config.ensure {
            let (version, extra) = hooks::split_version_and_extra(spec);
            let minimum_version = hooks::parse_version(version)
                .ok_or_else(|| RedpillError::FatalConfig(format!("invalid version string '{spec}' for '{tool}'")))?;
            self.tool_checks.ensure(tool, &minimum_version, extra)?;
        }
        Ok(())
    }

    fn distfile_url(&self, recipe: &Recipe, distfile_name: &str) -> String {
        let base = recipe
            .distfile_url_base
            .clone()
            .unwrap_or_else(|| self.config.distfiles_url_base.clone());
        format!("{}/{}", base.trim_end_matches('/'), distfile_name)
    }

    /// Build and install each package in `packages` (already topologically
    /// ordered), prefetching the next package's distfile while the current
    /// one builds (engine §5 one-ahead pipelining).
    fn install_ordered(&self, packages: &[String]) -> Result<()> {
        let fetcher = Fetcher::new(self.working_dir.clone(), self.runtime.clone());
        let mut pending: Option<(String, crate::fetcher::PendingFetch)> = None;

        for (index, package) in packages.iter().enumerate() {
            let recipe = self.store.current(package)?;
            let version = self.store.current_version(package)?.to_string();

            let distfile_path = if !recipe.distfile.is_empty() {
                let distfile_name = recipe.distfile_name(package, &version);
                let dest = fetcher.dest_for(&distfile_name);

                match pending.take() {
                    Some((pending_package, handle)) if &pending_package == package => {
                        fetcher.wait(handle)?;
                    }
                    Some((_, handle)) => {
                        fetcher.wait(handle)?;
                        let url = self.distfile_url(recipe, &distfile_name);
                        crate::fetcher::fetch(package, &url, recipe.hash.as_deref(), &dest)?;
                    }
                    None => {
                        let url = self.distfile_url(recipe, &distfile_name);
                        crate::fetcher::fetch(package, &url, recipe.hash.as_deref(), &dest)?;
                    }
                }
                Some(dest)
            } else {
                None
            };

            if let Some(next_package) = packages.get(index + 1) {
                let next_recipe = self.store.current(next_package)?;
                if !next_recipe.distfile.is_empty() {
                    let next_version = self.store.current_version(next_package)?.to_string();
                    let next_name = next_recipe.distfile_name(next_package, &next_version);
                    let next_url = self.distfile_url(next_recipe, &next_name);
                    let handle = fetcher.enqueue(next_package.clone(), next_url, next_recipe.hash.clone());
                    pending = Some((next_package.clone(), handle));
                }
            }

            output::action_numbered(index + 1, packages.len(), &format!("{package}-{version}"));

            let before = fs_ledger::listing(&self.prefix)?;
            match executor::execute(
                recipe,
                package,
                &version,
                distfile_path.as_deref(),
                &self.working_dir,
                &self.prefix,
            ) {
                Ok(receipt) => {
                    fs_ledger::write_receipt(&self.receipts_dir, &format!("{package}-{version}"), &receipt)?;
                    output::success(&format!("installed {package}-{version}"));
                }
                Err(e) => {
                    // Roll back whatever the failed build already wrote before
                    // surfacing the error (engine §5 partial-failure recovery).
                    let after = fs_ledger::listing(&self.prefix)?;
                    let partial: Vec<String> = fs_ledger::diff(&before, &after).into_iter().collect();
                    if !partial.is_empty() {
                        let _ = fs_ledger::prune(&self.prefix, &partial);
                    }
                    return Err(e).with_context(|| format!("building {package}-{version}"));
                }
            }
        }

        Ok(())
    }

    fn uninstall_ordered(&self, packages: &[String]) -> Result<()> {
        for package in packages {
            let version = deps::installed_version(package, &self.receipts_dir)?;
            let Some(version) = version else { continue };
            let receipt_name = format!("{package}-{version}");
            output::sub_action(&format!("uninstalling {receipt_name}"));

            let paths = fs_ledger::read_receipt(&self.receipts_dir, &receipt_name)?;
            fs_ledger::prune(&self.prefix, &paths)?;
            std::fs::remove_file(self.receipts_dir.join(&receipt_name))
                .with_context(|| format!("removing receipt {receipt_name}"))?;
        }
        Ok(())
    }

    /// Delete prefix entries not claimed by any current receipt. Directories
    /// named in any receipt are always treated as claimed, even if a literal
    /// set-difference against the live listing would include them
    /// (`SPEC_FULL.md` §9 design note 2).
    fn reconcile(&self) -> Result<()> {
        let mut claimed_files: BTreeSet<String> = BTreeSet::new();
        let mut claimed_dirs: BTreeSet<String> = BTreeSet::new();

        for name in fs_ledger::list_receipts(&self.receipts_dir)? {
            for path in fs_ledger::read_receipt(&self.receipts_dir, &name)? {
                if path.ends_with('/') {
                    claimed_dirs.insert(path);
                } else {
                    claimed_files.insert(path);
                }
            }
        }

        let listing = fs_ledger::listing(&self.prefix)?;
        let mut orphans = Vec::new();
        for entry in &listing {
            let claimed = if entry.ends_with('/') {
                claimed_dirs.contains(entry)
            } else {
                claimed_files.contains(entry)
            };
            if !claimed {
                orphans.push(entry.clone());
            }
        }

        fs_ledger::prune(&self.prefix, &orphans)
    }
}
