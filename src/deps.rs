//! Dependency Resolver & Planner (engine §4.4).
//!
//! Classifies requested packages into installs and uninstalls against the
//! currently-installed set, then orders each list with a topological sort.
//! The sort is grounded on the teacher's `engine/deps.rs` `DepGraph`: an
//! iterative DFS over an explicit stack with a three-state node marker,
//! avoiding recursion depth limits on deep dependency chains.

use crate::error::RedpillError;
use crate::fs_ledger;
use crate::recipe_store::RecipeStore;
use anyhow::Result;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// The installed version of `package`, read back from its receipt's name
/// (`"{package}-{version}"`), or `None` if no matching receipt exists.
pub fn installed_version(package: &str, receipts_dir: &Path) -> Result<Option<String>> {
    let prefix = format!("{package}-");
    for name in fs_ledger::list_receipts(receipts_dir)? {
        if let Some(version) = name.strip_prefix(&prefix) {
            return Ok(Some(version.to_string()));
        }
    }
    Ok(None)
}

/// Every known package's installed version, for those that have one.
pub fn installed_packages(store: &RecipeStore, receipts_dir: &Path) -> Result<BTreeMap<String, String>> {
    let mut out = BTreeMap::new();
    for package in store.packages() {
        if let Some(version) = installed_version(package, receipts_dir)? {
            out.insert(package.clone(), version);
        }
    }
    Ok(out)
}

/// `package -> packages that declare it in their requires list`.
pub fn inverse_deps(store: &RecipeStore) -> BTreeMap<String, Vec<String>> {
    let mut inv: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for package in store.packages() {
        for dep in store.requires(package) {
            inv.entry(dep.clone()).or_default().push(package.clone());
        }
    }
    inv
}

/// An install/uninstall plan, each list already topologically ordered for
/// execution (installs: dependencies before dependents; uninstalls: the
/// reverse).
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Plan {
    pub to_install: Vec<String>,
    pub to_uninstall: Vec<String>,
}

/// Classify `requested` packages against `installed` (engine §4.4,
/// SPEC_FULL §9 design note 1): a package with no installed version is a
/// fresh install; a package whose installed version differs from the
/// recipe store's current version is an upgrade, which queues the package
/// *and* every installed reverse-dependent (transitively) for uninstall,
/// unless the recipe opts out with `keep_reverse_deps`.
pub fn classify(
    store: &RecipeStore,
    requested: &[String],
    installed: &BTreeMap<String, String>,
) -> Result<Plan> {
    let inv = inverse_deps(store);
    let mut install_set: BTreeSet<String> = BTreeSet::new();
    let mut uninstall_set: BTreeSet<String> = BTreeSet::new();

    for package in requested {
        if !store.contains(package) {
            return Err(RedpillError::FatalRecipe(format!("unknown package '{package}'")).into());
        }
        let current = store.current_version(package)?.to_string();

        match installed.get(package) {
            None => {
                install_set.insert(package.clone());
            }
            Some(existing) if existing != &current => {
                install_set.insert(package.clone());
                cascade_uninstall(package, store, installed, &inv, &mut uninstall_set)?;
            }
            Some(_) => {}
        }
    }

    let to_install = topo_sort(store, &install_set.into_iter().collect::<Vec<_>>())?;

    let uninstall_order = topo_sort(store, &uninstall_set.into_iter().collect::<Vec<_>>())?;
    let to_uninstall: Vec<String> = uninstall_order.into_iter().rev().collect();

    Ok(Plan { to_install, to_uninstall })
}

pub fn cascade_uninstall(
    package: &str,
    store: &RecipeStore,
    installed: &BTreeMap<String, String>,
    inv: &BTreeMap<String, Vec<String>>,
    uninstall: &mut BTreeSet<String>,
) -> Result<()> {
    if !uninstall.insert(package.to_string()) {
        return Ok(());
    }

    if store.current(package)?.keep_reverse_deps {
        return Ok(());
    }

    if let Some(dependents) = inv.get(package) {
        for dependent in dependents {
            if installed.contains_key(dependent) {
                cascade_uninstall(dependent, store, installed, inv, uninstall)?;
            }
        }
    }

    Ok(())
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum NodeState {
    Unprocessed,
    Processing,
    Processed,
}

/// Topologically sort `roots` (and everything they transitively require)
/// with dependencies preceding dependents. A `requires` cycle is a fatal
/// recipe error.
pub fn topo_sort(store: &RecipeStore, roots: &[String]) -> Result<Vec<String>> {
    let mut state: BTreeMap<String, NodeState> = BTreeMap::new();
    let mut order = Vec::new();

    for root in roots {
        if matches!(state.get(root), Some(NodeState::Processed)) {
            continue;
        }
        visit(store, root, &mut state, &mut order)?;
    }

    Ok(order)
}

fn visit(
    store: &RecipeStore,
    start: &str,
    state: &mut BTreeMap<String, NodeState>,
    order: &mut Vec<String>,
) -> Result<()> {
    let mut stack: Vec<(String, usize)> = vec![(start.to_string(), 0)];
    state.insert(start.to_string(), NodeState::Processing);

    while let Some(&(ref name, idx)) = stack.last() {
        let name = name.clone();
        let deps = store.requires(&name);

        if idx < deps.len() {
            let dep = deps[idx].clone();
            stack.last_mut().unwrap().1 += 1;

            match state.get(&dep).copied().unwrap_or(NodeState::Unprocessed) {
                NodeState::Unprocessed => {
                    state.insert(dep.clone(), NodeState::Processing);
                    stack.push((dep, 0));
                }
                NodeState::Processing => {
                    return Err(RedpillError::FatalRecipe(format!(
                        "dependency cycle detected: '{name}' requires '{dep}'"
                    ))
                    .into());
                }
                NodeState::Processed => {}
            }
        } else {
            state.insert(name.clone(), NodeState::Processed);
            order.push(name);
            stack.pop();
        }
    }

    Ok(())
}
