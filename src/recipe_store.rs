//! Recipe Store (engine §4.2).
//!
//! Holds package definitions, resolves each package's current version (from
//! a pinned field, a VCS head, or a content hash over declared input
//! files), and exposes lookup by `(package, version)`.

use crate::error::RedpillError;
use crate::fs_ledger;
use crate::recipe::{Recipe, RecipeFile, VersionSource};
use anyhow::{Context, Result};
use sha1::{Digest, Sha1};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Command;

/// `RECIPES[package] = map<version, Recipe>` plus the ordered version list
/// `PACKAGES[package]`, position 0 being the current version.
#[derive(Debug, Default)]
pub struct RecipeStore {
    recipes: BTreeMap<String, BTreeMap<String, Recipe>>,
    order: BTreeMap<String, Vec<String>>,
}

impl RecipeStore {
    /// Load every recipe-definition file (engine §4.2 steps 2-4), deriving
    /// version labels and purging stale receipts along the way.
    pub fn load(recipe_files: &[PathBuf], receipts_dir: &Path) -> Result<Self> {
        // package -> recipes in declaration order (step 2)
        let mut by_package: BTreeMap<String, Vec<Recipe>> = BTreeMap::new();

        for file in recipe_files {
            let content = std::fs::read_to_string(file)
                .with_context(|| format!("reading recipe file {}", file.display()))?;
            let parsed: RecipeFile = toml::from_str(&content)
                .with_context(|| format!("parsing recipe file {}", file.display()))?;

            for raw in parsed.recipes {
                let name = raw.name.clone();
                let recipe = raw
                    .into_recipe()
                    .with_context(|| format!("recipe '{name}' in {}", file.display()))?;
                by_package.entry(name).or_default().push(recipe);
            }
        }

        let mut recipes = BTreeMap::new();
        let mut order = BTreeMap::new();

        for (package, recipe_list) in by_package {
            let mut versions = Vec::with_capacity(recipe_list.len());
            let mut data = BTreeMap::new();

            for recipe in recipe_list {
                let version = derive_version(&package, &recipe, receipts_dir)?;
                versions.push(version.clone());
                data.insert(version, recipe);
            }

            recipes.insert(package.clone(), data);
            order.insert(package, versions);
        }

        Ok(Self { recipes, order })
    }

    /// Build a store directly from already-constructed recipes, bypassing
    /// the TOML loader. For recipes built programmatically because their
    /// `commands`/hooks are in-process closures that can't round-trip
    /// through a recipe-definition file.
    pub fn from_recipes(entries: Vec<(String, Recipe)>, receipts_dir: &Path) -> Result<Self> {
        let mut recipes = BTreeMap::new();
        let mut order = BTreeMap::new();

        for (package, recipe) in entries {
            let version = derive_version(&package, &recipe, receipts_dir)?;
            recipes
                .entry(package.clone())
                .or_insert_with(BTreeMap::new)
                .insert(version.clone(), recipe);
            order.entry(package).or_insert_with(Vec::new).push(version);
        }

        Ok(Self { recipes, order })
    }

    /// The current (position-0) recipe for `package`.
    pub fn current(&self, package: &str) -> Result<&Recipe> {
        let version = self.current_version(package)?;
        self.recipes
            .get(package)
            .and_then(|m| m.get(version))
            .ok_or_else(|| RedpillError::FatalRecipe(format!("no recipe for {package}-{version}")).into())
    }

    /// The current version label for `package`.
    pub fn current_version(&self, package: &str) -> Result<&str> {
        self.order
            .get(package)
            .and_then(|v| v.first())
            .map(String::as_str)
            .ok_or_else(|| {
                RedpillError::FatalRecipe(format!("couldn't find a build recipe for {package}")).into()
            })
    }

    pub fn lookup(&self, package: &str, version: &str) -> Option<&Recipe> {
        self.recipes.get(package).and_then(|m| m.get(version))
    }

    pub fn contains(&self, package: &str) -> bool {
        self.recipes.contains_key(package)
    }

    /// Every known package name, in no particular order beyond `BTreeMap`'s.
    pub fn packages(&self) -> impl Iterator<Item = &String> {
        self.recipes.keys()
    }

    pub fn requires(&self, package: &str) -> &[String] {
        self.current(package)
            .map(|r| r.requires.as_slice())
            .unwrap_or(&[])
    }
}

/// Derive the version label for one recipe entry (engine §4.2 step 3).
fn derive_version(package: &str, recipe: &Recipe, receipts_dir: &Path) -> Result<String> {
    match &recipe.version {
        VersionSource::Literal(v) => Ok(v.clone()),
        VersionSource::Vcs { path } => vcs_revision(path)
            .with_context(|| format!("resolving git revision for package '{package}'")),
        VersionSource::ContentHash { depends, outputs } => {
            let (digest, stale) = content_hash(depends, outputs)?;
            if stale {
                purge_receipts_for(package, receipts_dir)?;
            }
            Ok(digest)
        }
    }
}

fn vcs_revision(path: &Path) -> Result<String> {
    let output = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .current_dir(path)
        .output()
        .with_context(|| format!("running git rev-parse in {}", path.display()))?;

    if !output.status.success() {
        anyhow::bail!(RedpillError::FatalRecipe(format!(
            "git rev-parse HEAD failed in {}",
            path.display()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// SHA-1 over the sorted `depends` glob matches' `"{path}\0{contents}"`
/// segments, plus whether the recipe is stale (engine §4.2 step 3).
fn content_hash(depends: &[String], outputs: &[String]) -> Result<(String, bool)> {
    let mut files: BTreeMap<String, Vec<u8>> = BTreeMap::new();
    let mut latest_mtime = std::time::SystemTime::UNIX_EPOCH;

    for pattern in depends {
        for entry in glob::glob(pattern).with_context(|| format!("invalid glob '{pattern}'"))? {
            let path = entry?;
            let contents = std::fs::read(&path)
                .with_context(|| format!("reading dependency file {}", path.display()))?;
            let mtime = std::fs::metadata(&path)?.modified()?;
            if mtime > latest_mtime {
                latest_mtime = mtime;
            }
            files.insert(path.to_string_lossy().into_owned(), contents);
        }
    }

    let mut hasher = Sha1::new();
    for (path, contents) in &files {
        hasher.update(path.as_bytes());
        hasher.update([0u8]);
        hasher.update(contents);
    }
    let digest = hex::encode(hasher.finalize());

    let mut stale = false;
    for pattern in outputs {
        let matches: Vec<_> = glob::glob(pattern)
            .with_context(|| format!("invalid glob '{pattern}'"))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        if matches.is_empty() {
            stale = true;
            break;
        }
        for out in &matches {
            if !out.is_file() {
                stale = true;
                break;
            }
            let mtime = std::fs::metadata(out)?.modified()?;
            if mtime <= latest_mtime {
                stale = true;
                break;
            }
        }
        if stale {
            break;
        }
    }

    Ok((digest, stale))
}

/// Delete every receipt file whose name starts with `"{package}-"`, forcing
/// a rebuild and reinstall of any previously installed version.
fn purge_receipts_for(package: &str, receipts_dir: &Path) -> Result<()> {
    let prefix = format!("{package}-");
    for name in fs_ledger::list_receipts(receipts_dir)? {
        if name.starts_with(&prefix) {
            std::fs::remove_file(receipts_dir.join(&name))
                .with_context(|| format!("removing stale receipt {name}"))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_file(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn literal_version_round_trips() {
        let dir = TempDir::new().unwrap();
        let receipts = dir.path().join("receipts");
        std::fs::create_dir_all(&receipts).unwrap();
        let file = write_file(
            dir.path(),
            "recipes.toml",
            r#"
                [[recipe]]
                name = "zlib"
                type = "default"
                version = "1.3.1"
            "#,
        );

        let store = RecipeStore::load(&[file], &receipts).unwrap();
        assert_eq!(store.current_version("zlib").unwrap(), "1.3.1");
    }

    #[test]
    fn unknown_package_is_fatal_recipe_error() {
        let dir = TempDir::new().unwrap();
        let store = RecipeStore::default();
        let err = store.current("missing").unwrap_err();
        assert!(err.downcast_ref::<RedpillError>().is_some());
        let _ = dir;
    }

    #[test]
    fn content_hash_is_deterministic_and_rebuild_detection_works() {
        let dir = TempDir::new().unwrap();
        let receipts = dir.path().join("receipts");
        std::fs::create_dir_all(&receipts).unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/a.c"), b"int main(){}").unwrap();

        let depends = vec![dir.path().join("src/*.c").to_string_lossy().into_owned()];
        let outputs = vec![dir.path().join("build/out").to_string_lossy().into_owned()];

        let (hash1, stale1) = content_hash(&depends, &outputs).unwrap();
        let (hash2, stale2) = content_hash(&depends, &outputs).unwrap();
        assert_eq!(hash1, hash2);
        assert!(stale1);
        assert!(stale2);
    }

    #[test]
    fn stale_content_hash_purges_receipts() {
        let dir = TempDir::new().unwrap();
        let receipts = dir.path().join("receipts");
        std::fs::create_dir_all(&receipts).unwrap();
        std::fs::write(receipts.join("gen-oldhash"), "bin/gen").unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/a.c"), b"int main(){}").unwrap();

        let file = write_file(
            dir.path(),
            "recipes.toml",
            &format!(
                r#"
                [[recipe]]
                name = "gen"
                type = "makelike"
                depends = ["{}/src/*.c"]
                outputs = ["{}/build/out"]
                "#,
                dir.path().display(),
                dir.path().display()
            ),
        );

        RecipeStore::load(&[file], &receipts).unwrap();
        assert!(!receipts.join("gen-oldhash").exists());
    }
}
