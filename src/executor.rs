//! Build Executor (engine §4.5).
//!
//! Unpacks a package's distfile (or locates its VCS checkout), runs the
//! build-type's command template (or the recipe's own override), and
//! derives the set of prefix paths the package introduced by diffing a
//! filesystem listing taken before and after the run.

use crate::archive;
use crate::error::RedpillError;
use crate::fs_ledger;
use crate::platform;
use crate::recipe::{BuildType, CommandSpec, Commands, Recipe};
use anyhow::{Context, Result};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Everything an in-process [`CommandSpec::Action`] or hook closure needs.
#[derive(Debug, Clone)]
pub struct BuildContext {
    pub package: String,
    pub version: String,
    pub prefix: PathBuf,
    pub src_dir: PathBuf,
    pub working_dir: PathBuf,
    pub env: BTreeMap<String, String>,
}

impl BuildContext {
    pub fn run(&self, argv: &[String]) -> Result<()> {
        run_command(argv, &self.src_dir, &self.env)
            .with_context(|| format!("running {:?} for {}", argv, self.package))
    }
}

/// Run the full build-and-install for one resolved package version,
/// returning the set of prefix-relative paths it introduced.
pub fn execute(
    recipe: &Recipe,
    package: &str,
    version: &str,
    distfile_path: Option<&Path>,
    working_dir: &Path,
    prefix: &Path,
) -> Result<BTreeSet<String>> {
    std::fs::create_dir_all(prefix).with_context(|| format!("creating prefix {}", prefix.display()))?;
    let before = fs_ledger::listing(prefix)?;

    let src_dir = unpack(recipe, package, version, distfile_path, working_dir)?;
    let env = build_env(recipe, prefix);

    let ctx = BuildContext {
        package: package.to_string(),
        version: version.to_string(),
        prefix: prefix.to_path_buf(),
        src_dir: src_dir.clone(),
        working_dir: working_dir.to_path_buf(),
        env: env.clone(),
    };

    if let Some(hook) = &recipe.before {
        hook(&ctx).with_context(|| format!("before-hook for {package}"))?;
    }

    for spec in resolve_commands(recipe, package, version, working_dir, prefix)? {
        match spec {
            CommandSpec::Exec(argv) => run_command(&argv, &src_dir, &env)
                .map_err(|e| RedpillError::Build {
                    package: package.to_string(),
                    version: version.to_string(),
                    reason: e.to_string(),
                })?,
            CommandSpec::Action(action) => action(&ctx).map_err(|e| RedpillError::Build {
                package: package.to_string(),
                version: version.to_string(),
                reason: e.to_string(),
            })?,
        }
    }

    if let Some(hook) = &recipe.after {
        hook(&ctx).with_context(|| format!("after-hook for {package}"))?;
    }

    let after = fs_ledger::listing(prefix)?;
    Ok(fs_ledger::diff(&before, &after))
}

fn unpack(
    recipe: &Recipe,
    package: &str,
    version: &str,
    distfile_path: Option<&Path>,
    working_dir: &Path,
) -> Result<PathBuf> {
    match recipe.build_type {
        BuildType::Git => {
            let path = recipe
                .path
                .clone()
                .ok_or_else(|| RedpillError::FatalRecipe(format!("git recipe '{package}' has no path")))?;
            if recipe.clean {
                run_command(
                    &["git".to_string(), "clean".to_string(), "-xdf".to_string()],
                    &path,
                    &BTreeMap::new(),
                )?;
            }
            Ok(path)
        }
        BuildType::Makelike => Ok(working_dir.to_path_buf()),
        // The distfile is the artifact itself (a jar), not an archive to unpack.
        BuildType::Jar => Ok(working_dir.to_path_buf()),
        _ => {
            let distfile_path = distfile_path.ok_or_else(|| RedpillError::Build {
                package: package.to_string(),
                version: version.to_string(),
                reason: "no distfile to unpack".to_string(),
            })?;
            let build_root = working_dir.join(format!("{package}-{version}-build"));
            archive::extract(distfile_path, &build_root)
                .with_context(|| format!("extracting {}", distfile_path.display()))?;
            Ok(single_extracted_dir(&build_root).unwrap_or(build_root))
        }
    }
}

/// Tarballs conventionally unpack into one top-level directory; prefer it as
/// the build working directory when present.
fn single_extracted_dir(build_root: &Path) -> Option<PathBuf> {
    let mut entries = std::fs::read_dir(build_root).ok()?;
    let first = entries.next()?.ok()?;
    if entries.next().is_some() {
        return None;
    }
    if first.file_type().ok()?.is_dir() {
        Some(first.path())
    } else {
        None
    }
}

fn build_env(recipe: &Recipe, prefix: &Path) -> BTreeMap<String, String> {
    let mut env: BTreeMap<String, String> = std::env::vars().collect();
    // Strip recursive-make markers inherited from whatever invoked redpill.
    env.remove("MAKE");
    env.remove("MAKELEVEL");

    let include = prefix.join("include");
    let lib = prefix.join("lib");

    env.insert("CPPFLAGS".to_string(), format!("-I{}", include.display()));
    env.insert("LDFLAGS".to_string(), format!("-L{}", lib.display()));

    for (k, v) in &recipe.env {
        env.insert(k.clone(), v.clone());
    }

    env
}

/// Resolve the command sequence to run: the recipe's own override if given
/// (literal or callable), otherwise the build type's default template.
fn resolve_commands(
    recipe: &Recipe,
    package: &str,
    version: &str,
    working_dir: &Path,
    prefix: &Path,
) -> Result<Vec<CommandSpec>> {
    match &recipe.commands {
        Commands::Literal(cmds) if !cmds.is_empty() => Ok(cmds.clone()),
        Commands::Callable(f) => f(package, recipe),
        _ => default_commands(recipe, package, version, working_dir, prefix),
    }
}

fn default_commands(
    recipe: &Recipe,
    package: &str,
    version: &str,
    working_dir: &Path,
    prefix: &Path,
) -> Result<Vec<CommandSpec>> {
    let jobs = platform::make_jobs();
    match recipe.build_type {
        BuildType::Python => Ok(vec![CommandSpec::Exec(vec![
            platform::python_binary().to_string(),
            "setup.py".to_string(),
            "build_ext".to_string(),
            "-i".to_string(),
        ])]),
        BuildType::Resource => {
            let source = recipe
                .source
                .clone()
                .unwrap_or_else(|| working_dir.join(package).to_string_lossy().into_owned());
            let destination = recipe
                .destination
                .clone()
                .unwrap_or_else(|| prefix.join("share").join(package).to_string_lossy().into_owned());
            Ok(vec![CommandSpec::Exec(vec![
                "cp".to_string(),
                "-R".to_string(),
                source,
                destination,
            ])])
        }
        BuildType::Jar => {
            let filename = recipe.distfile_name(package, version);
            Ok(vec![CommandSpec::Action(std::sync::Arc::new(move |ctx| {
                let source = ctx.working_dir.join(&filename);
                let destination = ctx.prefix.join("bin").join(&filename);
                if let Some(parent) = destination.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::copy(&source, &destination)?;
                Ok(())
            }))])
        }
        BuildType::Git | BuildType::Makelike => Err(RedpillError::FatalRecipe(format!(
            "build type '{}' requires explicit `commands`",
            recipe.build_type
        ))
        .into()),
        BuildType::Default => {
            let mut cmds = Vec::new();
            if !recipe.config_command.is_empty() {
                let mut argv = vec![recipe.config_command.clone(), format!("--prefix={}", prefix.display())];
                argv.extend(recipe.config_flags.iter().cloned());
                cmds.push(CommandSpec::Exec(argv));
            }

            let make = platform::make_binary().to_string();
            if recipe.separate_make_install {
                cmds.push(CommandSpec::Exec(vec![make.clone(), format!("-j{jobs}")]));
                let mut install_argv = vec![make];
                install_argv.extend(recipe.make_flags.iter().cloned());
                cmds.push(CommandSpec::Exec(install_argv));
            } else {
                let mut argv = vec![make, format!("-j{jobs}")];
                argv.extend(recipe.make_flags.iter().cloned());
                cmds.push(CommandSpec::Exec(argv));
            }

            Ok(cmds)
        }
    }
}

fn run_command(argv: &[String], cwd: &Path, env: &BTreeMap<String, String>) -> Result<()> {
    let (program, rest) = argv
        .split_first()
        .ok_or_else(|| anyhow::anyhow!("empty command"))?;

    let mut command = Command::new(program);
    command.args(rest).current_dir(cwd).env_clear().envs(env);

    let status = command
        .status()
        .with_context(|| format!("spawning {}", argv.join(" ")))?;

    if !status.success() {
        anyhow::bail!("command failed ({status}): {}", argv.join(" "));
    }

    Ok(())
}
