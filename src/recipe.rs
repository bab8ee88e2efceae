//! Recipe data model (engine §3, §9 "Dynamic typing of recipe entries").
//!
//! A [`Recipe`] is a tagged variant over a shared base, matching the design
//! note: "Model each build type as a tagged variant with a shared base...
//! and type-specific payload." Declarative recipes are read from TOML
//! recipe-definition files into [`RawRecipe`] (the on-disk shape); recipes
//! that need in-process command callables or hooks are built directly with
//! [`Recipe`]'s constructors, since a closure cannot round-trip through TOML.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Build type: selects the command template and field defaults (engine §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildType {
    Default,
    Python,
    Resource,
    Jar,
    Git,
    Makelike,
}

impl fmt::Display for BuildType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BuildType::Default => "default",
            BuildType::Python => "python",
            BuildType::Resource => "resource",
            BuildType::Jar => "jar",
            BuildType::Git => "git",
            BuildType::Makelike => "makelike",
        };
        f.write_str(s)
    }
}

/// One element of a resolved command sequence (design note "In-process
/// command callables"): either a subprocess argv, or an in-process action.
#[derive(Clone)]
pub enum CommandSpec {
    Exec(Vec<String>),
    Action(Arc<dyn Fn(&crate::executor::BuildContext) -> anyhow::Result<()> + Send + Sync>),
}

impl fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandSpec::Exec(argv) => f.debug_tuple("Exec").field(argv).finish(),
            CommandSpec::Action(_) => f.write_str("Action(..)"),
        }
    }
}

/// The recipe's `commands` field: a literal sequence, or a callable that
/// produces one from `(package, resolved_info)`.
#[derive(Clone)]
pub enum Commands {
    Literal(Vec<CommandSpec>),
    Callable(Arc<dyn Fn(&str, &ResolvedInfo) -> anyhow::Result<Vec<CommandSpec>> + Send + Sync>),
}

impl fmt::Debug for Commands {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Commands::Literal(cmds) => f.debug_tuple("Literal").field(cmds).finish(),
            Commands::Callable(_) => f.write_str("Callable(..)"),
        }
    }
}

/// An in-process `before`/`after` hook.
pub type Hook = Arc<dyn Fn(&crate::executor::BuildContext) -> anyhow::Result<()> + Send + Sync>;

/// How a recipe's version is determined (engine §3 `version`*).
#[derive(Debug, Clone)]
pub enum VersionSource {
    /// A literal version string, e.g. `"1.2.3"`.
    Literal(String),
    /// Derived from `git rev-parse HEAD` run in `path`.
    Vcs { path: PathBuf },
    /// Derived from a content hash over `depends` globs, with staleness
    /// detected against `outputs` globs.
    ContentHash {
        depends: Vec<String>,
        outputs: Vec<String>,
    },
}

/// A fully-materialized recipe: universal fields plus a type-specific
/// payload.
#[derive(Debug, Clone)]
pub struct Recipe {
    pub build_type: BuildType,
    pub version: VersionSource,
    pub requires: Vec<String>,
    pub hash: Option<String>,
    pub distfile: String,
    pub distfile_url_base: Option<String>,
    pub commands: Commands,
    pub before: Option<Hook>,
    pub after: Option<Hook>,
    pub env: BTreeMap<String, String>,

    // default
    pub config_command: String,
    pub config_flags: Vec<String>,
    pub make_flags: Vec<String>,
    pub separate_make_install: bool,

    // resource
    pub source: Option<String>,
    pub destination: Option<String>,

    // git
    pub path: Option<PathBuf>,
    pub clean: bool,

    // Open Question 1 resolution: opt out of reverse-dependent uninstall
    // cascade on a version change.
    pub keep_reverse_deps: bool,
}

impl Recipe {
    /// A bare recipe of the given build type, with every optional field at
    /// its build-type default (engine §4.5 "build-type command templates").
    pub fn new(build_type: BuildType, version: VersionSource) -> Self {
        let distfile = match build_type {
            BuildType::Jar => "{name}-{version}.jar".to_string(),
            BuildType::Git | BuildType::Makelike => String::new(),
            _ => "{name}-{version}.tar.bz2".to_string(),
        };

        Self {
            build_type,
            version,
            requires: Vec::new(),
            hash: None,
            distfile,
            distfile_url_base: None,
            commands: Commands::Literal(Vec::new()),
            before: None,
            after: None,
            env: BTreeMap::new(),
            config_command: "./configure".to_string(),
            config_flags: Vec::new(),
            make_flags: vec!["install".to_string()],
            separate_make_install: false,
            source: None,
            destination: None,
            path: None,
            clean: false,
            keep_reverse_deps: false,
        }
    }

    pub fn with_requires(mut self, requires: Vec<String>) -> Self {
        self.requires = requires;
        self
    }

    pub fn with_hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = Some(hash.into());
        self
    }

    pub fn with_distfile(mut self, distfile: impl Into<String>) -> Self {
        self.distfile = distfile.into();
        self
    }

    pub fn with_commands(mut self, commands: Commands) -> Self {
        self.commands = commands;
        self
    }

    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Format `distfile` for `(name, version)`, the way `"{name}-{version}.tar.bz2"`
    /// resolves. Unknown placeholders are left untouched.
    pub fn distfile_name(&self, name: &str, version: &str) -> String {
        self.distfile.replace("{name}", name).replace("{version}", version)
    }
}

/// A recipe after its build-type template has been merged with its own
/// overrides (engine §4.5 step 1: "recipe overrides template").
pub type ResolvedInfo = Recipe;

/// The on-disk shape of a recipe-definition file entry (engine §4.2 step 2,
/// SPEC_FULL §3 "Recipe files on disk"). Deserialized from TOML; commands
/// here can only ever be literal argv vectors, since closures cannot be
/// represented in data. Programmatic recipes skip this type entirely and
/// build a [`Recipe`] directly.
#[derive(Debug, Clone, Deserialize)]
pub struct RawRecipe {
    pub name: String,
    #[serde(rename = "type", default = "default_build_type")]
    pub build_type: BuildType,
    pub version: Option<String>,
    #[serde(default)]
    pub requires: Vec<String>,
    pub hash: Option<String>,
    pub distfile: Option<String>,
    pub distfile_url_base: Option<String>,
    #[serde(default)]
    pub commands: Vec<Vec<String>>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    #[serde(default)]
    pub config_command: Option<String>,
    #[serde(default)]
    pub config_flags: Vec<String>,
    #[serde(default)]
    pub make_flags: Vec<String>,
    #[serde(default)]
    pub separate_make_install: bool,

    pub source: Option<String>,
    pub destination: Option<String>,

    pub path: Option<String>,
    #[serde(default)]
    pub clean: bool,

    #[serde(default)]
    pub depends: Vec<String>,
    #[serde(default)]
    pub outputs: Vec<String>,

    #[serde(default)]
    pub keep_reverse_deps: bool,
}

fn default_build_type() -> BuildType {
    BuildType::Default
}

/// A recipe-definition file: zero or more `[[recipe]]` tables.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecipeFile {
    #[serde(default, rename = "recipe")]
    pub recipes: Vec<RawRecipe>,
}

impl RawRecipe {
    /// Lower into the runtime [`Recipe`] representation, applying the
    /// build-type defaults this entry didn't override.
    pub fn into_recipe(self) -> anyhow::Result<Recipe> {
        let version = if self.build_type == BuildType::Git {
            let path = self
                .path
                .clone()
                .ok_or_else(|| anyhow::anyhow!("git recipe '{}' is missing `path`", self.name))?;
            VersionSource::Vcs { path: PathBuf::from(path) }
        } else if !self.depends.is_empty() {
            VersionSource::ContentHash {
                depends: self.depends.clone(),
                outputs: self.outputs.clone(),
            }
        } else {
            let version = self
                .version
                .clone()
                .ok_or_else(|| anyhow::anyhow!("recipe '{}' is missing `version`", self.name))?;
            VersionSource::Literal(version)
        };

        let mut recipe = Recipe::new(self.build_type, version).with_requires(self.requires);

        if let Some(hash) = self.hash {
            recipe = recipe.with_hash(hash);
        }
        if let Some(distfile) = self.distfile {
            recipe = recipe.with_distfile(distfile);
        }
        recipe.distfile_url_base = self.distfile_url_base;
        recipe.env = self.env;

        if let Some(cmd) = self.config_command {
            recipe.config_command = cmd;
        }
        if !self.config_flags.is_empty() {
            recipe.config_flags = self.config_flags;
        }
        if !self.make_flags.is_empty() {
            recipe.make_flags = self.make_flags;
        }
        recipe.separate_make_install = self.separate_make_install;

        recipe.source = self.source;
        recipe.destination = self.destination;
        recipe.path = self.path.map(PathBuf::from);
        recipe.clean = self.clean;
        recipe.keep_reverse_deps = self.keep_reverse_deps;

        if !self.commands.is_empty() {
            let specs = self.commands.into_iter().map(CommandSpec::Exec).collect();
            recipe.commands = Commands::Literal(specs);
        }

        Ok(recipe)
    }
}
