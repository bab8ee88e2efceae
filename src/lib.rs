//! Redpill: a source-based, role-driven package builder and installer that
//! materializes packages into a single user-owned prefix directory. No
//! root, no global install state — every receipt, lock, and working file
//! lives under the prefix or a temp directory derived from it.
//!
//! A typical run wires the six components together through a
//! [`coordinator::Coordinator`]:
//!
//! ```no_run
//! use redpill::config::Config;
//! use redpill::coordinator::Coordinator;
//! use redpill::recipe_store::RecipeStore;
//! use std::path::PathBuf;
//!
//! # fn main() -> anyhow::Result<()> {
//! let runtime = tokio::runtime::Runtime::new()?;
//! let receipts_dir = PathBuf::from("/home/user/.redpill/receipts");
//! let store = RecipeStore::load(&[PathBuf::from("recipes.toml")], &receipts_dir)?;
//! let working_dir = redpill::lock::working_dir_for(&PathBuf::from("/home/user/.redpill"));
//!
//! let coordinator = Coordinator::new(
//!     Config::new("https://distfiles.example.org"),
//!     PathBuf::from("/home/user/.redpill"),
//!     receipts_dir,
//!     working_dir,
//!     store,
//!     runtime.handle().clone(),
//! );
//! coordinator.install(&["ripgrep".to_string()])?;
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod config;
pub mod coordinator;
pub mod deps;
pub mod error;
pub mod executor;
pub mod fetcher;
pub mod fs_ledger;
pub mod hooks;
pub mod lock;
pub mod output;
pub mod platform;
pub mod recipe;
pub mod recipe_store;
pub mod role;

pub use config::Config;
pub use coordinator::Coordinator;
pub use deps::Plan;
pub use error::RedpillError;
pub use recipe::Recipe;
pub use recipe_store::RecipeStore;
pub use role::Role;
