//! # patchpin
//!
//! This library resolves a reproducible kernel patch series from several
//! independent upstream repositories. It is designed to be used by the
//! `patchpin` command-line tool, but every phase is usable on its own.
//!
//! ## Quick Example
//!
//! ```
//! use patchpin::recipe::{Overrides, Recipe};
//! use patchpin::phases::materialize::commit_label;
//! use patchpin::types::CommitId;
//!
//! // Evaluate a package recipe without running a shell
//! let recipe = Recipe::evaluate(
//!     r#"
//! _major=6.19
//! source=("https://example.com/${_major}/all/0001-base.patch")
//! "#,
//!     &Overrides::default(),
//! )
//! .unwrap();
//! assert_eq!(
//!     recipe.sources(),
//!     vec!["https://example.com/6.19/all/0001-base.patch".to_string()]
//! );
//!
//! // Derive a file-name-safe label from a commit subject
//! let id = CommitId::from("27b53f08bb8b7dcf4e9ae551bc8f9c65a05568ca");
//! assert_eq!(commit_label("drm/amd: fix thing", &id), "drm-amd-fix-thing");
//! ```
//!
//! ## Core Concepts
//!
//! - **Configuration (`config`)**: the `patchpin.yaml` schema describing the
//!   base tree, the best-effort branch and the must-apply recipe.
//! - **Git (`git`, `repository`)**: every repository operation goes through
//!   the [`repository::GitOperations`] trait, implemented by the system `git`.
//! - **Recipes (`recipe`)**: a sandboxed evaluator for the shell subset used
//!   by package recipes.
//! - **Phases (`phases`)**: the pipeline itself.
//!
//! ## Execution Flow
//!
//! The main entry point is [`phases::orchestrator::execute_generate`]:
//!
//! 1.  **Ref Resolution**: pin the base, best-effort and upstream refs.
//! 2.  **Commit Extraction**: list the best-effort commits not in upstream or
//!     base.
//! 3.  **External Patch Loading**: read the patches a recipe declares.
//! 4.  **Materialization**: turn commits into labelled patches.
//! 5.  **Simulation**: apply everything to a scratch index and decide the
//!     series.
//! 6.  **Writing**: emit the numbered series and its archive.
//! 7.  **Rendering**: fill the package manifest template.

pub mod archive;
pub mod config;
pub mod defaults;
pub mod error;
pub mod git;
pub mod output;
pub mod phases;
pub mod recipe;
pub mod repository;
pub mod types;

#[cfg(test)]
mod label_proptest;
