//! # CLI Command Implementations
//!
//! This module contains the implementation for each subcommand of the `patchpin`
//! command-line tool. Each subcommand is defined in its own file.
//!
//! ## Structure
//!
//! Each command module contains:
//! - An `Args` struct that defines the command-specific arguments and options,
//!   derived using `clap`.
//! - An `execute` function that takes the parsed `Args` and performs the
//!   command's logic by calling into the `patchpin` library.

pub mod commits;
pub mod completions;
pub mod generate;
pub mod validate;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use patchpin::config::{self, Config, DEFAULT_CONFIG_FILE};

/// The config file to use: the flag (or `PATCHPIN_CONFIG`), else
/// `patchpin.yaml` in the current directory.
pub fn config_path(flag: Option<PathBuf>) -> PathBuf {
    flag.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

/// Load and validate the configuration at `path`.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        anyhow::bail!("Configuration file not found: {}", path.display());
    }
    config::from_file(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))
}
