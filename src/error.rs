//! # Error Handling
//!
//! This module defines the centralized error type for `patchpin`. It uses the
//! `thiserror` library to describe every failure mode the pipeline can hit,
//! with enough context in each variant to act on the message without a
//! debugger.
//!
//! ## Fatal vs. recoverable
//!
//! Every variant of [`Error`] is fatal: it aborts the run and the binary exits
//! non-zero. Anything that would leave the emitted patch series incomplete or
//! silently wrong surfaces as one of these variants.
//!
//! A best-effort patch that fails to apply is *not* an error. It is recorded as
//! [`crate::phases::simulate::Outcome::Failed`] and reported as a warning at the
//! end of the simulation.
//!
//! The [`Result`] alias is used throughout the library; CLI commands wrap it in
//! `anyhow::Result` to attach context.

use thiserror::Error;

/// Main error type for patchpin operations
#[derive(Error, Debug)]
pub enum Error {
    /// Required input is absent, invalid, or a sanity bound was exceeded.
    #[error("Configuration error: {message}{}", hint.as_ref().map(|h| format!("\n  hint: {}", h)).unwrap_or_default())]
    Configuration {
        message: String,
        /// Optional hint for how to fix the configuration issue
        hint: Option<String>,
    },

    /// Cloning or fetching from a remote failed.
    #[error("Fetch error for {remote} ({refspec}): {message}")]
    Fetch {
        remote: String,
        refspec: String,
        message: String,
    },

    /// A ref or ancestor could not be resolved.
    #[error("Resolution error: {message}")]
    Resolution { message: String },

    /// A recipe declares a patch that does not exist in the local checkout.
    #[error("Missing patch referenced by recipe: {}", path.display())]
    MissingPatch { path: std::path::PathBuf },

    /// A file the package needs (template, kernel config) does not exist.
    #[error("Missing {what}: {}", path.display())]
    MissingFile {
        what: String,
        path: std::path::PathBuf,
    },

    /// A must-apply recipe yielded no patches at all.
    #[error("No patches discovered for {source_name}")]
    EmptyResult { source_name: String },

    /// A must-apply patch was rejected by both direct and three-way apply.
    #[error("{group} patch failed to apply on {base}: {label} :: {message}")]
    PatchApply {
        group: String,
        label: String,
        base: String,
        message: String,
    },

    /// A git command exited unsuccessfully.
    #[error("Git command failed: {command} - {stderr}")]
    GitCommand { command: String, stderr: String },

    /// The recipe uses syntax the evaluator cannot handle.
    #[error("Recipe error at line {line}: {message}")]
    Manifest { line: usize, message: String },

    /// An error occurred during template rendering.
    ///
    /// May include the name of the problematic placeholder when applicable.
    #[error("Template processing error: {message}{}", variable.as_ref().map(|v| format!(" (variable: {})", v)).unwrap_or_default())]
    Template {
        message: String,
        /// The template placeholder that caused the error, if applicable
        variable: Option<String>,
    },

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A YAML parsing error, wrapped from `serde_yaml::Error`.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A JSON serialization error, wrapped from `serde_json::Error`.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A regular expression error, wrapped from `regex::Error`.
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// A glob pattern error, wrapped from `glob::PatternError`.
    #[error("Glob pattern error: {0}")]
    Glob(#[from] glob::PatternError),
}

impl Error {
    /// Shorthand for a [`Error::Configuration`] without a hint.
    pub fn config(message: impl Into<String>) -> Self {
        Error::Configuration {
            message: message.into(),
            hint: None,
        }
    }
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
