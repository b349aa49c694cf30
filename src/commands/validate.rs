//! # Validate Command Implementation
//!
//! This module implements the `validate` subcommand, which checks a
//! `patchpin.yaml` configuration without touching the network or any
//! checkout.
//!
//! ## Functionality
//!
//! - **Configuration Validation**: Parses the configuration file and validates
//!   its structure and contents (required refs, labels, exclusion prefixes,
//!   override names).
//! - **Reproducibility Warnings**: Flags repositories tracked by branch rather
//!   than pinned to a ref, and a best-effort group without an upstream.
//! - **Template Check**: Verifies that a configured manifest template exists
//!   and carries every placeholder.
//!
//! This command is a safe, read-only operation that does not modify any files.

use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

use patchpin::config::{Config, RepoSpec};
use patchpin::output::{emoji, OutputConfig};
use patchpin::phases::render;

/// Validate a patchpin.yaml configuration file
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Path to the configuration file to validate (defaults to patchpin.yaml)
    #[arg(short, long, value_name = "FILE", env = "PATCHPIN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Use strict validation (fail on warnings).
    #[arg(long)]
    pub strict: bool,
}

/// Repositories that follow a moving branch instead of a pinned ref.
fn unpinned(config: &Config) -> Vec<(String, &RepoSpec)> {
    let mut repos = vec![
        (config.base.name.clone(), &config.base.repo),
        (config.best_effort.name.clone(), &config.best_effort.repo),
    ];
    if let Some(upstream) = &config.best_effort.upstream {
        if upstream.tag_pattern.is_none() {
            repos.push((
                format!("{} upstream", config.best_effort.name),
                &upstream.repo,
            ));
        }
    }
    repos
        .into_iter()
        .filter(|(_, spec)| spec.r#ref.is_empty())
        .collect()
}

/// Execute the `validate` command.
///
/// # Arguments
/// * `args` - The command arguments
/// * `color_flag` - The value of the global --color flag ("always", "never", or "auto")
pub fn execute(args: ValidateArgs, color_flag: &str) -> Result<()> {
    let out = OutputConfig::from_env_and_flag(color_flag);
    let config_path = super::config_path(args.config);
    println!(
        "{} Validating configuration: {}",
        emoji(&out, "🔍", "[SCAN]"),
        config_path.display()
    );

    let config = match super::load_config(&config_path) {
        Ok(config) => {
            println!(
                "{} Configuration file parsed successfully",
                emoji(&out, "✅", "[OK]")
            );
            config
        }
        Err(e) => {
            println!(
                "{} Configuration parsing failed: {:#}",
                emoji(&out, "❌", "[ERR]"),
                e
            );
            return Err(e);
        }
    };

    let mut has_warnings = false;
    let mut has_errors = false;

    println!("\n{} Configuration Summary:", emoji(&out, "📊", "[INFO]"));
    println!(
        "   Base: {} ({} {})",
        config.base.name,
        config.base.repo.remote,
        config.base.repo.target().unwrap_or_default()
    );
    println!(
        "   Best-effort: {} ({} {}), {} excluded commits, at most {} commits",
        config.best_effort.name,
        config.best_effort.repo.remote,
        config.best_effort.repo.target().unwrap_or_default(),
        config.exclusion_set().len(),
        config.best_effort.max_commits
    );
    println!(
        "   Must-apply: {} (recipe {}, folder {}, {} overrides)",
        config.must_apply.name,
        config.must_apply.recipe_dir.join(&config.must_apply.recipe_file).display(),
        config.must_apply.folder,
        config.must_apply.variables.len()
    );
    println!("   Output: {}", config.output_dir().display());

    println!(
        "\n{} Checking reproducibility...",
        emoji(&out, "🔄", "[CHECK]")
    );
    for (label, spec) in unpinned(&config) {
        println!(
            "{} {} follows branch {} without a pinned ref",
            emoji(&out, "⚠️", "[WARN]"),
            label,
            spec.branch
        );
        has_warnings = true;
    }
    if config.best_effort.upstream.is_none() {
        println!(
            "{} {} has no upstream: every commit not in the base is a candidate",
            emoji(&out, "⚠️", "[WARN]"),
            config.best_effort.name
        );
        has_warnings = true;
    }

    if let Some(path) = config.template_path() {
        println!(
            "\n{} Checking manifest template...",
            emoji(&out, "🔍", "[SCAN]")
        );
        let checked = render::load_template(Some(&path)).and_then(|template| {
            let probe = render::ManifestFields {
                pkgver: String::new(),
                srcname: String::new(),
                sources: Vec::new(),
                sha256sums: Vec::new(),
            };
            render::render_manifest(&template, &probe)
        });
        match checked {
            Ok(_) => println!("{} Template is usable", emoji(&out, "✅", "[OK]")),
            Err(e) => {
                println!("{} {}", emoji(&out, "❌", "[ERR]"), e);
                has_errors = true;
            }
        }
    }

    println!("\n{} Validation Result:", emoji(&out, "🎯", "[RESULT]"));

    if has_errors {
        println!(
            "{} Configuration has errors that must be fixed",
            emoji(&out, "❌", "[ERR]")
        );
        return Err(anyhow::anyhow!("Configuration validation failed"));
    }

    if has_warnings && args.strict {
        println!(
            "{} Configuration has warnings (strict mode enabled)",
            emoji(&out, "❌", "[ERR]")
        );
        return Err(anyhow::anyhow!(
            "Configuration validation failed in strict mode"
        ));
    }

    if has_warnings {
        println!(
            "{} Configuration is valid but has warnings",
            emoji(&out, "⚠️", "[WARN]")
        );
    } else {
        println!("{} Configuration is valid", emoji(&out, "✅", "[OK]"));
    }

    Ok(())
}
