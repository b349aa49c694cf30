//! Generate command implementation
//!
//! Runs the full pipeline: pin refs, extract and materialize the best-effort
//! commits, load the must-apply patches, simulate both groups against the
//! base tree, then write the series, archive, kernel config and manifest.

use anyhow::{Context, Result};
use clap::Args;
use std::fs;
use std::path::PathBuf;
use std::time::Instant;

use patchpin::output::{emoji, OutputConfig};
use patchpin::phases::orchestrator::{self, GenerateOptions, RunReport};
use patchpin::phases::simulate::Outcome;
use patchpin::repository::SystemGit;

/// Arguments for the generate command
#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Path to config file (defaults to patchpin.yaml)
    #[arg(short, long, value_name = "PATH", env = "PATCHPIN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Package output directory (overrides `output` in the config)
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Resolve and simulate without writing anything
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Write a JSON run report to this path
    #[arg(long, value_name = "PATH")]
    pub report: Option<PathBuf>,

    /// Suppress all output except errors
    #[arg(short, long)]
    pub quiet: bool,
}

/// Execute the generate command
pub fn execute(args: GenerateArgs, color_flag: &str) -> Result<()> {
    let out = OutputConfig::from_env_and_flag(color_flag);
    let start_time = Instant::now();

    let config_path = super::config_path(args.config);
    let mut config = super::load_config(&config_path)?;
    if let Some(output) = args.output {
        config.output = std::env::current_dir()
            .context("Failed to get current directory")?
            .join(output);
    }

    if !args.quiet && args.dry_run {
        println!(
            "{} DRY RUN MODE - No changes will be made",
            emoji(&out, "🔎", "[DRY]")
        );
        println!();
    }

    let options = GenerateOptions {
        dry_run: args.dry_run,
    };
    let report = match orchestrator::execute_generate(&config, &SystemGit, &options) {
        Ok(report) => report,
        Err(e) => {
            if !args.quiet {
                println!("{} Generate failed", emoji(&out, "❌", "[ERR]"));
            }
            return Err(e.into());
        }
    };

    if let Some(path) = &args.report {
        let json = serde_json::to_string_pretty(&report)?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
    }

    if !args.quiet {
        print_summary(&out, &config.must_apply.name, &config.best_effort.name, &report);
        let done = format!("Done in {:.2}s", start_time.elapsed().as_secs_f64());
        println!("{} {}", emoji(&out, "✅", "[OK]"), out.good(&done));
    }
    Ok(())
}

fn print_summary(out: &OutputConfig, must_name: &str, best_name: &str, report: &RunReport) {
    println!();
    println!("{} Summary:", emoji(out, "📊", "[INFO]"));
    println!("   {} patches: {}", must_name, report.must_apply.applied);
    println!(
        "   {} patches: applied {} of {}, skipped {}, failed {}",
        best_name,
        report.best_effort.applied,
        report.best_effort.total,
        report.best_effort.skipped,
        report.best_effort.failed
    );

    let failed: Vec<_> = report
        .patches
        .iter()
        .filter(|p| matches!(p.outcome, Outcome::Failed { .. }))
        .collect();
    if !failed.is_empty() {
        println!("{} {}", emoji(out, "⚠️", "[WARN]"), out.caution("Dropped:"));
        for patch in failed {
            println!("   - {}", out.bad(&patch.label));
        }
    }

    if let Some(artifacts) = &report.artifacts {
        println!(
            "   {} patches written to: {}",
            artifacts.series.len(),
            artifacts.patches_dir.display()
        );
        println!("   Archive: {}", artifacts.archive.display());
        println!("   Manifest: {}", artifacts.manifest.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execute_missing_config() {
        let args = GenerateArgs {
            config: Some(PathBuf::from("/nonexistent/patchpin.yaml")),
            output: None,
            dry_run: true,
            report: None,
            quiet: true,
        };

        let result = execute(args, "never");
        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Configuration file not found"));
    }
}
