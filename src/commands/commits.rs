//! Commits command implementation
//!
//! Lists the best-effort commit set (`<id> <subject>` per line) so the
//! exclusion list can be audited before a generate run.

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;

use patchpin::phases::orchestrator;
use patchpin::repository::SystemGit;

/// Arguments for the commits command
#[derive(Args, Debug)]
pub struct CommitsArgs {
    /// Path to config file (defaults to patchpin.yaml)
    #[arg(short, long, value_name = "PATH", env = "PATCHPIN_CONFIG")]
    pub config: Option<PathBuf>,

    /// List in application order instead of newest first
    #[arg(long)]
    pub oldest_first: bool,

    /// Print a JSON array instead of plain lines
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct CommitLine<'a> {
    id: &'a str,
    subject: &'a str,
}

/// Execute the commits command
pub fn execute(args: CommitsArgs) -> Result<()> {
    let config = super::load_config(&super::config_path(args.config))?;
    let commits = orchestrator::list_commits(&config, &SystemGit, args.oldest_first)?;

    if args.json {
        let lines: Vec<CommitLine<'_>> = commits
            .iter()
            .map(|(id, subject)| CommitLine {
                id: id.as_str(),
                subject,
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&lines)?);
    } else {
        for (id, subject) in &commits {
            println!("{} {}", id, subject);
        }
    }
    Ok(())
}
