//! Thin wrappers around the system `git` binary.
//!
//! Every invocation goes through [`run`], which logs the command line at debug
//! level and captures stdout/stderr. Callers decide whether a non-zero exit is
//! an error ([`GitOutput::check`]) or an answer (for example `apply --check`).
//!
//! Using the system git means SSH keys, credential helpers and anything else
//! configured in `~/.gitconfig` work without extra setup.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

use crate::error::{Error, Result};
use crate::types::CommitId;

/// Captured result of one git invocation.
#[derive(Debug, Clone)]
pub struct GitOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub command: String,
}

impl GitOutput {
    /// Turns an unsuccessful invocation into [`Error::GitCommand`].
    pub fn check(self) -> Result<Self> {
        if self.success {
            Ok(self)
        } else {
            Err(Error::GitCommand {
                stderr: self.diagnostic(),
                command: self.command,
            })
        }
    }

    /// The most useful message git left behind: stderr, else stdout.
    pub fn diagnostic(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        "git command failed".to_string()
    }

    /// Non-empty, trimmed stdout lines.
    pub fn lines(&self) -> Vec<String> {
        parse_lines(&self.stdout)
    }
}

/// Build a git command that never prompts on the terminal.
pub(crate) fn git_command(repo: Option<&Path>) -> Command {
    let mut cmd = Command::new("git");
    if let Some(repo) = repo {
        cmd.arg("-C").arg(repo);
    }
    cmd.env("GIT_TERMINAL_PROMPT", "0");
    cmd
}

/// Run git with `args`, optionally feeding `stdin` and extra environment.
///
/// Only a failure to spawn git is an error here; the exit status is reported
/// in [`GitOutput::success`].
pub fn run<S: AsRef<OsStr>>(
    repo: Option<&Path>,
    args: &[S],
    stdin: Option<&str>,
    env: &[(&str, &OsStr)],
) -> Result<GitOutput> {
    let command = describe(repo, args);
    log::debug!("$ {}", command);

    let mut cmd = git_command(repo);
    cmd.args(args);
    for (key, value) in env {
        cmd.env(key, value);
    }
    cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    });

    let spawn_error = |e: std::io::Error| Error::GitCommand {
        command: command.clone(),
        stderr: e.to_string(),
    };

    let mut child = cmd.spawn().map_err(spawn_error)?;
    if let Some(input) = stdin {
        if let Some(mut pipe) = child.stdin.take() {
            pipe.write_all(input.as_bytes()).map_err(spawn_error)?;
        }
    }
    let output = child.wait_with_output().map_err(spawn_error)?;

    Ok(GitOutput {
        success: output.status.success(),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        command,
    })
}

/// Run git and fail on a non-zero exit.
pub fn run_checked<S: AsRef<OsStr>>(repo: &Path, args: &[S]) -> Result<GitOutput> {
    run(Some(repo), args, None, &[])?.check()
}

fn describe<S: AsRef<OsStr>>(repo: Option<&Path>, args: &[S]) -> String {
    let mut parts = vec!["git".to_string()];
    if let Some(repo) = repo {
        parts.push("-C".to_string());
        parts.push(repo.display().to_string());
    }
    parts.extend(
        args.iter()
            .map(|a| a.as_ref().to_string_lossy().into_owned()),
    );
    parts.join(" ")
}

/// Split command output into non-empty trimmed lines.
pub fn parse_lines(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse `git show -s --format='%H %s'` output into an id -> subject map.
///
/// A line carrying only a hash maps to an empty subject.
pub fn parse_subjects(stdout: &str) -> HashMap<CommitId, String> {
    let mut subjects = HashMap::new();
    for line in stdout.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match line.split_once(' ') {
            Some((hash, subject)) => {
                subjects.insert(CommitId::from(hash), subject.to_string());
            }
            None => {
                subjects.insert(CommitId::from(line.trim()), String::new());
            }
        }
    }
    subjects
}

/// Whether a usable `git` binary is on `PATH`.
pub fn git_available() -> bool {
    git_command(None)
        .arg("--version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}
