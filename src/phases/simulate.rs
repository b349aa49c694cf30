//! Phase 5: Simulated Application
//!
//! Decides which patches ship by applying them, in order, to a scratch index
//! seeded from the base tree. Neither the working tree nor the repository's
//! own index is touched.
//!
//! ## Policy
//!
//! - **Must-apply**: direct apply, then three-way. Both failing aborts the
//!   run with [`Error::PatchApply`].
//! - **Best-effort**: direct apply; on failure a reverse check detects a
//!   patch already present in the base (skipped); otherwise three-way; if
//!   that fails too the patch is dropped and reported.
//!
//! A rejected three-way attempt may leave conflict stages behind, so the index
//! is snapshotted before every three-way attempt and restored if it fails.

use std::fs;
use std::path::{Path, PathBuf};

use log::{info, warn};
use serde::Serialize;
use tempfile::TempDir;

use crate::error::{Error, Result};
use crate::repository::{ApplyMode, ApplyStatus, GitOperations};
use crate::types::{GroupPolicy, Patch, PatchGroup};

/// What happened to one patch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum Outcome {
    Applied,
    Skipped { reason: String },
    Failed { message: String },
}

/// Outcome of one patch, tagged with its group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatchReport {
    pub group: String,
    pub policy: GroupPolicy,
    pub label: String,
    pub outcome: Outcome,
}

/// The shipped series plus a record for every patch considered.
#[derive(Debug, Clone, Default)]
pub struct Simulation {
    /// Must-apply patches, then applied best-effort patches, each in input
    /// order.
    pub patches: Vec<Patch>,
    pub reports: Vec<PatchReport>,
}

impl Simulation {
    fn count(&self, policy: GroupPolicy, pred: impl Fn(&Outcome) -> bool) -> usize {
        self.reports
            .iter()
            .filter(|r| r.policy == policy && pred(&r.outcome))
            .count()
    }

    pub fn applied(&self, policy: GroupPolicy) -> usize {
        self.count(policy, |o| matches!(o, Outcome::Applied))
    }

    pub fn skipped(&self, policy: GroupPolicy) -> usize {
        self.count(policy, |o| matches!(o, Outcome::Skipped { .. }))
    }

    pub fn failed(&self, policy: GroupPolicy) -> usize {
        self.count(policy, |o| matches!(o, Outcome::Failed { .. }))
    }

    /// Reports of dropped patches.
    pub fn failures(&self) -> impl Iterator<Item = &PatchReport> {
        self.reports
            .iter()
            .filter(|r| matches!(r.outcome, Outcome::Failed { .. }))
    }
}

/// A throwaway index file seeded from a tree.
///
/// The file lives in its own temporary directory, removed when this value is
/// dropped.
pub struct StagingIndex<'a> {
    git: &'a dyn GitOperations,
    repo: PathBuf,
    dir: TempDir,
}

impl<'a> StagingIndex<'a> {
    /// Create the index and `read-tree` `base_tree` into it.
    pub fn stage(git: &'a dyn GitOperations, repo: &Path, base_tree: &str) -> Result<Self> {
        let staging = Self {
            git,
            repo: repo.to_path_buf(),
            dir: TempDir::new()?,
        };
        git.read_tree(repo, &staging.path(), base_tree)?;
        Ok(staging)
    }

    pub fn path(&self) -> PathBuf {
        self.dir.path().join("index")
    }

    fn snapshot_path(&self) -> PathBuf {
        self.dir.path().join("index.snapshot")
    }

    pub fn apply(&self, patch: &Patch, mode: ApplyMode) -> Result<ApplyStatus> {
        self.git.apply(&self.repo, &self.path(), &patch.content, mode)
    }

    /// Three-way apply that leaves the index unchanged when it fails.
    pub fn apply_three_way(&self, patch: &Patch) -> Result<ApplyStatus> {
        let index = self.path();
        let snapshot = self.snapshot_path();
        let had_index = index.is_file();
        if had_index {
            fs::copy(&index, &snapshot)?;
        }
        let status = self.apply(patch, ApplyMode::ThreeWay)?;
        if !status.is_clean() {
            if had_index {
                fs::copy(&snapshot, &index)?;
            } else if index.exists() {
                fs::remove_file(&index)?;
            }
        }
        Ok(status)
    }
}

/// Result of trying one patch under a policy.
enum Attempt {
    Applied,
    AlreadyPresent,
    Rejected(String),
}

fn attempt(index: &StagingIndex<'_>, patch: &Patch, policy: GroupPolicy) -> Result<Attempt> {
    let direct = index.apply(patch, ApplyMode::Direct)?;
    let direct_message = match direct {
        ApplyStatus::Clean => return Ok(Attempt::Applied),
        ApplyStatus::Rejected(message) => message,
    };

    if policy == GroupPolicy::BestEffort
        && index.apply(patch, ApplyMode::ReverseCheck)?.is_clean()
    {
        return Ok(Attempt::AlreadyPresent);
    }

    match index.apply_three_way(patch)? {
        ApplyStatus::Clean => Ok(Attempt::Applied),
        ApplyStatus::Rejected(message) if !message.is_empty() => Ok(Attempt::Rejected(message)),
        ApplyStatus::Rejected(_) => Ok(Attempt::Rejected(direct_message)),
    }
}

/// Apply `must_apply` then `best_effort` to a scratch index seeded from
/// `base_tree`, and return the series that applies cleanly.
pub fn simulate(
    git: &dyn GitOperations,
    repo: &Path,
    base_tree: &str,
    must_apply: &PatchGroup,
    best_effort: &PatchGroup,
) -> Result<Simulation> {
    let index = StagingIndex::stage(git, repo, base_tree)?;
    let mut simulation = Simulation::default();

    for group in [must_apply, best_effort] {
        for patch in &group.patches {
            match group.policy {
                GroupPolicy::MustApply => info!("applying {} patch {}", group.name, patch.label),
                GroupPolicy::BestEffort => info!("testing {} patch {}", group.name, patch.label),
            }

            let outcome = match attempt(&index, patch, group.policy)? {
                Attempt::Applied => {
                    simulation.patches.push(patch.clone());
                    Outcome::Applied
                }
                Attempt::AlreadyPresent => {
                    let reason = "already applied (reverse clean)".to_string();
                    info!("already applied: {}", patch.label);
                    Outcome::Skipped { reason }
                }
                Attempt::Rejected(message) => {
                    if group.policy == GroupPolicy::MustApply {
                        return Err(Error::PatchApply {
                            group: group.name.clone(),
                            label: patch.label.clone(),
                            base: base_tree.to_string(),
                            message,
                        });
                    }
                    Outcome::Failed { message }
                }
            };
            simulation.reports.push(PatchReport {
                group: group.name.clone(),
                policy: group.policy,
                label: patch.label.clone(),
                outcome,
            });
        }
    }

    let failed: Vec<&PatchReport> = simulation.failures().collect();
    if !failed.is_empty() {
        warn!(
            "{} {} patches failed to apply and were dropped:",
            failed.len(),
            best_effort.name
        );
        for report in failed {
            if let Outcome::Failed { message } = &report.outcome {
                warn!("  - {}: {}", report.label, message);
            }
        }
    }

    Ok(simulation)
}
