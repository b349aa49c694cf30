//! Phase 2: Commit Extraction
//!
//! Computes the commits that exist on the best-effort branch but not in the
//! history it was built on, in application order, minus excluded commits.
//!
//! Merge commits are never returned. Exceeding the configured bound is an
//! error rather than a truncation: a huge range almost always means the
//! upstream base was resolved wrong.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use log::{debug, info};

use crate::error::{Error, Result};
use crate::repository::GitOperations;
use crate::types::CommitId;

/// Commits to leave out, by full id or abbreviation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionSet {
    entries: BTreeSet<String>,
}

impl ExclusionSet {
    pub fn new(entries: impl IntoIterator<Item = String>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|e| e.trim().to_ascii_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
        }
    }

    /// True if some entry equals `id` or abbreviates it.
    pub fn matches(&self, id: &CommitId) -> bool {
        let id = id.as_str().to_ascii_lowercase();
        self.entries.iter().any(|e| id.starts_with(e.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Non-merge commits reachable from `include` but not from any of `excludes`.
///
/// `reverse` selects oldest-first (application order); otherwise the list is
/// newest-first. Fails with [`Error::Configuration`] if more than
/// `max_commits` remain after exclusions.
pub fn commits_between(
    git: &dyn GitOperations,
    repo: &Path,
    include: &str,
    excludes: &[String],
    reverse: bool,
    exclusions: &ExclusionSet,
    max_commits: usize,
) -> Result<Vec<CommitId>> {
    let listed = git.rev_list(repo, include, excludes, reverse)?;
    let total = listed.len();
    let commits: Vec<CommitId> = listed
        .into_iter()
        .filter(|id| {
            let excluded = exclusions.matches(id);
            if excluded {
                debug!("excluding {}", id.abbrev(12));
            }
            !excluded
        })
        .collect();

    if commits.len() > max_commits {
        return Err(Error::Configuration {
            message: format!(
                "unexpected commit count: {} (>{})",
                commits.len(),
                max_commits
            ),
            hint: Some(
                "check that the upstream base is right, or raise best_effort.max_commits"
                    .to_string(),
            ),
        });
    }

    info!(
        "{} commits in {} ({} excluded)",
        commits.len(),
        include,
        total - commits.len()
    );
    Ok(commits)
}

/// Subject lines for `ids`, looked up in batches.
///
/// Commits git did not report map to the empty string.
pub fn subjects(
    git: &dyn GitOperations,
    repo: &Path,
    ids: &[CommitId],
) -> Result<HashMap<CommitId, String>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let mut found = git.subjects(repo, ids)?;
    for id in ids {
        found.entry(id.clone()).or_default();
    }
    Ok(found)
}
