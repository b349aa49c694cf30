//! Phase 4: Materialization
//!
//! Turns best-effort commits into [`Patch`] values: `format-patch` text plus a
//! filesystem-safe label derived from the commit subject.

use std::collections::HashMap;
use std::path::Path;

use log::debug;

use crate::error::Result;
use crate::repository::GitOperations;
use crate::types::{CommitId, Patch};

fn is_label_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')
}

/// Label for a commit patch.
///
/// Each run of characters outside `[A-Za-z0-9._-]` becomes one `-`, and
/// leading/trailing `-` are trimmed. An empty result falls back to the first
/// 12 characters of the commit id.
pub fn commit_label(subject: &str, id: &CommitId) -> String {
    let mut label = String::with_capacity(subject.len());
    let mut in_run = false;
    for c in subject.chars() {
        if is_label_char(c) {
            label.push(c);
            in_run = false;
        } else if !in_run {
            label.push('-');
            in_run = true;
        }
    }
    let label = label.trim_matches('-');
    if label.is_empty() {
        id.abbrev(12).to_string()
    } else {
        label.to_string()
    }
}

/// One patch per commit, in input order.
pub fn materialize(
    git: &dyn GitOperations,
    repo: &Path,
    commits: &[CommitId],
    subjects: &HashMap<CommitId, String>,
) -> Result<Vec<Patch>> {
    commits
        .iter()
        .map(|id| {
            let subject = subjects.get(id).map(String::as_str).unwrap_or_default();
            let label = commit_label(subject, id);
            debug!("materializing {} as {}", id.abbrev(12), label);
            let content = git.format_patch(repo, id)?;
            Ok(Patch::new(label, content))
        })
        .collect()
}
