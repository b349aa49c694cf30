//! Core value types shared by every phase of the pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A git commit object name in its full-length form.
///
/// Two ids are equal iff their full strings are equal. Abbreviated forms are
/// only meaningful to [`crate::phases::extract::ExclusionSet`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommitId(pub String);

impl CommitId {
    pub fn new(s: impl Into<String>) -> Self {
        CommitId(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the first `n` characters, or the whole id if it is shorter.
    pub fn abbrev(&self, n: usize) -> &str {
        self.0.get(..n).unwrap_or(&self.0)
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CommitId {
    fn from(s: &str) -> Self {
        CommitId(s.to_string())
    }
}

impl From<String> for CommitId {
    fn from(s: String) -> Self {
        CommitId(s)
    }
}

/// One logical change: a display label plus raw unified-diff text.
///
/// Labels are not unique; the series writer makes file names unique by
/// numbering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch {
    pub label: String,
    pub content: String,
}

impl Patch {
    pub fn new(label: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            content: content.into(),
        }
    }
}

/// How the simulation treats a patch that does not apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GroupPolicy {
    /// Any rejected patch aborts the run.
    MustApply,
    /// Rejected patches are dropped and reported.
    BestEffort,
}

impl fmt::Display for GroupPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupPolicy::MustApply => write!(f, "must-apply"),
            GroupPolicy::BestEffort => write!(f, "best-effort"),
        }
    }
}

/// An ordered run of patches sharing a name and a failure policy.
#[derive(Debug, Clone)]
pub struct PatchGroup {
    pub name: String,
    pub policy: GroupPolicy,
    pub patches: Vec<Patch>,
}

impl PatchGroup {
    pub fn must_apply(name: impl Into<String>, patches: Vec<Patch>) -> Self {
        Self {
            name: name.into(),
            policy: GroupPolicy::MustApply,
            patches,
        }
    }

    pub fn best_effort(name: impl Into<String>, patches: Vec<Patch>) -> Self {
        Self {
            name: name.into(),
            policy: GroupPolicy::BestEffort,
            patches,
        }
    }

    pub fn len(&self) -> usize {
        self.patches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }
}
