//! Phase 1: Ref Resolution
//!
//! Turns the symbolic refs in the configuration (tags, branches, explicit
//! commits) into refs pinned in the local clone, fetching on demand.
//!
//! Pins live under `refs/remotes/<remote>/pin-<label>`. They are always
//! force-fetched, so moving a pin backwards (say from a newer tag to an older
//! one) never trips over a non-fast-forward rejection.

use std::cmp::Ordering;
use std::path::Path;

use log::{info, warn};

use crate::config::RepoSpec;
use crate::error::{Error, Result};
use crate::repository::GitOperations;

/// Name of the pinned ref a label resolves into.
pub fn pin_ref_name(remote: &str, label: &str) -> String {
    format!("refs/remotes/{}/pin-{}", remote, label)
}

/// Compare two ref names the way `--sort=version:refname` does: runs of
/// digits compare numerically, everything else byte-wise.
pub fn version_cmp(a: &str, b: &str) -> Ordering {
    let mut left = Chunks::new(a);
    let mut right = Chunks::new(b);
    loop {
        match (left.next(), right.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) => {
                let ord = match (is_digits(l), is_digits(r)) {
                    (true, true) => numeric_cmp(l, r),
                    _ => l.cmp(r),
                };
                if ord != Ordering::Equal {
                    return ord;
                }
            }
        }
    }
}

fn is_digits(s: &str) -> bool {
    s.bytes().all(|b| b.is_ascii_digit())
}

fn numeric_cmp(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Splits a string into alternating digit and non-digit runs.
struct Chunks<'a> {
    rest: &'a str,
}

impl<'a> Chunks<'a> {
    fn new(s: &'a str) -> Self {
        Self { rest: s }
    }
}

impl<'a> Iterator for Chunks<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        let first = self.rest.chars().next()?;
        let digit = first.is_ascii_digit();
        let end = self
            .rest
            .char_indices()
            .find(|(_, c)| c.is_ascii_digit() != digit)
            .map(|(i, _)| i)
            .unwrap_or(self.rest.len());
        let (chunk, rest) = self.rest.split_at(end);
        self.rest = rest;
        Some(chunk)
    }
}

/// Resolves configured refs into locally pinned refs.
pub struct RefResolver<'a> {
    git: &'a dyn GitOperations,
}

impl<'a> RefResolver<'a> {
    pub fn new(git: &'a dyn GitOperations) -> Self {
        Self { git }
    }

    /// Make sure `repo_dir` is a clone with `spec.remote` pointing at
    /// `spec.url`, cloning without a checkout if it does not exist yet.
    pub fn ensure_remote(&self, repo_dir: &Path, spec: &RepoSpec) -> Result<()> {
        if !repo_dir.exists() {
            info!("cloning {} into {}", spec.url, repo_dir.display());
            self.git
                .clone_no_checkout(&spec.url, &spec.remote, repo_dir)?;
        }

        if !repo_dir.join(".git").exists() {
            return Err(Error::Configuration {
                message: format!("{} exists but is not a git repository", repo_dir.display()),
                hint: Some("remove the directory or point workdir elsewhere".to_string()),
            });
        }

        let remotes = self.git.remotes(repo_dir)?;
        if remotes.iter().any(|r| r == &spec.remote) {
            self.git.set_remote_url(repo_dir, &spec.remote, &spec.url)?;
        } else {
            self.git.add_remote(repo_dir, &spec.remote, &spec.url)?;
        }
        Ok(())
    }

    /// Fetch the configured ref (or branch tip) into a pinned ref and return
    /// the pinned ref name.
    ///
    /// A target that already names an existing `refs/remotes/<remote>/...`
    /// ref is returned unchanged without touching the network.
    pub fn resolve(&self, repo_dir: &Path, spec: &RepoSpec, label: &str) -> Result<String> {
        let target = spec.target().ok_or_else(|| Error::Configuration {
            message: format!("missing required ref for {}", label),
            hint: Some("set either `branch` or `ref`".to_string()),
        })?;

        self.ensure_remote(repo_dir, spec)?;

        let remote_prefix = format!("refs/remotes/{}/", spec.remote);
        if target.starts_with(&remote_prefix)
            && !self.git.list_refs(repo_dir, target)?.is_empty()
        {
            return Ok(target.to_string());
        }

        let pin = pin_ref_name(&spec.remote, label);
        let refspec = format!("+{}:{}", target, pin);
        self.git.fetch(repo_dir, &spec.remote, &refspec)?;
        Ok(pin)
    }

    /// Resolve the base the best-effort branch was built on.
    ///
    /// An explicit `ref` wins. Otherwise the newest tag matching
    /// `tag_pattern` that is already merged into `descendant` is used, and
    /// failing that the merge base of `descendant` and the branch tip.
    pub fn resolve_auto_base(
        &self,
        repo_dir: &Path,
        spec: &RepoSpec,
        tag_pattern: Option<&str>,
        descendant: &str,
        label: &str,
    ) -> Result<String> {
        if !spec.r#ref.is_empty() {
            return self.resolve(repo_dir, spec, label);
        }

        self.ensure_remote(repo_dir, spec)?;

        if let Some(pattern) = tag_pattern {
            if let Err(e) = self.git.fetch_tags(repo_dir, &spec.remote) {
                warn!("could not fetch tags from {}: {}", spec.remote, e);
            }
            let mut tags = self.git.tags_merged_into(repo_dir, pattern, descendant)?;
            tags.sort_by(|a, b| version_cmp(b, a));
            if let Some(newest) = tags.first() {
                if let Some(id) = self.git.rev_parse(repo_dir, newest)? {
                    info!("{} base resolved to tag {} ({})", label, newest, id.abbrev(12));
                    return Ok(id.to_string());
                }
            }
        }

        let tip = self.resolve(repo_dir, spec, &format!("{}-tip", label))?;
        match self.git.merge_base(repo_dir, descendant, &tip)? {
            Some(id) => {
                info!("{} base resolved to merge-base {}", label, id.abbrev(12));
                Ok(id.to_string())
            }
            None => Err(Error::Resolution {
                message: format!(
                    "failed to determine {} merge-base with {}",
                    label, descendant
                ),
            }),
        }
    }

    /// Fetch the configured ref and detach the working tree at it.
    ///
    /// Used for repositories whose files are read from disk (recipes and
    /// patch collections) rather than through git objects.
    pub fn checkout(&self, repo_dir: &Path, spec: &RepoSpec) -> Result<()> {
        let target = spec.target().ok_or_else(|| {
            Error::config(format!(
                "missing required ref for checkout in {}",
                repo_dir.display()
            ))
        })?;
        self.ensure_remote(repo_dir, spec)?;
        self.git.fetch(repo_dir, &spec.remote, target)?;
        self.git.switch_detached(repo_dir, "FETCH_HEAD")
    }
}
