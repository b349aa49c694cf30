//! # Version-Control Collaborator
//!
//! Every phase talks to git through the [`GitOperations`] trait rather than
//! calling the binary directly. [`SystemGit`] is the real implementation and
//! shells out through [`crate::git::run`]; tests substitute in-memory mocks so
//! that ref resolution, commit extraction and the simulation policy can be
//! exercised without network access or a real repository.
//!
//! The trait mirrors the git commands the pipeline uses (clone, remote upsert,
//! forced fetch into a pinned ref, ref listing, rev-list ranges, batched
//! subjects, format-patch, read-tree, apply), not a general git API.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::Path;

use crate::error::{Error, Result};
use crate::git::{self, GitOutput};
use crate::types::CommitId;

/// Upper bound on ids passed to one `git show` invocation.
pub const SUBJECT_BATCH_SIZE: usize = 512;

/// How `git apply` should treat a patch against the staging index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyMode {
    /// Plain `apply --cached`.
    Direct,
    /// `apply --cached --reverse --check`: tests whether the patch is already
    /// present without touching the index.
    ReverseCheck,
    /// `apply --cached --3way`, falling back on the blob ids recorded in the
    /// patch.
    ThreeWay,
}

impl ApplyMode {
    fn extra_args(self) -> &'static [&'static str] {
        match self {
            ApplyMode::Direct => &[],
            ApplyMode::ReverseCheck => &["--reverse", "--check"],
            ApplyMode::ThreeWay => &["--3way"],
        }
    }
}

/// The answer git gave to one apply attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyStatus {
    Clean,
    Rejected(String),
}

impl ApplyStatus {
    pub fn is_clean(&self) -> bool {
        matches!(self, ApplyStatus::Clean)
    }
}

/// Trait for git operations - allows mocking in tests
pub trait GitOperations {
    /// Clone `url` into `target_dir` without checking out a working tree,
    /// naming the remote `remote`.
    fn clone_no_checkout(&self, url: &str, remote: &str, target_dir: &Path) -> Result<()>;

    /// Names of the configured remotes.
    fn remotes(&self, repo: &Path) -> Result<Vec<String>>;

    /// Add a remote.
    fn add_remote(&self, repo: &Path, name: &str, url: &str) -> Result<()>;

    /// Point an existing remote at `url`.
    fn set_remote_url(&self, repo: &Path, name: &str, url: &str) -> Result<()>;

    /// Fetch `refspec` from `remote`. A failed fetch is [`Error::Fetch`].
    fn fetch(&self, repo: &Path, remote: &str, refspec: &str) -> Result<()>;

    /// Fetch all tags from `remote`.
    fn fetch_tags(&self, repo: &Path, remote: &str) -> Result<()>;

    /// Refs matching `pattern`.
    fn list_refs(&self, repo: &Path, pattern: &str) -> Result<Vec<String>>;

    /// Tags matching `pattern` that are ancestors of `merged_into`.
    fn tags_merged_into(&self, repo: &Path, pattern: &str, merged_into: &str)
        -> Result<Vec<String>>;

    /// Resolve a revision to a commit id, `None` if it does not resolve.
    fn rev_parse(&self, repo: &Path, rev: &str) -> Result<Option<CommitId>>;

    /// Best common ancestor of `a` and `b`, `None` if they share no history.
    fn merge_base(&self, repo: &Path, a: &str, b: &str) -> Result<Option<CommitId>>;

    /// Non-merge commits reachable from `include` and from none of
    /// `excludes`, newest-first unless `reverse`.
    fn rev_list(
        &self,
        repo: &Path,
        include: &str,
        excludes: &[String],
        reverse: bool,
    ) -> Result<Vec<CommitId>>;

    /// Subject lines for many commits in as few invocations as possible.
    fn subjects(&self, repo: &Path, ids: &[CommitId]) -> Result<HashMap<CommitId, String>>;

    /// `format-patch` text for a single commit.
    fn format_patch(&self, repo: &Path, id: &CommitId) -> Result<String>;

    /// Detach HEAD at `target`, resetting the index and working tree to it.
    fn switch_detached(&self, repo: &Path, target: &str) -> Result<()>;

    /// Populate the index file at `index` from `treeish`.
    fn read_tree(&self, repo: &Path, index: &Path, treeish: &str) -> Result<()>;

    /// Apply `patch` to the index file at `index`.
    fn apply(&self, repo: &Path, index: &Path, patch: &str, mode: ApplyMode)
        -> Result<ApplyStatus>;
}

/// The default implementation of `GitOperations`, which uses the system's
/// `git` command to perform real Git operations.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemGit;

impl SystemGit {
    /// Run git in `repo` against the index file at `index`. `GIT_WORK_TREE`
    /// stays unset: git would resolve it against the `-C` directory.
    fn run_with_index(
        repo: &Path,
        index: &Path,
        args: &[&str],
        stdin: Option<&str>,
    ) -> Result<GitOutput> {
        git::run(Some(repo), args, stdin, &[("GIT_INDEX_FILE", index.as_os_str())])
    }
}

impl GitOperations for SystemGit {
    fn clone_no_checkout(&self, url: &str, remote: &str, target_dir: &Path) -> Result<()> {
        if let Some(parent) = target_dir.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let args = [
            OsStr::new("clone"),
            OsStr::new("--origin"),
            OsStr::new(remote),
            OsStr::new("--no-checkout"),
            OsStr::new(url),
            target_dir.as_os_str(),
        ];
        let out = git::run(None, &args, None, &[])?;
        if !out.success {
            return Err(Error::Fetch {
                remote: remote.to_string(),
                refspec: url.to_string(),
                message: out.diagnostic(),
            });
        }
        Ok(())
    }

    fn remotes(&self, repo: &Path) -> Result<Vec<String>> {
        Ok(git::run_checked(repo, &["remote"])?.lines())
    }

    fn add_remote(&self, repo: &Path, name: &str, url: &str) -> Result<()> {
        git::run_checked(repo, &["remote", "add", name, url])?;
        Ok(())
    }

    fn set_remote_url(&self, repo: &Path, name: &str, url: &str) -> Result<()> {
        git::run_checked(repo, &["remote", "set-url", name, url])?;
        Ok(())
    }

    fn fetch(&self, repo: &Path, remote: &str, refspec: &str) -> Result<()> {
        let out = git::run(Some(repo), &["fetch", remote, refspec], None, &[])?;
        if !out.success {
            return Err(Error::Fetch {
                remote: remote.to_string(),
                refspec: refspec.to_string(),
                message: out.diagnostic(),
            });
        }
        Ok(())
    }

    fn fetch_tags(&self, repo: &Path, remote: &str) -> Result<()> {
        let out = git::run(Some(repo), &["fetch", remote, "--tags"], None, &[])?;
        if !out.success {
            return Err(Error::Fetch {
                remote: remote.to_string(),
                refspec: "--tags".to_string(),
                message: out.diagnostic(),
            });
        }
        Ok(())
    }

    fn list_refs(&self, repo: &Path, pattern: &str) -> Result<Vec<String>> {
        Ok(git::run_checked(repo, &["for-each-ref", "--format=%(refname)", pattern])?.lines())
    }

    fn tags_merged_into(
        &self,
        repo: &Path,
        pattern: &str,
        merged_into: &str,
    ) -> Result<Vec<String>> {
        let out = git::run_checked(
            repo,
            &["tag", "--list", pattern, "--merged", merged_into],
        )?;
        Ok(out.lines())
    }

    fn rev_parse(&self, repo: &Path, rev: &str) -> Result<Option<CommitId>> {
        let spec = format!("{}^{{commit}}", rev);
        let out = git::run(Some(repo), &["rev-parse", "--verify", "--quiet", &spec], None, &[])?;
        if !out.success {
            return Ok(None);
        }
        Ok(out.lines().into_iter().next().map(CommitId::from))
    }

    fn merge_base(&self, repo: &Path, a: &str, b: &str) -> Result<Option<CommitId>> {
        let out = git::run(Some(repo), &["merge-base", a, b], None, &[])?;
        if !out.success {
            return Ok(None);
        }
        Ok(out.lines().into_iter().next().map(CommitId::from))
    }

    fn rev_list(
        &self,
        repo: &Path,
        include: &str,
        excludes: &[String],
        reverse: bool,
    ) -> Result<Vec<CommitId>> {
        let mut args = vec!["rev-list".to_string(), "--no-merges".to_string()];
        if reverse {
            args.push("--reverse".to_string());
        }
        args.push(include.to_string());
        args.extend(
            excludes
                .iter()
                .filter(|ex| !ex.is_empty())
                .map(|ex| format!("^{}", ex)),
        );
        let out = git::run_checked(repo, &args)?;
        Ok(out.lines().into_iter().map(CommitId::from).collect())
    }

    fn subjects(&self, repo: &Path, ids: &[CommitId]) -> Result<HashMap<CommitId, String>> {
        let mut subjects = HashMap::new();
        for chunk in ids.chunks(SUBJECT_BATCH_SIZE) {
            let mut args = vec![
                "show".to_string(),
                "-s".to_string(),
                "--format=%H %s".to_string(),
            ];
            args.extend(chunk.iter().map(|id| id.as_str().to_string()));
            let out = git::run_checked(repo, &args)?;
            subjects.extend(git::parse_subjects(&out.stdout));
        }
        Ok(subjects)
    }

    fn format_patch(&self, repo: &Path, id: &CommitId) -> Result<String> {
        let out = git::run_checked(repo, &["format-patch", "-1", id.as_str(), "--stdout"])?;
        Ok(out.stdout)
    }

    fn switch_detached(&self, repo: &Path, target: &str) -> Result<()> {
        git::run_checked(repo, &["switch", "--detach", "--discard-changes", target])?;
        Ok(())
    }

    fn read_tree(&self, repo: &Path, index: &Path, treeish: &str) -> Result<()> {
        Self::run_with_index(repo, index, &["read-tree", treeish], None)?.check()?;
        Ok(())
    }

    fn apply(
        &self,
        repo: &Path,
        index: &Path,
        patch: &str,
        mode: ApplyMode,
    ) -> Result<ApplyStatus> {
        let mut args = vec!["apply", "--cached", "--whitespace=nowarn"];
        args.extend_from_slice(mode.extra_args());
        args.push("-");
        let out = Self::run_with_index(repo, index, &args, Some(patch))?;
        if out.success {
            Ok(ApplyStatus::Clean)
        } else {
            Ok(ApplyStatus::Rejected(out.diagnostic()))
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::FixtureRepo;
    use super::*;
    use crate::git::git_available;

    #[test]
    fn test_apply_mode_args() {
        assert!(ApplyMode::Direct.extra_args().is_empty());
        assert_eq!(ApplyMode::ReverseCheck.extra_args(), &["--reverse", "--check"]);
        assert_eq!(ApplyMode::ThreeWay.extra_args(), &["--3way"]);
    }

    #[test]
    fn test_rev_parse_and_merge_base() {
        if !git_available() {
            return;
        }
        let repo = FixtureRepo::new();
        let root = repo.commit("a.txt", "a\n", "root");
        repo.git(&["checkout", "-q", "-b", "side"]);
        let side = repo.commit("b.txt", "b\n", "side");
        repo.git(&["checkout", "-q", "main"]);
        let main = repo.commit("c.txt", "c\n", "main");

        let git = SystemGit;
        assert_eq!(git.rev_parse(repo.path(), "side").unwrap(), Some(side));
        assert_eq!(git.rev_parse(repo.path(), "does-not-exist").unwrap(), None);
        assert_eq!(
            git.merge_base(repo.path(), main.as_str(), "side").unwrap(),
            Some(root)
        );
    }

    #[test]
    fn test_subjects_batches_lookup() {
        if !git_available() {
            return;
        }
        let repo = FixtureRepo::new();
        let a = repo.commit("a.txt", "a\n", "First change");
        let b = repo.commit("b.txt", "b\n", "Second: change!");

        let subjects = SystemGit.subjects(repo.path(), &[a.clone(), b.clone()]).unwrap();
        assert_eq!(subjects[&a], "First change");
        assert_eq!(subjects[&b], "Second: change!");
    }

    #[test]
    fn test_remote_upsert() {
        if !git_available() {
            return;
        }
        let repo = FixtureRepo::new();
        let git = SystemGit;
        assert!(git.remotes(repo.path()).unwrap().is_empty());
        git.add_remote(repo.path(), "upstream", "https://example.invalid/a.git")
            .unwrap();
        git.set_remote_url(repo.path(), "upstream", "https://example.invalid/b.git")
            .unwrap();
        assert_eq!(git.remotes(repo.path()).unwrap(), vec!["upstream".to_string()]);
        assert_eq!(
            repo.git(&["remote", "get-url", "upstream"]),
            "https://example.invalid/b.git"
        );
    }

    #[test]
    fn test_staging_index_accepts_relative_repo_path() {
        if !git_available() {
            return;
        }
        let repo = FixtureRepo::new();
        repo.commit("a.txt", "a\n", "root");
        let change = repo.commit("a.txt", "b\n", "change");
        let patch = SystemGit.format_patch(repo.path(), &change).unwrap();
        let relative = repo.relative_path();
        assert!(relative.is_relative());

        let scratch = tempfile::TempDir::new().unwrap();
        let index = scratch.path().join("index");
        let git = SystemGit;
        git.read_tree(&relative, &index, "HEAD~1").unwrap();
        assert!(index.is_file());
        assert_eq!(
            git.apply(&relative, &index, &patch, ApplyMode::Direct).unwrap(),
            ApplyStatus::Clean
        );
        assert_eq!(
            git.apply(&relative, &index, &patch, ApplyMode::ReverseCheck)
                .unwrap(),
            ApplyStatus::Clean
        );
    }

    #[test]
    fn test_fetch_failure_is_fetch_error() {
        if !git_available() {
            return;
        }
        let repo = FixtureRepo::new();
        repo.commit("a.txt", "a\n", "root");
        let git = SystemGit;
        let missing = repo.path().join("no-such-remote");
        git.add_remote(repo.path(), "gone", missing.to_str().unwrap())
            .unwrap();
        let err = git
            .fetch(repo.path(), "gone", "+main:refs/remotes/gone/pin-x")
            .unwrap_err();
        assert!(matches!(err, Error::Fetch { .. }));
    }
}
