//! Shared test utilities for E2E tests.
//!
//! ## Usage
//!
//! ```rust,ignore
//! mod common;
//! use common::prelude::*;
//!
//! let fixture = TestFixture::new().with_config(configs::PINNED);
//! fixture.command().arg("validate").assert().success();
//! ```

use assert_cmd::cargo::cargo_bin_cmd;
use assert_fs::prelude::*;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Re-export commonly used test dependencies for convenience.
pub mod prelude {
    pub use assert_cmd::cargo::cargo_bin_cmd;
    pub use assert_fs::prelude::*;
    pub use predicates::prelude::*;

    #[allow(unused_imports)]
    pub use super::{configs, git_available, GitRepo, KernelRemotes, TestFixture};
}

/// Configuration snippets for testing.
#[allow(dead_code)]
pub mod configs {
    /// Every repository pinned, upstream tag-resolved.
    pub const PINNED: &str = r#"
base:
  repo: { remote: origin, url: https://example.invalid/linux.git, branch: main, ref: v6.19 }
best_effort:
  name: vendor
  repo: { remote: vendor, url: https://example.invalid/vendor.git, branch: main, ref: v6.17-vendor }
  upstream:
    repo: { remote: upstream, url: https://example.invalid/upstream.git, branch: main }
    tag_pattern: "v6.17*"
  exclude_commits: ["27b53f08bb8b"]
must_apply:
  name: extra
  recipe_repo: { remote: origin, url: https://example.invalid/recipes.git, branch: master, ref: abc1234 }
  recipe_dir: linux-extra
  patches_repo: { remote: origin, url: https://example.invalid/patches.git, branch: master, ref: def5678 }
  folder: "6.19"
  variables: { _use_llvm_lto: thin }
package:
  pkgver: "6.19.0"
  kernel_source: https://example.invalid/linux-6.19.tar.xz
"#;

    /// Base and best-effort follow branches; no upstream.
    pub const BRANCH_TRACKING: &str = r#"
base:
  repo: { remote: origin, url: https://example.invalid/linux.git, branch: main }
best_effort:
  name: vendor
  repo: { remote: vendor, url: https://example.invalid/vendor.git, branch: main }
must_apply:
  name: extra
  recipe_repo: { remote: origin, url: https://example.invalid/recipes.git, branch: master, ref: abc1234 }
  recipe_dir: linux-extra
  patches_repo: { remote: origin, url: https://example.invalid/patches.git, branch: master, ref: def5678 }
  folder: "6.19"
package:
  pkgver: "6.19.0"
  kernel_source: https://example.invalid/linux-6.19.tar.xz
"#;

    /// Invalid YAML for error testing.
    pub const INVALID_YAML: &str = "base: [unclosed";
}

/// Whether a usable `git` binary is on the PATH.
#[allow(dead_code)]
pub fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// A temporary directory that may hold a `patchpin.yaml`.
pub struct TestFixture {
    temp_dir: assert_fs::TempDir,
}

#[allow(dead_code)]
impl TestFixture {
    pub fn new() -> Self {
        Self {
            temp_dir: assert_fs::TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Write `patchpin.yaml` with the given content.
    pub fn with_config(self, content: &str) -> Self {
        self.temp_dir
            .child("patchpin.yaml")
            .write_str(content)
            .expect("Failed to write config file");
        self
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn config_path(&self) -> PathBuf {
        self.temp_dir.path().join("patchpin.yaml")
    }

    pub fn child(&self, path: &str) -> assert_fs::fixture::ChildPath {
        self.temp_dir.child(path)
    }

    /// The patchpin binary, run from the fixture directory without colors.
    pub fn command(&self) -> assert_cmd::Command {
        let mut cmd = cargo_bin_cmd!("patchpin");
        cmd.current_dir(self.path())
            .env_remove("PATCHPIN_CONFIG")
            .env_remove("RUST_LOG")
            .arg("--color")
            .arg("never");
        cmd
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// A scratch git repository driven through the `git` binary.
#[allow(dead_code)]
pub struct GitRepo {
    path: PathBuf,
}

#[allow(dead_code)]
impl GitRepo {
    /// Initialize a repository at `path` with `branch` as the initial branch.
    pub fn init(path: &Path, branch: &str) -> Self {
        std::fs::create_dir_all(path).expect("Failed to create repository directory");
        let repo = Self {
            path: path.to_path_buf(),
        };
        repo.git(&["init", "-q", "-b", branch]);
        repo.git(&["config", "user.email", "test@example.com"]);
        repo.git(&["config", "user.name", "Test"]);
        repo.git(&["config", "commit.gpgsign", "false"]);
        repo.git(&["config", "tag.gpgsign", "false"]);
        repo
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn url(&self) -> String {
        self.path.display().to_string()
    }

    /// Run git and return trimmed stdout, panicking on failure.
    pub fn git(&self, args: &[&str]) -> String {
        let output = Command::new("git")
            .arg("-C")
            .arg(&self.path)
            .args(args)
            .output()
            .expect("Failed to run git");
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }

    /// Write `file`, commit everything and return the commit id.
    pub fn commit(&self, file: &str, content: &str, message: &str) -> String {
        let path = self.path.join(file);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directory");
        }
        std::fs::write(&path, content).expect("Failed to write file");
        self.git(&["add", "-A"]);
        self.git(&["commit", "-q", "-m", message]);
        self.git(&["rev-parse", "HEAD"])
    }

    /// `format-patch` text of `rev`, untrimmed.
    pub fn format_patch(&self, rev: &str) -> String {
        let output = Command::new("git")
            .arg("-C")
            .arg(&self.path)
            .args(["format-patch", "-1", rev, "--stdout"])
            .output()
            .expect("Failed to run git format-patch");
        assert!(output.status.success());
        String::from_utf8(output.stdout).expect("patch is not UTF-8")
    }
}

const TEN_LINES: &str = "one\ntwo\nthree\nfour\nfive\nsix\nseven\neight\nnine\nten\n";

/// Local repositories standing in for the kernel, recipe and patch remotes.
///
/// The kernel repository has `main` (the base) and `vendor` (the
/// best-effort branch). `vendor` carries three commits on top of the shared
/// root:
/// - `Vendor: tweak nine` applies cleanly
/// - `Vendor: rename five` conflicts with the must-apply patch
/// - `Vendor: add c` is already part of `main`
///
/// The recipe repository declares a single must-apply patch,
/// `6.19/all/0001-base.patch` in the patches repository, plus a kernel
/// config. Both are tagged `v1`.
#[allow(dead_code)]
pub struct KernelRemotes {
    pub kernel: GitRepo,
    pub recipes: GitRepo,
    pub patches: GitRepo,
}

#[allow(dead_code)]
impl KernelRemotes {
    /// Build the remotes under `root`. `must_apply_patch` replaces the
    /// generated must-apply patch text when given.
    pub fn create(root: &Path, must_apply_patch: Option<&str>) -> Self {
        let kernel = GitRepo::init(&root.join("remotes/linux"), "main");
        kernel.commit("a.txt", TEN_LINES, "Initial tree");
        kernel.git(&["checkout", "-q", "-b", "vendor"]);
        kernel.commit(
            "a.txt",
            &TEN_LINES.replace("nine", "NINE"),
            "Vendor: tweak nine",
        );
        kernel.commit(
            "a.txt",
            &TEN_LINES.replace("nine", "NINE").replace("five", "V5"),
            "Vendor: rename five",
        );
        kernel.commit("c.txt", "c\n", "Vendor: add c");
        kernel.git(&["checkout", "-q", "main"]);
        kernel.commit("c.txt", "c\n", "Add c upstream");

        kernel.git(&["checkout", "-q", "-b", "scratch"]);
        kernel.commit("a.txt", &TEN_LINES.replace("five", "FIVE"), "Base fix");
        let generated = kernel.format_patch("HEAD");
        kernel.git(&["checkout", "-q", "main"]);
        kernel.git(&["branch", "-q", "-D", "scratch"]);

        let patches = GitRepo::init(&root.join("remotes/patches"), "master");
        patches.commit(
            "6.19/all/0001-base.patch",
            must_apply_patch.unwrap_or(&generated),
            "Add base patch",
        );
        patches.git(&["tag", "v1"]);

        let recipes = GitRepo::init(&root.join("remotes/recipes"), "master");
        recipes.commit("linux-test/config", "CONFIG_TEST=y\n", "Add config");
        recipes.commit(
            "linux-test/PKGBUILD",
            r#"pkgbase=linux-test
_major=6.19
_patchsource="https://example.invalid/kernel-patches/master/${_major}"
source=(
    "https://example.invalid/linux-${_major}.tar.xz"
    "config"
    "${_patchsource}/all/0001-base.patch"
)
"#,
            "Add recipe",
        );
        recipes.git(&["tag", "v1"]);

        Self {
            kernel,
            recipes,
            patches,
        }
    }

    /// A `patchpin.yaml` using these remotes.
    pub fn config(&self) -> String {
        format!(
            r#"workdir: work
output: package
base:
  repo: {{ remote: origin, url: '{kernel}', branch: main }}
best_effort:
  name: vendor
  repo: {{ remote: vendor, url: '{kernel}', branch: vendor }}
must_apply:
  name: extra
  recipe_repo: {{ remote: origin, url: '{recipes}', branch: master, ref: v1 }}
  recipe_dir: linux-test
  patches_repo: {{ remote: origin, url: '{patches}', branch: master, ref: v1 }}
  folder: "6.19"
  config_file: config
package:
  pkgver: "6.19.0"
  kernel_source: https://example.invalid/linux-6.19.tar.xz
  checksums: sha256
"#,
            kernel = self.kernel.url(),
            recipes = self.recipes.url(),
            patches = self.patches.url(),
        )
    }
}
