//! # Configuration Schema and Parsing
//!
//! This module defines the `patchpin.yaml` schema and the logic for loading
//! and validating it. The whole run is described by one immutable [`Config`]
//! value that is threaded through every phase; nothing reads configuration
//! from global state.
//!
//! ## Layout
//!
//! - **`base`**: the tree the series is verified against. Its checkout also
//!   hosts the best-effort and upstream remotes, so commit ranges between them
//!   can be computed in one object store.
//! - **`best_effort`**: a branch whose own commits (those not in `upstream` or
//!   `base`) are offered as patches; failures are tolerated.
//! - **`must_apply`**: a package recipe plus a patch collection; every patch
//!   the recipe lists must apply.
//! - **`package`**: what to render once the series is known.
//!
//! Relative paths are resolved against the directory holding the config file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::defaults;
use crate::error::{Error, Result};
use crate::phases::extract::ExclusionSet;
use crate::recipe::Overrides;

/// Default config file name looked up in the current directory.
pub const DEFAULT_CONFIG_FILE: &str = "patchpin.yaml";

/// Shortest abbreviation accepted in `exclude_commits`.
pub const MIN_EXCLUDE_PREFIX: usize = 4;

/// A remote plus the ref to pin from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoSpec {
    /// Local name for the remote.
    pub remote: String,
    /// Fetch URL.
    pub url: String,
    /// Branch to follow when no explicit ref is given.
    #[serde(default)]
    pub branch: String,
    /// Tag, branch or commit to pin. Takes precedence over `branch`.
    #[serde(default, rename = "ref")]
    pub r#ref: String,
}

impl RepoSpec {
    /// The ref to resolve: `ref` if set, else `branch`.
    pub fn target(&self) -> Option<&str> {
        if !self.r#ref.is_empty() {
            Some(&self.r#ref)
        } else if !self.branch.is_empty() {
            Some(&self.branch)
        } else {
            None
        }
    }
}

/// The base tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseConfig {
    /// Label used for the pin and the checkout directory.
    #[serde(default = "default_base_name")]
    pub name: String,
    pub repo: RepoSpec,
}

/// History the best-effort branch was built on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    pub repo: RepoSpec,
    /// Tags matching this glob are preferred as the upstream base when no
    /// explicit ref is pinned.
    #[serde(default)]
    pub tag_pattern: Option<String>,
}

/// Commits offered on a best-effort basis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BestEffortConfig {
    pub name: String,
    pub repo: RepoSpec,
    #[serde(default)]
    pub upstream: Option<UpstreamConfig>,
    /// Full or abbreviated commit ids never to include.
    #[serde(default)]
    pub exclude_commits: Vec<String>,
    /// Refuse to continue when the range yields more commits than this.
    #[serde(default = "default_max_commits")]
    pub max_commits: usize,
}

/// Patches declared by a package recipe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MustApplyConfig {
    pub name: String,
    /// Repository holding the recipe.
    pub recipe_repo: RepoSpec,
    /// Directory inside `recipe_repo` containing the recipe.
    pub recipe_dir: PathBuf,
    #[serde(default = "default_recipe_file")]
    pub recipe_file: String,
    /// Repository holding the patch files.
    pub patches_repo: RepoSpec,
    /// Folder inside `patches_repo` the recipe URLs point into.
    pub folder: String,
    /// Recipe variables to override.
    #[serde(default)]
    pub variables: BTreeMap<String, String>,
    /// Extra names allowed in `variables`.
    #[serde(default)]
    pub allowed_variables: Vec<String>,
    /// Kernel config shipped next to the recipe, staged into the package.
    #[serde(default)]
    pub config_file: Option<String>,
}

impl MustApplyConfig {
    /// Validated recipe overrides.
    pub fn overrides(&self) -> Result<Overrides> {
        Overrides::new(&self.allowed_variables, &self.variables)
    }
}

/// How checksums are emitted in the rendered manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumMode {
    /// Every source is marked `'SKIP'`.
    #[default]
    Skip,
    /// Locally produced sources get real sha256 sums.
    Sha256,
}

/// Packaging output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageConfig {
    pub pkgver: String,
    /// URL of the kernel source tarball the package builds from.
    pub kernel_source: String,
    /// Manifest template; the built-in template is used when absent.
    #[serde(default)]
    pub template: Option<PathBuf>,
    #[serde(default = "default_manifest_name")]
    pub manifest_name: String,
    #[serde(default = "default_archive_name")]
    pub archive_name: String,
    #[serde(default)]
    pub checksums: ChecksumMode,
}

/// The complete, validated description of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Root for repository checkouts.
    #[serde(default)]
    pub workdir: Option<PathBuf>,
    /// Package output directory.
    #[serde(default = "default_output")]
    pub output: PathBuf,
    pub base: BaseConfig,
    pub best_effort: BestEffortConfig,
    pub must_apply: MustApplyConfig,
    pub package: PackageConfig,
    /// Directory relative paths are resolved against.
    #[serde(skip)]
    pub root: PathBuf,
}

fn default_base_name() -> String {
    "linux".to_string()
}

fn default_max_commits() -> usize {
    50
}

fn default_recipe_file() -> String {
    "PKGBUILD".to_string()
}

fn default_manifest_name() -> String {
    "PKGBUILD".to_string()
}

fn default_archive_name() -> String {
    "patches.tar.gz".to_string()
}

fn default_output() -> PathBuf {
    PathBuf::from("package")
}

impl Config {
    fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    /// Root directory for all checkouts.
    pub fn workdir(&self) -> PathBuf {
        match &self.workdir {
            Some(dir) => self.resolve_path(dir),
            None => defaults::default_workdir(),
        }
    }

    /// Shared clone for the base, best-effort and upstream remotes.
    pub fn base_repo_dir(&self) -> PathBuf {
        self.workdir().join(&self.base.name)
    }

    pub fn recipe_repo_dir(&self) -> PathBuf {
        self.workdir()
            .join(format!("{}-recipes", self.must_apply.name))
    }

    pub fn patches_repo_dir(&self) -> PathBuf {
        self.workdir()
            .join(format!("{}-patches", self.must_apply.name))
    }

    /// The recipe file inside the recipe checkout.
    pub fn recipe_path(&self) -> PathBuf {
        self.recipe_repo_dir()
            .join(&self.must_apply.recipe_dir)
            .join(&self.must_apply.recipe_file)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.resolve_path(&self.output)
    }

    /// Directory the numbered series is written into.
    pub fn patches_dir(&self) -> PathBuf {
        self.output_dir().join("patches")
    }

    pub fn archive_path(&self) -> PathBuf {
        self.output_dir().join(&self.package.archive_name)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.output_dir().join(&self.package.manifest_name)
    }

    /// User template, if one is configured.
    pub fn template_path(&self) -> Option<PathBuf> {
        self.package
            .template
            .as_deref()
            .map(|p| self.resolve_path(p))
    }

    pub fn exclusion_set(&self) -> ExclusionSet {
        ExclusionSet::new(self.best_effort.exclude_commits.iter().cloned())
    }

    /// Check everything that can be checked without touching the network.
    pub fn validate(&self) -> Result<()> {
        let safe = Regex::new(r"^[A-Za-z0-9._-]+$")?;
        for (what, name) in [
            ("base.name", &self.base.name),
            ("best_effort.name", &self.best_effort.name),
            ("must_apply.name", &self.must_apply.name),
        ] {
            if !safe.is_match(name) {
                return Err(Error::Configuration {
                    message: format!("{} {:?} is not a valid label", what, name),
                    hint: Some("use letters, digits, '.', '_' and '-' only".to_string()),
                });
            }
        }

        let mut remotes = vec![
            ("base", &self.base.repo),
            (self.best_effort.name.as_str(), &self.best_effort.repo),
        ];
        if let Some(upstream) = &self.best_effort.upstream {
            if let Some(pattern) = &upstream.tag_pattern {
                glob::Pattern::new(pattern)?;
            }
            remotes.push(("upstream", &upstream.repo));
        }
        for (label, spec) in &remotes {
            validate_repo(label, spec)?;
            if spec.target().is_none() {
                return Err(Error::config(format!("missing required ref for {}", label)));
            }
        }
        for (i, (label, spec)) in remotes.iter().enumerate() {
            if let Some((other, _)) = remotes[..i]
                .iter()
                .find(|(_, s)| s.remote == spec.remote && s.url != spec.url)
            {
                return Err(Error::Configuration {
                    message: format!(
                        "{} and {} share remote name {:?} with different URLs",
                        other, label, spec.remote
                    ),
                    hint: Some("the base checkout hosts all three remotes; give each a distinct name".to_string()),
                });
            }
        }

        for (label, spec) in [
            ("must_apply.recipe_repo", &self.must_apply.recipe_repo),
            ("must_apply.patches_repo", &self.must_apply.patches_repo),
        ] {
            validate_repo(label, spec)?;
            if spec.r#ref.is_empty() {
                return Err(Error::Configuration {
                    message: format!("{}.ref must be set", label),
                    hint: Some("pin must-apply sources to a tag or commit for reproducibility".to_string()),
                });
            }
        }

        if self.must_apply.folder.is_empty() || self.must_apply.folder.contains('/') {
            return Err(Error::config(format!(
                "must_apply.folder {:?} must be a single path segment",
                self.must_apply.folder
            )));
        }

        if self.best_effort.max_commits == 0 {
            return Err(Error::config("best_effort.max_commits must be positive"));
        }

        let hex = Regex::new(r"^[0-9a-fA-F]+$")?;
        for entry in &self.best_effort.exclude_commits {
            if entry.len() < MIN_EXCLUDE_PREFIX || !hex.is_match(entry) {
                return Err(Error::Configuration {
                    message: format!("invalid exclude_commits entry {:?}", entry),
                    hint: Some(format!(
                        "use a hex commit id of at least {} characters",
                        MIN_EXCLUDE_PREFIX
                    )),
                });
            }
        }

        self.must_apply.overrides()?;

        if self.package.pkgver.is_empty() {
            return Err(Error::config("package.pkgver must be set"));
        }
        if self.package.kernel_source.is_empty() {
            return Err(Error::config("package.kernel_source must be set"));
        }

        Ok(())
    }
}

fn validate_repo(label: &str, spec: &RepoSpec) -> Result<()> {
    if spec.remote.is_empty() {
        return Err(Error::config(format!("{}: remote must be set", label)));
    }
    if spec.url.is_empty() {
        return Err(Error::config(format!("{}: url must be set", label)));
    }
    Ok(())
}

/// Parse and validate a configuration string.
///
/// Relative paths resolve against the current directory; use [`from_file`]
/// to resolve them against the file's location instead.
pub fn parse(yaml: &str) -> Result<Config> {
    let mut config: Config = serde_yaml::from_str(yaml).map_err(|e| Error::Configuration {
        message: e.to_string(),
        hint: None,
    })?;
    config.root = PathBuf::from(".");
    config.validate()?;
    Ok(config)
}

/// Load and validate a configuration file.
pub fn from_file(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)?;
    let mut config = parse(&content)?;
    config.root = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    Ok(config)
}
