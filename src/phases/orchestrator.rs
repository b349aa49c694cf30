//! Orchestrator for a complete generate run
//!
//! This module coordinates all phases into the two operations the CLI
//! exposes: listing the best-effort commit set, and generating the package.

use std::fs;
use std::path::{Path, PathBuf};

use log::info;
use serde::Serialize;

use super::simulate::{PatchReport, Simulation};
use super::{phase1, phase2, phase3, phase4, phase5, phase6, phase7};
use crate::archive;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::repository::GitOperations;
use crate::types::{CommitId, GroupPolicy, PatchGroup};

/// Local refs (or commit ids) every later phase works against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pins {
    pub base: String,
    pub best_effort: String,
    /// History the best-effort branch was built on, if configured.
    pub upstream: Option<String>,
}

impl Pins {
    /// Refs whose history is not part of the best-effort commit set.
    pub fn excludes(&self) -> Vec<String> {
        let mut excludes: Vec<String> = self.upstream.iter().cloned().collect();
        excludes.push(self.base.clone());
        excludes
    }
}

/// Options for [`execute_generate`].
#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    /// Resolve and simulate, but write nothing.
    pub dry_run: bool,
}

/// Files produced by a generate run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifacts {
    pub patches_dir: PathBuf,
    pub series: Vec<String>,
    pub archive: PathBuf,
    pub kernel_config: Option<PathBuf>,
    pub manifest: PathBuf,
}

/// Counts for one patch group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GroupSummary {
    pub total: usize,
    pub applied: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl GroupSummary {
    fn of(simulation: &Simulation, policy: GroupPolicy, total: usize) -> Self {
        Self {
            total,
            applied: simulation.applied(policy),
            skipped: simulation.skipped(policy),
            failed: simulation.failed(policy),
        }
    }
}

/// Everything a generate run decided, serializable as the JSON run report.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub pins: Pins,
    pub must_apply: GroupSummary,
    pub best_effort: GroupSummary,
    pub patches: Vec<PatchReport>,
    pub dry_run: bool,
    pub artifacts: Option<Artifacts>,
}

/// Phase 1 for the base, best-effort and upstream refs.
///
/// All three live in one clone so that their histories can be compared.
pub fn resolve_pins(config: &Config, git: &dyn GitOperations) -> Result<Pins> {
    let resolver = phase1::RefResolver::new(git);
    let repo_dir = config.base_repo_dir();

    let base = resolver.resolve(&repo_dir, &config.base.repo, &config.base.name)?;
    let best_effort = resolver.resolve(
        &repo_dir,
        &config.best_effort.repo,
        &config.best_effort.name,
    )?;
    let upstream = match &config.best_effort.upstream {
        Some(upstream) => Some(resolver.resolve_auto_base(
            &repo_dir,
            &upstream.repo,
            upstream.tag_pattern.as_deref(),
            &best_effort,
            &format!("{}-upstream", config.best_effort.name),
        )?),
        None => None,
    };

    info!("base pinned at {}", base);
    Ok(Pins {
        base,
        best_effort,
        upstream,
    })
}

/// Phase 2 against resolved pins.
pub fn best_effort_commits(
    config: &Config,
    git: &dyn GitOperations,
    pins: &Pins,
    oldest_first: bool,
) -> Result<Vec<CommitId>> {
    phase2::commits_between(
        git,
        &config.base_repo_dir(),
        &pins.best_effort,
        &pins.excludes(),
        oldest_first,
        &config.exclusion_set(),
        config.best_effort.max_commits,
    )
}

/// The best-effort commit set with subjects, for auditing.
pub fn list_commits(
    config: &Config,
    git: &dyn GitOperations,
    oldest_first: bool,
) -> Result<Vec<(CommitId, String)>> {
    let pins = resolve_pins(config, git)?;
    let commits = best_effort_commits(config, git, &pins, oldest_first)?;
    let mut subjects = phase2::subjects(git, &config.base_repo_dir(), &commits)?;
    Ok(commits
        .into_iter()
        .map(|id| {
            let subject = subjects.remove(&id).unwrap_or_default();
            (id, subject)
        })
        .collect())
}

/// Kernel config shipped next to the manifest, if the recipe provides one.
fn kernel_config_source(config: &Config) -> Option<PathBuf> {
    config.must_apply.config_file.as_ref().map(|name| {
        config
            .recipe_repo_dir()
            .join(&config.must_apply.recipe_dir)
            .join(name)
    })
}

/// Execute a complete generate run.
///
/// 1. Pin the base, best-effort and upstream refs
/// 2. Extract the best-effort commit set
/// 3. Check out the recipe and patches repositories and load the must-apply
///    patches the recipe declares
/// 4. Materialize the best-effort commits as patches
/// 5. Simulate both groups against the base tree
/// 6. Write the series, its archive and the kernel config (unless dry-run)
/// 7. Render the manifest (unless dry-run)
///
/// Any error aborts before the output directory is touched.
pub fn execute_generate(
    config: &Config,
    git: &dyn GitOperations,
    options: &GenerateOptions,
) -> Result<RunReport> {
    // Phase 1: Ref Resolution
    let pins = resolve_pins(config, git)?;
    let base_repo = config.base_repo_dir();

    // Phase 2: Commit Extraction
    let commits = best_effort_commits(config, git, &pins, true)?;
    let subjects = phase2::subjects(git, &base_repo, &commits)?;

    // Phase 3: External Patch Loading
    let resolver = phase1::RefResolver::new(git);
    resolver.checkout(&config.recipe_repo_dir(), &config.must_apply.recipe_repo)?;
    resolver.checkout(&config.patches_repo_dir(), &config.must_apply.patches_repo)?;
    let kernel_config = kernel_config_source(config);
    if let Some(path) = &kernel_config {
        if !path.is_file() {
            return Err(Error::MissingFile {
                what: "kernel config".to_string(),
                path: path.clone(),
            });
        }
    }
    let template = phase7::load_template(config.template_path().as_deref())?;
    let overrides = config.must_apply.overrides()?;
    let must_apply = PatchGroup::must_apply(
        &config.must_apply.name,
        phase3::load_patch_group(
            &config.patches_repo_dir(),
            &config.must_apply.folder,
            &config.recipe_path(),
            &overrides,
        )?,
    );

    // Phase 4: Materialization
    let best_effort = PatchGroup::best_effort(
        &config.best_effort.name,
        phase4::materialize(git, &base_repo, &commits, &subjects)?,
    );

    // Phase 5: Simulation
    let simulation = phase5::simulate(git, &base_repo, &pins.base, &must_apply, &best_effort)?;

    let mut report = RunReport {
        must_apply: GroupSummary::of(&simulation, GroupPolicy::MustApply, must_apply.patches.len()),
        best_effort: GroupSummary::of(
            &simulation,
            GroupPolicy::BestEffort,
            best_effort.patches.len(),
        ),
        pins,
        patches: simulation.reports.clone(),
        dry_run: options.dry_run,
        artifacts: None,
    };
    if options.dry_run {
        info!("dry run: nothing written");
        return Ok(report);
    }

    // Phase 6: Writing
    let output = config.output_dir();
    let written = phase6::write_series(&simulation.patches, &config.patches_dir(), 1)?;
    let archive_path = config.archive_path();
    archive::create_tar_gz(&config.patches_dir(), &archive_path)?;
    let staged_config = match &kernel_config {
        Some(src) => Some(stage_kernel_config(src, &output)?),
        None => None,
    };

    // Phase 7: Rendering
    let mut sources = vec![(config.package.kernel_source.clone(), None)];
    if let Some(path) = &staged_config {
        sources.push(("config".to_string(), Some(path.as_path())));
    }
    sources.push((config.package.archive_name.clone(), Some(archive_path.as_path())));
    let sha256sums = sources
        .iter()
        .map(|(_, local)| phase7::checksum_entry(config.package.checksums, *local))
        .collect::<Result<Vec<_>>>()?;
    let fields = phase7::ManifestFields {
        pkgver: config.package.pkgver.clone(),
        srcname: phase7::srcname(&config.package.kernel_source),
        sources: sources.into_iter().map(|(s, _)| s).collect(),
        sha256sums,
    };
    let manifest = config.manifest_path();
    fs::write(&manifest, phase7::render_manifest(&template, &fields)?)?;
    info!("wrote {}", manifest.display());

    report.artifacts = Some(Artifacts {
        patches_dir: config.patches_dir(),
        series: written
            .iter()
            .filter_map(|p| p.file_name())
            .map(|n| n.to_string_lossy().into_owned())
            .collect(),
        archive: archive_path,
        kernel_config: staged_config,
        manifest,
    });
    Ok(report)
}

/// Copy the recipe's kernel config to `<output>/config`, replacing any
/// existing file.
fn stage_kernel_config(src: &Path, output: &Path) -> Result<PathBuf> {
    fs::create_dir_all(output)?;
    let dest = output.join("config");
    fs::copy(src, &dest)?;
    Ok(dest)
}
