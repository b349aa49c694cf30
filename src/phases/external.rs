//! Phase 3: External Patch Loading
//!
//! Reads the must-apply patch group declared by a package recipe. The recipe
//! is evaluated (see [`crate::recipe`]) and every `source` entry ending in
//! `.patch` is mapped onto a file in the local patches checkout.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, info};
use regex::Regex;
use url::Url;

use crate::error::{Error, Result};
use crate::recipe::{Overrides, Recipe};
use crate::types::Patch;

/// Path of a `source` entry, without any `name::` prefix, query or fragment.
fn source_path(entry: &str) -> String {
    let entry = match entry.split_once("::") {
        Some((_, url)) => url,
        None => entry,
    };
    match Url::parse(entry) {
        Ok(url) if url.has_host() || url.scheme() == "file" => url.path().to_string(),
        _ => entry.to_string(),
    }
}

/// Location of a patch below `<patches_root>/<folder>/`.
///
/// Everything after the first `/<folder>/` in the entry's path, else its last
/// path component.
pub fn relative_patch_path(entry: &str, folder: &str) -> String {
    let path = source_path(entry);
    let marker = format!("/{}/", folder);
    match path.find(&marker) {
        Some(index) => path[index + marker.len()..].to_string(),
        None => path.rsplit('/').next().unwrap_or_default().to_string(),
    }
}

/// Label for a patch file: its stem without a leading `NNNN-` sequence.
pub fn external_label(path: &Path, sequence: &Regex) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    sequence.replace(&stem, "").into_owned()
}

/// Load the must-apply patches declared by the recipe at `recipe_path`, in
/// declaration order.
pub fn load_patch_group(
    patches_root: &Path,
    folder: &str,
    recipe_path: &Path,
    overrides: &Overrides,
) -> Result<Vec<Patch>> {
    let recipe = Recipe::load(recipe_path, overrides)?;
    let sources = recipe.sources();
    debug!("recipe declares {} sources", sources.len());

    let entries: Vec<&String> = sources
        .iter()
        .filter(|entry| source_path(entry).ends_with(".patch"))
        .collect();
    if entries.is_empty() {
        return Err(Error::EmptyResult {
            source_name: recipe_path.display().to_string(),
        });
    }

    let sequence = Regex::new(r"^[0-9]+-")?;
    let base = patches_root.join(folder);
    let mut patches = Vec::with_capacity(entries.len());
    for entry in entries {
        let path: PathBuf = base.join(relative_patch_path(entry, folder));
        if !path.is_file() {
            return Err(Error::MissingPatch { path });
        }
        let content = fs::read_to_string(&path)?;
        patches.push(Patch::new(external_label(&path, &sequence), content));
    }

    info!(
        "{} must-apply patches declared by {}",
        patches.len(),
        recipe_path.display()
    );
    Ok(patches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::testing::KERNEL_RECIPE;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    #[test]
    fn test_relative_patch_path() {
        let url = "https://raw.githubusercontent.com/cachyos/kernel-patches/master/6.19/sched/0001-bore-cachy.patch";
        assert_eq!(relative_patch_path(url, "6.19"), "sched/0001-bore-cachy.patch");
        assert_eq!(relative_patch_path(url, "6.18"), "0001-bore-cachy.patch");
        assert_eq!(
            relative_patch_path("https://example.com/6.19/all/x.patch?raw=1#frag", "6.19"),
            "all/x.patch"
        );
        assert_eq!(relative_patch_path("local.patch", "6.19"), "local.patch");
        assert_eq!(
            relative_patch_path("fix.patch::https://example.com/p/6.19/misc/fix.patch", "6.19"),
            "misc/fix.patch"
        );
    }

    #[test]
    fn test_external_label_strips_sequence() {
        let sequence = Regex::new(r"^[0-9]+-").unwrap();
        assert_eq!(
            external_label(Path::new("sched/0001-bore-cachy.patch"), &sequence),
            "bore-cachy"
        );
        assert_eq!(external_label(Path::new("dkms-clang.patch"), &sequence), "dkms-clang");
        assert_eq!(external_label(Path::new("2024-fix.patch"), &sequence), "fix");
    }

    fn patches_checkout(files: &[&str]) -> TempDir {
        let temp = TempDir::new().unwrap();
        for file in files {
            let path = temp.path().join("6.19").join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, format!("content of {}\n", file)).unwrap();
        }
        temp
    }

    fn write_recipe(dir: &TempDir, text: &str) -> PathBuf {
        let path = dir.path().join("PKGBUILD");
        fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn test_load_patch_group_in_declaration_order() {
        let patches = patches_checkout(&[
            "all/0001-cachyos-base-all.patch",
            "sched/0001-bore-cachy.patch",
            "misc/dkms-clang.patch",
        ]);
        let recipes = TempDir::new().unwrap();
        let recipe = write_recipe(&recipes, KERNEL_RECIPE);
        let values = BTreeMap::from([("_use_llvm_lto".to_string(), "thin".to_string())]);
        let overrides = Overrides::new(&[], &values).unwrap();

        let group = load_patch_group(patches.path(), "6.19", &recipe, &overrides).unwrap();
        let labels: Vec<&str> = group.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(labels, vec!["dkms-clang", "cachyos-base-all", "bore-cachy"]);
        assert_eq!(group[1].content, "content of all/0001-cachyos-base-all.patch\n");
    }

    #[test]
    fn test_continued_case_arms_contribute_patches() {
        let patches = patches_checkout(&[
            "all/0001-cachyos-base-all.patch",
            "sched/0001-bore-cachy.patch",
            "misc/0001-rt-i915.patch",
        ]);
        let recipes = TempDir::new().unwrap();
        let recipe = write_recipe(&recipes, KERNEL_RECIPE);
        let values = BTreeMap::from([("_cpusched".to_string(), "rt-bore".to_string())]);
        let overrides = Overrides::new(&[], &values).unwrap();

        let group = load_patch_group(patches.path(), "6.19", &recipe, &overrides).unwrap();
        let labels: Vec<&str> = group.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(labels, vec!["cachyos-base-all", "bore-cachy", "rt-i915"]);
    }

    #[test]
    fn test_missing_patch_is_error() {
        let patches = patches_checkout(&["all/0001-cachyos-base-all.patch"]);
        let recipes = TempDir::new().unwrap();
        let recipe = write_recipe(&recipes, KERNEL_RECIPE);
        let err = load_patch_group(patches.path(), "6.19", &recipe, &Overrides::default())
            .unwrap_err();
        match err {
            Error::MissingPatch { path } => {
                assert!(path.ends_with("6.19/sched/0001-bore-cachy.patch"));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_recipe_without_patches_is_empty_result() {
        let patches = patches_checkout(&[]);
        let recipes = TempDir::new().unwrap();
        let recipe = write_recipe(&recipes, "source=(\"https://example.com/linux.tar.xz\" config)\n");
        let err = load_patch_group(patches.path(), "6.19", &recipe, &Overrides::default())
            .unwrap_err();
        assert!(matches!(err, Error::EmptyResult { .. }));
    }
}
