//! Phase 7: Manifest Rendering
//!
//! Fills the package manifest template with the version, the unpacked source
//! directory name, the source list and its checksums.
//!
//! ## Placeholders
//!
//! | Placeholder | Replacement |
//! |---|---|
//! | `{pkgver}` | package version |
//! | `{srcname}` | kernel source directory name |
//! | `{sources_block}` | one `    "<src>"` line per source |
//! | `{sha256sums_block}` | one `    <sum>` line per source |
//!
//! A template missing any placeholder is rejected rather than rendered into a
//! manifest that silently lacks sources.

use std::fs::{self, File};
use std::io;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::config::ChecksumMode;
use crate::error::{Error, Result};

/// The template used when the config names none.
pub const BUILTIN_TEMPLATE: &str = include_str!("../../templates/PKGBUILD.in");

/// Checksum entry for sources that are not verified.
pub const SKIP_SUM: &str = "'SKIP'";

const PLACEHOLDERS: [&str; 4] = ["pkgver", "srcname", "sources_block", "sha256sums_block"];

/// Values substituted into a manifest template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestFields {
    pub pkgver: String,
    pub srcname: String,
    pub sources: Vec<String>,
    pub sha256sums: Vec<String>,
}

/// Directory name a source tarball unpacks to: its file name minus the last
/// two dot-extensions.
pub fn srcname(url: &str) -> String {
    let file = url.rsplit('/').next().unwrap_or(url);
    file.rsplitn(3, '.').last().unwrap_or(file).to_string()
}

/// Lowercase hex SHA-256 of a file.
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut hasher = Sha256::new();
    io::copy(&mut File::open(path)?, &mut hasher)?;
    Ok(hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect())
}

/// Checksum entry for one source.
///
/// `local` is the path of a source produced by this run. Remote sources and
/// [`ChecksumMode::Skip`] yield [`SKIP_SUM`].
pub fn checksum_entry(mode: ChecksumMode, local: Option<&Path>) -> Result<String> {
    match (mode, local) {
        (ChecksumMode::Sha256, Some(path)) => Ok(format!("'{}'", sha256_file(path)?)),
        _ => Ok(SKIP_SUM.to_string()),
    }
}

/// Read the template at `path`, or the built-in one.
pub fn load_template(path: Option<&Path>) -> Result<String> {
    match path {
        None => Ok(BUILTIN_TEMPLATE.to_string()),
        Some(path) if !path.is_file() => Err(Error::MissingFile {
            what: "manifest template".to_string(),
            path: path.to_path_buf(),
        }),
        Some(path) => Ok(fs::read_to_string(path)?),
    }
}

/// Substitute `fields` into `template`.
pub fn render_manifest(template: &str, fields: &ManifestFields) -> Result<String> {
    for name in PLACEHOLDERS {
        if !template.contains(&format!("{{{}}}", name)) {
            return Err(Error::Template {
                message: "placeholder missing from template".to_string(),
                variable: Some(name.to_string()),
            });
        }
    }
    if fields.sources.len() != fields.sha256sums.len() {
        return Err(Error::Template {
            message: format!(
                "{} sources but {} checksums",
                fields.sources.len(),
                fields.sha256sums.len()
            ),
            variable: Some("sha256sums_block".to_string()),
        });
    }

    let sources_block = fields
        .sources
        .iter()
        .map(|s| format!("    \"{}\"", s))
        .collect::<Vec<_>>()
        .join("\n");
    let sums_block = fields
        .sha256sums
        .iter()
        .map(|s| format!("    {}", s))
        .collect::<Vec<_>>()
        .join("\n");

    Ok(template
        .replace("{pkgver}", &fields.pkgver)
        .replace("{srcname}", &fields.srcname)
        .replace("{sources_block}", &sources_block)
        .replace("{sha256sums_block}", &sums_block))
}
