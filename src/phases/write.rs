//! Phase 6: Writing the Series
//!
//! Writes the final patch list to disk as a numbered series.
//!
//! ## Process
//!
//! 1.  **Reset**: The destination directory is removed and recreated, so
//!     patches from an earlier run never linger.
//!
//! 2.  **Number**: Each patch becomes `NNNN-<label>.patch`, numbered from the
//!     start number with 4-digit zero padding. Numbering is what makes file
//!     names unique; labels may repeat.
//!
//! 3.  **Write Content**: The patch text is written exactly as given.
//!
//! The same patch list always yields a byte-identical directory.

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::Result;
use crate::types::Patch;

/// File name of the patch at `number` in a series.
pub fn series_file_name(number: usize, label: &str) -> String {
    format!("{:04}-{}.patch", number, label)
}

/// Write `patches` into a fresh `dest_dir`, numbered from `start_number`.
///
/// Returns the written paths in series order.
pub fn write_series(patches: &[Patch], dest_dir: &Path, start_number: usize) -> Result<Vec<PathBuf>> {
    if dest_dir.exists() {
        fs::remove_dir_all(dest_dir)?;
    }
    fs::create_dir_all(dest_dir)?;

    let mut written = Vec::with_capacity(patches.len());
    for (offset, patch) in patches.iter().enumerate() {
        let path = dest_dir.join(series_file_name(start_number + offset, &patch.label));
        fs::write(&path, &patch.content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o644))?;
        }

        debug!("wrote {}", path.display());
        written.push(path);
    }
    Ok(written)
}
