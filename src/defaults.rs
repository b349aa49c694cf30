//! Default values for patchpin configuration.
//!
//! Centralized so the CLI and the config loader agree on them.

use std::path::PathBuf;

/// Returns the default root for repository checkouts.
///
/// Uses the platform-appropriate cache directory:
/// - Linux: `~/.cache/patchpin` (XDG Base Directory)
/// - macOS: `~/Library/Caches/patchpin`
/// - Windows: `{FOLDERID_LocalAppData}\patchpin`
///
/// Falls back to `.patchpin-work` in the current directory if the platform
/// cache directory cannot be determined.
pub fn default_workdir() -> PathBuf {
    dirs::cache_dir()
        .map(|dir| dir.join("patchpin"))
        .unwrap_or_else(|| PathBuf::from(".patchpin-work"))
}
