//! Path utilities for LensBot
//!
//! Handles tilde expansion, the app root and the scratch directory.

use std::path::PathBuf;

/// Expands a leading tilde (~) to the user's home directory.
/// Examples:
/// "~/.lensbot" -> "/home/ada/.lensbot"
/// "/tmp/foo" -> "/tmp/foo" (no change)
pub fn expand_tilde(path: &str) -> String {
    if path == "~" {
        return home_dir();
    }
    match path.strip_prefix("~/") {
        Some(rest) => format!("{}/{}", home_dir(), rest),
        None => path.to_string(),
    }
}

/// Helper to convert a potentially tilde-containing string into a PathBuf.
pub fn get_path(path: &str) -> PathBuf {
    PathBuf::from(expand_tilde(path))
}

/// Resolves the LensBot root from LENSBOT_ROOT.
/// Handles absolute paths, tilde expansion, and names relative to $HOME.
pub fn get_app_root() -> PathBuf {
    let root_name = std::env::var("LENSBOT_ROOT").unwrap_or_else(|_| ".lensbot".to_string());

    if root_name.starts_with('/') {
        PathBuf::from(root_name)
    } else if root_name.starts_with('~') {
        get_path(&root_name)
    } else {
        PathBuf::from(home_dir()).join(root_name)
    }
}

/// Directory that holds per-request scratch files.
/// Falls back to `$TMPDIR/lensbot` when nothing is configured.
pub fn scratch_root(configured: Option<&str>) -> PathBuf {
    match configured.map(str::trim).filter(|p| !p.is_empty()) {
        Some(p) => get_path(p),
        None => std::env::temp_dir().join("lensbot"),
    }
}

fn home_dir() -> String {
    std::env::var("HOME").unwrap_or_else(|_| ".".to_string())
}
