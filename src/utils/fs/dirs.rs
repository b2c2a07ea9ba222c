//! Directory operations for creating and pruning directories.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Ensures a directory exists, creating it and any missing parents.
///
/// Fails if the path exists but is not a directory.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path).with_context(|| {
            let platform_help = if crate::utils::platform::is_windows() {
                "On Windows: Check that the path length is < 260 chars and that %APPDATA% is writable"
            } else {
                "Check directory permissions and path validity"
            };

            format!("Failed to create directory: {}\n\n{}", path.display(), platform_help)
        })?;
    } else if !path.is_dir() {
        return Err(anyhow::anyhow!("Path exists but is not a directory: {}", path.display()));
    }
    Ok(())
}

/// Ensures the parent directory of `path` exists.
pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }
    Ok(())
}

/// Removes every subdirectory of `root` whose name is not `keep`.
///
/// Plain files in `root` are left alone. Returns the number of directories
/// removed. Failures on individual entries are logged and skipped.
pub fn prune_subdirs_except(root: &Path, keep: &str) -> Result<usize> {
    if !root.is_dir() {
        return Ok(0);
    }

    let mut removed = 0;
    for entry in
        fs::read_dir(root).with_context(|| format!("Failed to read directory: {}", root.display()))?
    {
        let entry = entry?;
        if !entry.file_type()?.is_dir() || entry.file_name() == keep {
            continue;
        }

        let path = entry.path();
        match fs::remove_dir_all(&path) {
            Ok(()) => {
                tracing::debug!("Pruned stale directory {}", path.display());
                removed += 1;
            }
            Err(e) => tracing::warn!("Failed to prune {}: {}", path.display(), e),
        }
    }
    Ok(removed)
}
