//! Atomic file write operations using temp-and-rename strategy.
//!
//! Readers never observe a partially written target: content goes to a sibling
//! temporary file in the same directory, is synced to disk, and is then renamed
//! over the destination.

use crate::utils::fs::dirs::ensure_parent_dir;
use anyhow::{Context, Result};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

/// Returns `path` with `suffix` appended to its full file name.
///
/// Unlike [`Path::with_extension`] the original extension is kept, so
/// `app.exe` becomes `app.exe.part` rather than `app.part`.
///
/// # Examples
///
/// ```rust,no_run
/// use upkeep::utils::fs::sibling_with_suffix;
/// use std::path::Path;
///
/// let part = sibling_with_suffix(Path::new("/tmp/app.exe"), ".part");
/// assert_eq!(part, Path::new("/tmp/app.exe.part"));
/// ```
#[must_use]
pub fn sibling_with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(suffix);
    path.with_file_name(name)
}

/// Atomically writes bytes to a file using a write-then-rename strategy.
///
/// 1. Writes content to `<name>.tmp` next to the target
/// 2. Syncs the temporary file to disk
/// 3. Renames the temporary file over the target path
///
/// Parent directories are created if missing. If any step fails the temporary
/// file is removed and the target keeps its previous content.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    use std::io::Write;

    ensure_parent_dir(path)?;

    let temp_path = sibling_with_suffix(path, ".tmp");

    let written = (|| -> Result<()> {
        let mut file = fs::File::create(&temp_path).with_context(|| {
            let platform_help = if crate::utils::platform::is_windows() {
                "On Windows: Check file permissions, path length, and that directory exists"
            } else {
                "Check file permissions and that directory exists"
            };

            format!("Failed to create temp file: {}\n\n{}", temp_path.display(), platform_help)
        })?;

        file.write_all(content)
            .with_context(|| format!("Failed to write to temp file: {}", temp_path.display()))?;

        file.sync_all().with_context(|| "Failed to sync file to disk")?;
        Ok(())
    })();

    if let Err(e) = written {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }

    fs::rename(&temp_path, path).with_context(|| {
        let _ = fs::remove_file(&temp_path);
        format!("Failed to rename temp file to: {}", path.display())
    })?;

    Ok(())
}
