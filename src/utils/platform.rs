//! Platform detection and per-user directory resolution
//!
//! Release assets are matched against two short keys: an operating system key
//! (`windows`, `macos`, `linux`) and a normalized CPU architecture key
//! (`x86_64`, `arm64`, or the raw architecture name for anything else).
//!
//! # Examples
//!
//! ```rust,no_run
//! use upkeep::utils::platform::{arch_key, normalize_arch, os_key};
//!
//! assert_eq!(normalize_arch("amd64"), "x86_64");
//! println!("running on {}-{}", os_key(), arch_key());
//! ```

use anyhow::Result;
use std::path::PathBuf;

/// Checks if the current platform is Windows.
#[must_use]
pub const fn is_windows() -> bool {
    cfg!(windows)
}

/// Operating system key of the running build.
#[must_use]
pub fn os_key() -> &'static str {
    normalize_os(std::env::consts::OS)
}

/// Normalized architecture key of the running build.
#[must_use]
pub fn arch_key() -> String {
    normalize_arch(std::env::consts::ARCH)
}

/// Maps an operating system name onto its asset key.
///
/// `darwin` and `macos` both map to `macos`; `win32` and `windows` to `windows`.
/// Anything else is treated as `linux`, the generic Unix build.
#[must_use]
pub fn normalize_os(raw: &str) -> &'static str {
    match raw.to_ascii_lowercase().as_str() {
        "windows" | "win32" | "win" => "windows",
        "macos" | "darwin" | "osx" | "mac" => "macos",
        _ => "linux",
    }
}

/// Maps an architecture name onto its asset key.
///
/// The `amd64`/`x64`/`x86_64` aliases collapse to `x86_64` and
/// `aarch64`/`arm64` to `arm64`. Unknown names are lowercased and kept.
#[must_use]
pub fn normalize_arch(raw: &str) -> String {
    let lower = raw.to_ascii_lowercase();
    match lower.as_str() {
        "amd64" | "x64" | "x86_64" | "x86-64" => "x86_64".to_string(),
        "aarch64" | "arm64" => "arm64".to_string(),
        _ => lower,
    }
}

/// Returns the per-user data directory for this application.
///
/// - Windows: `%APPDATA%\upkeep`
/// - macOS: `~/Library/Application Support/upkeep`
/// - Linux: `$XDG_DATA_HOME/upkeep` or `~/.local/share/upkeep`
pub fn get_data_dir() -> Result<PathBuf> {
    dirs::data_dir().map(|p| p.join("upkeep")).ok_or_else(|| {
        let platform_help = if is_windows() {
            "On Windows: Check that the APPDATA environment variable is set"
        } else if cfg!(target_os = "macos") {
            "On macOS: Check that the HOME environment variable is set"
        } else {
            "On Linux: Check that the XDG_DATA_HOME or HOME environment variable is set"
        };
        anyhow::anyhow!("Could not determine data directory.\n\n{platform_help}")
    })
}

/// Returns the per-user configuration directory for this application, if any.
#[must_use]
pub fn get_config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("upkeep"))
}

/// Expands `~` and environment variables in a user-supplied path.
pub fn resolve_path(path: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(path)
        .map_err(|e| anyhow::anyhow!("Failed to expand path '{path}': {e}"))?;
    Ok(PathBuf::from(expanded.as_ref()))
}
