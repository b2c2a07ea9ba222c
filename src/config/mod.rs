//! Configuration file loading
//!
//! The updater reads one optional TOML file. Lookup order:
//!
//! 1. The path passed with `--config`
//! 2. The `UPKEEP_CONFIG` environment variable
//! 3. `<config_dir>/upkeep/config.toml` (`~/.config/upkeep/config.toml` on Linux)
//!
//! A missing file is not an error; every setting has a default.
//!
//! # Example
//!
//! ```toml
//! # Where update state and staged binaries live (default: platform data dir)
//! data_dir = "~/.local/share/acme-desk"
//!
//! [update]
//! repository = "acme/desk"
//! product_token = "desk"
//! check_interval = 43200
//! ```

use crate::update::config::UpdateConfig;
use crate::utils::platform::{get_config_dir, get_data_dir, resolve_path};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Environment variable naming an alternative config file.
pub const CONFIG_ENV_VAR: &str = "UPKEEP_CONFIG";

/// Top-level contents of the configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Application data root. `~` and environment variables are expanded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,

    /// Self-update policy.
    #[serde(default)]
    pub update: UpdateConfig,
}

impl GlobalConfig {
    /// Load from `path` if given, otherwise from the default location.
    ///
    /// An explicitly named file must exist; the default location may be absent.
    pub async fn load_with_optional(path: Option<PathBuf>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from(&path).await;
        }

        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from(&path).await,
            Some(path) => {
                tracing::debug!("No config file at {}; using defaults", path.display());
                Ok(Self::default())
            }
            None => Ok(Self::default()),
        }
    }

    /// Load from a specific file.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// `UPKEEP_CONFIG` if set, else `<config_dir>/upkeep/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        if let Some(path) = std::env::var_os(CONFIG_ENV_VAR) {
            return Some(PathBuf::from(path));
        }
        get_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// The data root with `~` and variables expanded, or the platform default.
    pub fn data_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => resolve_path(dir),
            None => get_data_dir(),
        }
    }
}
