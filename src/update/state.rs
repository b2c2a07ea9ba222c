//! Durable update state.
//!
//! A single JSON record in `updates/update_state.json` is the updater's only
//! memory across restarts. Writes replace the file wholesale through a
//! temp-file rename. A missing or unreadable record is treated as `idle`
//! since every flow can restart from a fresh check.

use crate::constants::STATE_FILE_NAME;
use crate::core::Result;
use crate::utils::fs::atomic_write;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Lifecycle position of the update flow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateStatus {
    /// Nothing has happened yet.
    #[default]
    Idle,
    /// A registry query is in flight.
    Checking,
    /// A newer stable release exists.
    Available,
    /// The running version is the newest stable release.
    UpToDate,
    /// The release binary is being transferred.
    Downloading,
    /// The binary is staged on disk.
    Downloaded,
    /// The binary is being verified and the helper launched.
    Applying,
    /// The helper is running; this process is about to be replaced.
    Applied,
    /// The last operation failed; see `error`.
    Error,
}

impl std::fmt::Display for UpdateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Checking => "checking",
            Self::Available => "available",
            Self::UpToDate => "up_to_date",
            Self::Downloading => "downloading",
            Self::Downloaded => "downloaded",
            Self::Applying => "applying",
            Self::Applied => "applied",
            Self::Error => "error",
        };
        f.write_str(name)
    }
}

/// The persisted update record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UpdateState {
    /// Current lifecycle position.
    pub status: UpdateStatus,
    /// Download progress, 0-100. Only meaningful while downloading.
    pub progress_percent: u8,
    /// Newest stable version seen by the last successful check.
    pub latest_version: Option<String>,
    /// Download URL of the asset chosen for that version.
    pub download_url: Option<String>,
    /// Staged binary.
    pub asset_path: Option<PathBuf>,
    /// Staged checksum sidecar.
    pub checksum_path: Option<PathBuf>,
    /// Digest the staged binary must match.
    pub expected_digest: Option<String>,
    /// Human-readable description of the last failure.
    pub error: Option<String>,
    /// When the registry was last queried successfully.
    pub last_checked_at: Option<DateTime<Utc>>,
    /// When this record was last written.
    pub updated_at: Option<DateTime<Utc>>,
}

impl UpdateState {
    /// Move to `status`, clearing any previous error.
    pub fn transition(&mut self, status: UpdateStatus) {
        self.status = status;
        self.error = None;
        if status != UpdateStatus::Downloading {
            self.progress_percent = if status == UpdateStatus::Downloaded { 100 } else { 0 };
        }
    }

    /// Record a failure.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = UpdateStatus::Error;
        self.error = Some(message.into());
    }
}

/// File-backed store for [`UpdateState`].
///
/// Not safe for concurrent writers in different processes.
#[derive(Debug, Clone)]
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    /// Store the record in `updates_dir/update_state.json`.
    pub fn new(updates_dir: &Path) -> Self {
        Self {
            path: updates_dir.join(STATE_FILE_NAME),
        }
    }

    /// Location of the state file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the record, falling back to the default `idle` state.
    pub fn load(&self) -> UpdateState {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return UpdateState::default(),
            Err(e) => {
                warn!("Failed to read update state {}: {e}", self.path.display());
                return UpdateState::default();
            }
        };

        serde_json::from_str(&content).unwrap_or_else(|e| {
            warn!("Discarding corrupt update state {}: {e}", self.path.display());
            UpdateState::default()
        })
    }

    /// Replace the record, stamping `updated_at`.
    pub fn save(&self, state: &UpdateState) -> Result<()> {
        let mut stamped = state.clone();
        stamped.updated_at = Some(Utc::now());
        self.write(&stamped)
    }

    /// Load, apply `update`, and save. Returns the saved record.
    pub fn patch<F>(&self, update: F) -> Result<UpdateState>
    where
        F: FnOnce(&mut UpdateState),
    {
        let mut state = self.load();
        update(&mut state);
        state.updated_at = Some(Utc::now());
        self.write(&state)?;
        debug!("Update state is now {}", state.status);
        Ok(state)
    }

    fn write(&self, state: &UpdateState) -> Result<()> {
        let json = serde_json::to_vec_pretty(state)?;
        atomic_write(&self.path, &json)?;
        Ok(())
    }
}
