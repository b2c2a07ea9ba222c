//! The update service: the four host-facing operations over the state machine.
//!
//! ```text
//! idle/up_to_date/error --check--> checking --> up_to_date | available | error
//! available --download--> downloading --> downloaded | error
//! downloaded --apply--> applying --> applied | error
//! ```
//!
//! Every operation returns a serializable payload rather than an error: the
//! host renders `success`/`error` and the persisted state verbatim. Failures
//! past the preconditions are also written to the state record so a later
//! `check` reports them.

use crate::constants::UPDATES_DIR_NAME;
use crate::core::{Result, UpdateError};
use crate::update::apply::{ApplyEngine, DetachedLauncher, Launcher};
use crate::update::config::UpdateConfig;
use crate::update::release::{Platform, ReleaseResolver};
use crate::update::state::{StateStore, UpdateState, UpdateStatus};
use crate::update::transfer::{DownloadProgress, TransferEngine};
use crate::update::verification::ChecksumVerifier;
use crate::update::version_check::is_newer;
use crate::utils::fs::prune_subdirs_except;
use crate::utils::platform::get_data_dir;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How the running binary was built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// A release build produced by the packaging step.
    Packaged,
    /// A developer build from a source checkout. Never self-updates.
    Source,
}

impl RunMode {
    /// Packaged when the build was stamped with `UPKEEP_PACKAGED`.
    pub fn detect() -> Self {
        if option_env!("UPKEEP_PACKAGED").is_some() {
            Self::Packaged
        } else {
            Self::Source
        }
    }
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Packaged => f.write_str("packaged"),
            Self::Source => f.write_str("source"),
        }
    }
}

/// Payload of `check`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    /// A newer stable release can be installed. Always false in source mode.
    pub update_available: bool,
    /// Version of the running build.
    pub current_version: String,
    /// Newest stable version known.
    pub latest_version: Option<String>,
    /// Download URL of the matching asset.
    pub download_url: Option<String>,
    /// Build mode.
    pub mode: RunMode,
    /// Full persisted state.
    pub state: UpdateState,
}

/// Payload of `download`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadResponse {
    /// Whether the asset is staged.
    pub success: bool,
    /// Build mode.
    pub mode: RunMode,
    /// Staged binary.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_path: Option<PathBuf>,
    /// Version that was staged.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_version: Option<String>,
    /// Failure description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Payload of `apply`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyResponse {
    /// Whether the helper was launched.
    pub success: bool,
    /// Build mode.
    pub mode: RunMode,
    /// The helper runs through an elevation prompt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requires_elevation: Option<bool>,
    /// Message for the user.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Failure description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Payload of `instructions`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstructionsResponse {
    /// Build mode the steps apply to.
    pub mode: RunMode,
    /// Manual update steps in order.
    pub steps: Vec<String>,
}

/// A binary staged under `updates/<version>/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedAsset {
    /// Version the binary belongs to.
    pub version: String,
    /// Staged binary.
    pub asset_path: PathBuf,
    /// Staged sidecar, if the release published one.
    pub checksum_path: Option<PathBuf>,
    /// Digest parsed from the sidecar.
    pub expected_digest: Option<String>,
}

/// Orchestrates release checks, downloads and helper launches.
#[derive(Debug)]
pub struct UpdateService {
    config: UpdateConfig,
    current_version: String,
    mode: RunMode,
    updates_dir: PathBuf,
    current_exe: PathBuf,
    pid: u32,
    store: StateStore,
    transfer: TransferEngine,
    resolver: ReleaseResolver,
    apply: ApplyEngine,
}

/// Builder for [`UpdateService`].
///
/// Everything that would otherwise be read from the process (version, mode,
/// executable path, pid, platform) can be replaced here.
pub struct UpdateServiceBuilder {
    config: UpdateConfig,
    data_dir: Option<PathBuf>,
    current_version: String,
    mode: RunMode,
    current_exe: Option<PathBuf>,
    pid: u32,
    platform: Platform,
    launcher: Arc<dyn Launcher>,
}

impl UpdateServiceBuilder {
    fn new(config: UpdateConfig) -> Self {
        Self {
            config,
            data_dir: None,
            current_version: env!("CARGO_PKG_VERSION").to_string(),
            mode: RunMode::detect(),
            current_exe: None,
            pid: std::process::id(),
            platform: Platform::current(),
            launcher: Arc::new(DetachedLauncher),
        }
    }

    /// Application data root; updates live in `<data_dir>/updates`.
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    /// Version of the running build.
    pub fn current_version(mut self, version: impl Into<String>) -> Self {
        self.current_version = version.into();
        self
    }

    /// Build mode.
    pub fn mode(mut self, mode: RunMode) -> Self {
        self.mode = mode;
        self
    }

    /// Executable to replace on apply.
    pub fn current_exe(mut self, path: impl Into<PathBuf>) -> Self {
        self.current_exe = Some(path.into());
        self
    }

    /// Process the helper terminates.
    pub fn pid(mut self, pid: u32) -> Self {
        self.pid = pid;
        self
    }

    /// Platform used for asset selection and helper scripts.
    pub fn platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// How the helper is started.
    pub fn launcher(mut self, launcher: Arc<dyn Launcher>) -> Self {
        self.launcher = launcher;
        self
    }

    /// Assemble the service.
    pub fn build(self) -> Result<UpdateService> {
        let data_dir = match self.data_dir {
            Some(dir) => dir,
            None => get_data_dir()?,
        };
        let current_exe = match self.current_exe {
            Some(path) => path,
            None => {
                let exe = std::env::current_exe()?;
                std::fs::canonicalize(&exe).unwrap_or(exe)
            }
        };
        let updates_dir = data_dir.join(UPDATES_DIR_NAME);

        let transfer = TransferEngine::new(&self.config)?;
        let resolver = ReleaseResolver::new(transfer.clone(), &self.config, self.platform.clone());
        let apply =
            ApplyEngine::for_platform(&self.platform, self.launcher, self.config.helper_delay_secs);

        debug!(
            "Update service for {} {} ({}) using {}",
            self.platform.os,
            self.current_version,
            self.mode,
            updates_dir.display()
        );

        Ok(UpdateService {
            store: StateStore::new(&updates_dir),
            config: self.config,
            current_version: self.current_version,
            mode: self.mode,
            updates_dir,
            current_exe,
            pid: self.pid,
            transfer,
            resolver,
            apply,
        })
    }
}

impl UpdateService {
    /// Start building a service for `config`.
    pub fn builder(config: UpdateConfig) -> UpdateServiceBuilder {
        UpdateServiceBuilder::new(config)
    }

    /// Build mode.
    pub fn mode(&self) -> RunMode {
        self.mode
    }

    /// Version of the running build.
    pub fn current_version(&self) -> &str {
        &self.current_version
    }

    /// Directory holding the state file and staged versions.
    pub fn updates_dir(&self) -> &Path {
        &self.updates_dir
    }

    /// The state store backing this service.
    pub fn store(&self) -> &StateStore {
        &self.store
    }

    fn report(&self, state: UpdateState) -> StatusReport {
        let update_available = self.mode == RunMode::Packaged
            && state.latest_version.as_deref().is_some_and(|v| is_newer(v, &self.current_version));
        StatusReport {
            update_available,
            current_version: self.current_version.clone(),
            latest_version: state.latest_version.clone(),
            download_url: state.download_url.clone(),
            mode: self.mode,
            state,
        }
    }

    fn checked_recently(&self, state: &UpdateState) -> bool {
        let cooldown = self.config.check_cooldown();
        state.last_checked_at.is_some_and(|at| {
            (Utc::now() - at).to_std().is_ok_and(|elapsed: Duration| elapsed < cooldown)
        })
    }

    /// Report update status, querying the registry unless a recent check is cached.
    ///
    /// Registry failures are recorded in the state and reported through it;
    /// only a failure to persist the state is returned as an error.
    pub async fn check(&self, force_refresh: bool) -> Result<StatusReport> {
        let cached = self.store.load();
        if !force_refresh && self.checked_recently(&cached) {
            debug!("Using cached update status ({})", cached.status);
            return Ok(self.report(cached));
        }

        self.store.patch(|s| s.transition(UpdateStatus::Checking))?;
        info!("Checking for updates (current version {})", self.current_version);

        let state = match self.resolver.resolve().await {
            Ok(Some(resolved)) => {
                let version = resolved.release.version.clone();
                let newer = is_newer(&version, &self.current_version);
                let download_url = resolved.selection.main_asset.map(|a| a.download_url);
                if newer {
                    info!("Update available: {} -> {version}", self.current_version);
                }

                self.store.patch(|s| {
                    if s.latest_version.as_deref() != Some(version.as_str()) {
                        s.asset_path = None;
                        s.checksum_path = None;
                        s.expected_digest = None;
                    }
                    s.transition(if newer {
                        UpdateStatus::Available
                    } else {
                        UpdateStatus::UpToDate
                    });
                    s.latest_version = Some(version);
                    s.download_url = download_url;
                    s.last_checked_at = Some(Utc::now());
                })?
            }
            Ok(None) => self.store.patch(|s| {
                s.transition(UpdateStatus::UpToDate);
                s.latest_version = None;
                s.download_url = None;
                s.asset_path = None;
                s.checksum_path = None;
                s.expected_digest = None;
                s.last_checked_at = Some(Utc::now());
            })?,
            Err(e) => {
                warn!("Update check failed ({}): {e}", e.category());
                self.store.patch(|s| s.fail(e.to_string()))?
            }
        };

        Ok(self.report(state))
    }

    /// Download and verify the newest release binary.
    pub async fn download(&self) -> DownloadResponse {
        self.download_with_progress(|_| {}).await
    }

    /// [`download`](Self::download) with a progress callback.
    pub async fn download_with_progress<F>(&self, on_progress: F) -> DownloadResponse
    where
        F: FnMut(DownloadProgress) + Send,
    {
        match self.stage_update(on_progress).await {
            Ok(staged) => DownloadResponse {
                success: true,
                mode: self.mode,
                asset_path: Some(staged.asset_path),
                latest_version: Some(staged.version),
                error: None,
            },
            Err(e) => {
                self.record_failure(&e);
                DownloadResponse {
                    success: false,
                    mode: self.mode,
                    asset_path: None,
                    latest_version: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Launch the helper that installs the staged binary, downloading it first if needed.
    pub async fn apply(&self) -> ApplyResponse {
        match self.apply_staged().await {
            Ok(requires_elevation) => ApplyResponse {
                success: true,
                mode: self.mode,
                requires_elevation: Some(requires_elevation),
                message: Some(if requires_elevation {
                    "Approve the permission prompt to finish installing; the application will restart".to_string()
                } else {
                    "Update is being installed; the application will restart shortly".to_string()
                }),
                error: None,
            },
            Err(e) => {
                self.record_failure(&e);
                ApplyResponse {
                    success: false,
                    mode: self.mode,
                    requires_elevation: None,
                    message: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Manual update steps for the current build mode.
    pub fn instructions(&self) -> InstructionsResponse {
        let steps = match self.mode {
            RunMode::Source => vec![
                "Open a terminal in your source checkout".to_string(),
                "Run `git pull --ff-only` to fetch the latest changes".to_string(),
                "Run `cargo build --release` to rebuild".to_string(),
                format!("Run `target/release/{}` to start the new build", env!("CARGO_PKG_NAME")),
            ],
            RunMode::Packaged => vec![
                format!(
                    "Download the latest release for your platform from https://github.com/{}/releases",
                    self.config.repository
                ),
                "Close the running application".to_string(),
                format!("Replace {} with the downloaded file", self.current_exe.display()),
                "Start the application again".to_string(),
            ],
        };
        InstructionsResponse {
            mode: self.mode,
            steps,
        }
    }

    fn require_known_update(&self, state: &UpdateState) -> Result<()> {
        let known_newer = state
            .latest_version
            .as_deref()
            .is_some_and(|v| is_newer(v, &self.current_version));
        if known_newer {
            Ok(())
        } else {
            Err(UpdateError::NoUpdateAvailable {
                current: self.current_version.clone(),
            })
        }
    }

        fn require_packaged(&self, operation: &str) -> Result<()> {
        if self.mode == RunMode::Source {
            return Err(UpdateError::UnsupportedMode {
                operation: operation.to_string(),
            });
        }
        Ok(())
    }

    /// Download the newest release binary and its sidecar into `updates/<version>/`.
    ///
    /// Requires a prior check that found a newer version. The binary is
    /// verified as soon as a digest is known; a mismatching file is deleted.
    pub async fn stage_update<F>(&self, on_progress: F) -> Result<StagedAsset>
    where
        F: FnMut(DownloadProgress) + Send,
    {
        self.require_packaged("Update download")?;

        self.require_known_update(&self.store.load())?;

        self.store.patch(|s| {
            s.transition(UpdateStatus::Downloading);
            s.progress_percent = 0;
        })?;

        let resolved = self.resolver.resolve().await?.ok_or_else(|| UpdateError::NoUpdateAvailable {
            current: self.current_version.clone(),
        })?;
        let version = resolved.release.version.clone();
        if !is_newer(&version, &self.current_version) {
            return Err(UpdateError::NoUpdateAvailable {
                current: self.current_version.clone(),
            });
        }
        let platform = self.resolver.platform();
        let main = resolved.selection.main_asset.ok_or_else(|| UpdateError::NoCompatibleAsset {
            os: platform.os.clone(),
            arch: platform.arch.clone(),
        })?;

        let version_dir = self.updates_dir.join(&version);
        let asset_path = version_dir.join(&main.name);
        info!("Downloading {} {version} to {}", main.name, asset_path.display());

        let store = &self.store;
        let mut on_progress = on_progress;
        self.transfer
            .download_to_file(&main.download_url, &asset_path, move |progress| {
                if let Some(percent) = progress.percent {
                    if let Err(e) = store.patch(|s| s.progress_percent = percent) {
                        debug!("Failed to persist download progress: {e}");
                    }
                }
                on_progress(progress);
            })
            .await?;

        let (checksum_path, expected_digest) = match &resolved.selection.checksum_asset {
            Some(sidecar) => {
                let path = version_dir.join(&sidecar.name);
                self.transfer.download_to_file(&sidecar.download_url, &path, |_| {}).await?;
                let text = tokio::fs::read_to_string(&path).await?;
                let digest = ChecksumVerifier::parse_sidecar(&text, &main.name);
                if digest.is_none() {
                    warn!("Sidecar {} has no usable digest for {}", sidecar.name, main.name);
                }
                (Some(path), digest)
            }
            None => {
                warn!("Release {version} publishes no checksum for {}", main.name);
                (None, None)
            }
        };

        if let Some(expected) = expected_digest.as_deref() {
            if let Err(e) = ChecksumVerifier::ensure_verified(&asset_path, Some(expected)).await {
                let _ = tokio::fs::remove_file(&asset_path).await;
                return Err(e);
            }
        }

        self.store.patch(|s| {
            s.transition(UpdateStatus::Downloaded);
            s.latest_version = Some(version.clone());
            s.download_url = Some(main.download_url.clone());
            s.asset_path = Some(asset_path.clone());
            s.checksum_path = checksum_path.clone();
            s.expected_digest = expected_digest.clone();
        })?;

        match prune_subdirs_except(&self.updates_dir, &version) {
            Ok(0) => {}
            Ok(n) => debug!("Pruned {n} stale staging directories"),
            Err(e) => warn!("Failed to prune stale staging directories: {e:#}"),
        }

        Ok(StagedAsset {
            version,
            asset_path,
            checksum_path,
            expected_digest,
        })
    }

    async fn apply_staged(&self) -> Result<bool> {
        self.require_packaged("Update install")?;

        // The staged binary must still be newer than the running build.
        let mut state = self.store.load();
        self.require_known_update(&state)?;

        let staged = state.asset_path.as_deref().is_some_and(Path::is_file);
        if !staged {
            info!("No staged update on disk; downloading first");
            self.stage_update(|_| {}).await?;
            state = self.store.load();
        }

        self.store.patch(|s| s.transition(UpdateStatus::Applying))?;

        let asset_path = state.asset_path.ok_or_else(|| UpdateError::AssetMissing {
            path: self.updates_dir.display().to_string(),
        })?;
        self.apply.check_candidate(&asset_path)?;
        ChecksumVerifier::ensure_verified(&asset_path, state.expected_digest.as_deref()).await?;

        let outcome =
            self.apply.apply_with_helper(&asset_path, &self.updates_dir, &self.current_exe, self.pid)?;
        self.store.patch(|s| s.transition(UpdateStatus::Applied))?;
        info!("Update helper launched from {}", outcome.script_path.display());
        Ok(outcome.requires_elevation)
    }

    fn record_failure(&self, error: &UpdateError) {
        // Source mode never writes; a refused download leaves a settled state as it was.
        let refused = match error {
            UpdateError::UnsupportedMode { .. } => true,
            UpdateError::NoUpdateAvailable { .. } => !matches!(
                self.store.load().status,
                UpdateStatus::Checking | UpdateStatus::Downloading | UpdateStatus::Applying
            ),
            _ => false,
        };
        if refused {
            debug!("Operation refused: {error}");
            return;
        }

        warn!("Update failed ({}): {error}", error.category());
        if let Err(e) = self.store.patch(|s| s.fail(error.to_string())) {
            warn!("Failed to record update failure: {e}");
        }
    }
}
