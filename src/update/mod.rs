//! Self-update subsystem
//!
//! Checks a GitHub-style release registry for a newer stable build, downloads
//! the binary matching the running platform, verifies it against the published
//! SHA-256 sidecar, and replaces the running executable through a detached
//! helper script.
//!
//! # Components
//!
//! - [`version_check`] - version parsing and ordering
//! - [`release`] - release discovery and asset selection
//! - [`verification`] - digests and checksum sidecars
//! - [`transfer`] - allow-listed, retrying downloads
//! - [`state`] - the persisted state machine record
//! - [`apply`] - helper scripts and detached launch
//! - [`service`] - the `check`/`download`/`apply`/`instructions` operations
//! - [`config`] - tunable policy
//!
//! # Example
//!
//! ```rust,no_run
//! use upkeep::update::{UpdateConfig, UpdateService};
//!
//! # async fn example() -> upkeep::core::Result<()> {
//! let service = UpdateService::builder(UpdateConfig::default()).build()?;
//! let status = service.check(false).await?;
//! if status.update_available {
//!     let staged = service.download().await;
//!     if staged.success {
//!         // The process is terminated by the helper shortly after this returns.
//!         service.apply().await;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod apply;
pub mod config;
pub mod release;
pub mod service;
pub mod state;
pub mod transfer;
pub mod verification;
pub mod version_check;

pub use apply::{ApplyEngine, DetachedLauncher, HelperScriptBuilder, Launcher, ScriptDescription};
pub use config::UpdateConfig;
pub use release::{AssetSelection, Platform, ReleaseAsset, ReleaseMetadata, ReleaseResolver};
pub use service::{
    ApplyResponse, DownloadResponse, InstructionsResponse, RunMode, StatusReport, UpdateService,
    UpdateServiceBuilder,
};
pub use state::{StateStore, UpdateState, UpdateStatus};
pub use transfer::{DownloadProgress, HostAllowList, TransferEngine};
pub use verification::ChecksumVerifier;
pub use version_check::is_newer;
