//! Cross-platform utilities and helpers
//!
//! # Modules
//!
//! - [`backoff`] - Retry policy with exponential delays
//! - [`fs`] - Atomic writes and directory helpers
//! - [`platform`] - Platform keys and per-user directories
//! - [`progress`] - Progress bars and spinners for downloads
//!
//! # Example
//!
//! ```rust,no_run
//! use upkeep::utils::{atomic_write, ensure_dir};
//! use std::path::Path;
//!
//! # fn example() -> anyhow::Result<()> {
//! ensure_dir(Path::new("data/updates"))?;
//! atomic_write(Path::new("data/updates/update_state.json"), b"{}")?;
//! # Ok(())
//! # }
//! ```

pub mod backoff;
pub mod fs;
pub mod platform;
pub mod progress;

pub use backoff::RetryPolicy;
pub use fs::{atomic_write, ensure_dir};
pub use platform::{get_data_dir, is_windows, resolve_path};
pub use progress::{ProgressBar, ProgressStyle};
