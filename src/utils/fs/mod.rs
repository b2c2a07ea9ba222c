//! File system utilities for crash-safe file operations
//!
//! Everything the updater persists (the state record, staged binaries) goes
//! through a temp-file-then-rename sequence so a reader, or a process restarted
//! after a crash, never sees a half-written file.
//!
//! # Examples
//!
//! ```rust,no_run
//! use upkeep::utils::fs::{atomic_write, ensure_dir};
//! use std::path::Path;
//!
//! # fn example() -> anyhow::Result<()> {
//! ensure_dir(Path::new("data/updates"))?;
//! atomic_write(Path::new("data/updates/update_state.json"), b"{}")?;
//! # Ok(())
//! # }
//! ```

pub mod atomic;
pub mod dirs;

pub use atomic::{atomic_write, sibling_with_suffix};
pub use dirs::{ensure_dir, ensure_parent_dir, prune_subdirs_except};
