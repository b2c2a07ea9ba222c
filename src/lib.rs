//! upkeep - in-place self-update for packaged applications
//!
//! upkeep checks a GitHub-style release registry for a newer stable build,
//! downloads the binary for the running OS and CPU, verifies it against the
//! published SHA-256 sidecar, and swaps it in for the running executable
//! through a detached helper script. No installer, package manager or
//! administrator is involved unless the install location demands elevation.
//!
//! # Architecture Overview
//!
//! Leaf components first:
//!
//! - [`update::version_check`] - parse and order release tags
//! - [`update::release`] - find the newest stable release and pick the platform asset
//! - [`update::verification`] - SHA-256 digests and sidecar parsing
//! - [`update::transfer`] - allow-listed, retrying, streamed downloads
//! - [`update::state`] - the persisted state machine record
//! - [`update::apply`] - helper script generation and detached launch
//! - [`update::service`] - `check`, `download`, `apply` and `instructions`
//!
//! # Supporting Modules
//!
//! - [`cli`] - the `upkeep` binary's command-line interface
//! - [`config`] - optional TOML configuration file
//! - [`constants`] - policy defaults and file names
//! - [`core`] - error types and user-facing error rendering
//! - [`utils`] - atomic file writes, backoff, platform keys, progress bars
//!
//! # Filesystem Layout
//!
//! ```text
//! <data_dir>/updates/
//! ├── update_state.json          # persisted UpdateState
//! └── 1.4.0/                     # one directory per staged version
//!     ├── app-linux-x86_64
//!     └── app-linux-x86_64.sha256
//! ```
//!
//! # Run Modes
//!
//! Release builds are stamped with the `UPKEEP_PACKAGED` environment variable
//! at compile time. Builds without it run in source mode: updates are never
//! reported as available and `download`/`apply` refuse with an explanation,
//! pointing at the steps returned by `instructions`.

pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod update;
pub mod utils;
