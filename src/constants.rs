//! Global constants used throughout the updater.
//!
//! This module contains timeout durations, retry parameters, and file names
//! shared by several modules. The numeric policy values are only defaults:
//! every one of them can be overridden through
//! [`UpdateConfig`](crate::update::config::UpdateConfig).

/// Number of attempts for every network operation (3).
///
/// Covers both the releases-list request and each asset download.
pub const DEFAULT_NETWORK_RETRIES: u32 = 3;

/// Base delay for exponential backoff between network attempts (750ms).
///
/// The delay doubles after every failed attempt: 750ms, 1.5s, 3s...
pub const DEFAULT_BACKOFF_BASE_MS: u64 = 750;

/// Timeout for registry API requests (10 seconds).
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Timeout for a complete asset download (10 minutes).
///
/// Release binaries can be tens of megabytes on slow links, so this is
/// intentionally much larger than the API request timeout.
pub const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 600;

/// Minimum time between automatic update checks (24 hours).
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 24 * 60 * 60;

/// Delay the helper script waits before terminating the running process (2 seconds).
///
/// Gives the caller time to send its response before it is killed.
pub const DEFAULT_HELPER_DELAY_SECS: u64 = 2;

/// Minimum progress step, in percentage points, between progress reports.
pub const PROGRESS_STEP_PERCENT: u8 = 5;

/// Bytes between progress reports when the server omits `Content-Length` (1 MiB).
pub const UNKNOWN_LENGTH_REPORT_BYTES: u64 = 1024 * 1024;

/// Chunk size used when hashing files (256 KiB).
pub const DIGEST_CHUNK_SIZE: usize = 256 * 1024;

/// Length of a hex-encoded SHA-256 digest.
pub const SHA256_HEX_LEN: usize = 64;

/// Name of the directory holding update state and staged assets.
pub const UPDATES_DIR_NAME: &str = "updates";

/// File name of the persisted update state record.
pub const STATE_FILE_NAME: &str = "update_state.json";

/// Suffix of checksum sidecar assets.
pub const CHECKSUM_SUFFIX: &str = ".sha256";

/// Suffix of the temporary file a download streams into.
pub const PARTIAL_SUFFIX: &str = ".part";

/// Suffix of the backup copy the helper script makes of the current executable.
pub const BACKUP_SUFFIX: &str = ".bak";

/// User agent sent with every registry and asset request.
pub const USER_AGENT: &str = concat!("upkeep/", env!("CARGO_PKG_VERSION"), " (self-update)");

/// Media type requested from the release registry.
pub const GITHUB_ACCEPT: &str = "application/vnd.github+json";
