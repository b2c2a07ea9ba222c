use crate::constants::{
    DEFAULT_BACKOFF_BASE_MS, DEFAULT_CHECK_INTERVAL_SECS, DEFAULT_DOWNLOAD_TIMEOUT_SECS,
    DEFAULT_HELPER_DELAY_SECS, DEFAULT_NETWORK_RETRIES, DEFAULT_REQUEST_TIMEOUT_SECS,
};
use crate::utils::backoff::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tunable policy for the self-update subsystem.
///
/// Every field has a default, so an empty `[update]` table (or no config file
/// at all) yields a working configuration pointed at GitHub.
///
/// # TOML Example
/// ```toml
/// [update]
/// repository = "acme/desk"
/// product_token = "desk"
/// check_interval = 86400
/// network_retries = 3
/// backoff_base_ms = 750
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateConfig {
    /// Base URL of the release registry API.
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Repository in `owner/name` form.
    #[serde(default = "default_repository")]
    pub repository: String,

    /// Product name token matched against asset names when scoring.
    #[serde(default = "default_product_token")]
    pub product_token: String,

    /// Hosts the updater may contact. Redirect targets are checked too.
    #[serde(default = "default_allowed_hosts")]
    pub allowed_hosts: Vec<String>,

    /// Permit plain `http` to `127.0.0.1` and `localhost`.
    ///
    /// Only local test harnesses need this; it never widens the host list.
    #[serde(default)]
    pub allow_insecure_loopback: bool,

    /// Seconds between automatic update checks.
    #[serde(default = "default_check_interval")]
    pub check_interval: u64,

    /// Total attempts per network operation.
    #[serde(default = "default_network_retries")]
    pub network_retries: u32,

    /// First backoff delay in milliseconds; doubles after each failure.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    /// Timeout for a single registry API request.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Timeout for a complete asset download.
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,

    /// Seconds the helper script waits before terminating the running process.
    #[serde(default = "default_helper_delay_secs")]
    pub helper_delay_secs: u64,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            repository: default_repository(),
            product_token: default_product_token(),
            allowed_hosts: default_allowed_hosts(),
            allow_insecure_loopback: false,
            check_interval: default_check_interval(),
            network_retries: default_network_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            request_timeout_secs: default_request_timeout_secs(),
            download_timeout_secs: default_download_timeout_secs(),
            helper_delay_secs: default_helper_delay_secs(),
        }
    }
}

impl UpdateConfig {
    /// Retry policy derived from `network_retries` and `backoff_base_ms`.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.network_retries, Duration::from_millis(self.backoff_base_ms))
    }

    /// Cooldown between automatic checks.
    pub fn check_cooldown(&self) -> Duration {
        Duration::from_secs(self.check_interval)
    }

    /// URL of the releases-list endpoint.
    pub fn releases_url(&self) -> String {
        format!(
            "{}/repos/{}/releases",
            self.api_base.trim_end_matches('/'),
            self.repository.trim_matches('/')
        )
    }
}

fn default_api_base() -> String {
    "https://api.github.com".to_string()
}

fn default_repository() -> String {
    "upkeep-dev/upkeep".to_string()
}

fn default_product_token() -> String {
    env!("CARGO_PKG_NAME").to_string()
}

fn default_allowed_hosts() -> Vec<String> {
    [
        "api.github.com",
        "github.com",
        "objects.githubusercontent.com",
        "release-assets.githubusercontent.com",
    ]
    .iter()
    .map(|h| (*h).to_string())
    .collect()
}

const fn default_check_interval() -> u64 {
    DEFAULT_CHECK_INTERVAL_SECS
}

const fn default_network_retries() -> u32 {
    DEFAULT_NETWORK_RETRIES
}

const fn default_backoff_base_ms() -> u64 {
    DEFAULT_BACKOFF_BASE_MS
}

const fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

const fn default_download_timeout_secs() -> u64 {
    DEFAULT_DOWNLOAD_TIMEOUT_SECS
}

const fn default_helper_delay_secs() -> u64 {
    DEFAULT_HELPER_DELAY_SECS
}
