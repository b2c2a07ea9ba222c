//! Retrying, allow-listed HTTP transfers.
//!
//! Every URL the updater touches passes through [`HostAllowList::check`] before
//! a connection is attempted, and every redirect hop is re-checked by the
//! client's redirect policy. Downloads stream into `<dest>.part`, which is
//! renamed over the destination only after the body has been fully written and
//! synced; a failed attempt deletes the partial file before the next retry.

use crate::constants::{PARTIAL_SUFFIX, PROGRESS_STEP_PERCENT, UNKNOWN_LENGTH_REPORT_BYTES, USER_AGENT};
use crate::core::{Result, UpdateError};
use crate::update::config::UpdateConfig;
use crate::utils::backoff::RetryPolicy;
use crate::utils::fs::{ensure_parent_dir, sibling_with_suffix};
use reqwest::Url;
use reqwest::header::{ACCEPT, HeaderValue};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_retry::RetryIf;
use tracing::{debug, warn};

const MAX_REDIRECTS: usize = 10;

/// Hosts and schemes the updater is allowed to contact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostAllowList {
    hosts: Vec<String>,
    allow_insecure_loopback: bool,
}

impl HostAllowList {
    /// Allow HTTPS to exactly the given hosts.
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            hosts: hosts.into_iter().map(|h| h.into().to_ascii_lowercase()).collect(),
            allow_insecure_loopback: false,
        }
    }

    /// Also accept plain `http` when the host is a loopback name in the list.
    pub fn allow_insecure_loopback(mut self, allow: bool) -> Self {
        self.allow_insecure_loopback = allow;
        self
    }

    /// Parse `url` and reject it unless its scheme and host are allowed.
    pub fn check(&self, url: &str) -> Result<Url> {
        let parsed = Url::parse(url).map_err(|e| UpdateError::Security {
            url: url.to_string(),
            reason: format!("malformed URL: {e}"),
        })?;
        self.check_url(&parsed).map_err(|reason| UpdateError::Security {
            url: url.to_string(),
            reason,
        })?;
        Ok(parsed)
    }

    fn check_url(&self, url: &Url) -> std::result::Result<(), String> {
        let host = url.host_str().map(str::to_ascii_lowercase).ok_or("URL has no host")?;

        match url.scheme() {
            "https" => {}
            "http" if self.allow_insecure_loopback && is_loopback(&host) => {}
            other => return Err(format!("scheme '{other}' is not allowed; only https is")),
        }

        if self.hosts.iter().any(|allowed| *allowed == host) {
            Ok(())
        } else {
            Err(format!("host '{host}' is not in the allow-list"))
        }
    }
}

fn is_loopback(host: &str) -> bool {
    matches!(host, "127.0.0.1" | "localhost" | "[::1]")
}

/// Progress of a single download attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadProgress {
    /// Bytes written so far.
    pub downloaded: u64,
    /// Total size announced by the server, if any.
    pub total: Option<u64>,
    /// Whole percentage, `None` when the server omitted `Content-Length`.
    pub percent: Option<u8>,
}

/// Decides which byte counts are worth reporting.
struct ProgressThrottle {
    total: Option<u64>,
    last_percent: u8,
    last_bytes: u64,
}

impl ProgressThrottle {
    fn new(total: Option<u64>) -> Self {
        Self {
            total,
            last_percent: 0,
            last_bytes: 0,
        }
    }

    fn advance(&mut self, downloaded: u64) -> Option<DownloadProgress> {
        match self.total {
            Some(total) => {
                let percent = percent_of(downloaded, total);
                if percent >= self.last_percent.saturating_add(PROGRESS_STEP_PERCENT) {
                    self.last_percent = percent;
                    return Some(self.snapshot(downloaded, Some(percent)));
                }
                None
            }
            None => {
                if downloaded - self.last_bytes >= UNKNOWN_LENGTH_REPORT_BYTES {
                    self.last_bytes = downloaded;
                    return Some(self.snapshot(downloaded, None));
                }
                None
            }
        }
    }

    fn finish(&mut self, downloaded: u64) -> Option<DownloadProgress> {
        match self.total {
            Some(_) if self.last_percent >= 100 => None,
            Some(_) => {
                self.last_percent = 100;
                Some(self.snapshot(downloaded, Some(100)))
            }
            None => Some(self.snapshot(downloaded, None)),
        }
    }

    fn snapshot(&self, downloaded: u64, percent: Option<u8>) -> DownloadProgress {
        DownloadProgress {
            downloaded,
            total: self.total,
            percent,
        }
    }
}

fn percent_of(done: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    ((done.min(total) as u128 * 100) / total as u128) as u8
}

/// HTTP client bound to an allow-list and a retry policy.
#[derive(Debug, Clone)]
pub struct TransferEngine {
    client: reqwest::Client,
    allow: Arc<HostAllowList>,
    retry: RetryPolicy,
    request_timeout: Duration,
    download_timeout: Duration,
}

impl TransferEngine {
    /// Build an engine from the update configuration.
    pub fn new(config: &UpdateConfig) -> Result<Self> {
        let allow = HostAllowList::new(config.allowed_hosts.iter().cloned())
            .allow_insecure_loopback(config.allow_insecure_loopback);
        Self::with_parts(
            allow,
            config.retry_policy(),
            Duration::from_secs(config.request_timeout_secs),
            Duration::from_secs(config.download_timeout_secs),
        )
    }

    /// Build an engine from explicit parts.
    pub fn with_parts(
        allow: HostAllowList,
        retry: RetryPolicy,
        request_timeout: Duration,
        download_timeout: Duration,
    ) -> Result<Self> {
        let allow = Arc::new(allow);
        let redirect_allow = Arc::clone(&allow);
        let policy = reqwest::redirect::Policy::custom(move |attempt| {
            if attempt.previous().len() >= MAX_REDIRECTS {
                return attempt.error("too many redirects");
            }
            match redirect_allow.check_url(attempt.url()) {
                Ok(()) => attempt.follow(),
                Err(reason) => attempt.error(reason),
            }
        });

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .redirect(policy)
            .build()
            .map_err(|e| UpdateError::Other {
                message: format!("Failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            allow,
            retry,
            request_timeout,
            download_timeout,
        })
    }

    /// The allow-list every request is checked against.
    pub fn allow_list(&self) -> &HostAllowList {
        &self.allow
    }

    /// GET `url` and decode the body as JSON, retrying transient failures.
    pub async fn get_json(&self, url: &str, accept: &'static str) -> Result<serde_json::Value> {
        let parsed = self.allow.check(url)?;
        let mut attempt = 0u32;

        RetryIf::spawn(
            self.retry.delays(),
            || {
                attempt += 1;
                let attempt = attempt;
                let url = parsed.clone();
                async move {
                    debug!("GET {url} (attempt {attempt})");
                    let response = self
                        .client
                        .get(url.clone())
                        .header(ACCEPT, HeaderValue::from_static(accept))
                        .timeout(self.request_timeout)
                        .send()
                        .await
                        .map_err(transport_error)?;

                    let status = response.status();
                    if !status.is_success() {
                        let err = UpdateError::HttpStatus {
                            url: url.to_string(),
                            status: status.as_u16(),
                        };
                        warn!("Registry request failed: {err}");
                        return Err(err);
                    }

                    response.json::<serde_json::Value>().await.map_err(transport_error)
                }
            },
            |e: &UpdateError| e.is_retryable(),
        )
        .await
    }

    /// Stream `url` into `dest`, retrying transient failures.
    ///
    /// `on_progress` receives updates at most every five percentage points
    /// (or every MiB when the length is unknown) plus a final update. Returns
    /// the number of bytes written. On failure `dest` is left as it was.
    pub async fn download_to_file<F>(&self, url: &str, dest: &Path, on_progress: F) -> Result<u64>
    where
        F: FnMut(DownloadProgress) + Send,
    {
        let parsed = self.allow.check(url)?;
        ensure_parent_dir(dest)?;

        let part = sibling_with_suffix(dest, PARTIAL_SUFFIX);
        let progress = Mutex::new(on_progress);
        let mut attempt = 0u32;

        let written = RetryIf::spawn(
            self.retry.delays(),
            || {
                attempt += 1;
                let attempt = attempt;
                let url = parsed.clone();
                let part = part.as_path();
                let progress = &progress;
                async move {
                    debug!("Downloading {url} (attempt {attempt})");
                    let result = self.download_once(&url, part, progress).await;
                    if let Err(e) = &result {
                        warn!("Download attempt {attempt} for {url} failed: {e}");
                        if let Err(rm) = tokio::fs::remove_file(part).await {
                            if rm.kind() != std::io::ErrorKind::NotFound {
                                warn!("Failed to remove partial file {}: {rm}", part.display());
                            }
                        }
                    }
                    result
                }
            },
            |e: &UpdateError| e.is_retryable(),
        )
        .await?;

        if let Err(e) = tokio::fs::rename(&part, dest).await {
            let _ = tokio::fs::remove_file(&part).await;
            return Err(e.into());
        }
        debug!("Downloaded {written} bytes to {}", dest.display());
        Ok(written)
    }

    async fn download_once<F>(&self, url: &Url, part: &Path, progress: &Mutex<F>) -> Result<u64>
    where
        F: FnMut(DownloadProgress),
    {
        let mut response = self
            .client
            .get(url.clone())
            .timeout(self.download_timeout)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpdateError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let total = response.content_length();
        let mut throttle = ProgressThrottle::new(total);
        let mut file = tokio::fs::File::create(part).await?;
        let mut downloaded = 0u64;

        while let Some(chunk) = response.chunk().await.map_err(transport_error)? {
            file.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
            if let Some(update) = throttle.advance(downloaded) {
                emit(progress, update);
            }
        }

        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        if let Some(expected) = total {
            if downloaded != expected {
                return Err(UpdateError::network(
                    "download",
                    format!("body ended after {downloaded} of {expected} bytes"),
                ));
            }
        }

        if let Some(update) = throttle.finish(downloaded) {
            emit(progress, update);
        }
        Ok(downloaded)
    }
}

fn emit<F: FnMut(DownloadProgress)>(progress: &Mutex<F>, update: DownloadProgress) {
    if let Ok(mut callback) = progress.lock() {
        callback(update);
    }
}

/// Map a reqwest failure, surfacing rejected redirects as security errors.
fn transport_error(err: reqwest::Error) -> UpdateError {
    if err.is_redirect() {
        let reason = std::error::Error::source(&err)
            .map_or_else(|| err.to_string(), |source| format!("redirect rejected: {source}"));
        return UpdateError::Security {
            url: err.url().map(ToString::to_string).unwrap_or_default(),
            reason,
        };
    }
    err.into()
}
