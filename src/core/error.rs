//! Error handling for the updater
//!
//! The error system follows two principles:
//! 1. **Strongly-typed errors** so callers can branch on the failure category
//! 2. **User-friendly messages** with actionable suggestions for the host UI and CLI
//!
//! # Error Categories
//!
//! - **Network**: [`UpdateError::Network`], [`UpdateError::HttpStatus`]. Retried
//!   locally with backoff before they surface.
//! - **Security**: [`UpdateError::Security`]. Disallowed scheme or host. Never retried.
//! - **Integrity**: [`UpdateError::ChecksumMismatch`], [`UpdateError::MissingChecksum`].
//!   Always fatal; an update is never applied without a matched digest.
//! - **Mode**: [`UpdateError::UnsupportedMode`]. Mutating operation in a source checkout.
//! - **Permission**: [`UpdateError::PermissionDenied`]. Install location not writable
//!   and no elevation path exists on this platform.
//! - **Asset**: [`UpdateError::UnsupportedAsset`], [`UpdateError::NoCompatibleAsset`],
//!   [`UpdateError::AssetMissing`].
//!
//! "No stable release published" is not an error: the resolver returns `Ok(None)`.
//!
//! # Examples
//!
//! ```rust,no_run
//! use upkeep::core::{UpdateError, user_friendly_error};
//!
//! let err = UpdateError::Security {
//!     url: "https://evil.example/app".to_string(),
//!     reason: "host is not in the allow-list".to_string(),
//! };
//! assert!(!err.is_retryable());
//!
//! let ctx = user_friendly_error(anyhow::Error::from(err));
//! ctx.display();
//! ```

use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// The main error type for update operations.
///
/// Each variant maps onto one failure category of the update flow. The
/// [`Display`](fmt::Display) text of every variant is written for end users, since
/// the service persists it verbatim into the `error` field of the update state.
#[derive(Error, Debug)]
pub enum UpdateError {
    /// Transport-level failure talking to the registry or the asset CDN.
    #[error("Network error during {operation}: {reason}")]
    Network {
        /// The network operation that failed (e.g. "fetch releases")
        operation: String,
        /// Reason for the network failure
        reason: String,
    },

    /// The server answered with a non-success HTTP status.
    #[error("HTTP {status} from {url}")]
    HttpStatus {
        /// URL that returned the status
        url: String,
        /// HTTP status code
        status: u16,
    },

    /// URL rejected before any connection was attempted.
    #[error("Refusing to contact {url}: {reason}")]
    Security {
        /// The rejected URL
        url: String,
        /// Why the URL was rejected
        reason: String,
    },

    /// Digest of the staged file does not match the published sidecar.
    #[error("Checksum mismatch for {file}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// File that was verified
        file: String,
        /// Digest parsed from the sidecar
        expected: String,
        /// Digest computed locally
        actual: String,
    },

    /// No usable digest is available for the staged file.
    #[error("Missing SHA-256 checksum for {file}; refusing to apply an unverified update")]
    MissingChecksum {
        /// File that could not be verified
        file: String,
    },

    /// Mutating operation attempted while running from an unpackaged checkout.
    #[error("{operation} is unavailable in source mode; update manually instead")]
    UnsupportedMode {
        /// The operation that was refused
        operation: String,
    },

    /// Install location is not writable and the platform has no elevation path.
    #[error("Permission denied: {operation} ({path})")]
    PermissionDenied {
        /// The operation that was denied
        operation: String,
        /// Path that is not writable
        path: String,
    },

    /// Candidate is an archive or installer and cannot replace the executable directly.
    #[error("Asset '{name}' is an archive or installer and cannot be applied in place")]
    UnsupportedAsset {
        /// Asset file name
        name: String,
    },

    /// The newest stable release has no binary for this platform.
    #[error("No compatible release asset found for {os}-{arch}")]
    NoCompatibleAsset {
        /// Operating system key
        os: String,
        /// Architecture key
        arch: String,
    },

    /// The cached state does not indicate that a newer version is available.
    #[error("No update available (current version {current})")]
    NoUpdateAvailable {
        /// The running version
        current: String,
    },

    /// A file the update flow depends on has disappeared from disk.
    #[error("Staged update asset is missing: {path}")]
    AssetMissing {
        /// Expected location
        path: String,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Anything else
    #[error("{message}")]
    Other {
        /// Error message
        message: String,
    },
}

impl UpdateError {
    /// Build a [`UpdateError::Network`] from any displayable cause.
    pub fn network(operation: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::Network {
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether the failure is transient and worth another attempt.
    ///
    /// Transport failures and HTTP 408/429/5xx are retryable. Everything else,
    /// including every security and integrity failure, is not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. } => true,
            Self::HttpStatus { status, .. } => {
                *status == 408 || *status == 429 || (500..600).contains(status)
            }
            _ => false,
        }
    }

    /// Failure category name, used in logs.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Network { .. } | Self::HttpStatus { .. } => "network",
            Self::Security { .. } => "security",
            Self::ChecksumMismatch { .. } | Self::MissingChecksum { .. } => "integrity",
            Self::UnsupportedMode { .. } => "unsupported_mode",
            Self::PermissionDenied { .. } => "permission",
            Self::UnsupportedAsset { .. }
            | Self::NoCompatibleAsset { .. }
            | Self::AssetMissing { .. } => "asset",
            Self::NoUpdateAvailable { .. } => "not_found",
            Self::Io(_) | Self::Json(_) | Self::Other { .. } => "internal",
        }
    }
}

impl From<reqwest::Error> for UpdateError {
    fn from(err: reqwest::Error) -> Self {
        let operation = if err.is_timeout() {
            "request (timed out)"
        } else if err.is_connect() {
            "connect"
        } else if err.is_body() || err.is_decode() {
            "read response body"
        } else {
            "request"
        };
        Self::network(operation, err)
    }
}

impl From<anyhow::Error> for UpdateError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<UpdateError>() {
            Ok(update_error) => update_error,
            Err(err) => Self::Other {
                message: format!("{err:#}"),
            },
        }
    }
}

impl Clone for UpdateError {
    fn clone(&self) -> Self {
        match self {
            Self::Network { operation, reason } => Self::Network {
                operation: operation.clone(),
                reason: reason.clone(),
            },
            Self::HttpStatus { url, status } => Self::HttpStatus {
                url: url.clone(),
                status: *status,
            },
            Self::Security { url, reason } => Self::Security {
                url: url.clone(),
                reason: reason.clone(),
            },
            Self::ChecksumMismatch { file, expected, actual } => Self::ChecksumMismatch {
                file: file.clone(),
                expected: expected.clone(),
                actual: actual.clone(),
            },
            Self::MissingChecksum { file } => Self::MissingChecksum { file: file.clone() },
            Self::UnsupportedMode { operation } => Self::UnsupportedMode {
                operation: operation.clone(),
            },
            Self::PermissionDenied { operation, path } => Self::PermissionDenied {
                operation: operation.clone(),
                path: path.clone(),
            },
            Self::UnsupportedAsset { name } => Self::UnsupportedAsset { name: name.clone() },
            Self::NoCompatibleAsset { os, arch } => Self::NoCompatibleAsset {
                os: os.clone(),
                arch: arch.clone(),
            },
            Self::NoUpdateAvailable { current } => Self::NoUpdateAvailable {
                current: current.clone(),
            },
            Self::AssetMissing { path } => Self::AssetMissing { path: path.clone() },
            // For errors that don't implement Clone, convert to Other
            Self::Io(e) => Self::Other {
                message: format!("IO error: {e}"),
            },
            Self::Json(e) => Self::Other {
                message: format!("JSON error: {e}"),
            },
            Self::Other { message } => Self::Other {
                message: message.clone(),
            },
        }
    }
}

/// Error wrapper carrying a suggestion and optional details for display.
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error
    pub error: UpdateError,
    /// What the user can do about it
    pub suggestion: Option<String>,
    /// Extra background
    pub details: Option<String>,
}

impl ErrorContext {
    /// Wrap an error without any suggestion.
    pub fn new(error: UpdateError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    /// Attach a suggestion.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Attach details.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print the error to stderr with colors.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error into an [`ErrorContext`] with a suggestion where one is known.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    if let Some(update_error) = error.downcast_ref::<UpdateError>() {
        return create_error_context(update_error.clone());
    }

    if let Some(io_error) = error.downcast_ref::<std::io::Error>() {
        if io_error.kind() == std::io::ErrorKind::PermissionDenied {
            return ErrorContext::new(UpdateError::PermissionDenied {
                operation: "file access".to_string(),
                path: "unknown".to_string(),
            })
            .with_suggestion("Check ownership of the application data directory");
        }
    }

    if let Some(toml_error) = error.downcast_ref::<toml::de::Error>() {
        return ErrorContext::new(UpdateError::Other {
            message: format!("Invalid configuration file: {toml_error}"),
        })
        .with_suggestion("Check the TOML syntax of the [update] table in your config file");
    }

    // Generic error - include the full error chain for better diagnostics
    let mut message = error.to_string();
    let chain: Vec<String> =
        error.chain().skip(1).map(std::string::ToString::to_string).collect();

    if !chain.is_empty() {
        message.push_str("\n\nCaused by:");
        for (i, cause) in chain.iter().enumerate() {
            message.push_str(&format!("\n  {}: {}", i + 1, cause));
        }
    }

    ErrorContext::new(UpdateError::Other { message })
}

fn create_error_context(error: UpdateError) -> ErrorContext {
    let suggestion = match &error {
        UpdateError::Network { .. } | UpdateError::HttpStatus { .. } => Some(
            "Check your internet connection and try again; the registry may be rate limiting",
        ),
        UpdateError::Security { .. } => {
            Some("Only HTTPS URLs on the configured allowed_hosts are ever contacted")
        }
        UpdateError::ChecksumMismatch { .. } => {
            Some("Run the download again; the staged file was corrupted or tampered with")
        }
        UpdateError::MissingChecksum { .. } => Some(
            "The release has no usable .sha256 sidecar; update manually from the release page",
        ),
        UpdateError::UnsupportedMode { .. } => {
            Some("Follow the manual steps from `upkeep instructions`")
        }
        UpdateError::PermissionDenied { .. } => Some(
            "Reinstall into a user-writable directory or run the application with elevated permissions",
        ),
        UpdateError::UnsupportedAsset { .. } | UpdateError::NoCompatibleAsset { .. } => {
            Some("Download and install the release manually for this platform")
        }
        UpdateError::NoUpdateAvailable { .. } => Some("Run `upkeep status --force` first"),
        UpdateError::AssetMissing { .. } => Some("Run `upkeep download` again"),
        UpdateError::Io(_) | UpdateError::Json(_) | UpdateError::Other { .. } => None,
    };

    let ctx = ErrorContext::new(error);
    match suggestion {
        Some(s) => ctx.with_suggestion(s),
        None => ctx,
    }
}
