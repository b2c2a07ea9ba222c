//! Core types shared by every part of the updater
//!
//! ## `error` - Error Handling
//!
//! - [`UpdateError`] - Enumerated failure categories of the update flow
//! - [`ErrorContext`] - User-friendly error wrapper with suggestions and details
//! - [`user_friendly_error`] - Convert any error to the user-friendly format
//!
//! Library operations return [`Result<T>`], an alias over [`UpdateError`]. The
//! binary and configuration loading work with `anyhow::Result` and convert at
//! the edge through [`user_friendly_error`].

pub mod error;

pub use error::{ErrorContext, UpdateError, user_friendly_error};

/// Result alias used by the update subsystem.
pub type Result<T, E = UpdateError> = std::result::Result<T, E>;
