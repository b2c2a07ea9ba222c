//! Terminal progress indicators built on `indicatif`
//!
//! Progress output goes to stderr so stdout stays machine-readable. Setting the
//! `UPKEEP_NO_PROGRESS` environment variable hides every indicator, which is
//! what CI and the integration tests do.

use indicatif::{ProgressBar as IndicatifBar, ProgressStyle as IndicatifStyle};
use std::time::Duration;

fn is_progress_disabled() -> bool {
    std::env::var("UPKEEP_NO_PROGRESS").is_ok()
}

/// A progress bar with consistent styling.
///
/// Cloning shares the underlying bar, so a clone can be moved into a progress
/// callback while the original finishes the bar afterwards.
#[derive(Clone)]
pub struct ProgressBar {
    inner: IndicatifBar,
}

impl ProgressBar {
    /// Creates a spinner for work of unknown size.
    pub fn new_spinner() -> Self {
        let bar = if is_progress_disabled() {
            IndicatifBar::hidden()
        } else {
            let bar = IndicatifBar::new_spinner();
            bar.set_style(ProgressStyle::spinner());
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        };
        Self { inner: bar }
    }

    /// Sets the message shown next to the bar.
    pub fn set_message(&self, msg: impl Into<String>) {
        self.inner.set_message(msg.into());
    }

    /// Sets the total length, switching a spinner into a bar once the size is known.
    pub fn set_length(&self, len: u64) {
        if self.inner.length() != Some(len) {
            self.inner.set_length(len);
            if !self.inner.is_hidden() {
                self.inner.set_style(ProgressStyle::download());
            }
        }
    }

    /// Sets the absolute position.
    pub fn set_position(&self, pos: u64) {
        self.inner.set_position(pos);
    }

    /// Finishes and removes the bar.
    pub fn finish_and_clear(&self) {
        self.inner.finish_and_clear();
    }
}

/// Styles shared by every indicator.
pub struct ProgressStyle;

impl ProgressStyle {
    /// Byte counter with transfer rate and ETA.
    pub fn download() -> IndicatifStyle {
        IndicatifStyle::default_bar()
            .template(
                "{msg:.bold.cyan} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})",
            )
            .unwrap_or_else(|_| IndicatifStyle::default_bar())
            .progress_chars("━╸━")
    }

    /// Braille spinner with a message.
    pub fn spinner() -> IndicatifStyle {
        IndicatifStyle::default_spinner()
            .template("{spinner:.cyan} {msg} {bytes}")
            .unwrap_or_else(|_| IndicatifStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
    }
}
