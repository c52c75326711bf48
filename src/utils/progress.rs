//! Progress indicators for downloads and extraction
//!
//! Thin wrappers over `indicatif` with upkeep's styling. Every bar is hidden
//! when `UPKEEP_NO_PROGRESS` is set, so scripted runs and tests produce no
//! terminal noise.
//!
//! The engine never touches `indicatif` directly: it reports into an
//! [`UpdateProgress`], which is cheap to clone and can be moved onto the
//! blocking thread that runs the extraction.
//!
//! # Examples
//!
//! ```rust
//! use upkeep_cli::utils::progress::UpdateProgress;
//!
//! let progress = UpdateProgress::hidden();
//! progress.on_download(512, Some(1024));
//! progress.on_extract(10, 10);
//! progress.finish();
//! ```

use indicatif::{ProgressBar as IndicatifBar, ProgressDrawTarget, ProgressStyle as IndicatifStyle};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Environment variable that disables every progress bar.
pub const NO_PROGRESS_ENV: &str = "UPKEEP_NO_PROGRESS";

fn is_progress_disabled() -> bool {
    std::env::var_os(NO_PROGRESS_ENV).is_some()
}

/// A progress bar with upkeep styling.
#[derive(Clone)]
pub struct ProgressBar {
    inner: IndicatifBar,
    visible: bool,
    /// Whether the spinner style for an unknown total is applied
    spinner: Arc<AtomicBool>,
}

impl ProgressBar {
    /// Byte-counting bar. Starts hidden and only draws once it has a
    /// length or a position, so a run that finds nothing to do stays quiet.
    pub fn new_bytes(prefix: &'static str) -> Self {
        if is_progress_disabled() {
            return Self::hidden();
        }
        let bar = IndicatifBar::with_draw_target(None, ProgressDrawTarget::hidden());
        bar.set_style(ProgressStyle::download());
        bar.set_prefix(prefix);
        Self {
            inner: bar,
            visible: true,
            spinner: Arc::default(),
        }
    }

    /// A bar that never draws.
    pub fn hidden() -> Self {
        Self {
            inner: IndicatifBar::hidden(),
            visible: false,
            spinner: Arc::default(),
        }
    }

    /// Update position and (possibly unknown) length in one call.
    pub fn update(&self, position: u64, length: Option<u64>) {
        if self.visible && self.inner.is_hidden() {
            self.inner.set_draw_target(ProgressDrawTarget::stderr());
        }
        match length {
            Some(length) => {
                if self.inner.length() != Some(length) {
                    self.inner.set_length(length);
                }
                if self.spinner.swap(false, Ordering::Relaxed) {
                    self.inner.set_style(ProgressStyle::download());
                }
            }
            None => {
                if self.inner.length().is_some() {
                    self.inner.unset_length();
                }
                if !self.spinner.swap(true, Ordering::Relaxed) {
                    self.inner.set_style(ProgressStyle::bytes_only());
                }
            }
        }
        self.inner.set_position(position);
    }

    /// Remove the bar from the terminal.
    pub fn finish_and_clear(&self) {
        self.inner.finish_and_clear();
    }
}

/// Style presets.
pub struct ProgressStyle;

impl ProgressStyle {
    /// Bar with byte counts, used when the total is known.
    pub fn download() -> IndicatifStyle {
        IndicatifStyle::default_bar()
            .template("{prefix:>9.bold.cyan} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
            .unwrap_or_else(|_| IndicatifStyle::default_bar())
            .progress_chars("━╸━")
    }

    /// Spinner with a byte count, used when the total is unknown.
    pub fn bytes_only() -> IndicatifStyle {
        IndicatifStyle::default_spinner()
            .template("{prefix:>9.bold.cyan} {spinner:.cyan} {bytes} ({bytes_per_sec})")
            .unwrap_or_else(|_| IndicatifStyle::default_spinner())
    }
}

/// Progress sink of one update run: one bar for the download and one for
/// the extraction.
#[derive(Clone)]
pub struct UpdateProgress {
    download: ProgressBar,
    extract: ProgressBar,
}

impl UpdateProgress {
    /// Visible bars, unless `UPKEEP_NO_PROGRESS` is set.
    pub fn new() -> Self {
        Self {
            download: ProgressBar::new_bytes("Download"),
            extract: ProgressBar::new_bytes("Extract"),
        }
    }

    /// Bars that never draw.
    pub fn hidden() -> Self {
        Self {
            download: ProgressBar::hidden(),
            extract: ProgressBar::hidden(),
        }
    }

    /// Download callback: bytes received so far and the announced total.
    pub fn on_download(&self, received: u64, total: Option<u64>) {
        self.download.update(received, total);
    }

    /// Extraction callback: archive bytes processed and the archive total.
    pub fn on_extract(&self, processed: u64, total: u64) {
        self.extract.update(processed, Some(total));
    }

    /// Clear both bars.
    pub fn finish(&self) {
        self.download.finish_and_clear();
        self.extract.finish_and_clear();
    }
}

impl Default for UpdateProgress {
    fn default() -> Self {
        Self::new()
    }
}
