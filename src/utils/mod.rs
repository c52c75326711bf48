//! Terminal and logging helpers
//!
//! - [`progress`] - Progress bars for downloads and extraction
//! - [`logging`] - Per-run log files and subscriber setup

pub mod logging;
pub mod progress;

pub use progress::{ProgressBar, UpdateProgress};
