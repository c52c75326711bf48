//! Log file management and subscriber setup.
//!
//! Every run writes a fresh log file into `<work_dir>/log/`, named after the
//! UTC start time (`20240102T030405Z.log`). Only the newest
//! `log_rotate_count` files are kept; files in the directory that do not
//! follow that naming are never touched.
//!
//! [`init_logging`] is for the binary only. Library code just emits
//! `tracing` events, and tests install their own subscriber through
//! `test_utils::init_test_logging`.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

const LOG_NAME_FORMAT: &str = "%Y%m%dT%H%M%SZ";
const LOG_EXTENSION: &str = "log";

/// Log file name for a run started at `time`.
#[must_use]
pub fn log_file_name(time: DateTime<Utc>) -> String {
    format!("{}.{LOG_EXTENSION}", time.format(LOG_NAME_FORMAT))
}

fn is_log_file_name(name: &str) -> bool {
    name.strip_suffix(".log")
        .is_some_and(|stem| NaiveDateTime::parse_from_str(stem, LOG_NAME_FORMAT).is_ok())
}

/// Delete the oldest log files in `dir` until at most `keep` remain.
///
/// Returns the deleted paths. The names sort chronologically, so the oldest
/// files are the lexicographically smallest.
pub fn prune_logs(dir: &Path, keep: usize) -> Result<Vec<PathBuf>> {
    let mut logs: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to list log directory {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_ok_and(|t| t.is_file()))
        .filter(|entry| entry.file_name().to_str().is_some_and(is_log_file_name))
        .map(|entry| entry.path())
        .collect();
    logs.sort();

    let excess = logs.len().saturating_sub(keep);
    let mut deleted = Vec::with_capacity(excess);
    for path in logs.into_iter().take(excess) {
        std::fs::remove_file(&path)
            .with_context(|| format!("Failed to delete old log {}", path.display()))?;
        deleted.push(path);
    }
    Ok(deleted)
}

/// Make room for one more log and create it.
///
/// Returns `None` when `keep` is zero, which disables file logging. Failing
/// to prune old logs is only a warning.
pub fn create_log_file(dir: &Path, keep: usize, now: DateTime<Utc>) -> Result<Option<File>> {
    if keep == 0 {
        return Ok(None);
    }
    if let Err(e) = prune_logs(dir, keep - 1) {
        warn!("Failed to rotate log files: {e:#}");
    }
    let path = dir.join(log_file_name(now));
    let file = File::create(&path)
        .with_context(|| format!("Failed to create log file {}", path.display()))?;
    Ok(Some(file))
}

/// Install the global subscriber: stderr at `stderr_level` (or `RUST_LOG`
/// when set), plus `info` and above into `log_file` when given.
pub fn init_logging(stderr_level: LevelFilter, log_file: Option<File>) -> Result<()> {
    let stderr_filter = if std::env::var_os("RUST_LOG").is_some() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::default().add_directive(stderr_level.into())
    };
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .with_filter(stderr_filter);

    let file_layer = log_file.map(|file| {
        fmt::layer()
            .with_writer(Arc::new(file))
            .with_ansi(false)
            .with_target(true)
            .with_filter(LevelFilter::INFO)
    });

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to install logger")
}
