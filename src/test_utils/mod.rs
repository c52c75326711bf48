//! Test utilities for upkeep
//!
//! Helpers shared by unit tests and the integration suite:
//!
//! - [`init_test_logging`] - one-time tracing setup that plays well with the
//!   test harness
//! - [`ArchiveBuilder`] - zip fixtures with controlled names, contents and
//!   timestamps
//! - [`snapshot_tree`] - the files of a directory as a path-to-content map
//!
//! # Example
//!
//! ```rust,no_run
//! use upkeep_cli::test_utils::{ArchiveBuilder, snapshot_tree};
//! use std::path::Path;
//!
//! # fn example() -> anyhow::Result<()> {
//! let archive = ArchiveBuilder::new()
//!     .file("pkg/bin/app.exe", b"X")
//!     .file("pkg/doc/readme.txt", b"Y")
//!     .write_to(Path::new("/tmp/pkg.zip"))?;
//! let tree = snapshot_tree(Path::new("/tmp/target"));
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Once;
use tracing::Level;
use tracing_subscriber::EnvFilter;
use zip::write::SimpleFileOptions;

/// Global flag to ensure logging is only initialized once in tests
static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Only the first call has an effect. `level` wins over `RUST_LOG`; with
/// neither, tests run without a subscriber.
///
/// ```bash
/// RUST_LOG=upkeep_cli=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .try_init();
    });
}

/// Modification time of an entry: year, month, day, hour, minute, second.
pub type EntryTime = (u16, u8, u8, u8, u8, u8);

enum Entry {
    Dir(String),
    File {
        name: String,
        content: Vec<u8>,
        modified: Option<EntryTime>,
    },
}

/// Builds zip archives entry by entry, in the order given.
#[derive(Default)]
pub struct ArchiveBuilder {
    entries: Vec<Entry>,
}

impl ArchiveBuilder {
    /// Empty archive.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a directory entry. The name should end with `/`.
    pub fn dir(mut self, name: &str) -> Self {
        self.entries.push(Entry::Dir(name.to_string()));
        self
    }

    /// Add a file entry.
    pub fn file(mut self, name: &str, content: &[u8]) -> Self {
        self.entries.push(Entry::File {
            name: name.to_string(),
            content: content.to_vec(),
            modified: None,
        });
        self
    }

    /// Add a file entry with an explicit modification time.
    pub fn file_with_time(mut self, name: &str, content: &[u8], modified: EntryTime) -> Self {
        self.entries.push(Entry::File {
            name: name.to_string(),
            content: content.to_vec(),
            modified: Some(modified),
        });
        self
    }

    /// Encode the archive in memory.
    pub fn build(&self) -> Result<Vec<u8>> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for entry in &self.entries {
            match entry {
                Entry::Dir(name) => {
                    writer
                        .add_directory(name.as_str(), SimpleFileOptions::default())
                        .with_context(|| format!("Failed to add directory {name}"))?;
                }
                Entry::File {
                    name,
                    content,
                    modified,
                } => {
                    let mut options = SimpleFileOptions::default();
                    if let Some((year, month, day, hour, minute, second)) = *modified {
                        let time = zip::DateTime::from_date_and_time(
                            year, month, day, hour, minute, second,
                        )
                        .map_err(|e| anyhow::anyhow!("Invalid entry time for {name}: {e}"))?;
                        options = options.last_modified_time(time);
                    }
                    writer
                        .start_file(name.as_str(), options)
                        .with_context(|| format!("Failed to add file {name}"))?;
                    writer.write_all(content)?;
                }
            }
        }
        let cursor = writer.finish().context("Failed to finish archive")?;
        Ok(cursor.into_inner())
    }

    /// Write the archive to `path` and return the path.
    pub fn write_to(&self, path: &Path) -> Result<PathBuf> {
        std::fs::write(path, self.build()?)
            .with_context(|| format!("Failed to write archive {}", path.display()))?;
        Ok(path.to_path_buf())
    }
}

/// Every regular file below `root`, keyed by `/`-separated relative path.
///
/// A missing root yields an empty map.
pub fn snapshot_tree(root: &Path) -> BTreeMap<String, Vec<u8>> {
    walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| {
            let relative = entry.path().strip_prefix(root).ok()?;
            let key = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/");
            let content = std::fs::read(entry.path()).ok()?;
            Some((key, content))
        })
        .collect()
}
