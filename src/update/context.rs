//! Everything one run needs, and the on-disk layout of the working directory.
//!
//! ```text
//! <work_dir>/
//! ├── log/                    one log file per run
//! ├── tmp/                    downloaded archives
//! └── var/<source name>/
//!     ├── recipe.txt          ledger of the last applied archive
//!     └── anchor.txt          effective time of the last applied archive
//! ```

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use std::fs::File;
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::constants::{ANCHOR_FILE_NAME, ANCHOR_LEN, RECIPE_FILE_NAME};
use crate::source::{FetchSettings, SourceDescriptor};

/// Explicit configuration of one update, restore or sweep run.
#[derive(Debug, Clone)]
pub struct UpdateContext {
    /// Installation directory the archive is extracted into
    pub target_dir: PathBuf,
    /// Working directory holding `log/`, `tmp/` and `var/`
    pub work_dir: PathBuf,
    /// The source chosen for this platform
    pub source: SourceDescriptor,
    /// Generations kept when rotating binaries
    pub exe_rotate_count: usize,
    /// Network settings
    pub fetch: FetchSettings,
}

impl UpdateContext {
    /// Directory for log files.
    #[must_use]
    pub fn log_dir(&self) -> PathBuf {
        self.work_dir.join("log")
    }

    /// Directory for downloaded archives.
    #[must_use]
    pub fn tmp_dir(&self) -> PathBuf {
        self.work_dir.join("tmp")
    }

    /// Per-source state directory.
    #[must_use]
    pub fn var_dir(&self) -> PathBuf {
        self.work_dir.join("var").join(self.source.name())
    }

    /// Path of the ledger file.
    #[must_use]
    pub fn recipe_path(&self) -> PathBuf {
        self.var_dir().join(RECIPE_FILE_NAME)
    }

    /// Path of the anchor file.
    #[must_use]
    pub fn anchor_path(&self) -> PathBuf {
        self.var_dir().join(ANCHOR_FILE_NAME)
    }

    /// Create the target directory and every working directory.
    pub fn prepare(&self) -> Result<()> {
        for dir in [
            self.target_dir.clone(),
            self.work_dir.clone(),
            self.log_dir(),
            self.tmp_dir(),
            self.var_dir(),
        ] {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create directory {}", dir.display()))?;
        }
        Ok(())
    }

    /// Time of the last applied archive, `None` if never applied.
    ///
    /// A missing, short or unparsable anchor file reads as `None`, which
    /// forces a full fetch.
    #[must_use]
    pub fn read_anchor(&self) -> Option<DateTime<Utc>> {
        read_anchor_file(&self.anchor_path())
    }

    /// Persist the anchor. On failure the anchor file is removed so the next
    /// run re-verifies instead of trusting a partial timestamp.
    pub fn write_anchor(&self, time: DateTime<Utc>) -> Result<()> {
        let path = self.anchor_path();
        if let Err(e) = write_anchor_file(&path, time) {
            if let Err(remove) = remove_if_exists(&path) {
                warn!("Failed to remove anchor {} after a failed write: {remove}", path.display());
            }
            return Err(e);
        }
        debug!("Anchor set to {}", render_anchor(time));
        Ok(())
    }

    /// Delete the anchor file if it exists.
    pub fn reset_anchor(&self) -> Result<()> {
        let path = self.anchor_path();
        remove_if_exists(&path)
            .with_context(|| format!("Failed to remove anchor {}", path.display()))
    }

    /// Delete the ledger file if it exists.
    pub fn reset_recipe(&self) -> Result<()> {
        let path = self.recipe_path();
        remove_if_exists(&path)
            .with_context(|| format!("Failed to remove recipe {}", path.display()))
    }
}

/// Anchor text: RFC 3339 with seconds and an explicit `+00:00` offset, so it
/// is always exactly [`ANCHOR_LEN`] bytes.
#[must_use]
pub fn render_anchor(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, false)
}

fn read_anchor_file(path: &Path) -> Option<DateTime<Utc>> {
    let mut buf = [0u8; ANCHOR_LEN];
    let mut file = File::open(path).ok()?;
    if let Err(e) = file.read_exact(&mut buf) {
        debug!("Ignoring short anchor {}: {e}", path.display());
        return None;
    }
    let text = std::str::from_utf8(&buf).ok()?;
    match DateTime::parse_from_rfc3339(text) {
        Ok(time) => Some(time.with_timezone(&Utc)),
        Err(e) => {
            warn!("Ignoring invalid anchor {}: {e}", path.display());
            None
        }
    }
}

fn write_anchor_file(path: &Path, time: DateTime<Utc>) -> Result<()> {
    let mut file = File::create(path)
        .with_context(|| format!("Failed to create anchor {}", path.display()))?;
    file.write_all(render_anchor(time).as_bytes())
        .with_context(|| format!("Failed to write anchor {}", path.display()))?;
    file.sync_all().with_context(|| format!("Failed to sync anchor {}", path.display()))?;
    Ok(())
}

fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        other => other,
    }
}
