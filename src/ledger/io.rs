//! Loading and saving the ledger file.
//!
//! Parsing is strict: one malformed line fails the whole load. Callers decide
//! what an unusable ledger means. The orchestrator goes through
//! [`Ledger::load_or_empty`], which falls back to an empty ledger (full
//! re-extraction) and never treats the failure as fatal.

use anyhow::{Context, Result};
use std::fmt::Write as _;
use std::fs::File;
use std::io::Write as _;
use std::path::Path;
use tracing::{debug, warn};

use super::{FingerprintRecord, Ledger};
use crate::core::UpkeepError;

impl Ledger {
    /// Load a ledger from disk.
    ///
    /// # Errors
    ///
    /// - The file does not exist (the [`std::io::Error`] with kind `NotFound`
    ///   is kept in the error chain)
    /// - The file cannot be read
    /// - Any line is malformed ([`UpkeepError::LedgerParse`])
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read recipe {}", path.display()))?;
        Self::parse(&content, &path.display().to_string())
    }

    /// Load a ledger, falling back to an empty one when it is unusable.
    ///
    /// A missing file is the normal first-run case and only logged at debug
    /// level. Any other failure is logged as a warning: the run continues as
    /// if nothing had been installed before.
    #[must_use]
    pub fn load_or_empty(path: &Path) -> Self {
        match Self::load(path) {
            Ok(ledger) => {
                debug!("Loaded recipe {} with {} records", path.display(), ledger.len());
                ledger
            }
            Err(e) if is_not_found(&e) => {
                debug!("No recipe at {}, starting from an empty one", path.display());
                Self::new()
            }
            Err(e) => {
                warn!("Failed to load recipe, all files will be extracted: {e:#}");
                Self::new()
            }
        }
    }

    /// Parse ledger text. `file` is only used in error messages.
    pub fn parse(content: &str, file: &str) -> Result<Self> {
        let mut ledger = Self::new();
        for (index, line) in content.lines().enumerate() {
            let record = parse_line(line).map_err(|reason| UpkeepError::LedgerParse {
                file: file.to_string(),
                line: index + 1,
                reason,
            })?;
            ledger.insert(record);
        }
        Ok(ledger)
    }

    /// Render the ledger in its on-disk format.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        for record in self.iter() {
            // Writing to a String cannot fail
            let _ = writeln!(out, "{}\t{}\t{:08x}", record.path, record.size, record.checksum);
        }
        out
    }

    /// Write the ledger to disk and flush it to stable storage.
    ///
    /// The write overwrites in place. A crash mid-write can leave a corrupt
    /// ledger, which the next run treats as "no previous state".
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut file = File::create(path)
            .with_context(|| format!("Failed to create recipe {}", path.display()))?;
        file.write_all(self.render().as_bytes())
            .with_context(|| format!("Failed to write recipe {}", path.display()))?;
        file.sync_all().with_context(|| format!("Failed to sync recipe {}", path.display()))?;
        debug!("Saved recipe {} with {} records", path.display(), self.len());
        Ok(())
    }
}

/// Whether an error chain bottoms out in a "file not found" I/O error.
pub(crate) fn is_not_found(error: &anyhow::Error) -> bool {
    error
        .chain()
        .filter_map(|e| e.downcast_ref::<std::io::Error>())
        .any(|e| e.kind() == std::io::ErrorKind::NotFound)
}

fn parse_line(line: &str) -> std::result::Result<FingerprintRecord, String> {
    // Split from the right so paths may contain spaces (but not tabs)
    let mut fields = line.rsplitn(3, '\t');
    let checksum = fields.next().unwrap_or_default();
    let size = fields.next().ok_or_else(|| "expected 3 tab-separated fields".to_string())?;
    let path = fields.next().ok_or_else(|| "expected 3 tab-separated fields".to_string())?;

    if path.is_empty() {
        return Err("empty path".to_string());
    }
    let size = size.parse::<u64>().map_err(|e| format!("invalid size '{size}': {e}"))?;
    if checksum.len() != 8
        || !checksum.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
    {
        return Err(format!("checksum '{checksum}' is not 8 lowercase hex digits"));
    }
    let checksum = u32::from_str_radix(checksum, 16)
        .map_err(|e| format!("invalid checksum '{checksum}': {e}"))?;

    Ok(FingerprintRecord::new(path, size, checksum))
}
