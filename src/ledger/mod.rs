//! Fingerprint ledger ("recipe") of an installation.
//!
//! The ledger records, for every file the last applied archive declared, the
//! relative path, the size and the CRC-32 the file had when it was written.
//! It is the only memory the updater keeps between runs besides the anchor
//! timestamp, and it answers one question: *is the file on disk still exactly
//! what we put there?*
//!
//! # Lifecycle
//!
//! 1. Read at the start of a run and used as the *previous* ledger
//! 2. Built from scratch while the archive is reconciled (the *new* ledger)
//! 3. Saved over the old one once reconciliation succeeded
//!
//! A missing or unreadable ledger only costs performance: every file is then
//! treated as unknown and extracted again. It never causes data loss, so the
//! write path is a plain overwrite followed by `fsync` rather than an atomic
//! swap.
//!
//! # File Format
//!
//! One record per line, tab separated, checksum as 8 lowercase hex digits:
//!
//! ```text
//! bin/app.exe	12345	0a1b2c3d
//! doc/readme.txt	42	cbf43926
//! ```
//!
//! # Comparing against disk
//!
//! [`FingerprintRecord::compare_with_file`] stats the file first and only
//! hashes it when the size matches, so the common "file was replaced" case
//! costs one `stat`.

mod checksum;
mod io;

pub(crate) use io::is_not_found;

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::Path;

/// Expected on-disk state of one installed file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerprintRecord {
    /// Path relative to the target directory, `/`-separated
    pub path: String,
    /// Size of the file content in bytes
    pub size: u64,
    /// IEEE CRC-32 of the file content
    pub checksum: u32,
}

/// Outcome of comparing a [`FingerprintRecord`] with a file on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareResult {
    /// No file exists at the path
    Missing,
    /// The file exists but its size or checksum differs
    Mismatched,
    /// Size and checksum both match
    Identical,
}

impl FingerprintRecord {
    /// Create a new record.
    pub fn new(path: impl Into<String>, size: u64, checksum: u32) -> Self {
        Self {
            path: path.into(),
            size,
            checksum,
        }
    }

    /// Compare this record with the file at `file_path`.
    ///
    /// A size difference short-circuits to [`CompareResult::Mismatched`]
    /// without hashing. A file that disappears between `stat` and hashing is
    /// reported as [`CompareResult::Missing`].
    ///
    /// # Errors
    ///
    /// Any I/O failure other than "not found" is returned. Callers must treat
    /// an error as *inconclusive*: never overwrite or delete on it.
    pub fn compare_with_file(&self, file_path: &Path) -> Result<CompareResult> {
        let metadata = match std::fs::metadata(file_path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(CompareResult::Missing);
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to stat {}", file_path.display()));
            }
        };

        if metadata.len() != self.size {
            return Ok(CompareResult::Mismatched);
        }

        let checksum = match Ledger::compute_checksum(file_path) {
            Ok(checksum) => checksum,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(CompareResult::Missing);
            }
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to checksum {}", file_path.display()));
            }
        };

        if checksum == self.checksum {
            Ok(CompareResult::Identical)
        } else {
            Ok(CompareResult::Mismatched)
        }
    }
}

/// Mapping of relative path to [`FingerprintRecord`].
///
/// Keys are unique. Iteration is in path order, which keeps saved ledgers
/// stable across runs and easy to diff.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ledger {
    records: BTreeMap<String, FingerprintRecord>,
}

impl Ledger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a record, replacing any record with the same path.
    pub fn insert(&mut self, record: FingerprintRecord) -> Option<FingerprintRecord> {
        self.records.insert(record.path.clone(), record)
    }

    /// Look up the record for a relative path.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&FingerprintRecord> {
        self.records.get(path)
    }

    /// Whether a record exists for a relative path.
    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.records.contains_key(path)
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the ledger has no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Iterate over records in path order.
    pub fn iter(&self) -> impl Iterator<Item = &FingerprintRecord> {
        self.records.values()
    }

    /// Records present in `self` but absent from `newer`.
    pub fn orphaned_by<'a>(
        &'a self,
        newer: &'a Ledger,
    ) -> impl Iterator<Item = &'a FingerprintRecord> + 'a {
        self.iter().filter(move |record| !newer.contains(&record.path))
    }
}

impl FromIterator<FingerprintRecord> for Ledger {
    fn from_iter<T: IntoIterator<Item = FingerprintRecord>>(iter: T) -> Self {
        let mut ledger = Self::new();
        for record in iter {
            ledger.insert(record);
        }
        ledger
    }
}
