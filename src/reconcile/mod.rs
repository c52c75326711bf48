//! Archive reconciliation against the previous installation.
//!
//! [`reconcile`] walks a zip archive entry by entry and decides, for each
//! regular file, whether it has to be written at all and where:
//!
//! ```text
//! entry ──► strip leading segments ──► record in new ledger
//!             │
//!             ▼
//!      previous record? ── no ──────────────────────────────┐
//!             │ yes                                          │
//!             ▼                                              │
//!      compare with disk                                     │
//!        ├─ error ──────► leave file alone (log)             │
//!        ├─ mismatched ─► write to evacuated sibling ────────┤
//!        ├─ identical and same checksum ─► skip              │
//!        └─ missing / identical but changed ─────────────────┤
//!                                                            ▼
//!                                      rotate if binary, extract, set mtime
//! ```
//!
//! The new ledger always lists every file the archive declares, whether it
//! was written or not, so the next run knows what a pristine installation
//! of this archive looks like.
//!
//! Extraction is synchronous. The orchestrator runs it on a blocking thread.

mod paths;

pub use paths::{evacuate_name, insert_before_extension, native_path, strip_path};

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, warn};

use crate::ledger::{CompareResult, FingerprintRecord, Ledger};
use crate::rotate;

/// Tunables for one reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOptions {
    /// Leading path segments dropped from every entry name
    pub strip_count: usize,
    /// Generations kept when rotating binaries
    pub max_generations: usize,
}

/// Result of a reconciliation pass.
#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    /// Manifest of every regular file the archive declares
    pub ledger: Ledger,
    /// Entries extracted to disk
    pub written: usize,
    /// Entries left untouched (already correct, or inconclusive comparison)
    pub skipped: usize,
    /// Entries redirected to an evacuated sibling
    pub evacuated: usize,
    /// Existing binaries shifted into a rotation generation
    pub rotated: usize,
    /// Uncompressed bytes actually written
    pub bytes_written: u64,
    /// Uncompressed size of the whole archive
    pub total_bytes: u64,
}

/// Metadata of one archive entry, detached from the reader.
struct EntryInfo {
    name: String,
    size: u64,
    checksum: u32,
    modified: Option<SystemTime>,
}

/// What to do with one entry.
enum Plan {
    Skip,
    Write(PathBuf),
}

/// Extract `archive_path` into `target_dir`, reconciling against `previous`.
///
/// `progress` receives `(bytes_processed, total_bytes)` after every entry,
/// counting entries that were skipped too, so it tracks archive traversal
/// rather than disk writes.
///
/// # Errors
///
/// - The archive cannot be opened or an entry cannot be read (including a
///   CRC mismatch detected while decompressing)
/// - An entry escapes the target directory
/// - Rotating or writing a file fails
///
/// An I/O error while *comparing* an existing file is not an error: the file
/// is left as it is and the entry is counted as skipped.
pub fn reconcile(
    archive_path: &Path,
    target_dir: &Path,
    options: &ReconcileOptions,
    previous: &Ledger,
    progress: &mut dyn FnMut(u64, u64),
) -> Result<ReconcileReport> {
    let file = File::open(archive_path)
        .with_context(|| format!("Failed to open archive {}", archive_path.display()))?;
    let mut archive = zip::ZipArchive::new(BufReader::new(file))
        .with_context(|| format!("Failed to read archive {}", archive_path.display()))?;

    let mut report = ReconcileReport::default();
    for index in 0..archive.len() {
        let entry = archive
            .by_index_raw(index)
            .with_context(|| format!("Failed to read entry #{index} of archive"))?;
        report.total_bytes += entry.size();
    }
    info!(
        "Reconciling {} ({} entries, {} bytes) into {}",
        archive_path.display(),
        archive.len(),
        report.total_bytes,
        target_dir.display()
    );

    let mut processed = 0u64;
    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .with_context(|| format!("Failed to read entry #{index} of archive"))?;
        let size = entry.size();

        if !entry.is_dir() {
            let info = EntryInfo {
                name: entry.name().to_string(),
                size,
                checksum: entry.crc32(),
                modified: entry.last_modified().and_then(zip_time_to_system),
            };
            match plan_entry(&info, target_dir, options, previous, &mut report)? {
                Plan::Skip => report.skipped += 1,
                Plan::Write(destination) => {
                    write_entry(&mut entry, &destination, info.modified)?;
                    report.written += 1;
                    report.bytes_written += size;
                }
            }
        }

        processed += size;
        progress(processed, report.total_bytes);
    }

    info!(
        "Reconciled {} files: {} written, {} skipped, {} evacuated, {} rotated",
        report.ledger.len(),
        report.written,
        report.skipped,
        report.evacuated,
        report.rotated
    );
    Ok(report)
}

fn plan_entry(
    info: &EntryInfo,
    target_dir: &Path,
    options: &ReconcileOptions,
    previous: &Ledger,
    report: &mut ReconcileReport,
) -> Result<Plan> {
    let Some(relative) = strip_path(&info.name, options.strip_count)? else {
        debug!("Skipping entry '{}': nothing left after stripping", info.name);
        return Ok(Plan::Skip);
    };

    report.ledger.insert(FingerprintRecord::new(relative.clone(), info.size, info.checksum));

    let mut destination = native_path(target_dir, &relative);
    if let Some(record) = previous.get(&relative) {
        match record.compare_with_file(&destination) {
            Err(e) => {
                warn!("Failed to compare file {}, leaving it as is: {e:#}", destination.display());
                return Ok(Plan::Skip);
            }
            Ok(CompareResult::Mismatched) => {
                destination = evacuate_name(&destination);
                report.evacuated += 1;
                info!("{} was modified locally, writing {}", relative, destination.display());
            }
            Ok(CompareResult::Identical)
                if record.checksum == info.checksum && record.size == info.size =>
            {
                debug!("Unchanged: {relative}");
                return Ok(Plan::Skip);
            }
            Ok(_) => {}
        }
    }

    if rotate::is_target(&destination) {
        let existed = destination.exists();
        rotate::rotate(&destination, options.max_generations)?;
        if existed && options.max_generations > 0 {
            report.rotated += 1;
        }
    }

    Ok(Plan::Write(destination))
}

fn write_entry(reader: &mut impl Read, destination: &Path, modified: Option<SystemTime>) -> Result<()> {
    if let Some(parent) = destination.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    let mut file = File::create(destination)
        .with_context(|| format!("Failed to create {}", destination.display()))?;
    std::io::copy(reader, &mut file)
        .with_context(|| format!("Failed to extract {}", destination.display()))?;

    if let Some(time) = modified {
        if let Err(e) = file.set_modified(time) {
            warn!("Failed to set modification time of {}: {e}", destination.display());
        }
    }
    debug!("Extracted {}", destination.display());
    Ok(())
}

/// Zip timestamps carry no zone, they are taken as UTC.
fn zip_time_to_system(time: zip::DateTime) -> Option<SystemTime> {
    let date = chrono::NaiveDate::from_ymd_opt(
        i32::from(time.year()),
        u32::from(time.month()),
        u32::from(time.day()),
    )?;
    let datetime = date.and_hms_opt(
        u32::from(time.hour()),
        u32::from(time.minute()),
        u32::from(time.second()),
    )?;
    Some(SystemTime::from(datetime.and_utc()))
}
