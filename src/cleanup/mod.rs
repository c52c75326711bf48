//! Removal of files and directories the new archive no longer ships.
//!
//! Cleanup is tidiness, not correctness: nothing in here aborts a run.
//! Every failure is logged and the affected path is simply kept.
//!
//! # Files
//!
//! [`clean_files`] only deletes a file when its content is still exactly what
//! the previous ledger recorded. A file the user edited, or one that could
//! not be read, survives.
//!
//! # Directories
//!
//! [`clean_dirs`] builds a tree of every directory mentioned in the previous
//! ledger and prunes it bottom-up:
//!
//! ```text
//! target/            never removed
//! ├── doc/           removed if empty after its children were visited
//! │   └── old/       removed first
//! └── plugin/        kept: holds an untracked file, so removal fails
//!     └── cache/     kept children keep their parents
//! ```

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::ledger::{CompareResult, Ledger};
use crate::reconcile::native_path;

/// Outcome of [`clean_files`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Relative paths that were deleted
    pub removed: Vec<String>,
    /// Relative paths kept because they were modified, unreadable, or
    /// could not be deleted
    pub kept: Vec<String>,
}

/// Delete files listed in `previous` but not in `current`.
///
/// A file already gone is fine and counted as neither removed nor kept.
pub fn clean_files(target_dir: &Path, previous: &Ledger, current: &Ledger) -> CleanupReport {
    let mut report = CleanupReport::default();

    for record in previous.orphaned_by(current) {
        let path = native_path(target_dir, &record.path);
        match record.compare_with_file(&path) {
            Ok(CompareResult::Identical) => match std::fs::remove_file(&path) {
                Ok(()) => {
                    debug!("Removed {}", path.display());
                    report.removed.push(record.path.clone());
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    warn!("Failed to remove {}: {e}", path.display());
                    report.kept.push(record.path.clone());
                }
            },
            Ok(CompareResult::Missing) => {}
            Ok(CompareResult::Mismatched) => {
                info!("Keeping {}: modified since it was installed", path.display());
                report.kept.push(record.path.clone());
            }
            Err(e) => {
                warn!("Keeping {}: {e:#}", path.display());
                report.kept.push(record.path.clone());
            }
        }
    }

    if !report.removed.is_empty() {
        info!("Removed {} obsolete files", report.removed.len());
    }
    report
}

/// Remove every empty directory under `target_dir` that `previous` mentions.
///
/// `target_dir` itself is never removed. Returns the number of directories
/// deleted.
pub fn clean_dirs(target_dir: &Path, previous: &Ledger) -> usize {
    let mut root = DirectoryNode::default();
    for record in previous.iter() {
        let mut segments: Vec<&str> = record.path.split('/').collect();
        // The last segment is the file itself
        segments.pop();
        root.insert(&segments);
    }

    let mut removed = 0;
    for (name, child) in &root.children {
        child.prune(&target_dir.join(name), &mut removed);
    }
    if removed > 0 {
        info!("Removed {removed} empty directories");
    }
    removed
}

/// One directory of the cleanup tree. Children are owned by value.
#[derive(Debug, Default)]
struct DirectoryNode {
    children: BTreeMap<String, DirectoryNode>,
}

impl DirectoryNode {
    fn insert(&mut self, segments: &[&str]) {
        if let Some((first, rest)) = segments.split_first() {
            self.children.entry((*first).to_string()).or_default().insert(rest);
        }
    }

    /// Post-order prune. Returns `true` when this directory was kept.
    fn prune(&self, path: &Path, removed: &mut usize) -> bool {
        let mut keep = false;
        for (name, child) in &self.children {
            keep |= child.prune(&path.join(name), removed);
        }
        if keep {
            return true;
        }

        match std::fs::remove_dir(path) {
            Ok(()) => {
                debug!("Removed directory {}", path.display());
                *removed += 1;
                false
            }
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => {
                debug!("Keeping directory {}: {e}", path.display());
                true
            }
        }
    }
}
