//! Generational rotation of binaries that may be locked.
//!
//! A running program keeps its executable and libraries open, and on some
//! platforms an open file cannot be overwritten or deleted, but it *can* be
//! renamed. Before a new binary is written, the existing one is shifted
//! along a chain of numbered generations:
//!
//! ```text
//! app.exe -> app.1.exe -> app.2.exe -> ... -> app.N.exe (deleted)
//! ```
//!
//! The bare name is then free for the new file while the running process
//! keeps using the renamed one. [`sweep`] removes the numbered generations
//! once they are no longer needed.
//!
//! Missing generations are normal (a fresh install has none), so a rename
//! whose source does not exist is skipped. Every other failure aborts the
//! rotation and is returned to the caller.

use anyhow::{Context, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Extensions (lowercase, without dot) of files that get rotated.
const ROTATION_EXTENSIONS: &[&str] = &["exe", "dll"];

/// Whether `path` names a binary that must be rotated instead of overwritten.
///
/// The check is on the extension only and ignores case.
///
/// # Examples
///
/// ```rust
/// use std::path::Path;
/// use upkeep_cli::rotate::is_target;
///
/// assert!(is_target(Path::new("bin/Vim.EXE")));
/// assert!(is_target(Path::new("libintl.dll")));
/// assert!(!is_target(Path::new("vimrc_example.vim")));
/// ```
#[must_use]
pub fn is_target(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ROTATION_EXTENSIONS.iter().any(|t| ext.eq_ignore_ascii_case(t)))
}

/// Path of generation `index` of `path`.
///
/// Generation 0 is `path` itself. Higher generations insert `.<index>`
/// before the extension: `dir/app.exe` becomes `dir/app.2.exe`.
#[must_use]
pub fn generation_path(path: &Path, index: usize) -> PathBuf {
    if index == 0 {
        return path.to_path_buf();
    }
    crate::reconcile::insert_before_extension(path, &format!(".{index}"))
}

/// Shift the generation chain of `path` up by one.
///
/// Deletes generation `max_generations` if present, then renames generation
/// `i` to `i + 1` for `i` from `max_generations - 1` down to 0. The strictly
/// descending order guarantees a generation is never overwritten before it
/// moved. Afterwards `path` itself no longer exists.
///
/// `max_generations == 0` disables rotation; the file is left alone.
///
/// # Errors
///
/// Any failure to delete the oldest generation or rename a generation other
/// than "source does not exist".
pub fn rotate(path: &Path, max_generations: usize) -> Result<()> {
    if max_generations == 0 {
        return Ok(());
    }

    let oldest = generation_path(path, max_generations);
    match std::fs::remove_file(&oldest) {
        Ok(()) => debug!("Deleted oldest generation {}", oldest.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => {
            return Err(e).with_context(|| {
                format!("Failed to delete oldest generation {}", oldest.display())
            });
        }
    }

    let mut destination = oldest;
    for index in (0..max_generations).rev() {
        let source = generation_path(path, index);
        match std::fs::rename(&source, &destination) {
            Ok(()) => debug!("Rotated {} -> {}", source.display(), destination.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to rotate {} to {}", source.display(), destination.display())
                });
            }
        }
        destination = source;
    }
    Ok(())
}

/// Delete every numbered generation (1 through `max_generations`) of `path`.
///
/// Generation 0, the live file, is never touched. Generations that do not
/// exist are skipped, and so are directories that happen to carry a
/// generation name.
///
/// Returns the paths that were deleted.
pub fn sweep(path: &Path, max_generations: usize) -> Result<Vec<PathBuf>> {
    let mut deleted = Vec::new();
    for index in 1..=max_generations {
        let generation = generation_path(path, index);
        let metadata = match std::fs::metadata(&generation) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to stat {}", generation.display()));
            }
        };
        if metadata.is_dir() {
            continue;
        }
        std::fs::remove_file(&generation)
            .with_context(|| format!("Failed to delete {}", generation.display()))?;
        debug!("Swept {}", generation.display());
        deleted.push(generation);
    }
    Ok(deleted)
}
