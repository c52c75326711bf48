//! Path helpers for mapping archive entries onto the target directory.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::constants::EVACUATION_SUFFIX;
use crate::core::UpkeepError;

/// Drop the first `count` segments of an archive entry name.
///
/// Both `/` and `\` separate segments. Empty and `.` segments inside the
/// remainder are dropped, so the result is always a clean relative path
/// joined with `/`.
///
/// Returns `Ok(None)` when nothing is left (for example the root folder
/// entry of the archive itself).
///
/// # Errors
///
/// [`UpkeepError::UnsafeEntryPath`] if the entry name or the stripped
/// remainder is absolute, or a remaining segment is `..`, looks like a drive
/// prefix, or contains a control character. The first three would let the
/// entry escape the target directory, the last cannot be stored in the
/// recipe.
///
/// # Examples
///
/// ```rust
/// use upkeep_cli::reconcile::strip_path;
///
/// assert_eq!(strip_path("vim80/gvim.exe", 1).unwrap().as_deref(), Some("gvim.exe"));
/// assert_eq!(strip_path("vim80/", 1).unwrap(), None);
/// assert!(strip_path("pkg/../../etc/passwd", 1).is_err());
/// ```
pub fn strip_path(name: &str, count: usize) -> Result<Option<String>, UpkeepError> {
    if name.starts_with(['/', '\\']) {
        return Err(unsafe_entry(name));
    }
    let mut remainder = name.split(['/', '\\']).skip(count).peekable();
    // A remainder starting with a separator is absolute
    if remainder.peek() == Some(&"") && remainder.clone().any(|s| !s.is_empty()) {
        return Err(unsafe_entry(name));
    }

    let mut segments = Vec::new();
    for segment in remainder {
        match segment {
            "" | "." => {}
            ".." => return Err(unsafe_entry(name)),
            s if s.contains(':') || s.chars().any(char::is_control) => {
                return Err(unsafe_entry(name));
            }
            s => segments.push(s),
        }
    }
    if segments.is_empty() {
        Ok(None)
    } else {
        Ok(Some(segments.join("/")))
    }
}

fn unsafe_entry(name: &str) -> UpkeepError {
    UpkeepError::UnsafeEntryPath {
        entry: name.to_string(),
    }
}

/// Sibling name used instead of a locally modified file.
///
/// Inserts `.orig` before the extension: `app.cfg` becomes `app.orig.cfg`,
/// `Makefile` becomes `Makefile.orig`. The extension is kept so the file
/// still opens with the same program and rotation still recognises
/// binaries.
#[must_use]
pub fn evacuate_name(path: &Path) -> PathBuf {
    insert_before_extension(path, EVACUATION_SUFFIX)
}

/// Insert `infix` between the stem and the extension of the file name.
#[must_use]
pub fn insert_before_extension(path: &Path, infix: &str) -> PathBuf {
    let Some(stem) = path.file_stem() else {
        let mut raw = path.as_os_str().to_os_string();
        raw.push(infix);
        return PathBuf::from(raw);
    };
    let mut name = OsString::from(stem);
    name.push(infix);
    if let Some(ext) = path.extension() {
        name.push(".");
        name.push(ext);
    }
    path.with_file_name(name)
}

/// Join a `/`-separated relative path onto `base` using native separators.
#[must_use]
pub fn native_path(base: &Path, relative: &str) -> PathBuf {
    relative.split('/').fold(base.to_path_buf(), |acc, segment| acc.join(segment))
}
