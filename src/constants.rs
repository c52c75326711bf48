//! Global constants used throughout the upkeep codebase.
//!
//! File names, default counts and timeouts that more than one module needs.
//! Keeping them here makes the on-disk layout discoverable in one place.

use std::time::Duration;

/// Default timeout for downloading an artifact (5 minutes).
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(300);

/// Default number of generations kept for rotated binaries.
pub const DEFAULT_EXE_ROTATE_COUNT: usize = 5;

/// Default number of log files kept in `log/`.
pub const DEFAULT_LOG_ROTATE_COUNT: usize = 5;

/// Default base URL of the GitHub REST API.
pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";

/// Default source set name.
pub const DEFAULT_SOURCE: &str = "release";

/// Default configuration file name, looked up in the current directory.
pub const CONFIG_FILE_NAME: &str = "upkeep.toml";

/// Name of the working directory created under the target directory.
pub const WORK_DIR_NAME: &str = "upkeep";

/// Ledger file name inside `var/<source>/`.
pub const RECIPE_FILE_NAME: &str = "recipe.txt";

/// Anchor file name inside `var/<source>/`.
pub const ANCHOR_FILE_NAME: &str = "anchor.txt";

/// Length in bytes of a persisted anchor (`YYYY-MM-DDTHH:MM:SS+00:00`).
pub const ANCHOR_LEN: usize = 25;

/// Suffix inserted before the extension of an evacuated file.
pub const EVACUATION_SUFFIX: &str = ".orig";

/// Release asset state that marks a fully uploaded asset.
pub const ASSET_STATE_UPLOADED: &str = "uploaded";
