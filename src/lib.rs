//! upkeep - incremental self-updater for locally deployed software bundles
//!
//! upkeep keeps an installation directory in sync with a zip archive
//! published at a URL or as a GitHub release asset. It is built for
//! installations that are in use while they update: binaries may be locked
//! by a running process, and users may have edited files in place.
//!
//! # Architecture Overview
//!
//! Two small files under the working directory carry state between runs:
//!
//! - the **recipe** (ledger) records the size and CRC-32 of every file the
//!   last applied archive installed
//! - the **anchor** records the effective time of that archive
//!
//! Each run asks the source for something newer than the anchor and, if
//! there is, reconciles the archive against the recipe:
//!
//! - unchanged files are not rewritten
//! - files the user modified are kept, the new version is written next to
//!   them as `name.orig.ext`
//! - `.exe` and `.dll` files are renamed to `name.1.exe`, `name.2.exe`, ...
//!   before the new one is written, which works even while they are running
//! - files the new archive no longer ships are removed, but only when they
//!   are still exactly as installed, and directories left empty are pruned
//!
//! # Core Modules
//!
//! - [`ledger`] - Fingerprint records, recipe file format, CRC-32
//! - [`rotate`] - Generational renaming of binaries
//! - [`source`] - Direct and GitHub release sources, conditional download
//! - [`reconcile`] - Archive extraction against the previous recipe
//! - [`cleanup`] - Orphan file removal and empty directory pruning
//! - [`update`] - The update, restore and sweep operations
//!
//! ## Supporting Modules
//!
//! - [`config`] - `upkeep.toml` parsing
//! - [`core`] - Error types and user-facing error rendering
//! - [`cli`] - Command line
//! - [`utils`] - Progress bars and log files
//!
//! # Example
//!
//! ```rust,no_run
//! use upkeep_cli::config::UpkeepConfig;
//! use upkeep_cli::update::{self, UpdateOutcome};
//! use upkeep_cli::utils::UpdateProgress;
//! use std::path::Path;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = UpkeepConfig::load_or_default(Path::new("upkeep.toml")).await?;
//! let ctx = config.context()?;
//! match update::update(&ctx, &UpdateProgress::hidden()).await? {
//!     UpdateOutcome::UpToDate => println!("nothing to do"),
//!     UpdateOutcome::Updated(summary) => println!("{} files written", summary.written),
//! }
//! # Ok(())
//! # }
//! ```

pub mod cleanup;
pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod ledger;
pub mod reconcile;
pub mod rotate;
pub mod source;
pub mod update;
pub mod utils;

// test_utils module is available for both unit tests and integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
