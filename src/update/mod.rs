//! Update orchestration: resolve, download, reconcile, clean up, persist.
//!
//! ```text
//! read anchor ──► resolve source ──► NotModified ──► UpToDate
//!                      │
//!                      ▼ Downloaded
//!               reconcile archive (blocking thread)
//!                      │
//!                      ▼
//!        clean orphaned files, prune empty directories
//!                      │
//!                      ▼
//!        save ledger, write anchor, remove archive ──► Updated
//! ```
//!
//! Any failure up to and including reconciliation aborts the run before the
//! anchor moves, so the next run retries the same archive. Cleanup, ledger
//! saving and archive removal only log their failures.
//!
//! [`restore`] deletes the anchor and ledger first, which forces a download
//! and treats every installed file as unknown. [`sweep`] deletes the rotated
//! generations of every binary the current ledger tracks.

mod context;

pub use context::{UpdateContext, render_anchor};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::cleanup::{clean_dirs, clean_files};
use crate::core::UpkeepError;
use crate::ledger::{Ledger, is_not_found};
use crate::reconcile::{ReconcileOptions, native_path, reconcile};
use crate::rotate;
use crate::source::{Artifact, Fetcher, Resolution};
use crate::utils::progress::UpdateProgress;

/// Result of [`update`] and [`restore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The source has nothing newer than the anchor.
    UpToDate,
    /// A newer archive was applied.
    Updated(UpdateSummary),
}

/// What an applied update did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateSummary {
    /// Name of the source the archive came from
    pub source: String,
    /// The new anchor
    pub anchor_time: DateTime<Utc>,
    /// Files the archive declares
    pub files: usize,
    /// Files extracted
    pub written: usize,
    /// Files already up to date
    pub skipped: usize,
    /// Files written next to a locally modified original
    pub evacuated: usize,
    /// Binaries moved aside
    pub rotated: usize,
    /// Bytes extracted
    pub bytes_written: u64,
    /// Obsolete files deleted
    pub removed_files: usize,
    /// Obsolete files kept because they were modified or unreadable
    pub kept_files: usize,
    /// Empty directories deleted
    pub removed_dirs: usize,
}

/// Bring the target directory up to date with the source.
pub async fn update(ctx: &UpdateContext, progress: &UpdateProgress) -> Result<UpdateOutcome> {
    ctx.prepare()?;
    info!("context: target={} source={}", ctx.target_dir.display(), ctx.source);

    let pivot = ctx.read_anchor();
    match pivot {
        Some(pivot) => debug!("Anchor is {}", render_anchor(pivot)),
        None => debug!("No anchor, fetching unconditionally"),
    }

    let fetcher = Fetcher::new(ctx.fetch.clone())?;
    let download_progress = progress.clone();
    let resolution = ctx
        .source
        .resolve(&fetcher, pivot, &ctx.tmp_dir(), &mut |received, total| {
            download_progress.on_download(received, total);
        })
        .await?;

    let artifact = match resolution {
        Resolution::NotModified => {
            progress.finish();
            info!("No updates found for {}", ctx.source.name());
            return Ok(UpdateOutcome::UpToDate);
        }
        Resolution::Downloaded(artifact) => artifact,
    };

    let summary = apply(ctx, &artifact, progress).await;
    progress.finish();
    let summary = summary?;

    if let Err(e) = std::fs::remove_file(&artifact.path) {
        warn!("Failed to remove downloaded archive {}: {e}", artifact.path.display());
    }

    info!(
        "Updated {}: {} written, {} skipped, {} evacuated, {} rotated, {} removed",
        summary.source,
        summary.written,
        summary.skipped,
        summary.evacuated,
        summary.rotated,
        summary.removed_files
    );
    Ok(UpdateOutcome::Updated(summary))
}

/// Forget the previous installation state, then [`update`].
pub async fn restore(ctx: &UpdateContext, progress: &UpdateProgress) -> Result<UpdateOutcome> {
    ctx.prepare()?;
    info!("Restoring {} from scratch", ctx.target_dir.display());
    ctx.reset_anchor()?;
    ctx.reset_recipe()?;
    update(ctx, progress).await
}

/// Delete the rotated generations of every binary listed in the ledger.
///
/// # Errors
///
/// [`UpkeepError::LedgerNotFound`] when no ledger exists, and any failure
/// to load it or to delete a generation.
pub fn sweep(ctx: &UpdateContext) -> Result<Vec<PathBuf>> {
    let recipe = ctx.recipe_path();
    let ledger = match Ledger::load(&recipe) {
        Ok(ledger) => ledger,
        Err(e) if is_not_found(&e) => {
            return Err(UpkeepError::LedgerNotFound {
                path: recipe.display().to_string(),
            }
            .into());
        }
        Err(e) => return Err(e),
    };

    let mut swept = Vec::new();
    for record in ledger.iter() {
        let path = native_path(&ctx.target_dir, &record.path);
        if rotate::is_target(&path) {
            swept.extend(rotate::sweep(&path, ctx.exe_rotate_count)?);
        }
    }
    info!("Swept {} rotated files", swept.len());
    Ok(swept)
}

async fn apply(
    ctx: &UpdateContext,
    artifact: &Artifact,
    progress: &UpdateProgress,
) -> Result<UpdateSummary> {
    let recipe = ctx.recipe_path();
    let previous = Ledger::load_or_empty(&recipe);
    let options = ReconcileOptions {
        strip_count: ctx.source.strip_count(),
        max_generations: ctx.exe_rotate_count,
    };

    let archive = artifact.path.clone();
    let target_dir = ctx.target_dir.clone();
    let extract_progress = progress.clone();
    let (report, cleanup, removed_dirs) = tokio::task::spawn_blocking(move || {
        let report =
            reconcile(&archive, &target_dir, &options, &previous, &mut |processed, total| {
                extract_progress.on_extract(processed, total);
            })?;
        let cleanup = clean_files(&target_dir, &previous, &report.ledger);
        let removed_dirs = clean_dirs(&target_dir, &previous);
        anyhow::Ok((report, cleanup, removed_dirs))
    })
    .await
    .context("Reconciliation task panicked")??;

    if let Err(e) = report.ledger.save(&recipe) {
        warn!("Failed to save recipe, the next update extracts every file: {e:#}");
        if let Err(e) = ctx.reset_recipe() {
            warn!("Failed to remove stale recipe: {e:#}");
        }
    }
    ctx.write_anchor(artifact.anchor_time)?;

    Ok(UpdateSummary {
        source: ctx.source.name().to_string(),
        anchor_time: artifact.anchor_time,
        files: report.ledger.len(),
        written: report.written,
        skipped: report.skipped,
        evacuated: report.evacuated,
        rotated: report.rotated,
        bytes_written: report.bytes_written,
        removed_files: cleanup.removed.len(),
        kept_files: cleanup.kept.len(),
        removed_dirs,
    })
}
