//! Command-line interface for upkeep
//!
//! upkeep has no subcommands: a plain invocation updates the target
//! directory, `--restore` reinstalls it from scratch and `--sweep` removes
//! rotated binaries left behind by earlier updates.
//!
//! ```bash
//! upkeep                          # update from upkeep.toml in the current directory
//! upkeep -t ~/vim -s nightly      # other target and source set
//! upkeep --restore                # forget local state, extract everything
//! upkeep --sweep                  # delete app.1.exe, app.2.exe, ...
//! upkeep -c /etc/upkeep.toml -q   # quiet, custom configuration
//! ```
//!
//! Flags override the configuration file, which overrides built-in
//! defaults.
//!
//! # Environment Variables
//!
//! - `UPKEEP_CONFIG` - configuration file path
//! - `UPKEEP_NO_PROGRESS` - disable progress bars
//! - `UPKEEP_GITHUB_USER`, `UPKEEP_GITHUB_TOKEN` - release API credentials
//! - `RUST_LOG` - stderr log filter, overrides `-v`/`-q`

use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use colored::Colorize;
use std::path::PathBuf;
use tracing::level_filters::LevelFilter;

use crate::config::{CONFIG_ENV, UpkeepConfig};
use crate::constants::CONFIG_FILE_NAME;
use crate::update::{self, UpdateContext, UpdateOutcome};
use crate::utils::logging::{create_log_file, init_logging};
use crate::utils::progress::UpdateProgress;

/// Incremental self-updater for locally deployed software bundles.
#[derive(Parser, Debug)]
#[command(
    name = "upkeep",
    about = "Keep a locally deployed software bundle up to date",
    version,
    long_about = "upkeep downloads the newest archive of a software bundle and applies it \
                  incrementally: unchanged files are skipped, locally modified files are \
                  preserved, locked binaries are rotated aside and obsolete files are removed."
)]
pub struct Cli {
    /// Installation directory to update (overrides `target_dir`)
    #[arg(short, long, value_name = "DIR")]
    target: Option<PathBuf>,

    /// Source set to update from (overrides `source`)
    #[arg(short, long, value_name = "NAME")]
    source: Option<String>,

    /// Platform key used to pick the source (overrides `platform`)
    #[arg(long, value_name = "KEY")]
    platform: Option<String>,

    /// Discard the recorded state and extract every file again
    #[arg(long)]
    restore: bool,

    /// Delete rotated generations of installed binaries
    #[arg(long, conflicts_with = "restore")]
    sweep: bool,

    /// Configuration file
    #[arg(short, long, value_name = "PATH", env = CONFIG_ENV)]
    config: Option<PathBuf>,

    /// Show debug output
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Only show errors
    #[arg(short, long)]
    quiet: bool,

    /// Hide progress bars (also hidden when `UPKEEP_NO_PROGRESS` is set)
    #[arg(long)]
    no_progress: bool,
}

impl Cli {
    /// Run the selected operation.
    pub async fn execute(self) -> Result<()> {
        let config = self.load_config().await?;
        let ctx = config.context()?;
        ctx.prepare()?;

        let log_file = create_log_file(&ctx.log_dir(), config.log_rotate_count, Utc::now())?;
        init_logging(self.stderr_level(), log_file)?;

        if self.sweep {
            let swept = update::sweep(&ctx)?;
            if !self.quiet {
                println!("{} Removed {} rotated files", "✓".green(), swept.len());
            }
            return Ok(());
        }

        let progress = if self.no_progress || self.quiet {
            UpdateProgress::hidden()
        } else {
            UpdateProgress::new()
        };
        let outcome = if self.restore {
            update::restore(&ctx, &progress).await?
        } else {
            update::update(&ctx, &progress).await?
        };
        if !self.quiet {
            print_outcome(&ctx, &outcome);
        }
        Ok(())
    }

    async fn load_config(&self) -> Result<UpkeepConfig> {
        let path = self.config.clone().unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));
        let mut config = UpkeepConfig::load_or_default(&path).await?;
        if let Some(target) = &self.target {
            config.target_dir = Some(target.clone());
        }
        if let Some(source) = &self.source {
            config.source.clone_from(source);
        }
        if let Some(platform) = &self.platform {
            config.platform = Some(platform.clone());
        }
        Ok(config)
    }

    fn stderr_level(&self) -> LevelFilter {
        if self.verbose {
            LevelFilter::DEBUG
        } else if self.quiet {
            LevelFilter::ERROR
        } else {
            LevelFilter::WARN
        }
    }
}

fn print_outcome(ctx: &UpdateContext, outcome: &UpdateOutcome) {
    match outcome {
        UpdateOutcome::UpToDate => {
            println!("{} {} is up to date", "✓".green(), ctx.target_dir.display());
        }
        UpdateOutcome::Updated(summary) => {
            println!(
                "{} Updated {} from {} ({} written, {} unchanged, {} removed)",
                "✓".green(),
                ctx.target_dir.display(),
                summary.source.bold(),
                summary.written,
                summary.skipped,
                summary.removed_files
            );
            if summary.evacuated > 0 {
                println!(
                    "  {} {} locally modified files kept, new versions written as *.orig.*",
                    "!".yellow(),
                    summary.evacuated
                );
            }
            if summary.kept_files > 0 {
                println!(
                    "  {} {} obsolete files kept because they were modified",
                    "!".yellow(),
                    summary.kept_files
                );
            }
        }
    }
}
