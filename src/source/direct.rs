//! Plain URL source.

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::fmt;
use std::path::Path;

use super::download::{DownloadProgress, FetchOutcome, Fetcher};
use super::{Artifact, Resolution};

/// A zip archive served at a fixed URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectSource {
    /// Display name, also names the state directory
    pub name: String,
    /// Archive URL
    pub url: String,
    /// Leading path segments stripped from archive entries
    pub strip: usize,
}

impl DirectSource {
    /// Conditionally download the archive.
    ///
    /// The anchor of the artifact is the server's `Last-Modified` when it
    /// sent one, the local receipt time otherwise.
    pub async fn resolve(
        &self,
        fetcher: &Fetcher,
        pivot: Option<DateTime<Utc>>,
        dest_dir: &Path,
        progress: DownloadProgress<'_>,
    ) -> Result<Resolution> {
        let fallback = format!("{}.zip", self.name);
        match fetcher.download(&self.url, pivot, dest_dir, &fallback, progress).await? {
            FetchOutcome::NotModified => Ok(Resolution::NotModified),
            FetchOutcome::Fetched {
                path,
                last_modified,
            } => Ok(Resolution::Downloaded(Artifact {
                path,
                anchor_time: last_modified.unwrap_or_else(Utc::now),
            })),
        }
    }
}

impl fmt::Display for DirectSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "direct: URL={}", self.url)
    }
}
