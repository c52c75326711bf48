//! Where update archives come from.
//!
//! A [`SourceDescriptor`] is one of exactly two kinds:
//!
//! - [`DirectSource`]: a zip archive at a fixed URL, fetched with
//!   `If-Modified-Since`
//! - [`GithubSource`]: the newest non-draft, non-prerelease release of a
//!   GitHub project, one asset picked by a name pattern
//!
//! Both resolve against a *pivot* (the anchor of the last applied archive)
//! and either report [`Resolution::NotModified`], the normal steady state,
//! or download a newer archive into the working directory.
//!
//! A [`SourcePack`] maps platform keys to descriptors, so one configured
//! source set can serve several architectures.

mod direct;
mod download;
mod github;

pub use direct::DirectSource;
pub use download::{DownloadProgress, FetchOutcome, FetchSettings, Fetcher, http_date};
pub use github::GithubSource;

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::core::UpkeepError;

/// A downloaded archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Local path of the complete archive
    pub path: PathBuf,
    /// Time to persist as the new anchor once the archive is applied
    pub anchor_time: DateTime<Utc>,
}

/// Outcome of resolving a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Nothing newer than the pivot exists.
    NotModified,
    /// A newer archive was downloaded.
    Downloaded(Artifact),
}

/// One configured source.
#[derive(Debug, Clone)]
pub enum SourceDescriptor {
    /// Archive at a fixed URL
    Direct(DirectSource),
    /// Latest GitHub release asset
    GithubRelease(GithubSource),
}

impl SourceDescriptor {
    /// Name of the source; also names its state directory under `var/`.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Direct(source) => &source.name,
            Self::GithubRelease(source) => &source.name,
        }
    }

    /// Number of leading path segments to strip from archive entries.
    #[must_use]
    pub fn strip_count(&self) -> usize {
        match self {
            Self::Direct(source) => source.strip,
            Self::GithubRelease(source) => source.strip,
        }
    }

    /// Resolve the source against `pivot` and download into `dest_dir` if
    /// something newer exists. `None` means "never applied": always fetch.
    ///
    /// # Errors
    ///
    /// Source resolution and transport failures from
    /// [`crate::core::UpkeepError`], and I/O errors while saving the file.
    pub async fn resolve(
        &self,
        fetcher: &Fetcher,
        pivot: Option<DateTime<Utc>>,
        dest_dir: &Path,
        progress: DownloadProgress<'_>,
    ) -> Result<Resolution> {
        match self {
            Self::Direct(source) => source.resolve(fetcher, pivot, dest_dir, progress).await,
            Self::GithubRelease(source) => {
                source.resolve(fetcher, pivot, dest_dir, progress).await
            }
        }
    }
}

impl fmt::Display for SourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct(source) => source.fmt(f),
            Self::GithubRelease(source) => source.fmt(f),
        }
    }
}

/// Platform key to source mapping of one source set.
#[derive(Debug, Clone, Default)]
pub struct SourcePack {
    name: String,
    sources: BTreeMap<String, SourceDescriptor>,
}

impl SourcePack {
    /// Create an empty pack for the source set `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sources: BTreeMap::new(),
        }
    }

    /// Name of the source set.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register the source for a platform key.
    pub fn insert(&mut self, platform: impl Into<String>, source: SourceDescriptor) {
        self.sources.insert(platform.into(), source);
    }

    /// Platform keys this pack serves, sorted.
    pub fn platforms(&self) -> impl Iterator<Item = &str> {
        self.sources.keys().map(String::as_str)
    }

    /// Source for a platform key.
    ///
    /// # Errors
    ///
    /// [`UpkeepError::UnsupportedPlatform`] when the pack has no entry.
    pub fn find(&self, platform: &str) -> Result<&SourceDescriptor, UpkeepError> {
        self.sources.get(platform).ok_or_else(|| UpkeepError::UnsupportedPlatform {
            source_name: self.name.clone(),
            platform: platform.to_string(),
            supported: self.platforms().map(str::to_string).collect(),
        })
    }
}
