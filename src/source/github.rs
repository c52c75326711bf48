//! GitHub release source.
//!
//! Resolution takes two requests at most: the "latest release" metadata
//! (conditional on the anchor) and, when the chosen asset is strictly newer
//! than the anchor, the asset itself.

use anyhow::Result;
use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, IF_MODIFIED_SINCE};
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use tracing::{debug, info};

use super::download::{DownloadProgress, FetchOutcome, Fetcher, http_date, transport_error};
use super::{Artifact, Resolution};
use crate::constants::ASSET_STATE_UPLOADED;
use crate::core::UpkeepError;

/// Latest release of a GitHub project, one asset selected by name pattern.
#[derive(Debug, Clone)]
pub struct GithubSource {
    /// Display name, also names the state directory
    pub name: String,
    /// Repository owner
    pub owner: String,
    /// Repository name
    pub project: String,
    /// First asset whose name matches is used
    pub pattern: Regex,
    /// Leading path segments stripped from archive entries
    pub strip: usize,
}

#[derive(Debug, Deserialize)]
struct Release {
    tag_name: String,
    #[serde(default)]
    draft: bool,
    #[serde(default)]
    prerelease: bool,
    #[serde(default)]
    assets: Vec<Asset>,
}

#[derive(Debug, Clone, Deserialize)]
struct Asset {
    name: String,
    state: String,
    updated_at: DateTime<Utc>,
    browser_download_url: String,
}

impl GithubSource {
    fn repo(&self) -> String {
        format!("{}/{}", self.owner, self.project)
    }

    /// Resolve the newest qualifying asset and download it if newer than
    /// `pivot`. The anchor of the artifact is the asset's update time.
    pub async fn resolve(
        &self,
        fetcher: &Fetcher,
        pivot: Option<DateTime<Utc>>,
        dest_dir: &Path,
        progress: DownloadProgress<'_>,
    ) -> Result<Resolution> {
        let Some(release) = self.fetch_latest(fetcher, pivot).await? else {
            return Ok(Resolution::NotModified);
        };
        let asset = self.select_asset(&release)?;

        if pivot.is_some_and(|pivot| asset.updated_at <= pivot) {
            debug!("Asset {} updated {} is not newer than anchor", asset.name, asset.updated_at);
            return Ok(Resolution::NotModified);
        }
        info!("Found newer release {} of {}: {}", release.tag_name, self.repo(), asset.name);

        let fallback = format!("{}.zip", self.name);
        match fetcher
            .download(&asset.browser_download_url, None, dest_dir, &fallback, progress)
            .await?
        {
            FetchOutcome::NotModified => Ok(Resolution::NotModified),
            FetchOutcome::Fetched {
                path, ..
            } => Ok(Resolution::Downloaded(Artifact {
                path,
                anchor_time: asset.updated_at,
            })),
        }
    }

    /// `None` when the API answered `304 Not Modified`.
    async fn fetch_latest(
        &self,
        fetcher: &Fetcher,
        pivot: Option<DateTime<Utc>>,
    ) -> Result<Option<Release>> {
        let settings = fetcher.settings();
        let url = format!(
            "{}/repos/{}/{}/releases/latest",
            settings.github_api_url.trim_end_matches('/'),
            self.owner,
            self.project
        );

        let mut request =
            fetcher.client().get(&url).header(ACCEPT, "application/vnd.github+json");
        if let Some(pivot) = pivot {
            request = request.header(IF_MODIFIED_SINCE, http_date(pivot));
        }
        if let Some(token) = &settings.github_token {
            request = request.basic_auth(settings.github_user.as_deref().unwrap_or(""), Some(token));
        }

        debug!("GET {url}");
        let response = request.send().await.map_err(|e| transport_error(&url, &e))?;
        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_MODIFIED => {
                debug!("Release list of {} not modified", self.repo());
                return Ok(None);
            }
            StatusCode::NOT_FOUND => {
                return Err(UpkeepError::NoQualifyingRelease {
                    repo: self.repo(),
                }
                .into());
            }
            status => {
                return Err(UpkeepError::UnexpectedStatus {
                    url,
                    status: status.to_string(),
                }
                .into());
            }
        }

        let release: Release = response.json().await.map_err(|e| transport_error(&url, &e))?;
        Ok(Some(release))
    }

    fn select_asset<'a>(&self, release: &'a Release) -> Result<&'a Asset, UpkeepError> {
        if release.draft || release.prerelease {
            return Err(UpkeepError::NoQualifyingRelease {
                repo: self.repo(),
            });
        }
        let asset = release
            .assets
            .iter()
            .find(|asset| self.pattern.is_match(&asset.name))
            .ok_or_else(|| UpkeepError::NoMatchingAsset {
                repo: self.repo(),
                pattern: self.pattern.to_string(),
            })?;
        if asset.state != ASSET_STATE_UPLOADED {
            return Err(UpkeepError::AssetIncomplete {
                asset: asset.name.clone(),
                state: asset.state.clone(),
            });
        }
        Ok(asset)
    }
}

impl fmt::Display for GithubSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GitHub: {}/{} pattern={}", self.owner, self.project, self.pattern)
    }
}
