//! Streaming, conditional HTTP download shared by every source kind.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, IF_MODIFIED_SINCE, LAST_MODIFIED};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::constants::{DEFAULT_DOWNLOAD_TIMEOUT, DEFAULT_GITHUB_API_URL};
use crate::core::UpkeepError;

/// Download progress sink: `(bytes_so_far, total)`. The total is `None` when
/// the server does not announce a length.
pub type DownloadProgress<'a> = &'a mut (dyn FnMut(u64, Option<u64>) + Send);

/// HTTP date layout used by `If-Modified-Since`.
const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Network settings for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchSettings {
    /// Whole-request timeout, body included
    pub timeout: Duration,
    /// Basic-auth user for the release API
    pub github_user: Option<String>,
    /// Basic-auth token for the release API. Credentials are only sent
    /// when this is set.
    pub github_token: Option<String>,
    /// Base URL of the release API, without trailing slash
    pub github_api_url: String,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_DOWNLOAD_TIMEOUT,
            github_user: None,
            github_token: None,
            github_api_url: DEFAULT_GITHUB_API_URL.to_string(),
        }
    }
}

/// Result of a conditional download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The server reported no change since the pivot time.
    NotModified,
    /// The body was saved to `path`.
    Fetched {
        /// Complete downloaded file
        path: PathBuf,
        /// `Last-Modified` reported by the server, if any
        last_modified: Option<DateTime<Utc>>,
    },
}

/// HTTP client configured from [`FetchSettings`].
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    settings: FetchSettings,
}

impl Fetcher {
    /// Build a client with the configured timeout and our user agent.
    pub fn new(settings: FetchSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .user_agent(concat!("upkeep/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            settings,
        })
    }

    /// The settings this fetcher was built from.
    #[must_use]
    pub fn settings(&self) -> &FetchSettings {
        &self.settings
    }

    pub(crate) fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Download `url` into `dest_dir`.
    ///
    /// When `since` is set the request carries `If-Modified-Since`. A `304`
    /// answer, or a `200` whose `Last-Modified` is not strictly newer than
    /// `since`, yields [`FetchOutcome::NotModified`] without reading the
    /// body.
    ///
    /// The body is streamed into a temporary file in `dest_dir` and renamed
    /// to the last segment of the URL path (or `fallback_name`) once it is
    /// complete, replacing any earlier download of the same name.
    ///
    /// # Errors
    ///
    /// [`UpkeepError::Transport`] when the request or the body fails,
    /// [`UpkeepError::UnexpectedStatus`] for any status but 200 and 304, and
    /// plain I/O errors while writing the file.
    pub async fn download(
        &self,
        url: &str,
        since: Option<DateTime<Utc>>,
        dest_dir: &Path,
        fallback_name: &str,
        progress: DownloadProgress<'_>,
    ) -> Result<FetchOutcome> {
        let mut request = self.client.get(url);
        if let Some(since) = since {
            request = request.header(IF_MODIFIED_SINCE, http_date(since));
        }

        debug!("GET {url}");
        let mut response = request.send().await.map_err(|e| transport_error(url, &e))?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_MODIFIED => {
                debug!("{url} not modified");
                return Ok(FetchOutcome::NotModified);
            }
            status => {
                return Err(UpkeepError::UnexpectedStatus {
                    url: url.to_string(),
                    status: status.to_string(),
                }
                .into());
            }
        }

        let last_modified = last_modified(response.headers());
        if let (Some(since), Some(modified)) = (since, last_modified) {
            if modified <= since {
                debug!("{url} last modified {modified}, not newer than {since}");
                return Ok(FetchOutcome::NotModified);
            }
        }

        let path = dest_dir.join(download_file_name(url, fallback_name));
        info!("Downloading {url} to {}", path.display());

        let total = response.content_length();
        let mut temp = tempfile::NamedTempFile::new_in(dest_dir).with_context(|| {
            format!("Failed to create temporary file in {}", dest_dir.display())
        })?;
        let mut received = 0u64;
        progress(received, total);
        while let Some(chunk) = response.chunk().await.map_err(|e| transport_error(url, &e))? {
            temp.write_all(&chunk)
                .with_context(|| format!("Failed to write download of {url}"))?;
            received += chunk.len() as u64;
            progress(received, total);
        }
        temp.as_file().sync_all().context("Failed to flush download")?;
        temp.persist(&path)
            .map_err(|e| e.error)
            .with_context(|| format!("Failed to move download to {}", path.display()))?;

        debug!("Downloaded {received} bytes from {url}");
        Ok(FetchOutcome::Fetched {
            path,
            last_modified,
        })
    }
}

/// Render a timestamp as an HTTP date.
#[must_use]
pub fn http_date(time: DateTime<Utc>) -> String {
    time.format(HTTP_DATE_FORMAT).to_string()
}

fn last_modified(headers: &HeaderMap) -> Option<DateTime<Utc>> {
    let value = headers.get(LAST_MODIFIED)?.to_str().ok()?;
    DateTime::parse_from_rfc2822(value).ok().map(|time| time.with_timezone(&Utc))
}

pub(crate) fn transport_error(url: &str, error: &reqwest::Error) -> UpkeepError {
    UpkeepError::Transport {
        url: url.to_string(),
        reason: error.to_string(),
    }
}

/// Last segment of the URL path, or `fallback` when there is none.
fn download_file_name(url: &str, fallback: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|url| {
            url.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|name| !name.is_empty() && name != "." && name != "..")
        .unwrap_or_else(|| fallback.to_string())
}
