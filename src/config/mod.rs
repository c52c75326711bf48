//! Configuration file handling
//!
//! upkeep reads a single TOML file, `upkeep.toml` in the current directory
//! unless `--config` or `UPKEEP_CONFIG` points elsewhere. A missing file is
//! fine: every setting has a default, and command line flags fill in the
//! rest.
//!
//! ```toml
//! source = "release"
//! target_dir = "~/vim"
//! exe_rotate_count = 5
//!
//! [sources.release.x86_64]
//! kind = "github"
//! name = "vim64"
//! owner = "vim"
//! project = "vim-win32-installer"
//! pattern = '^gvim_.*_x64\.zip$'
//! strip = 1
//!
//! [sources.nightly.x86_64]
//! kind = "direct"
//! name = "vim64-nightly"
//! url = "https://example.com/vim-nightly-x64.zip"
//! strip = 1
//! ```
//!
//! Source sets are keyed first by set name, then by platform key. The
//! platform key is opaque: it is whatever `platform` (or `--platform`) says,
//! and defaults to the architecture upkeep was built for.
//!
//! # Credentials
//!
//! `github_user` and `github_token` authenticate release API requests. When
//! the file leaves them out, `UPKEEP_GITHUB_USER` and `UPKEEP_GITHUB_TOKEN`
//! are used. Keep tokens out of files under version control.

use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::debug;

use crate::constants::{
    DEFAULT_DOWNLOAD_TIMEOUT, DEFAULT_EXE_ROTATE_COUNT, DEFAULT_GITHUB_API_URL,
    DEFAULT_LOG_ROTATE_COUNT, DEFAULT_SOURCE, WORK_DIR_NAME,
};
use crate::core::UpkeepError;
use crate::source::{DirectSource, FetchSettings, GithubSource, SourceDescriptor, SourcePack};
use crate::update::UpdateContext;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "UPKEEP_CONFIG";
/// Environment fallback for [`UpkeepConfig::github_user`].
pub const GITHUB_USER_ENV: &str = "UPKEEP_GITHUB_USER";
/// Environment fallback for [`UpkeepConfig::github_token`].
pub const GITHUB_TOKEN_ENV: &str = "UPKEEP_GITHUB_TOKEN";

/// Contents of `upkeep.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct UpkeepConfig {
    /// Source set to update from
    pub source: String,
    /// Installation directory; the current directory when unset
    pub target_dir: Option<PathBuf>,
    /// Working directory; `<target_dir>/upkeep` when unset, relative paths
    /// are taken from the target directory
    pub work_dir: Option<PathBuf>,
    /// Platform key; the build architecture when unset
    pub platform: Option<String>,
    /// Download timeout in seconds
    pub download_timeout_secs: u64,
    /// Generations kept for rotated binaries
    pub exe_rotate_count: usize,
    /// Log files kept in `log/`
    pub log_rotate_count: usize,
    /// Release API user
    pub github_user: Option<String>,
    /// Release API token
    pub github_token: Option<String>,
    /// Release API base URL
    pub github_api_url: String,
    /// Source sets: set name, then platform key
    pub sources: BTreeMap<String, BTreeMap<String, SourceConfig>>,
}

impl Default for UpkeepConfig {
    fn default() -> Self {
        Self {
            source: DEFAULT_SOURCE.to_string(),
            target_dir: None,
            work_dir: None,
            platform: None,
            download_timeout_secs: DEFAULT_DOWNLOAD_TIMEOUT.as_secs(),
            exe_rotate_count: DEFAULT_EXE_ROTATE_COUNT,
            log_rotate_count: DEFAULT_LOG_ROTATE_COUNT,
            github_user: None,
            github_token: None,
            github_api_url: DEFAULT_GITHUB_API_URL.to_string(),
            sources: BTreeMap::new(),
        }
    }
}

/// One source entry of a source set.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceConfig {
    /// Archive at a fixed URL
    Direct {
        /// Source name, names the state directory
        name: String,
        /// Archive URL
        url: String,
        /// Leading segments stripped from entries
        #[serde(default)]
        strip: usize,
    },
    /// Latest GitHub release asset
    Github {
        /// Source name, names the state directory
        name: String,
        /// Repository owner
        owner: String,
        /// Repository name
        project: String,
        /// Regular expression selecting the asset
        pattern: String,
        /// Leading segments stripped from entries
        #[serde(default)]
        strip: usize,
    },
}

impl SourceConfig {
    /// Build the runtime descriptor, compiling the asset pattern.
    pub fn to_descriptor(&self) -> Result<SourceDescriptor, UpkeepError> {
        match self {
            Self::Direct {
                name,
                url,
                strip,
            } => Ok(SourceDescriptor::Direct(DirectSource {
                name: name.clone(),
                url: url.clone(),
                strip: *strip,
            })),
            Self::Github {
                name,
                owner,
                project,
                pattern,
                strip,
            } => {
                let regex = Regex::new(pattern).map_err(|e| UpkeepError::InvalidSourcePattern {
                    pattern: pattern.clone(),
                    reason: e.to_string(),
                })?;
                Ok(SourceDescriptor::GithubRelease(GithubSource {
                    name: name.clone(),
                    owner: owner.clone(),
                    project: project.clone(),
                    pattern: regex,
                    strip: *strip,
                }))
            }
        }
    }
}

impl UpkeepConfig {
    /// Load the configuration at `path`, or defaults when it does not exist.
    ///
    /// Credentials missing from the file are taken from the environment.
    pub async fn load_or_default(path: &Path) -> Result<Self> {
        let mut config = if fs::try_exists(path).await.unwrap_or(false) {
            Self::load_from(path).await?
        } else {
            debug!("No config at {}, using defaults", path.display());
            Self::default()
        };
        config.apply_env_credentials();
        Ok(config)
    }

    /// Load the configuration at `path`.
    ///
    /// # Errors
    ///
    /// The file cannot be read, or it is not valid TOML for this schema
    /// ([`UpkeepError::ConfigError`]).
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        toml::from_str(&content).map_err(|e| {
            UpkeepError::ConfigError {
                message: format!("{}: {e}", path.display()),
            }
            .into()
        })
    }

    fn apply_env_credentials(&mut self) {
        fn env_value(name: &str) -> Option<String> {
            std::env::var(name).ok().filter(|value| !value.is_empty())
        }
        if self.github_user.as_deref().is_none_or(str::is_empty) {
            self.github_user = env_value(GITHUB_USER_ENV);
        }
        if self.github_token.as_deref().is_none_or(str::is_empty) {
            self.github_token = env_value(GITHUB_TOKEN_ENV);
        }
    }

    /// The platform key in effect.
    #[must_use]
    pub fn platform_key(&self) -> String {
        self.platform.clone().unwrap_or_else(|| std::env::consts::ARCH.to_string())
    }

    /// Build the [`SourcePack`] of a source set.
    ///
    /// # Errors
    ///
    /// [`UpkeepError::SourceNotFound`] for an unknown set and
    /// [`UpkeepError::InvalidSourcePattern`] for a pattern that does not
    /// compile.
    pub fn source_pack(&self, set: &str) -> Result<SourcePack, UpkeepError> {
        let entries = self.sources.get(set).ok_or_else(|| UpkeepError::SourceNotFound {
            name: set.to_string(),
        })?;
        let mut pack = SourcePack::new(set);
        for (platform, entry) in entries {
            pack.insert(platform.clone(), entry.to_descriptor()?);
        }
        Ok(pack)
    }

    /// Network settings derived from this configuration.
    #[must_use]
    pub fn fetch_settings(&self) -> FetchSettings {
        FetchSettings {
            timeout: Duration::from_secs(self.download_timeout_secs),
            github_user: self.github_user.clone(),
            github_token: self.github_token.clone(),
            github_api_url: self.github_api_url.clone(),
        }
    }

    /// Installation directory with `~` expanded.
    pub fn target_dir(&self) -> Result<PathBuf> {
        match &self.target_dir {
            Some(dir) => expand_path(dir),
            None => std::env::current_dir().context("Failed to determine current directory"),
        }
    }

    /// Assemble the context of one run.
    ///
    /// # Errors
    ///
    /// Unknown source set, unsupported platform, invalid pattern, or a path
    /// that cannot be expanded.
    pub fn context(&self) -> Result<UpdateContext> {
        let target_dir = self.target_dir()?;
        let work_dir = match &self.work_dir {
            Some(dir) => target_dir.join(expand_path(dir)?),
            None => target_dir.join(WORK_DIR_NAME),
        };
        let pack = self.source_pack(&self.source)?;
        let source = pack.find(&self.platform_key())?.clone();

        Ok(UpdateContext {
            target_dir,
            work_dir,
            source,
            exe_rotate_count: self.exe_rotate_count,
            fetch: self.fetch_settings(),
        })
    }
}

/// Expand `~` and environment variables in a path.
fn expand_path(path: &Path) -> Result<PathBuf> {
    let raw = path.to_string_lossy();
    let expanded = shellexpand::full(&raw).map_err(|e| UpkeepError::ConfigError {
        message: format!("Cannot expand path '{raw}': {e}"),
    })?;
    Ok(PathBuf::from(expanded.as_ref()))
}
