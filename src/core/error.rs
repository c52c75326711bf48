//! Error handling for upkeep
//!
//! This module provides the error taxonomy of the update engine together with
//! the user-facing presentation used at the CLI boundary. The design follows
//! two layers:
//!
//! 1. **Strongly-typed errors** ([`UpkeepError`]) for the failure modes callers
//!    may want to branch on (source resolution, transport, ledger parsing)
//! 2. **User-friendly contexts** ([`ErrorContext`]) that pair an error with
//!    details and an actionable suggestion
//!
//! Engine code returns `anyhow::Result` and raises [`UpkeepError`] values where
//! the kind of failure matters. [`user_friendly_error`] digs them back out with
//! `downcast_ref` when the CLI renders the failure.
//!
//! # Taxonomy
//!
//! - *Source resolution*: [`UpkeepError::SourceNotFound`],
//!   [`UpkeepError::UnsupportedPlatform`], [`UpkeepError::NoQualifyingRelease`],
//!   [`UpkeepError::NoMatchingAsset`], [`UpkeepError::AssetIncomplete`]
//! - *Transport*: [`UpkeepError::Transport`], [`UpkeepError::UnexpectedStatus`]
//! - *Local I/O*: [`UpkeepError::FileSystemError`],
//!   [`UpkeepError::UnsafeEntryPath`]
//! - *Ledger*: [`UpkeepError::LedgerParse`], [`UpkeepError::LedgerNotFound`]
//!
//! There is no "not modified" variant: an unchanged source is the expected
//! steady state and is reported as [`crate::source::Resolution::NotModified`].

use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// The main error type for upkeep operations.
///
/// Each variant carries the context (URL, path, pattern) needed to explain the
/// failure without consulting the log file.
#[derive(Error, Debug)]
pub enum UpkeepError {
    /// The configuration file is unreadable or semantically invalid.
    #[error("Configuration error: {message}")]
    ConfigError {
        /// Description of the configuration problem
        message: String,
    },

    /// The requested source set is not defined in the configuration.
    #[error("Source '{name}' is not defined")]
    SourceNotFound {
        /// Name of the missing source set
        name: String,
    },

    /// The source set has no entry for the platform key.
    #[error("Source '{source_name}' does not support platform '{platform}'")]
    UnsupportedPlatform {
        /// Name of the source set
        source_name: String,
        /// The opaque platform key that was looked up
        platform: String,
        /// Platform keys the source set does define
        supported: Vec<String>,
    },

    /// The asset name pattern of a release source does not compile.
    #[error("Invalid asset pattern '{pattern}': {reason}")]
    InvalidSourcePattern {
        /// The offending pattern
        pattern: String,
        /// Compiler message from the regex engine
        reason: String,
    },

    /// The newest release is a draft or prerelease, or no release exists.
    #[error("No qualifying release found for {repo}")]
    NoQualifyingRelease {
        /// Repository identifier (`owner/project`)
        repo: String,
    },

    /// No asset of the newest release matches the configured pattern.
    #[error("No asset of the latest release of {repo} matches '{pattern}'")]
    NoMatchingAsset {
        /// Repository identifier (`owner/project`)
        repo: String,
        /// The asset name pattern
        pattern: String,
    },

    /// The matched asset is not fully uploaded yet.
    #[error("Release asset '{asset}' is incomplete (state: {state})")]
    AssetIncomplete {
        /// Asset name
        asset: String,
        /// State reported by the release API
        state: String,
    },

    /// The request could not be sent or the body could not be received.
    #[error("Network error while fetching {url}: {reason}")]
    Transport {
        /// Requested URL
        url: String,
        /// Underlying transport failure
        reason: String,
    },

    /// The server answered with a status other than 200 or 304.
    #[error("Unexpected response from {url}: {status}")]
    UnexpectedStatus {
        /// Requested URL
        url: String,
        /// Status line, e.g. `404 Not Found`
        status: String,
    },

    /// An archive entry would land outside the target directory.
    #[error("Archive entry '{entry}' escapes the target directory")]
    UnsafeEntryPath {
        /// Entry name after stripping
        entry: String,
    },

    /// A ledger line does not follow `<path>\t<size>\t<crc32>`.
    #[error("Invalid recipe {file} at line {line}: {reason}")]
    LedgerParse {
        /// Ledger file path
        file: String,
        /// 1-based line number
        line: usize,
        /// What was wrong with the line
        reason: String,
    },

    /// An operation that requires the ledger found none.
    #[error("Recipe not found: {path}")]
    LedgerNotFound {
        /// Expected ledger path
        path: String,
    },

    /// A file system operation failed.
    #[error("File system error: {operation}")]
    FileSystemError {
        /// The operation that failed
        operation: String,
        /// Path involved in the operation
        path: String,
    },

    /// Anything else.
    #[error("{message}")]
    Other {
        /// Generic error message
        message: String,
    },
}

impl Clone for UpkeepError {
    fn clone(&self) -> Self {
        match self {
            Self::ConfigError {
                message,
            } => Self::ConfigError {
                message: message.clone(),
            },
            Self::SourceNotFound {
                name,
            } => Self::SourceNotFound {
                name: name.clone(),
            },
            Self::UnsupportedPlatform {
                source_name,
                platform,
                supported,
            } => Self::UnsupportedPlatform {
                source_name: source_name.clone(),
                platform: platform.clone(),
                supported: supported.clone(),
            },
            Self::InvalidSourcePattern {
                pattern,
                reason,
            } => Self::InvalidSourcePattern {
                pattern: pattern.clone(),
                reason: reason.clone(),
            },
            Self::NoQualifyingRelease {
                repo,
            } => Self::NoQualifyingRelease {
                repo: repo.clone(),
            },
            Self::NoMatchingAsset {
                repo,
                pattern,
            } => Self::NoMatchingAsset {
                repo: repo.clone(),
                pattern: pattern.clone(),
            },
            Self::AssetIncomplete {
                asset,
                state,
            } => Self::AssetIncomplete {
                asset: asset.clone(),
                state: state.clone(),
            },
            Self::Transport {
                url,
                reason,
            } => Self::Transport {
                url: url.clone(),
                reason: reason.clone(),
            },
            Self::UnexpectedStatus {
                url,
                status,
            } => Self::UnexpectedStatus {
                url: url.clone(),
                status: status.clone(),
            },
            Self::UnsafeEntryPath {
                entry,
            } => Self::UnsafeEntryPath {
                entry: entry.clone(),
            },
            Self::LedgerParse {
                file,
                line,
                reason,
            } => Self::LedgerParse {
                file: file.clone(),
                line: *line,
                reason: reason.clone(),
            },
            Self::LedgerNotFound {
                path,
            } => Self::LedgerNotFound {
                path: path.clone(),
            },
            Self::FileSystemError {
                operation,
                path,
            } => Self::FileSystemError {
                operation: operation.clone(),
                path: path.clone(),
            },
            Self::Other {
                message,
            } => Self::Other {
                message: message.clone(),
            },
        }
    }
}

/// An error paired with optional details and a suggestion for the user.
///
/// This is what the CLI prints when a run fails:
///
/// ```text
/// error: No asset of the latest release of owner/project matches '-win64-.*\.zip$'
/// details: The release exists but none of its asset names matched
/// suggestion: Check the `pattern` of the source in upkeep.toml
/// ```
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error
    pub error: UpkeepError,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Create a new error context with no suggestion or details.
    #[must_use]
    pub const fn new(error: UpkeepError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    /// Add a suggestion for resolving the error.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Add details explaining the error.
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print the error to stderr with terminal colors.
    ///
    /// - Error message: red and bold
    /// - Details: yellow
    /// - Suggestion: green
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error into an [`ErrorContext`] suitable for display.
///
/// Typed [`UpkeepError`] values anywhere in the chain get tailored
/// suggestions. I/O errors are classified by kind. Everything else is shown
/// with its full cause chain.
///
/// # Examples
///
/// ```rust,no_run
/// use upkeep_cli::core::{UpkeepError, user_friendly_error};
///
/// let error = anyhow::Error::from(UpkeepError::SourceNotFound {
///     name: "nightly".to_string(),
/// });
/// user_friendly_error(error).display();
/// ```
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    if let Some(upkeep_error) = error.chain().find_map(|e| e.downcast_ref::<UpkeepError>()) {
        return create_error_context(upkeep_error.clone());
    }

    if let Some(io_error) = error.chain().find_map(|e| e.downcast_ref::<std::io::Error>()) {
        match io_error.kind() {
            std::io::ErrorKind::PermissionDenied => {
                return ErrorContext::new(UpkeepError::FileSystemError {
                    operation: error.to_string(),
                    path: "unknown".to_string(),
                })
                .with_suggestion("Check the ownership of the target directory. A running program may also hold the file open")
                .with_details("The update could not read or replace a file in the installation");
            }
            std::io::ErrorKind::NotFound => {
                return ErrorContext::new(UpkeepError::FileSystemError {
                    operation: error.to_string(),
                    path: "unknown".to_string(),
                })
                .with_suggestion("Check that the target directory exists and the path is correct");
            }
            _ => {}
        }
    }

    if let Some(toml_error) = error.chain().find_map(|e| e.downcast_ref::<toml::de::Error>()) {
        return ErrorContext::new(UpkeepError::ConfigError {
            message: toml_error.to_string(),
        })
        .with_suggestion("Check the TOML syntax of upkeep.toml");
    }

    // Generic error - include the full error chain
    let mut message = error.to_string();
    let chain: Vec<String> =
        error.chain().skip(1).map(std::string::ToString::to_string).collect();

    if !chain.is_empty() {
        message.push_str("\n\nCaused by:");
        for (i, cause) in chain.iter().enumerate() {
            message.push_str(&format!("\n  {}: {}", i + 1, cause));
        }
    }

    ErrorContext::new(UpkeepError::Other {
        message,
    })
}

fn create_error_context(error: UpkeepError) -> ErrorContext {
    match &error {
        UpkeepError::SourceNotFound { name } => {
            let suggestion = format!("Define [sources.{name}.<platform>] in upkeep.toml or pick another source with --source");
            ErrorContext::new(error).with_suggestion(suggestion)
        }

        UpkeepError::UnsupportedPlatform { platform, supported, .. } => {
            let details = if supported.is_empty() {
                format!("No source entry exists for platform key '{platform}'")
            } else {
                format!(
                    "No source entry exists for platform key '{platform}'. Defined keys: {}",
                    supported.join(", ")
                )
            };
            ErrorContext::new(error)
                .with_details(details)
                .with_suggestion("Set `platform` in upkeep.toml or pass --platform with a key the source defines")
        }

        UpkeepError::InvalidSourcePattern { .. } => ErrorContext::new(error)
            .with_suggestion("Fix the `pattern` of the source in upkeep.toml. It is a regular expression matched against asset names"),

        UpkeepError::NoQualifyingRelease { .. } => ErrorContext::new(error)
            .with_details("The newest release is missing, a draft or a prerelease")
            .with_suggestion("Wait for a final release to be published, then run again"),

        UpkeepError::NoMatchingAsset { .. } => ErrorContext::new(error)
            .with_details("The release exists but none of its asset names matched")
            .with_suggestion("Check the `pattern` of the source in upkeep.toml"),

        UpkeepError::AssetIncomplete { .. } => ErrorContext::new(error)
            .with_details("The asset is still being uploaded")
            .with_suggestion("Run again in a few minutes"),

        UpkeepError::Transport { .. } => ErrorContext::new(error)
            .with_suggestion("Check your internet connection. Raise `download_timeout_secs` for slow links"),

        UpkeepError::UnexpectedStatus { status, .. } => {
            let suggestion = if status.starts_with("401") || status.starts_with("403") {
                "Check github_user/github_token (or UPKEEP_GITHUB_USER/UPKEEP_GITHUB_TOKEN). Anonymous API access is rate limited"
            } else {
                "Check the source URL in upkeep.toml"
            };
            ErrorContext::new(error).with_suggestion(suggestion)
        }

        UpkeepError::UnsafeEntryPath { .. } => ErrorContext::new(error)
            .with_details("The archive contains a path that is absolute or climbs out with '..'")
            .with_suggestion("Check the `strip` count of the source and the archive contents"),

        UpkeepError::LedgerParse { .. } | UpkeepError::LedgerNotFound { .. } => {
            ErrorContext::new(error)
                .with_suggestion("Run with --restore to re-extract every file and rebuild the recipe")
        }

        _ => ErrorContext::new(error),
    }
}
