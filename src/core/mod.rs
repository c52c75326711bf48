//! Core types for upkeep
//!
//! Houses the error taxonomy shared by every engine module and the helpers the
//! CLI uses to present failures. See [`error`] for the details.
//!
//! # Examples
//!
//! ```rust
//! use upkeep_cli::core::{UpkeepError, user_friendly_error};
//! use anyhow::Result;
//!
//! fn resolve() -> Result<()> {
//!     Err(UpkeepError::SourceNotFound { name: "nightly".to_string() }.into())
//! }
//!
//! if let Err(e) = resolve() {
//!     let friendly = user_friendly_error(e);
//!     assert!(friendly.suggestion.is_some());
//! }
//! ```

pub mod error;

pub use error::{ErrorContext, UpkeepError, user_friendly_error};
