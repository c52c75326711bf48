//! Integration test suite for upkeep
//!
//! End-to-end tests that run complete updates against an in-process HTTP
//! server. The server hands out zip archives with `Last-Modified` handling
//! and answers the GitHub "latest release" endpoint, so no test touches the
//! network. These tests run quickly and are executed in CI on every commit.
//!
//! # Running Integration Tests
//!
//! ```bash
//! cargo test --test integration
//! cargo nextest run --test integration
//! ```
//!
//! # Test Organization
//!
//! Tests are organized by functionality area:
//! - **update_tests**: Direct URL updates, evacuation, cleanup, restore, sweep
//! - **release_tests**: GitHub release selection and conditional requests
//! - **cli_tests**: The `upkeep` binary, its flags and error output

// Shared test utilities (from parent tests/ directory)
#[path = "../common/mod.rs"]
mod common;

mod cli_tests;
mod release_tests;
