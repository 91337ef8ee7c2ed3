//! Test utilities for server-backups
//!
//! Shared builders, fixtures and a temp-dir backed context used by the
//! unit, command and integration test targets.

pub mod config_builder;
pub mod fixtures;
pub mod test_context;

pub use config_builder::ConfigBuilder;
pub use fixtures::*;
pub use test_context::{OptionAssertions, ResultAssertions, TestContext};

// Re-export the mock executor from the main crate
pub use server_backups::utils::executor::mock::{CommandCall, MockExecutor, MockResponse};

/// Result type for tests
pub type TestResult<T = ()> = anyhow::Result<T>;
