//! Command tests for server-backups
//!
//! These tests drive the operations behind each CLI command against a
//! written config directory, with a mocked command executor.

mod list;
mod run;
mod snapshots;
mod validate;
