//! Unit tests for server-backups
//!
//! Configuration resolution, retention planning and command routing,
//! exercised through the public API.

mod config;
mod prune;
mod remote;
