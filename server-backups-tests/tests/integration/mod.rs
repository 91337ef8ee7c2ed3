//! Integration tests for server-backups
//!
//! These tests run real rsync against local directories and check the
//! snapshot tree left behind. They skip themselves when rsync is missing.
//! Run with: `cargo test -p server-backups-tests --test integration`

mod common;
mod snapshots;
