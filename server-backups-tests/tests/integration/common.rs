//! Shared helpers for the end-to-end tests

use std::fs;
use std::path::{Path, PathBuf};

/// True when rsync is installed; prints why the test is skipped otherwise
pub fn rsync_available() -> bool {
    match which::which("rsync") {
        Ok(_) => true,
        Err(_) => {
            eprintln!("rsync not found in PATH, skipping");
            false
        }
    }
}

/// Snapshot directory names under `<backups>/<server>/snapshots`, sorted
pub fn snapshot_names(backups: &Path, server: &str) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(backups.join(server).join("snapshots"))
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

/// Where `source` lands inside a snapshot, rsync `--relative` keeps the full path
pub fn in_snapshot(backups: &Path, server: &str, snapshot: &str, source: &Path) -> PathBuf {
    backups
        .join(server)
        .join("snapshots")
        .join(snapshot)
        .join(source.strip_prefix("/").unwrap_or(source))
}
