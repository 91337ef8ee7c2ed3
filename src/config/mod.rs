//! Configuration module for server-backups
//!
//! Servers are described by YAML option blocks that are merged over a shared
//! defaults block before a backup runs.
//!
//! ## Merge rules
//!
//! 1. List options (`files.common`, `files.extra`, `files.exclude`,
//!    `mysql.excludeDbs`) are appended: defaults first, then the server's.
//! 2. Mapping options (`prune`, `rsync`, `source`, `destination`, `mysql`, the
//!    ssh blocks) are shallow overrides: the server's keys win.
//! 3. Script entries present on both sides are merged key by key.
//!
//! ## Example Usage
//!
//! ```no_run
//! use server_backups::config;
//!
//! let dir = config::load_config_dir("/etc/serverbackups")?;
//! let servers = config::resolve_all_servers(&dir.servers, &dir.defaults)?;
//!
//! for server in servers {
//!     println!("Server: {}, enabled: {}", server.name, server.enabled);
//! }
//! # Ok::<(), config::ConfigError>(())
//! ```

mod loader;
mod merge;
mod types;

pub use loader::{load_config_dir, resolve_all_servers, ConfigDir, ConfigError, Result};
pub use merge::{merge_raw, resolve_server};
pub use types::*;

/// Expand tilde (~) in path
pub fn expand_tilde(path: &str) -> String {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped).display().to_string();
        }
    }
    path.to_string()
}
