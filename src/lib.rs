//! Server Backups Library
//!
//! Hardlinked rsync snapshots of local or remote servers, MySQL dumps and
//! script output, pruned by a yearly/monthly/weekly/daily retention policy.

pub mod config;
pub mod managers;
pub mod utils;

// Re-export commonly used types
pub use config::{load_config_dir, resolve_all_servers, resolve_server, ConfigError, ServerConfig};
pub use managers::backup::{
    BackupError, Backups, CustomBackup, RunOptions, RunSummary, Selection,
};
pub use managers::logging::{init_logging, LogGuard, LoggingConfig};
pub use managers::server::{BackupServer, Phase, PhaseStatus, ServerReport};
