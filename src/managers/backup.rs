//! Backup run - drives server backups across the fleet

use crate::config::{
    load_config_dir, resolve_all_servers, ConfigError, OrderedMap, RawServer, ServerConfig,
};
use crate::managers::server::{default_work_dir, BackupServer, PhaseStatus, ServerReport};
use crate::utils::clock::Clock;
use crate::utils::executor::{CommandExecutor, RealExecutor};
use crate::utils::interrupt::Interrupt;
use crate::utils::locker::RunLock;
use crate::utils::prune::{prune, PrunePlan};
use crate::utils::snapshot::Snapshot;
use chrono::NaiveDateTime;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum BackupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Unknown server: {0}")]
    UnknownServer(String),

    #[error("No servers in cluster: {0}")]
    UnknownCluster(String),

    #[error("Backup interrupted while backing up '{server}'")]
    Interrupted { server: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Backup logic that does not fit the file/mysql/script model
///
/// Registered on [`Backups`] and run by the `all` and `custom` selections.
pub trait CustomBackup: Send + Sync {
    fn name(&self) -> &str;
    fn run(&self) -> anyhow::Result<()>;
}

/// Which backups a run covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    /// Every configured server, then every custom backup
    All,
    /// Every configured server
    Servers,
    /// Only custom backups
    Custom,
    Server(String),
    Cluster(String),
}

impl Selection {
    fn includes_servers(&self) -> bool {
        !matches!(self, Selection::Custom)
    }

    fn includes_custom(&self) -> bool {
        matches!(self, Selection::All | Selection::Custom)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Overrides the clock for snapshot names and retention
    pub now: Option<NaiveDateTime>,
    /// Log every command without running any
    pub dry_run: bool,
    pub interrupt: Interrupt,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomReport {
    pub name: String,
    pub status: PhaseStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub servers: Vec<ServerReport>,
    pub custom: Vec<CustomReport>,
}

impl RunSummary {
    /// Failed phases across servers plus failed custom backups
    pub fn failure_count(&self) -> usize {
        let phases: usize = self.servers.iter().map(|s| s.failures().count()).sum();
        let custom = self
            .custom
            .iter()
            .filter(|c| c.status.is_failed())
            .count();
        phases + custom
    }

    pub fn is_success(&self) -> bool {
        self.failure_count() == 0
    }

    fn log(&self) {
        let backed_up = self.servers.iter().filter(|s| !s.is_disabled()).count();
        let failed = self.servers.iter().filter(|s| !s.is_success()).count();
        info!(
            "Backup summary: {} server(s) backed up, {} with failures, {} custom backup(s)",
            backed_up,
            failed,
            self.custom.len()
        );

        for server in &self.servers {
            for failure in server.failures() {
                if let PhaseStatus::Failed(reason) = &failure.status {
                    error!("{}: {} failed: {}", server.server, failure.phase, reason);
                }
            }
        }
        for custom in &self.custom {
            if let PhaseStatus::Failed(reason) = &custom.status {
                error!("custom backup {} failed: {}", custom.name, reason);
            }
        }
    }
}

/// Snapshots at a server's destination and what retention would do with them
#[derive(Debug, Clone)]
pub struct SnapshotOverview {
    pub snapshots: Vec<Snapshot>,
    pub plan: PrunePlan,
}

pub struct Backups {
    servers: Vec<ServerConfig>,
    custom: Vec<Box<dyn CustomBackup>>,
    executor: Arc<dyn CommandExecutor>,
    clock: Clock,
    work_dir: PathBuf,
}

impl Backups {
    /// Create from already resolved servers, using the system clock
    pub fn new(servers: Vec<ServerConfig>) -> Self {
        Self {
            servers,
            custom: Vec::new(),
            executor: Arc::new(RealExecutor::new()),
            clock: Clock::System,
            work_dir: default_work_dir(),
        }
    }

    /// Resolve in-process server records; builtin defaults apply when none are given
    pub fn from_servers(
        servers: &OrderedMap<RawServer>,
        defaults: Option<&RawServer>,
    ) -> Result<Self, BackupError> {
        let builtin = RawServer::builtin();
        let resolved = resolve_all_servers(servers, defaults.unwrap_or(&builtin))?;
        Ok(Self::new(resolved).with_clock(Clock::from_env()?))
    }

    /// Load `<root>/defaults.yml` and `<root>/config.d/*.yml`
    pub fn from_config_dir(root: impl AsRef<Path>) -> Result<Self, BackupError> {
        let dir = load_config_dir(root)?;
        let resolved = resolve_all_servers(&dir.servers, &dir.defaults)?;
        Ok(Self::new(resolved).with_clock(Clock::from_env()?))
    }

    pub fn with_executor(mut self, executor: Arc<dyn CommandExecutor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Local scratch directory for exclude files; the run lock sits next to it
    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = work_dir.into();
        self
    }

    pub fn register(&mut self, backup: Box<dyn CustomBackup>) {
        self.custom.push(backup);
    }

    pub fn with_custom(mut self, backup: impl CustomBackup + 'static) -> Self {
        self.register(Box::new(backup));
        self
    }

    pub fn servers(&self) -> &[ServerConfig] {
        &self.servers
    }

    pub fn server(&self, name: &str) -> Option<&ServerConfig> {
        self.servers.iter().find(|server| server.name == name)
    }

    pub fn custom_names(&self) -> Vec<&str> {
        self.custom.iter().map(|backup| backup.name()).collect()
    }

    pub fn clock(&self) -> Clock {
        self.clock
    }

    /// `<work dir>.lock`
    pub fn lock_path(&self) -> PathBuf {
        self.work_dir.with_extension("lock")
    }

    /// Servers a selection covers, in declaration order
    pub fn select(&self, selection: &Selection) -> Result<Vec<&ServerConfig>, BackupError> {
        match selection {
            Selection::All | Selection::Servers => Ok(self.servers.iter().collect()),
            Selection::Custom => Ok(Vec::new()),
            Selection::Server(name) => self
                .server(name)
                .map(|server| vec![server])
                .ok_or_else(|| BackupError::UnknownServer(name.clone())),
            Selection::Cluster(tag) => {
                let servers: Vec<_> = self
                    .servers
                    .iter()
                    .filter(|server| server.cluster.as_deref() == Some(tag.as_str()))
                    .collect();
                if servers.is_empty() {
                    return Err(BackupError::UnknownCluster(tag.clone()));
                }
                Ok(servers)
            }
        }
    }

    /// List a server's snapshots without changing anything
    pub fn snapshots(&self, name: &str) -> Result<SnapshotOverview, BackupError> {
        let server = self
            .server(name)
            .ok_or_else(|| BackupError::UnknownServer(name.to_string()))?;

        let now = self.clock.now();
        let snapshots = BackupServer::new(server, Arc::clone(&self.executor), now)?.list_snapshots()?;
        let names: Vec<&str> = snapshots.iter().map(Snapshot::name).collect();
        let plan = prune(&names, now.date(), &server.prune);

        Ok(SnapshotOverview { snapshots, plan })
    }

    /// Back up the selected servers one after another
    pub fn run(&self, selection: &Selection, options: &RunOptions) -> Result<RunSummary, BackupError> {
        let selected = self.select(selection)?;

        let mut lock = RunLock::open_at(self.lock_path())?;
        let _guard = lock.try_hold()?;

        let clock = options.now.map(Clock::Fixed).unwrap_or(self.clock);
        let now = clock.now();
        let start_time = Instant::now();
        let mut summary = RunSummary::default();

        if options.dry_run {
            info!("Dry run: commands are logged, not executed");
        }

        if selection.includes_servers() {
            if selected.is_empty() {
                warn!("No servers configured");
            }

            for server in selected {
                if options.interrupt.is_raised() {
                    return Err(BackupError::Interrupted {
                        server: server.name.clone(),
                    });
                }

                let report = BackupServer::new(server, Arc::clone(&self.executor), now)?
                    .with_dry_run(options.dry_run)
                    .with_work_dir(&self.work_dir)
                    .with_interrupt(options.interrupt.clone())
                    .run();

                let interrupted = report.interrupted;
                summary.servers.push(report);
                if interrupted {
                    summary.log();
                    return Err(BackupError::Interrupted {
                        server: server.name.clone(),
                    });
                }
            }
        }

        if selection.includes_custom() {
            self.run_custom(options, &mut summary);
        }

        summary.log();
        info!(
            "Backup run completed in {:.2}s",
            start_time.elapsed().as_secs_f64()
        );
        Ok(summary)
    }

    fn run_custom(&self, options: &RunOptions, summary: &mut RunSummary) {
        if self.custom.is_empty() {
            info!("No custom backups registered");
            return;
        }

        for backup in &self.custom {
            if options.interrupt.is_raised() {
                warn!("Interrupted, skipping custom backup {}", backup.name());
                break;
            }

            let status = if options.dry_run {
                info!("[dry-run] custom backup {}", backup.name());
                PhaseStatus::Skipped("dry run".to_string())
            } else {
                info!("Running custom backup {}", backup.name());
                match backup.run() {
                    Ok(()) => PhaseStatus::Ok,
                    Err(e) => PhaseStatus::Failed(format!("{:#}", e)),
                }
            };

            summary.custom.push(CustomReport {
                name: backup.name().to_string(),
                status,
            });
        }
    }
}

/// Resolved configuration of one server as YAML, password omitted
pub fn render_server(server: &ServerConfig) -> anyhow::Result<String> {
    let mut wrapper = OrderedMap::new();
    wrapper.insert(server.name.clone(), server);
    Ok(serde_yaml::to_string(&wrapper)?)
}
