//! Backup of a single server
//!
//! Phases run strictly in order:
//! prepare, pre-scripts, files, mysql, post-scripts, symlink, prune.
//! A failed phase is recorded and the next one still runs, except that a
//! failed prepare or a raised interrupt ends the server's backup.

use crate::config::{Databases, Script, ServerConfig};
use crate::utils::command::{CommandOutput, Pipeline, Stage};
use crate::utils::executor::CommandExecutor;
use crate::utils::interrupt::{is_interrupt_signal, Interrupt};
use crate::utils::mysql;
use crate::utils::prune::prune;
use crate::utils::remote::{CommandLog, RemoteExecutor};
use crate::utils::rsync::{rsync_stage, SyncPlan, RSYNC_INTERRUPTED};
use crate::utils::snapshot::{parse_listing, Snapshot};
use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, info_span, warn};

/// rsync: some source files vanished before they could be transferred
const RSYNC_VANISHED: i32 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Prepare,
    PreScripts,
    FilesSync,
    MysqlDump,
    PostScripts,
    Symlink,
    Prune,
}

impl Phase {
    pub const ALL: [Phase; 7] = [
        Phase::Prepare,
        Phase::PreScripts,
        Phase::FilesSync,
        Phase::MysqlDump,
        Phase::PostScripts,
        Phase::Symlink,
        Phase::Prune,
    ];
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Prepare => "prepare",
            Phase::PreScripts => "pre-scripts",
            Phase::FilesSync => "files",
            Phase::MysqlDump => "mysql",
            Phase::PostScripts => "post-scripts",
            Phase::Symlink => "symlink",
            Phase::Prune => "prune",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseStatus {
    Ok,
    Skipped(String),
    Failed(String),
}

impl PhaseStatus {
    pub fn is_failed(&self) -> bool {
        matches!(self, PhaseStatus::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseReport {
    pub phase: Phase,
    pub status: PhaseStatus,
}

/// Outcome of one server's backup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerReport {
    pub server: String,
    /// Snapshot created by this run, `None` when the server is disabled
    pub snapshot: Option<String>,
    pub phases: Vec<PhaseReport>,
    /// Snapshots removed by the prune phase
    pub deleted: Vec<String>,
    pub interrupted: bool,
}

impl ServerReport {
    pub fn is_disabled(&self) -> bool {
        self.snapshot.is_none()
    }

    pub fn status(&self, phase: Phase) -> Option<&PhaseStatus> {
        self.phases
            .iter()
            .find(|report| report.phase == phase)
            .map(|report| &report.status)
    }

    pub fn failures(&self) -> impl Iterator<Item = &PhaseReport> {
        self.phases.iter().filter(|report| report.status.is_failed())
    }

    pub fn is_success(&self) -> bool {
        !self.interrupted && self.failures().next().is_none()
    }
}

/// What earlier phases learned that later phases need
#[derive(Debug, Default)]
struct Progress {
    has_current: bool,
    sync_failed: bool,
    interrupted: bool,
    /// Snapshot `current` was pointed at during this run
    linked: Option<String>,
    deleted: Vec<String>,
}

pub struct BackupServer<'a> {
    config: &'a ServerConfig,
    remote: RemoteExecutor,
    snapshot: Snapshot,
    now: NaiveDateTime,
    work_dir: PathBuf,
    interrupt: Interrupt,
}

impl<'a> BackupServer<'a> {
    pub fn new(
        config: &'a ServerConfig,
        executor: Arc<dyn CommandExecutor>,
        now: NaiveDateTime,
    ) -> Result<Self> {
        let remote = RemoteExecutor::new(
            config.source.clone(),
            config.destination.endpoint.clone(),
            executor,
        )
        .with_context(|| format!("Invalid locations for server '{}'", config.name))?;

        Ok(Self {
            config,
            remote,
            snapshot: Snapshot::at(now),
            now,
            work_dir: default_work_dir(),
            interrupt: Interrupt::new(),
        })
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.remote = self.remote.with_dry_run(dry_run);
        self
    }

    /// Local directory for the exclude file
    pub fn with_work_dir(mut self, work_dir: impl Into<PathBuf>) -> Self {
        self.work_dir = work_dir.into();
        self
    }

    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// `<destination>/<server>`
    pub fn base_dir(&self) -> String {
        format!("{}/{}", self.config.destination.path, self.config.name)
    }

    pub fn snapshots_dir(&self) -> String {
        format!("{}/snapshots", self.base_dir())
    }

    pub fn snapshot_dir(&self) -> String {
        format!("{}/{}", self.snapshots_dir(), self.snapshot)
    }

    pub fn current_link(&self) -> String {
        format!("{}/current", self.base_dir())
    }

    pub fn exclude_file(&self) -> PathBuf {
        self.work_dir.join(format!("{}.exclude", self.config.name))
    }

    /// Valid snapshot directories at the destination, oldest first
    pub fn list_snapshots(&self) -> Result<Vec<Snapshot>> {
        let entries = self
            .list_dir(&self.snapshots_dir())
            .map_err(anyhow::Error::msg)?;
        Ok(parse_listing(&entries))
    }

    /// Run every phase and report how each went
    pub fn run(&self) -> ServerReport {
        let span = info_span!("server", name = %self.config.name);
        let _enter = span.enter();

        let mut report = ServerReport {
            server: self.config.name.clone(),
            ..Default::default()
        };

        if !self.config.enabled {
            info!("Server '{}' is disabled, skipping", self.config.name);
            return report;
        }

        let start_time = Instant::now();
        report.snapshot = Some(self.snapshot.name().to_string());
        info!(
            "Backing up server '{}' into {}",
            self.config.name,
            self.snapshot_dir()
        );

        let mut progress = Progress::default();
        let mut abort: Option<String> = None;

        for phase in Phase::ALL {
            // No phase starts once the interrupt is raised
            if abort.is_none() && self.interrupt.is_raised() {
                warn!("Interrupted, skipping the remaining phases");
                progress.interrupted = true;
                abort = Some("interrupted".to_string());
            }

            let status = match &abort {
                Some(reason) => PhaseStatus::Skipped(reason.clone()),
                None => {
                    info!("==> {}", phase);
                    self.run_phase(phase, &mut progress)
                }
            };

            match &status {
                PhaseStatus::Ok => debug!("Phase {} completed", phase),
                PhaseStatus::Skipped(reason) => info!("Phase {} skipped: {}", phase, reason),
                PhaseStatus::Failed(reason) => error!("Phase {} failed: {}", phase, reason),
            }

            if abort.is_none() {
                if progress.interrupted {
                    abort = Some("interrupted".to_string());
                } else if phase == Phase::Prepare && status.is_failed() {
                    abort = Some("prepare failed".to_string());
                }
            }
            report.phases.push(PhaseReport { phase, status });
        }

        self.remove_exclude_file();
        report.deleted = progress.deleted;
        report.interrupted = progress.interrupted;

        info!(
            "Backup for server '{}' completed in {:.2}s",
            self.config.name,
            start_time.elapsed().as_secs_f64()
        );
        report
    }

    fn run_phase(&self, phase: Phase, progress: &mut Progress) -> PhaseStatus {
        match phase {
            Phase::Prepare => self.prepare(progress),
            Phase::PreScripts => self.run_scripts(&self.config.pre_scripts),
            Phase::FilesSync => self.sync_files(progress),
            Phase::MysqlDump => self.dump_mysql(),
            Phase::PostScripts => self.run_scripts(&self.config.post_scripts),
            Phase::Symlink => self.link_current(progress),
            Phase::Prune => self.prune_snapshots(progress),
        }
    }

    fn prepare(&self, progress: &mut Progress) -> PhaseStatus {
        if let Err(reason) = self.make_dir(&self.snapshot_dir()) {
            return PhaseStatus::Failed(reason);
        }

        match self.list_dir(&self.base_dir()) {
            Ok(entries) => {
                progress.has_current = entries.iter().any(|entry| entry == "current");
                if !progress.has_current {
                    info!("No current snapshot yet, syncing without --link-dest");
                }
                PhaseStatus::Ok
            }
            Err(reason) => PhaseStatus::Failed(reason),
        }
    }

    fn run_scripts(&self, scripts: &[Script]) -> PhaseStatus {
        let enabled: Vec<&Script> = scripts.iter().filter(|script| script.enabled).collect();
        if enabled.is_empty() {
            return PhaseStatus::Skipped("no enabled scripts".to_string());
        }

        let mut failures = Vec::new();
        for script in enabled {
            let output = script.output.as_ref().map(|output| {
                format!("{}/{}", self.snapshot_dir(), output.trim_start_matches('/'))
            });

            if let Some(parent) = output.as_deref().and_then(|path| Path::new(path).parent()) {
                if let Err(reason) = self.make_dir(&parent.display().to_string()) {
                    failures.push(format!("{}: {}", script.name, reason));
                    continue;
                }
            }

            match &output {
                Some(path) => info!("Running script '{}' with output sent to {}", script.name, path),
                None => info!("Running script '{}'", script.name),
            }

            let command = Pipeline::from(Stage::shell(script.script.clone()));
            match self
                .remote
                .execute(&command, output.as_deref(), CommandLog::Verbatim)
            {
                Ok(result) if result.success => {}
                Ok(result) => failures.push(format!("{}: {}", script.name, result.describe())),
                Err(e) => failures.push(format!("{}: {:#}", script.name, e)),
            }
        }

        summarize(failures)
    }

    fn sync_files(&self, progress: &mut Progress) -> PhaseStatus {
        if self.config.file_list().is_empty() {
            return PhaseStatus::Skipped("no files configured".to_string());
        }

        if self.interrupt.is_raised() {
            progress.interrupted = true;
            progress.sync_failed = true;
            return PhaseStatus::Failed("interrupted".to_string());
        }

        let exclude_file = self.exclude_file();
        if self.remote.is_dry_run() {
            info!("[dry-run] write exclude file {:?}", exclude_file);
        } else if let Err(e) = self.write_exclude_file(&exclude_file) {
            progress.sync_failed = true;
            return PhaseStatus::Failed(format!("{:#}", e));
        }

        let current = self.current_link();
        let snapshot_dir = self.snapshot_dir();
        let plan = SyncPlan {
            server: self.config,
            exclude_file: &exclude_file,
            snapshot_dir: &snapshot_dir,
            link_dest: progress.has_current.then_some(current.as_str()),
        };

        let result = self.remote.execute_local(&Pipeline::from(rsync_stage(&plan)));

        let interrupted = self.interrupt.is_raised()
            || matches!(&result, Ok(output)
                if output.code == Some(RSYNC_INTERRUPTED) || is_interrupt_signal(output.signal));
        if interrupted {
            warn!("File sync interrupted, stopping");
            progress.interrupted = true;
            progress.sync_failed = true;
            return PhaseStatus::Failed("interrupted".to_string());
        }

        match result {
            Ok(output) if output.success => PhaseStatus::Ok,
            Ok(output) if output.code == Some(RSYNC_VANISHED) => {
                warn!("Some files vanished during the transfer");
                PhaseStatus::Ok
            }
            Ok(output) => {
                progress.sync_failed = true;
                PhaseStatus::Failed(format!("rsync failed: {}", output.describe()))
            }
            Err(e) => {
                progress.sync_failed = true;
                PhaseStatus::Failed(format!("{:#}", e))
            }
        }
    }

    fn dump_mysql(&self) -> PhaseStatus {
        let Some(config) = &self.config.mysql else {
            return PhaseStatus::Skipped("mysql disabled".to_string());
        };

        let dump_dir = format!("{}/mysqldump", self.snapshot_dir());
        if let Err(reason) = self.make_dir(&dump_dir) {
            return PhaseStatus::Failed(reason);
        }

        let log = CommandLog::Redact(&config.password);
        let listing = match &config.dbs {
            Databases::All => match self
                .remote
                .execute_lines(&mysql::list_databases(config), log)
            {
                Ok(listing) => listing,
                Err(e) => return PhaseStatus::Failed(format!("Failed to list databases: {:#}", e)),
            },
            Databases::Listed(_) => Vec::new(),
        };

        let databases = mysql::select_databases(config, &listing);
        if databases.is_empty() {
            if !self.remote.is_dry_run() {
                warn!("No databases to dump");
            }
            return PhaseStatus::Skipped("no databases".to_string());
        }

        let mut failures = Vec::new();
        for database in &databases {
            if database.tables.is_empty() {
                info!("Backing up MySQL database {} (all tables)", database.name);
            } else {
                info!(
                    "Backing up MySQL database {} ({} tables)",
                    database.name,
                    database.tables.len()
                );
            }

            let path = mysql::dump_path(&self.snapshot_dir(), &database.name);
            let dump = mysql::dump_database(config, database);
            match self.remote.execute(&dump, Some(&path), log) {
                Ok(result) if result.success => {}
                Ok(result) => failures.push(format!("{}: {}", database.name, result.describe())),
                Err(e) => failures.push(format!("{}: {:#}", database.name, e)),
            }
        }

        summarize(failures)
    }

    fn link_current(&self, progress: &mut Progress) -> PhaseStatus {
        if progress.sync_failed {
            return PhaseStatus::Skipped("file sync failed, current left unchanged".to_string());
        }

        let entries = match self.list_dir(&self.snapshots_dir()) {
            Ok(entries) => entries,
            Err(reason) => return PhaseStatus::Failed(reason),
        };
        // A dry run lists nothing; show the link this run would create
        let latest = parse_listing(&entries)
            .pop()
            .unwrap_or_else(|| self.snapshot.clone());

        let target = format!("{}/{}", self.snapshots_dir(), latest);
        let link = Pipeline::from(Stage::new("ln").args([
            "-snf".to_string(),
            target,
            self.current_link(),
        ]));

        match self.on_destination(&link) {
            Ok(_) => {
                progress.linked = Some(latest.name().to_string());
                PhaseStatus::Ok
            }
            Err(reason) => PhaseStatus::Failed(reason),
        }
    }

    fn prune_snapshots(&self, progress: &mut Progress) -> PhaseStatus {
        let entries = match self.list_dir(&self.snapshots_dir()) {
            Ok(entries) => entries,
            Err(reason) => return PhaseStatus::Failed(reason),
        };

        let plan = prune(&entries, self.now.date(), &self.config.prune);
        let kept = plan.kept().len();
        let mut delete: BTreeSet<String> = plan.delete.into_iter().collect();

        if progress.sync_failed {
            delete.insert(self.snapshot.name().to_string());
        }

        let current = progress.linked.clone().or_else(|| self.read_current());
        if let Some(current) = current {
            if delete.remove(&current) {
                info!("Keeping {} because current points to it", current);
            }
        }

        info!(
            "Retention keeps {} snapshot(s), deleting {}",
            kept,
            delete.len()
        );

        let mut failures = Vec::new();
        for name in delete {
            info!("Deleting old snapshot {}", name);
            let path = format!("{}/{}", self.snapshots_dir(), name);
            let remove = Pipeline::from(Stage::new("rm").args(["-rf".to_string(), path]));
            match self.on_destination(&remove) {
                Ok(_) => progress.deleted.push(name),
                Err(reason) => failures.push(format!("{}: {}", name, reason)),
            }
        }

        summarize(failures)
    }

    /// Snapshot name `current` points to on the destination
    fn read_current(&self) -> Option<String> {
        let readlink = Pipeline::from(Stage::new("readlink").arg(self.current_link()));
        let output = self.on_destination(&readlink).ok()?;
        let target = output.stdout.trim();
        let name = Path::new(target).file_name()?.to_str()?;
        Snapshot::parse(name).map(|snapshot| snapshot.name().to_string())
    }

    fn make_dir(&self, path: &str) -> std::result::Result<CommandOutput, String> {
        self.on_destination(&Pipeline::from(
            Stage::new("mkdir").args(["-p".to_string(), path.to_string()]),
        ))
    }

    fn list_dir(&self, path: &str) -> std::result::Result<Vec<String>, String> {
        self.on_destination(&Pipeline::from(
            Stage::new("ls").args(["-1".to_string(), path.to_string()]),
        ))
        .map(|output| output.words())
    }

    fn on_destination(&self, command: &Pipeline) -> std::result::Result<CommandOutput, String> {
        match self.remote.execute_on_destination(command) {
            Ok(output) if output.success => Ok(output),
            Ok(output) => Err(format!("{} failed: {}", command.program(), output.describe())),
            Err(e) => Err(format!("{:#}", e)),
        }
    }

    fn write_exclude_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {:?}", parent))?;
        }

        let mut contents = self.config.files.exclude.join("\n");
        contents.push('\n');
        fs::write(path, contents)
            .with_context(|| format!("Failed to write exclude file {:?}", path))
    }

    fn remove_exclude_file(&self) {
        let path = self.exclude_file();
        if path.exists() {
            if let Err(e) = fs::remove_file(&path) {
                debug!("Failed to remove exclude file {:?}: {}", path, e);
            }
        }
    }
}

/// `<tmp>/server-backups`
pub fn default_work_dir() -> PathBuf {
    std::env::temp_dir().join("server-backups")
}

fn summarize(failures: Vec<String>) -> PhaseStatus {
    if failures.is_empty() {
        PhaseStatus::Ok
    } else {
        PhaseStatus::Failed(failures.join("; "))
    }
}
