//! rsync invocation for the file sync phase

use super::command::Stage;
use crate::config::{expand_tilde, ServerConfig, SshTarget};
use std::path::Path;

/// rsync exit code for "received SIGUSR1 or SIGINT"
pub const RSYNC_INTERRUPTED: i32 = 20;

/// Where one file sync writes and what it links against
#[derive(Debug, Clone)]
pub struct SyncPlan<'a> {
    pub server: &'a ServerConfig,
    /// Local file holding one exclude pattern per line
    pub exclude_file: &'a Path,
    /// Snapshot directory as seen on the destination host
    pub snapshot_dir: &'a str,
    /// Previous snapshot (`current`) on the destination host, when one exists
    pub link_dest: Option<&'a str>,
}

/// One rsync covering every configured path
///
/// Always runs on this machine; the remote leg goes through `-e ssh ...`.
pub fn rsync_stage(plan: &SyncPlan<'_>) -> Stage {
    let server = plan.server;
    let mut stage = Stage::new("rsync").arg("--archive");
    if server.rsync.verbose {
        stage = stage.args(["--verbose", "--progress"]);
    }
    stage = stage
        .args([
            "--relative",
            "--hard-links",
            "--delete",
            "--partial",
            "--compress",
        ])
        .arg(format!("--exclude-from={}", plan.exclude_file.display()));

    if let Some(current) = plan.link_dest {
        stage = stage.arg(format!("--link-dest={}", current));
    }

    let remote = server
        .source
        .ssh()
        .or_else(|| server.destination.endpoint.ssh());
    if let Some(target) = remote {
        stage = stage.args(["-e".to_string(), ssh_transport(target)]);
    }

    let sources = server
        .file_list()
        .into_iter()
        .map(|path| server.source.rsync_path(&path));

    stage
        .args(sources)
        .arg(server.destination.endpoint.rsync_path(plan.snapshot_dir))
}

/// Value of rsync's `-e` option
fn ssh_transport(target: &SshTarget) -> String {
    let mut transport = format!("ssh -p {}", target.port);
    if let Some(key) = &target.key {
        transport.push_str(&format!(" -i {}", expand_tilde(key)));
    }
    transport.push_str(" -o LogLevel=quiet");
    transport
}
