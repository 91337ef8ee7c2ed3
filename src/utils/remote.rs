//! Running commands across the source/destination location pairs
//!
//! | source | destination | effect                                                   |
//! |--------|-------------|----------------------------------------------------------|
//! | local  | local       | run locally, stdout redirected to a local file           |
//! | local  | ssh         | run locally, stdout piped into `ssh dest "cat > file"`   |
//! | ssh    | local       | wrap in `ssh source "..."`, stdout redirected locally    |
//!
//! ssh to ssh is rejected when the executor is built.

use super::command::{shell_quote, CommandOutput, Pipeline, Stage, StdoutTarget};
use super::executor::CommandExecutor;
use crate::config::{expand_tilde, Endpoint, SshTarget};
use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// How a command is written to the log before it runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandLog<'a> {
    Verbatim,
    /// Replace every occurrence of the secret with `****`
    Redact(&'a str),
}

impl CommandLog<'_> {
    fn render(&self, command: &str) -> String {
        match self {
            CommandLog::Verbatim => command.to_string(),
            CommandLog::Redact(secret) if !secret.is_empty() => command.replace(secret, "****"),
            CommandLog::Redact(_) => command.to_string(),
        }
    }
}

/// A fully constructed command, ready to hand to a [`CommandExecutor`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub pipeline: Pipeline,
    pub stdout: StdoutTarget,
}

/// Build the `ssh ... user@host "<command>"` stage for a target
pub fn ssh_stage(target: &SshTarget, remote_command: String) -> Stage {
    let mut stage = Stage::new("ssh").args(["-p".to_string(), target.port.to_string()]);
    if let Some(key) = &target.key {
        stage = stage.args(["-i".to_string(), expand_tilde(key)]);
    }
    stage
        .args(["-o", "LogLevel=quiet"])
        .arg(target.address())
        .arg(remote_command)
}

pub struct RemoteExecutor {
    source: Endpoint,
    destination: Endpoint,
    executor: Arc<dyn CommandExecutor>,
    dry_run: bool,
}

impl RemoteExecutor {
    pub fn new(
        source: Endpoint,
        destination: Endpoint,
        executor: Arc<dyn CommandExecutor>,
    ) -> Result<Self> {
        if source.ssh().is_some() && destination.ssh().is_some() {
            anyhow::bail!("ssh source with ssh destination is not supported");
        }

        Ok(Self {
            source,
            destination,
            executor,
            dry_run: false,
        })
    }

    /// Construct and log commands without running them
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Build the invocation for a command issued from the source side
    pub fn plan(&self, command: &Pipeline, output: Option<&str>) -> Invocation {
        match (&self.source, &self.destination) {
            (Endpoint::Ssh(source), _) => Invocation {
                pipeline: Pipeline::from(ssh_stage(source, command.to_shell())),
                stdout: local_target(output),
            },
            (Endpoint::Local, Endpoint::Ssh(destination)) => match output {
                Some(path) => Invocation {
                    pipeline: command.clone().pipe(ssh_stage(
                        destination,
                        format!("cat > {}", shell_quote(path)),
                    )),
                    stdout: StdoutTarget::Inherit,
                },
                None => Invocation {
                    pipeline: command.clone(),
                    stdout: StdoutTarget::Inherit,
                },
            },
            (Endpoint::Local, Endpoint::Local) => Invocation {
                pipeline: command.clone(),
                stdout: local_target(output),
            },
        }
    }

    /// Build the invocation for a command that must run where the backups live
    pub fn plan_on_destination(&self, command: &Pipeline) -> Invocation {
        let pipeline = match &self.destination {
            Endpoint::Local => command.clone(),
            Endpoint::Ssh(destination) => Pipeline::from(ssh_stage(destination, command.to_shell())),
        };
        Invocation {
            pipeline,
            stdout: StdoutTarget::Capture,
        }
    }

    /// Run a command on the source, optionally sending stdout to `output`
    /// (a path on the destination)
    pub fn execute(
        &self,
        command: &Pipeline,
        output: Option<&str>,
        log: CommandLog<'_>,
    ) -> Result<CommandOutput> {
        self.run(self.plan(command, output), log)
    }

    /// Run a command on the source and return its stdout split on whitespace
    pub fn execute_lines(&self, command: &Pipeline, log: CommandLog<'_>) -> Result<Vec<String>> {
        let mut invocation = self.plan(command, None);
        invocation.stdout = StdoutTarget::Capture;
        Ok(self.run(invocation, log)?.words())
    }

    /// Run a command on the destination host and capture its stdout
    ///
    /// `words()` on the result gives the listing form.
    pub fn execute_on_destination(&self, command: &Pipeline) -> Result<CommandOutput> {
        self.run(self.plan_on_destination(command), CommandLog::Verbatim)
    }

    /// Run a command on this machine regardless of the endpoints (rsync)
    pub fn execute_local(&self, command: &Pipeline) -> Result<CommandOutput> {
        self.run(
            Invocation {
                pipeline: command.clone(),
                stdout: StdoutTarget::Inherit,
            },
            CommandLog::Verbatim,
        )
    }

    fn run(&self, invocation: Invocation, log: CommandLog<'_>) -> Result<CommandOutput> {
        let mut text = log.render(&invocation.pipeline.to_shell());
        if let StdoutTarget::File(path) = &invocation.stdout {
            text = format!("{} > {}", text, path.display());
        }

        if self.dry_run {
            info!("[dry-run] {}", text);
            return Ok(CommandOutput::empty());
        }

        info!("{}", text);
        self.executor.run(&invocation.pipeline, &invocation.stdout)
    }
}

fn local_target(output: Option<&str>) -> StdoutTarget {
    match output {
        Some(path) => StdoutTarget::File(PathBuf::from(path)),
        None => StdoutTarget::Inherit,
    }
}
