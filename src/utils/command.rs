//! Argv-based commands and pipelines, and running them as child processes

use anyhow::{Context, Result};
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use tracing::debug;

/// One process in a pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    /// A program and its arguments, never interpreted by a shell locally
    Argv { program: String, args: Vec<String> },
    /// A user supplied shell snippet (pre/post scripts), run with `sh -c`
    Shell(String),
}

impl Stage {
    pub fn new(program: impl Into<String>) -> Self {
        Stage::Argv {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Split a configured command such as `docker exec -i mysql mysqldump`
    pub fn from_words(command: &str) -> Self {
        let mut words = command.split_whitespace().map(str::to_string);
        let program = words.next().unwrap_or_default();
        Stage::Argv {
            program,
            args: words.collect(),
        }
    }

    pub fn shell(script: impl Into<String>) -> Self {
        Stage::Shell(script.into())
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        if let Stage::Argv { args, .. } = &mut self {
            args.push(arg.into());
        }
        self
    }

    pub fn args<I, S>(mut self, extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Stage::Argv { args, .. } = &mut self {
            args.extend(extra.into_iter().map(Into::into));
        }
        self
    }

    /// Name of the executable this stage starts
    pub fn program(&self) -> &str {
        match self {
            Stage::Argv { program, .. } => program,
            Stage::Shell(_) => "sh",
        }
    }

    /// Text for a remote shell: argv tokens are single-quoted, scripts pass through
    pub fn to_shell(&self) -> String {
        match self {
            Stage::Argv { program, args } => std::iter::once(program)
                .chain(args.iter())
                .map(|token| shell_quote(token))
                .collect::<Vec<_>>()
                .join(" "),
            Stage::Shell(script) => script.clone(),
        }
    }

    fn to_command(&self) -> Command {
        match self {
            Stage::Argv { program, args } => {
                let mut cmd = Command::new(program);
                cmd.args(args);
                cmd
            }
            Stage::Shell(script) => {
                let mut cmd = Command::new("sh");
                cmd.arg("-c").arg(script);
                cmd
            }
        }
    }
}

/// Processes connected stdout to stdin, `a | b | c`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pipeline {
    stages: Vec<Stage>,
}

impl Pipeline {
    pub fn new(first: Stage) -> Self {
        Self {
            stages: vec![first],
        }
    }

    pub fn pipe(mut self, next: Stage) -> Self {
        self.stages.push(next);
        self
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// Program of the first stage
    pub fn program(&self) -> &str {
        self.stages.first().map(Stage::program).unwrap_or_default()
    }

    pub fn to_shell(&self) -> String {
        self.stages
            .iter()
            .map(Stage::to_shell)
            .collect::<Vec<_>>()
            .join(" | ")
    }
}

impl From<Stage> for Pipeline {
    fn from(stage: Stage) -> Self {
        Pipeline::new(stage)
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_shell())
    }
}

/// Where the last stage's stdout goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StdoutTarget {
    /// Stream to our own stdout (rsync progress, scripts without output)
    Inherit,
    /// Collect into [`CommandOutput::stdout`]
    Capture,
    /// Write into a local file, truncating it
    File(PathBuf),
}

/// Result of a finished pipeline
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Every stage exited with status 0
    pub success: bool,
    /// Exit code of the first failing stage (or the last stage)
    pub code: Option<i32>,
    /// Signal that terminated the first failing stage
    pub signal: Option<i32>,
    pub stdout: String,
}

impl CommandOutput {
    /// What a dry run returns
    pub fn empty() -> Self {
        Self {
            success: true,
            code: Some(0),
            signal: None,
            stdout: String::new(),
        }
    }

    /// Stdout split on whitespace
    pub fn words(&self) -> Vec<String> {
        self.stdout.split_whitespace().map(str::to_string).collect()
    }

    /// Short description of the exit status for logs and reports
    pub fn describe(&self) -> String {
        match (self.code, self.signal) {
            (_, Some(signal)) => format!("terminated by signal {}", signal),
            (Some(code), None) => format!("exit code {}", code),
            (None, None) => "unknown exit status".to_string(),
        }
    }
}

/// Spawn every stage, wire the pipes and wait for all of them
pub fn run_pipeline(pipeline: &Pipeline, stdout: &StdoutTarget) -> Result<CommandOutput> {
    debug!("Running pipeline: {}", pipeline);

    let stages = pipeline.stages();
    let mut children: Vec<Child> = Vec::with_capacity(stages.len());
    if let Err(e) = spawn_stages(stages, stdout, &mut children) {
        reap(children);
        return Err(e);
    }

    // The last child owns the captured stdout; earlier stdouts were moved into stdin
    let last = children
        .pop()
        .context("Pipeline has no stages")?
        .wait_with_output()
        .context("Failed to wait for command")?;

    let mut statuses = Vec::with_capacity(stages.len());
    for mut child in children {
        statuses.push(child.wait().context("Failed to wait for command")?);
    }
    statuses.push(last.status);

    let stdout = String::from_utf8_lossy(&last.stdout).to_string();
    if !stdout.is_empty() {
        debug!("Command output: {}", stdout.trim_end());
    }

    Ok(summarize(&statuses, stdout))
}

fn spawn_stages(stages: &[Stage], stdout: &StdoutTarget, children: &mut Vec<Child>) -> Result<()> {
    let mut previous_stdout = None;

    for (index, stage) in stages.iter().enumerate() {
        let mut cmd = stage.to_command();
        if let Some(input) = previous_stdout.take() {
            cmd.stdin(Stdio::from(input));
        }

        let last = index + 1 == stages.len();
        if !last {
            cmd.stdout(Stdio::piped());
        } else {
            match stdout {
                StdoutTarget::Inherit => {
                    cmd.stdout(Stdio::inherit());
                }
                StdoutTarget::Capture => {
                    cmd.stdout(Stdio::piped());
                }
                StdoutTarget::File(path) => {
                    cmd.stdout(Stdio::from(create_output_file(path)?));
                }
            }
        }

        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to execute {}", stage.program()))?;
        if !last {
            previous_stdout = child.stdout.take();
        }
        children.push(child);
    }

    Ok(())
}

/// Kill and wait for stages already started when a later one could not be
fn reap(children: Vec<Child>) {
    for mut child in children {
        if let Err(e) = child.kill() {
            debug!("Failed to kill pipeline stage {}: {}", child.id(), e);
        }
        if let Err(e) = child.wait() {
            debug!("Failed to wait for pipeline stage {}: {}", child.id(), e);
        }
    }
}

fn summarize(statuses: &[ExitStatus], stdout: String) -> CommandOutput {
    let failed = statuses.iter().find(|status| !status.success());
    let status = failed.or(statuses.last());

    CommandOutput {
        success: failed.is_none(),
        code: status.and_then(|s| s.code()),
        signal: status.and_then(exit_signal),
        stdout,
    }
}

#[cfg(unix)]
fn exit_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn exit_signal(_status: &ExitStatus) -> Option<i32> {
    None
}

fn create_output_file(path: &Path) -> Result<File> {
    File::create(path).with_context(|| format!("Failed to create output file {:?}", path))
}

/// Quote a token for a POSIX shell
pub fn shell_quote(token: &str) -> String {
    let plain = !token.is_empty()
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:@,+%".contains(c));
    if plain {
        token.to_string()
    } else {
        format!("'{}'", token.replace('\'', r#"'\''"#))
    }
}
