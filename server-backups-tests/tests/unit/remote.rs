//! Tests for how commands are routed between source and destination

use server_backups::config::Endpoint;
use server_backups::utils::command::{Pipeline, Stage, StdoutTarget};
use server_backups::utils::remote::CommandLog;
use server_backups::utils::RemoteExecutor;
use std::sync::Arc;
use test_utils::{ConfigBuilder, MockExecutor, MockResponse};

fn ssh_source() -> Endpoint {
    let servers = ConfigBuilder::minimal()
        .add_ssh_server("web1", "web1.example.com", "root")
        .build();
    servers[0].source.clone()
}

#[test]
fn test_ssh_source_wraps_command_and_redirects_locally() {
    let mock = Arc::new(MockExecutor::new());
    let remote = RemoteExecutor::new(ssh_source(), Endpoint::Local, mock.clone()).unwrap();

    let command = Pipeline::from(Stage::shell("uname -a"));
    remote
        .execute(&command, Some("/backups/web1/uname.txt"), CommandLog::Verbatim)
        .unwrap();

    let calls = mock.get_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].pipeline.program(), "ssh");
    assert!(calls[0].command().contains("root@web1.example.com"));
    assert!(calls[0].command().contains("uname -a"));
    assert!(matches!(&calls[0].stdout, StdoutTarget::File(path) if path.ends_with("uname.txt")));
}

#[test]
fn test_local_pair_runs_directly() {
    let mock = Arc::new(MockExecutor::new().expect("ls", MockResponse::stdout("a\nb\n")));
    let remote = RemoteExecutor::new(Endpoint::Local, Endpoint::Local, mock.clone()).unwrap();

    let output = remote
        .execute_on_destination(&Pipeline::from(Stage::new("ls").arg("/backups")))
        .unwrap();

    assert_eq!(output.words(), vec!["a", "b"]);
    assert_eq!(mock.commands(), vec!["ls /backups"]);
}

#[test]
fn test_dry_run_executes_nothing() {
    let mock = Arc::new(MockExecutor::new());
    let remote = RemoteExecutor::new(ssh_source(), Endpoint::Local, mock.clone())
        .unwrap()
        .with_dry_run(true);

    let output = remote
        .execute(&Pipeline::from(Stage::new("true")), None, CommandLog::Verbatim)
        .unwrap();

    assert!(output.success);
    assert!(mock.get_calls().is_empty());
}

#[test]
fn test_ssh_pair_is_rejected() {
    let mock = Arc::new(MockExecutor::new());
    assert!(RemoteExecutor::new(ssh_source(), ssh_source(), mock).is_err());
}
