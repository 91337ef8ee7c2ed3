//! Tests for the 'validate' command
//!
//! Validation loads the config directory and resolves every server.

use server_backups::{BackupError, Backups, ConfigError};
use std::fs;
use test_utils::{ConfigBuilder, TestContext};

#[test]
fn test_validate_minimal_config() {
    let ctx = TestContext::from_builder(ConfigBuilder::minimal().add_server("web"));
    assert!(Backups::from_config_dir(ctx.config_dir()).is_ok());
}

#[test]
fn test_validate_missing_config_dir() {
    let ctx = TestContext::new();
    let result = Backups::from_config_dir(ctx.temp_dir().join("nowhere"));

    assert!(matches!(
        result,
        Err(BackupError::Config(ConfigError::MissingDefaults(_)))
    ));
}

#[test]
fn test_validate_reports_missing_ssh_user() {
    let ctx = TestContext::from_builder(ConfigBuilder::minimal());
    fs::write(
        ctx.config_dir().join("config.d/bad.yml"),
        "web:\n  source:\n    location: ssh\n    ssh:\n      host: web.example.com\n",
    )
    .unwrap();

    let err = Backups::from_config_dir(ctx.config_dir()).err().unwrap();
    assert!(err.to_string().contains("source.ssh.user"), "{}", err);
}

#[test]
fn test_validate_rejects_unknown_location() {
    let ctx = TestContext::from_builder(ConfigBuilder::minimal());
    fs::write(
        ctx.config_dir().join("config.d/bad.yml"),
        "web:\n  source:\n    location: ftp\n",
    )
    .unwrap();

    let err = Backups::from_config_dir(ctx.config_dir()).err().unwrap();
    assert!(matches!(
        err,
        BackupError::Config(ConfigError::ParseError { .. })
    ));
}

#[test]
fn test_later_file_replaces_server() {
    let ctx = TestContext::from_builder(ConfigBuilder::minimal().add_server("web"));
    fs::write(
        ctx.config_dir().join("config.d/zz-override.yml"),
        "web:\n  enabled: false\n",
    )
    .unwrap();

    let backups = Backups::from_config_dir(ctx.config_dir()).unwrap();
    assert_eq!(backups.servers().len(), 1);
    assert!(!backups.server("web").unwrap().enabled);
}
