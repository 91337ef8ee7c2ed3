//! Tests for the 'list' command
//!
//! The list command displays every configured server and where it backs up to.

use server_backups::config::Location;
use test_utils::{ConfigBuilder, TestContext};

#[test]
fn test_list_all_servers_in_declaration_order() {
    let ctx = TestContext::from_builder(
        ConfigBuilder::minimal()
            .add_server("web1")
            .add_server("db1")
            .add_server("web2"),
    );

    let backups = ctx.backups().unwrap();
    let names: Vec<&str> = backups.servers().iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["web1", "db1", "web2"]);
}

#[test]
fn test_list_shows_enabled_status_and_cluster() {
    let ctx = TestContext::from_builder(
        ConfigBuilder::minimal()
            .add_cluster_server("web1", "front")
            .add_disabled_server("legacy"),
    );

    let backups = ctx.backups().unwrap();
    let web1 = backups.server("web1").unwrap();
    let legacy = backups.server("legacy").unwrap();

    assert!(web1.enabled);
    assert_eq!(web1.cluster.as_deref(), Some("front"));
    assert!(!legacy.enabled);
    assert_eq!(legacy.cluster, None);
}

#[test]
fn test_list_shows_topology() {
    let ctx = TestContext::from_builder(
        ConfigBuilder::minimal()
            .add_server("local")
            .add_ssh_server("remote", "remote.example.com", "root"),
    );

    let backups = ctx.backups().unwrap();
    assert_eq!(
        backups.server("local").unwrap().topology(),
        (Location::Local, Location::Local)
    );
    assert_eq!(
        backups.server("remote").unwrap().topology(),
        (Location::Ssh, Location::Local)
    );
    assert_eq!(
        backups.server("remote").unwrap().destination.path,
        ctx.backup_path().display().to_string()
    );
}

#[test]
fn test_list_empty_config() {
    let ctx = TestContext::from_builder(ConfigBuilder::minimal());

    let backups = ctx.backups().unwrap();
    assert!(backups.servers().is_empty());
}
