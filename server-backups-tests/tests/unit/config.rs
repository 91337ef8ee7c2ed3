//! Tests for loading and resolving a config directory

use server_backups::config::{Endpoint, Location, RawServer};
use server_backups::{load_config_dir, resolve_all_servers, ConfigError};
use std::fs;
use std::path::Path;
use tempfile::TempDir;
use test_utils::{ConfigBuilder, ResultAssertions};

fn write(dir: &Path, name: &str, contents: &str) {
    let path = dir.join(name);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

const DEFAULTS: &str = r#"
source:
  location: local
prune:
  keepDaily: 7
  keepWeekly: 4
destination:
  location: local
  path: /mnt/backups/
backup:
  files:
    common: [/etc/]
    exclude: ["*.tmp"]
"#;

#[test]
fn test_missing_defaults_is_an_error() {
    let dir = TempDir::new().unwrap();
    let err = load_config_dir(dir.path()).unwrap_err();
    assert!(matches!(err, ConfigError::MissingDefaults(_)));
}

#[test]
fn test_servers_keep_file_and_declaration_order() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "defaults.yml", DEFAULTS);
    write(dir.path(), "config.d/20-db.yml", "db1: {}\ndb2: {}\n");
    write(dir.path(), "config.d/10-web.yml", "web2: {}\nweb1: {}\n");
    write(dir.path(), "config.d/notes.txt", "ignored");

    let loaded = load_config_dir(dir.path()).unwrap();
    let names: Vec<&str> = loaded.servers.keys().collect();
    assert_eq!(names, vec!["web2", "web1", "db1", "db2"]);
}

#[test]
fn test_lists_append_and_scalars_override() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "defaults.yml", DEFAULTS);
    write(
        dir.path(),
        "config.d/web.yml",
        r#"
web:
  cluster: front
  prune:
    keepDaily: 3
  backup:
    files:
      common: [/var/www/]
      exclude: ["cache/"]
"#,
    );

    let loaded = load_config_dir(dir.path()).unwrap();
    let servers = resolve_all_servers(&loaded.servers, &loaded.defaults).unwrap();
    let web = &servers[0];

    assert_eq!(web.cluster.as_deref(), Some("front"));
    assert_eq!(web.prune.daily, 3);
    assert_eq!(web.prune.weekly, 4);
    assert_eq!(web.files.common, vec!["/etc/", "/var/www/"]);
    assert_eq!(web.files.exclude, vec!["*.tmp", "cache/"]);
    assert_eq!(web.destination.path, "/mnt/backups");
}

#[test]
fn test_empty_server_file_is_allowed() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "defaults.yml", DEFAULTS);
    write(dir.path(), "config.d/empty.yml", "");

    let loaded = load_config_dir(dir.path()).unwrap();
    assert!(loaded.servers.is_empty());
}

#[test]
fn test_invalid_yaml_names_the_file() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "defaults.yml", DEFAULTS);
    write(dir.path(), "config.d/broken.yml", "web: [unclosed");

    load_config_dir(dir.path()).assert_err_contains("broken.yml");
}

#[test]
fn test_ssh_source_resolves_with_default_port() {
    let servers = ConfigBuilder::minimal()
        .add_ssh_server("web1", "web1.example.com", "root")
        .build();

    let (source, destination) = servers[0].topology();
    assert_eq!(source, Location::Ssh);
    assert_eq!(destination, Location::Local);
    match &servers[0].source {
        Endpoint::Ssh(target) => {
            assert_eq!(target.port, 22);
            assert_eq!(target.address(), "root@web1.example.com");
        }
        other => panic!("expected ssh source, got {:?}", other),
    }
}

#[test]
fn test_ssh_to_ssh_is_rejected() {
    let builder = ConfigBuilder::minimal();
    let mut defaults = builder.defaults().clone();
    defaults.destination = Some(server_backups::config::RawDestination {
        location: Some(Location::Ssh),
        path: Some("/backups".to_string()),
        ssh: Some(server_backups::config::RawSsh {
            host: Some("nas".to_string()),
            port: None,
            user: Some("backup".to_string()),
            key: None,
        }),
    });
    let builder = builder.add_ssh_server("web1", "web1.example.com", "root");

    resolve_all_servers(builder.servers(), &defaults).assert_err_contains("not supported");
}

#[test]
fn test_missing_destination_is_reported() {
    let mut servers = server_backups::config::OrderedMap::new();
    servers.insert("web", RawServer::default());

    let err = resolve_all_servers(&servers, &RawServer::builtin()).unwrap_err();
    assert!(err.to_string().contains("destination"), "{}", err);
}

#[test]
fn test_disabled_server_resolves() {
    let servers = ConfigBuilder::minimal()
        .add_server("web")
        .add_disabled_server("old")
        .build();

    assert!(servers[0].enabled);
    assert!(!servers[1].enabled);
}
