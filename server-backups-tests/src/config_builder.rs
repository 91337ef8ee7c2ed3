//! Fluent API for building test configurations
//!
//! Builds a defaults block plus server entries and can write them out as a
//! config directory (`defaults.yml` + `config.d/servers.yml`).

use server_backups::config::{
    resolve_all_servers, Location, OrderedMap, RawBackup, RawDestination, RawFiles, RawPrune,
    RawScript, RawServer, RawSource, RawSsh, RetentionPolicy, ServerConfig,
};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Builder for creating test configurations
pub struct ConfigBuilder {
    temp_dir: TempDir,
    defaults: RawServer,
    servers: OrderedMap<RawServer>,
}

impl ConfigBuilder {
    /// Builtin defaults with a local destination under the temp dir
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");

        let backup_path = temp_dir.path().join("backups");
        fs::create_dir_all(&backup_path).expect("Failed to create backup dir");

        let mut defaults = RawServer::builtin();
        defaults.destination = Some(RawDestination {
            location: Some(Location::Local),
            path: Some(backup_path.display().to_string()),
            ssh: None,
        });

        Self {
            temp_dir,
            defaults,
            servers: OrderedMap::new(),
        }
    }

    /// A local-to-local setup backing up `<temp>/data/`, keeping three dailies
    pub fn minimal() -> Self {
        let builder = Self::new();

        let data = builder.temp_dir.path().join("data");
        fs::create_dir_all(&data).expect("Failed to create data dir");

        builder
            .with_retention(RetentionPolicy {
                daily: 3,
                weekly: 0,
                monthly: 0,
                yearly: 0,
            })
            .with_files(vec![format!("{}/", data.display())])
    }

    /// Root of the temp dir everything is written under
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Destination path shared by every server
    pub fn backup_path(&self) -> PathBuf {
        self.temp_dir.path().join("backups")
    }

    pub fn with_retention(mut self, keep: RetentionPolicy) -> Self {
        self.defaults.prune = Some(RawPrune {
            keep_daily: Some(keep.daily),
            keep_weekly: Some(keep.weekly),
            keep_monthly: Some(keep.monthly),
            keep_yearly: Some(keep.yearly),
        });
        self
    }

    /// Replace the default `files.common` list
    pub fn with_files(mut self, common: Vec<String>) -> Self {
        let backup = self.defaults.backup.get_or_insert_with(RawBackup::default);
        let files = backup.files.get_or_insert_with(RawFiles::default);
        files.common = common;
        self
    }

    pub fn with_excludes(mut self, exclude: Vec<String>) -> Self {
        let backup = self.defaults.backup.get_or_insert_with(RawBackup::default);
        let files = backup.files.get_or_insert_with(RawFiles::default);
        files.exclude = exclude;
        self
    }

    /// Add a default post script
    pub fn with_post_script(mut self, name: &str, script: &str, output: Option<&str>) -> Self {
        let backup = self.defaults.backup.get_or_insert_with(RawBackup::default);
        backup
            .post_scripts
            .get_or_insert_with(OrderedMap::new)
            .insert(
                name,
                RawScript {
                    script: Some(script.to_string()),
                    output: output.map(str::to_string),
                    enabled: Some(true),
                },
            );
        self
    }

    /// Add a server that only inherits the defaults
    pub fn add_server(self, name: &str) -> Self {
        self.add_server_with(name, RawServer::default())
    }

    pub fn add_disabled_server(self, name: &str) -> Self {
        self.add_server_with(
            name,
            RawServer {
                enabled: Some(false),
                ..Default::default()
            },
        )
    }

    pub fn add_cluster_server(self, name: &str, cluster: &str) -> Self {
        self.add_server_with(
            name,
            RawServer {
                cluster: Some(cluster.to_string()),
                ..Default::default()
            },
        )
    }

    /// Add a server pulled from `user@host` over ssh
    pub fn add_ssh_server(self, name: &str, host: &str, user: &str) -> Self {
        self.add_server_with(
            name,
            RawServer {
                source: Some(RawSource {
                    location: Some(Location::Ssh),
                    ssh: Some(RawSsh {
                        host: Some(host.to_string()),
                        port: None,
                        user: Some(user.to_string()),
                        key: None,
                    }),
                }),
                ..Default::default()
            },
        )
    }

    /// Add a server with custom overrides
    pub fn add_server_with(mut self, name: &str, server: RawServer) -> Self {
        self.servers.insert(name, server);
        self
    }

    pub fn defaults(&self) -> &RawServer {
        &self.defaults
    }

    pub fn servers(&self) -> &OrderedMap<RawServer> {
        &self.servers
    }

    /// Resolve every server against the defaults
    pub fn build(&self) -> Vec<ServerConfig> {
        resolve_all_servers(&self.servers, &self.defaults).expect("Failed to resolve servers")
    }

    /// Write the config directory and return its root along with the temp dir
    pub fn persist(self) -> (PathBuf, TempDir) {
        let root = self.temp_dir.path().join("config");
        let configd = root.join("config.d");
        fs::create_dir_all(&configd).expect("Failed to create config.d");

        let defaults = serde_yaml::to_string(&self.defaults).expect("Failed to serialize defaults");
        fs::write(root.join("defaults.yml"), defaults).expect("Failed to write defaults.yml");

        if !self.servers.is_empty() {
            let servers =
                serde_yaml::to_string(&self.servers).expect("Failed to serialize servers");
            fs::write(configd.join("servers.yml"), servers).expect("Failed to write servers.yml");
        }

        (root, self.temp_dir)
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
