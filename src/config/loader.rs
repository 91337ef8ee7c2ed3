use super::merge::resolve_server;
use super::types::*;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path:?}: {source}")]
    ParseError {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Defaults file {0:?} does not exist")]
    MissingDefaults(PathBuf),

    #[error("Server '{server}': required option '{path}' is missing from both the server and the defaults")]
    MissingKey { server: String, path: String },

    #[error("Validation error: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Raw configuration read from a config directory
#[derive(Debug, Clone)]
pub struct ConfigDir {
    pub root: PathBuf,
    pub defaults: RawServer,
    pub servers: OrderedMap<RawServer>,
}

/// Load `<root>/defaults.yml` and every `<root>/config.d/*.yml`
///
/// Server files are read in file-name order; a server defined again in a later
/// file replaces the earlier definition.
pub fn load_config_dir<P: AsRef<Path>>(root: P) -> Result<ConfigDir> {
    let root = root.as_ref().to_path_buf();
    let defaults_file = root.join("defaults.yml");
    if !defaults_file.exists() {
        return Err(ConfigError::MissingDefaults(defaults_file));
    }

    let defaults: RawServer = read_yaml::<Option<RawServer>>(&defaults_file)?.unwrap_or_default();

    let mut servers = OrderedMap::new();
    for file in server_files(&root.join("config.d"))? {
        debug!("Reading server config {:?}", file);
        let entries: OrderedMap<RawServer> =
            read_yaml::<Option<OrderedMap<RawServer>>>(&file)?.unwrap_or_default();
        servers.extend(entries);
    }

    Ok(ConfigDir {
        root,
        defaults,
        servers,
    })
}

/// `*.yml` / `*.yaml` files of a `config.d` directory, sorted by name
fn server_files(configd: &Path) -> Result<Vec<PathBuf>> {
    if !configd.is_dir() {
        return Ok(Vec::new());
    }

    let entries = fs::read_dir(configd).map_err(|source| ConfigError::ReadError {
        path: configd.to_path_buf(),
        source,
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && matches!(
                    path.extension().and_then(|e| e.to_str()),
                    Some("yml") | Some("yaml")
                )
        })
        .collect();
    files.sort();

    Ok(files)
}

fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&contents).map_err(|source| ConfigError::ParseError {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolve every server against the defaults, in declaration order
pub fn resolve_all_servers(
    servers: &OrderedMap<RawServer>,
    defaults: &RawServer,
) -> Result<Vec<ServerConfig>> {
    servers
        .iter()
        .map(|(name, server)| resolve_server(name, server, defaults))
        .collect()
}
