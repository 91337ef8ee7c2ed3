use serde::de::{self, DeserializeOwned};
use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Mapping that keeps declaration order (servers, scripts)
///
/// Inserting an existing key replaces the value in place, so a later config
/// file overriding a server keeps that server's original position.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedMap<V>(Vec<(String, V)>);

impl<V> Default for OrderedMap<V> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<V> OrderedMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a value, keeping the position of an existing key
    pub fn insert(&mut self, key: impl Into<String>, value: V) {
        let key = key.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.0.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Merge another map over this one; its values win, first positions stay
    pub fn extend(&mut self, other: OrderedMap<V>) {
        for (key, value) in other.0 {
            self.insert(key, value);
        }
    }
}

impl<V> FromIterator<(String, V)> for OrderedMap<V> {
    fn from_iter<I: IntoIterator<Item = (String, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (key, value) in iter {
            map.insert(key, value);
        }
        map
    }
}

impl<V> IntoIterator for OrderedMap<V> {
    type Item = (String, V);
    type IntoIter = std::vec::IntoIter<(String, V)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<V: Serialize> Serialize for OrderedMap<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, value) in &self.0 {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

impl<'de, V: DeserializeOwned> Deserialize<'de> for OrderedMap<V> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mapping = serde_yaml::Mapping::deserialize(deserializer)?;
        let mut map = Self::new();
        for (key, value) in mapping {
            let key = match key {
                serde_yaml::Value::String(s) => s,
                serde_yaml::Value::Number(n) => n.to_string(),
                serde_yaml::Value::Bool(b) => b.to_string(),
                other => {
                    return Err(de::Error::custom(format!(
                        "unsupported mapping key: {:?}",
                        other
                    )))
                }
            };
            let value = serde_yaml::from_value(value).map_err(de::Error::custom)?;
            map.insert(key, value);
        }
        Ok(map)
    }
}

/// Where an endpoint lives relative to the machine running the backups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Location {
    Local,
    Ssh,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Local => f.write_str("local"),
            Location::Ssh => f.write_str("ssh"),
        }
    }
}

// ---------------------------------------------------------------------------
// Raw configuration (as written in YAML, every key optional)
// ---------------------------------------------------------------------------

/// One server entry, or the defaults block it is merged over
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawServer {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prune: Option<RawPrune>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rsync: Option<RawRsync>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<RawSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<RawDestination>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup: Option<RawBackup>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPrune {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_daily: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_weekly: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_monthly: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keep_yearly: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct RawRsync {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verbose: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct RawSsh {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct RawSource {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh: Option<RawSsh>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct RawDestination {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh: Option<RawSsh>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawBackup {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_scripts: Option<OrderedMap<RawScript>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<RawFiles>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mysql: Option<RawMysql>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_scripts: Option<OrderedMap<RawScript>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct RawFiles {
    #[serde(default)]
    pub common: Vec<String>,
    #[serde(default)]
    pub extra: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct RawScript {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMysql {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mysql_cmd: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dump_cmd: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dump_flags: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dbs: Option<RawDatabases>,
    #[serde(default)]
    pub exclude_dbs: Vec<String>,
}

/// `dbs:` accepts `"*"`, a single name, or a list of names / `{name, tables}`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RawDatabases {
    One(String),
    Many(Vec<RawDatabase>),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RawDatabase {
    Name(String),
    Spec {
        name: String,
        #[serde(default)]
        tables: Option<RawTables>,
    },
}

/// `tables:` is either `"*"` or a list of table names
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum RawTables {
    Pattern(String),
    List(Vec<String>),
}

impl RawServer {
    /// Defaults applied when servers are given without a defaults block
    ///
    /// There is deliberately no `destination` here: every server has to say
    /// where its snapshots go.
    pub fn builtin() -> Self {
        Self {
            enabled: Some(true),
            cluster: None,
            prune: Some(RawPrune {
                keep_daily: Some(30),
                keep_weekly: Some(24),
                keep_monthly: Some(60),
                keep_yearly: Some(10),
            }),
            rsync: Some(RawRsync {
                verbose: Some(false),
            }),
            source: Some(RawSource {
                location: Some(Location::Local),
                ssh: None,
            }),
            destination: None,
            backup: Some(RawBackup {
                pre_scripts: None,
                files: Some(RawFiles::default()),
                mysql: Some(RawMysql {
                    enabled: Some(false),
                    mysql_cmd: Some(DEFAULT_MYSQL_CMD.to_string()),
                    dump_cmd: Some(DEFAULT_DUMP_CMD.to_string()),
                    dump_flags: Some(DEFAULT_DUMP_FLAGS.to_string()),
                    host: Some(DEFAULT_MYSQL_HOST.to_string()),
                    port: Some(DEFAULT_MYSQL_PORT),
                    user: Some(DEFAULT_MYSQL_USER.to_string()),
                    password: None,
                    dbs: Some(RawDatabases::One("*".to_string())),
                    exclude_dbs: DEFAULT_EXCLUDE_DBS.iter().map(|s| s.to_string()).collect(),
                }),
                post_scripts: None,
            }),
        }
    }
}

pub(crate) const DEFAULT_SSH_PORT: u16 = 22;
pub(crate) const DEFAULT_MYSQL_CMD: &str = "mysql";
pub(crate) const DEFAULT_DUMP_CMD: &str = "mysqldump";
pub(crate) const DEFAULT_DUMP_FLAGS: &str = "--quick --single-transaction --flush-logs";
pub(crate) const DEFAULT_MYSQL_HOST: &str = "127.0.0.1";
pub(crate) const DEFAULT_MYSQL_PORT: u16 = 3306;
pub(crate) const DEFAULT_MYSQL_USER: &str = "root";
pub(crate) const DEFAULT_EXCLUDE_DBS: &[&str] = &[
    "information_schema",
    "performance_schema",
    "lost+found",
    "#mysql50#lost+found",
];

// ---------------------------------------------------------------------------
// Resolved configuration (every key present, inapplicable sections stripped)
// ---------------------------------------------------------------------------

/// Fully resolved options for one server
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    #[serde(skip)]
    pub name: String,
    pub enabled: bool,
    pub cluster: Option<String>,
    pub prune: RetentionPolicy,
    pub rsync: RsyncOptions,
    pub source: Endpoint,
    pub destination: Destination,
    pub files: FileSet,
    pub pre_scripts: Vec<Script>,
    pub post_scripts: Vec<Script>,
    /// `None` when MySQL dumps are disabled for this server
    pub mysql: Option<MysqlConfig>,
}

impl ServerConfig {
    /// Source and destination location pair
    pub fn topology(&self) -> (Location, Location) {
        (self.source.location(), self.destination.endpoint.location())
    }

    /// Common and extra paths, in that order
    pub fn file_list(&self) -> Vec<String> {
        self.files
            .common
            .iter()
            .chain(self.files.extra.iter())
            .cloned()
            .collect()
    }
}

/// Snapshot counts kept per retention tier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetentionPolicy {
    #[serde(rename = "keepDaily")]
    pub daily: u32,
    #[serde(rename = "keepWeekly")]
    pub weekly: u32,
    #[serde(rename = "keepMonthly")]
    pub monthly: u32,
    #[serde(rename = "keepYearly")]
    pub yearly: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RsyncOptions {
    pub verbose: bool,
}

/// Connection details for an endpoint reached over SSH
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SshTarget {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub key: Option<String>,
}

impl SshTarget {
    /// `user@host`
    pub fn address(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "location", rename_all = "lowercase")]
pub enum Endpoint {
    Local,
    Ssh(SshTarget),
}

impl Endpoint {
    pub fn location(&self) -> Location {
        match self {
            Endpoint::Local => Location::Local,
            Endpoint::Ssh(_) => Location::Ssh,
        }
    }

    pub fn ssh(&self) -> Option<&SshTarget> {
        match self {
            Endpoint::Local => None,
            Endpoint::Ssh(target) => Some(target),
        }
    }

    /// Prefix a path with `user@host:` when the endpoint is remote
    pub fn rsync_path(&self, path: &str) -> String {
        match self {
            Endpoint::Local => path.to_string(),
            Endpoint::Ssh(target) => format!("{}:{}", target.address(), path),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Destination {
    pub path: String,
    #[serde(flatten)]
    pub endpoint: Endpoint,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileSet {
    pub common: Vec<String>,
    pub extra: Vec<String>,
    pub exclude: Vec<String>,
}

/// A pre or post script
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Script {
    pub name: String,
    pub script: String,
    /// Path relative to the snapshot directory that receives stdout
    pub output: Option<String>,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MysqlConfig {
    pub mysql_cmd: String,
    pub dump_cmd: String,
    pub dump_flags: String,
    pub host: String,
    pub port: u16,
    pub user: String,
    #[serde(skip_serializing)]
    pub password: String,
    pub dbs: Databases,
    pub exclude_dbs: Vec<String>,
}

/// Which databases to dump
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Databases {
    /// Every database on the server minus `excludeDbs`
    All,
    Listed(Vec<DatabaseSpec>),
}

impl Serialize for Databases {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Databases::All => serializer.serialize_str("*"),
            Databases::Listed(specs) => {
                let mut seq = serializer.serialize_seq(Some(specs.len()))?;
                for spec in specs {
                    seq.serialize_element(spec)?;
                }
                seq.end()
            }
        }
    }
}

/// One database and its selected tables (empty means all tables)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatabaseSpec {
    pub name: String,
    pub tables: Vec<String>,
}

impl DatabaseSpec {
    pub fn all_tables(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tables: Vec::new(),
        }
    }
}
