//! Merging a server's overrides over the defaults
//!
//! Lists (`files.common`, `files.extra`, `files.exclude`, `mysql.excludeDbs`)
//! are appended: defaults first, then the server's own entries. Every mapping
//! section is a shallow override where the server's keys win. Script entries
//! present on both sides are merged one level deeper.

use super::loader::{ConfigError, Result};
use super::types::*;

/// Resolve one server's options against the defaults
pub fn resolve_server(name: &str, overrides: &RawServer, defaults: &RawServer) -> Result<ServerConfig> {
    finalize(name, merge_raw(overrides, defaults))
}

/// Structural merge without validation or fallbacks
pub fn merge_raw(overrides: &RawServer, defaults: &RawServer) -> RawServer {
    RawServer {
        enabled: pick(&overrides.enabled, &defaults.enabled),
        cluster: pick(&overrides.cluster, &defaults.cluster),
        prune: merge_section(&overrides.prune, &defaults.prune, |o, d| RawPrune {
            keep_daily: pick(&o.keep_daily, &d.keep_daily),
            keep_weekly: pick(&o.keep_weekly, &d.keep_weekly),
            keep_monthly: pick(&o.keep_monthly, &d.keep_monthly),
            keep_yearly: pick(&o.keep_yearly, &d.keep_yearly),
        }),
        rsync: merge_section(&overrides.rsync, &defaults.rsync, |o, d| RawRsync {
            verbose: pick(&o.verbose, &d.verbose),
        }),
        source: merge_section(&overrides.source, &defaults.source, |o, d| RawSource {
            location: pick(&o.location, &d.location),
            ssh: merge_section(&o.ssh, &d.ssh, merge_ssh),
        }),
        destination: merge_section(&overrides.destination, &defaults.destination, |o, d| {
            RawDestination {
                location: pick(&o.location, &d.location),
                path: pick(&o.path, &d.path),
                ssh: merge_section(&o.ssh, &d.ssh, merge_ssh),
            }
        }),
        backup: merge_section(&overrides.backup, &defaults.backup, merge_backup),
    }
}

fn merge_backup(o: &RawBackup, d: &RawBackup) -> RawBackup {
    RawBackup {
        pre_scripts: merge_section(&o.pre_scripts, &d.pre_scripts, merge_scripts),
        files: merge_section(&o.files, &d.files, |o, d| RawFiles {
            common: append(&d.common, &o.common),
            extra: append(&d.extra, &o.extra),
            exclude: append(&d.exclude, &o.exclude),
        }),
        mysql: merge_section(&o.mysql, &d.mysql, |o, d| RawMysql {
            enabled: pick(&o.enabled, &d.enabled),
            mysql_cmd: pick(&o.mysql_cmd, &d.mysql_cmd),
            dump_cmd: pick(&o.dump_cmd, &d.dump_cmd),
            dump_flags: pick(&o.dump_flags, &d.dump_flags),
            host: pick(&o.host, &d.host),
            port: pick(&o.port, &d.port),
            user: pick(&o.user, &d.user),
            password: pick(&o.password, &d.password),
            dbs: pick(&o.dbs, &d.dbs),
            exclude_dbs: append(&d.exclude_dbs, &o.exclude_dbs),
        }),
        post_scripts: merge_section(&o.post_scripts, &d.post_scripts, merge_scripts),
    }
}

fn merge_ssh(o: &RawSsh, d: &RawSsh) -> RawSsh {
    RawSsh {
        host: pick(&o.host, &d.host),
        port: pick(&o.port, &d.port),
        user: pick(&o.user, &d.user),
        key: pick(&o.key, &d.key),
    }
}

/// Defaults' scripts first, then the server's new ones; shared names merge field by field
fn merge_scripts(o: &OrderedMap<RawScript>, d: &OrderedMap<RawScript>) -> OrderedMap<RawScript> {
    let mut merged = d.clone();
    for (name, script) in o.iter() {
        let value = match d.get(name) {
            Some(default) => RawScript {
                script: pick(&script.script, &default.script),
                output: pick(&script.output, &default.output),
                enabled: pick(&script.enabled, &default.enabled),
            },
            None => script.clone(),
        };
        merged.insert(name, value);
    }
    merged
}

fn pick<T: Clone>(overrides: &Option<T>, defaults: &Option<T>) -> Option<T> {
    overrides.as_ref().or(defaults.as_ref()).cloned()
}

fn merge_section<T: Clone>(
    overrides: &Option<T>,
    defaults: &Option<T>,
    merge: impl FnOnce(&T, &T) -> T,
) -> Option<T> {
    match (overrides, defaults) {
        (Some(o), Some(d)) => Some(merge(o, d)),
        (Some(o), None) => Some(o.clone()),
        (None, Some(d)) => Some(d.clone()),
        (None, None) => None,
    }
}

fn append(defaults: &[String], overrides: &[String]) -> Vec<String> {
    defaults.iter().chain(overrides.iter()).cloned().collect()
}

fn missing(server: &str, path: &str) -> ConfigError {
    ConfigError::MissingKey {
        server: server.to_string(),
        path: path.to_string(),
    }
}

/// Apply fallbacks, validate, and strip sections that do not apply
fn finalize(name: &str, raw: RawServer) -> Result<ServerConfig> {
    let source = raw.source.ok_or_else(|| missing(name, "source"))?;
    let destination = raw.destination.ok_or_else(|| missing(name, "destination"))?;
    let backup = raw.backup.ok_or_else(|| missing(name, "backup"))?;

    let source = endpoint(name, "source", source.location, source.ssh)?;
    let destination_endpoint = endpoint(name, "destination", destination.location, destination.ssh)?;
    if source.location() == Location::Ssh && destination_endpoint.location() == Location::Ssh {
        return Err(ConfigError::ValidationError(format!(
            "Server '{}': ssh source with ssh destination is not supported",
            name
        )));
    }
    let path = destination
        .path
        .filter(|p| !p.is_empty())
        .ok_or_else(|| missing(name, "destination.path"))?;

    // No prune section in the server or the defaults: builtin retention
    let prune = raw
        .prune
        .or_else(|| RawServer::builtin().prune)
        .unwrap_or_default();
    let files = backup.files.unwrap_or_default();

    Ok(ServerConfig {
        name: name.to_string(),
        enabled: raw.enabled.unwrap_or(true),
        cluster: raw.cluster.filter(|c| !c.is_empty()),
        prune: RetentionPolicy {
            daily: prune.keep_daily.unwrap_or(0),
            weekly: prune.keep_weekly.unwrap_or(0),
            monthly: prune.keep_monthly.unwrap_or(0),
            yearly: prune.keep_yearly.unwrap_or(0),
        },
        rsync: RsyncOptions {
            verbose: raw.rsync.and_then(|r| r.verbose).unwrap_or(false),
        },
        source,
        destination: Destination {
            path: path.trim_end_matches('/').to_string(),
            endpoint: destination_endpoint,
        },
        files: FileSet {
            common: files.common,
            extra: files.extra,
            exclude: files.exclude,
        },
        pre_scripts: scripts(name, "preScripts", backup.pre_scripts)?,
        post_scripts: scripts(name, "postScripts", backup.post_scripts)?,
        mysql: mysql(backup.mysql),
    })
}

fn endpoint(
    server: &str,
    section: &str,
    location: Option<Location>,
    ssh: Option<RawSsh>,
) -> Result<Endpoint> {
    match location.unwrap_or(Location::Local) {
        Location::Local => Ok(Endpoint::Local),
        Location::Ssh => {
            let ssh = ssh.unwrap_or_default();
            Ok(Endpoint::Ssh(SshTarget {
                host: ssh
                    .host
                    .ok_or_else(|| missing(server, &format!("{}.ssh.host", section)))?,
                port: ssh.port.unwrap_or(DEFAULT_SSH_PORT),
                user: ssh
                    .user
                    .ok_or_else(|| missing(server, &format!("{}.ssh.user", section)))?,
                key: ssh.key,
            }))
        }
    }
}

fn scripts(server: &str, section: &str, raw: Option<OrderedMap<RawScript>>) -> Result<Vec<Script>> {
    let mut scripts = Vec::new();
    for (name, script) in raw.unwrap_or_default() {
        let enabled = script.enabled.unwrap_or(true);
        let command = script.script.unwrap_or_default();
        if enabled && command.trim().is_empty() {
            return Err(missing(server, &format!("backup.{}.{}.script", section, name)));
        }
        scripts.push(Script {
            name,
            script: command,
            output: script.output.filter(|o| !o.is_empty()),
            enabled,
        });
    }
    Ok(scripts)
}

fn mysql(raw: Option<RawMysql>) -> Option<MysqlConfig> {
    let raw = raw?;
    if !raw.enabled.unwrap_or(false) {
        return None;
    }

    Some(MysqlConfig {
        mysql_cmd: raw.mysql_cmd.unwrap_or_else(|| DEFAULT_MYSQL_CMD.to_string()),
        dump_cmd: raw.dump_cmd.unwrap_or_else(|| DEFAULT_DUMP_CMD.to_string()),
        dump_flags: raw.dump_flags.unwrap_or_else(|| DEFAULT_DUMP_FLAGS.to_string()),
        host: raw.host.unwrap_or_else(|| DEFAULT_MYSQL_HOST.to_string()),
        port: raw.port.unwrap_or(DEFAULT_MYSQL_PORT),
        user: raw.user.unwrap_or_else(|| DEFAULT_MYSQL_USER.to_string()),
        password: raw.password.unwrap_or_default(),
        dbs: databases(raw.dbs),
        exclude_dbs: raw.exclude_dbs,
    })
}

fn databases(raw: Option<RawDatabases>) -> Databases {
    match raw {
        None => Databases::All,
        Some(RawDatabases::One(name)) if name == "*" => Databases::All,
        Some(RawDatabases::One(name)) => Databases::Listed(vec![DatabaseSpec::all_tables(name)]),
        Some(RawDatabases::Many(items)) => Databases::Listed(
            items
                .into_iter()
                .map(|item| match item {
                    RawDatabase::Name(name) => DatabaseSpec::all_tables(name),
                    RawDatabase::Spec { name, tables } => DatabaseSpec {
                        name,
                        tables: match tables {
                            Some(RawTables::List(tables)) => tables,
                            Some(RawTables::Pattern(pattern)) if pattern == "*" => Vec::new(),
                            Some(RawTables::Pattern(table)) => vec![table],
                            None => Vec::new(),
                        },
                    },
                })
                .collect(),
        ),
    }
}

impl From<&ServerConfig> for RawServer {
    fn from(config: &ServerConfig) -> Self {
        fn raw_ssh(endpoint: &Endpoint) -> Option<RawSsh> {
            endpoint.ssh().map(|ssh| RawSsh {
                host: Some(ssh.host.clone()),
                port: Some(ssh.port),
                user: Some(ssh.user.clone()),
                key: ssh.key.clone(),
            })
        }

        fn raw_scripts(scripts: &[Script]) -> Option<OrderedMap<RawScript>> {
            Some(
                scripts
                    .iter()
                    .map(|s| {
                        (
                            s.name.clone(),
                            RawScript {
                                script: Some(s.script.clone()),
                                output: s.output.clone(),
                                enabled: Some(s.enabled),
                            },
                        )
                    })
                    .collect(),
            )
        }

        let mysql = match &config.mysql {
            Some(m) => RawMysql {
                enabled: Some(true),
                mysql_cmd: Some(m.mysql_cmd.clone()),
                dump_cmd: Some(m.dump_cmd.clone()),
                dump_flags: Some(m.dump_flags.clone()),
                host: Some(m.host.clone()),
                port: Some(m.port),
                user: Some(m.user.clone()),
                password: Some(m.password.clone()),
                dbs: Some(match &m.dbs {
                    Databases::All => RawDatabases::One("*".to_string()),
                    Databases::Listed(specs) => RawDatabases::Many(
                        specs
                            .iter()
                            .map(|spec| RawDatabase::Spec {
                                name: spec.name.clone(),
                                tables: Some(RawTables::List(spec.tables.clone())),
                            })
                            .collect(),
                    ),
                }),
                exclude_dbs: m.exclude_dbs.clone(),
            },
            None => RawMysql {
                enabled: Some(false),
                ..RawMysql::default()
            },
        };

        RawServer {
            enabled: Some(config.enabled),
            cluster: config.cluster.clone(),
            prune: Some(RawPrune {
                keep_daily: Some(config.prune.daily),
                keep_weekly: Some(config.prune.weekly),
                keep_monthly: Some(config.prune.monthly),
                keep_yearly: Some(config.prune.yearly),
            }),
            rsync: Some(RawRsync {
                verbose: Some(config.rsync.verbose),
            }),
            source: Some(RawSource {
                location: Some(config.source.location()),
                ssh: raw_ssh(&config.source),
            }),
            destination: Some(RawDestination {
                location: Some(config.destination.endpoint.location()),
                path: Some(config.destination.path.clone()),
                ssh: raw_ssh(&config.destination.endpoint),
            }),
            backup: Some(RawBackup {
                pre_scripts: raw_scripts(&config.pre_scripts),
                files: Some(RawFiles {
                    common: config.files.common.clone(),
                    extra: config.files.extra.clone(),
                    exclude: config.files.exclude.clone(),
                }),
                mysql: Some(mysql),
                post_scripts: raw_scripts(&config.post_scripts),
            }),
        }
    }
}
