//! MySQL listing and dump commands

use super::command::{Pipeline, Stage};
use crate::config::{DatabaseSpec, Databases, MysqlConfig};
use std::collections::BTreeSet;

/// `mysql -h H -P P -u U -pPW -Bse "show databases"`
pub fn list_databases(mysql: &MysqlConfig) -> Pipeline {
    Pipeline::from(
        Stage::from_words(&mysql.mysql_cmd)
            .args(connection_args(mysql))
            .args(["-Bse", "show databases"]),
    )
}

/// `<dumpCmd> -h H -P P -u U -pPW <dumpFlags> db [tables...] | gzip`
pub fn dump_database(mysql: &MysqlConfig, database: &DatabaseSpec) -> Pipeline {
    let dump = Stage::from_words(&mysql.dump_cmd)
        .args(connection_args(mysql))
        .args(mysql.dump_flags.split_whitespace())
        .arg(database.name.clone())
        .args(database.tables.iter().cloned());
    Pipeline::new(dump).pipe(Stage::new("gzip"))
}

fn connection_args(mysql: &MysqlConfig) -> Vec<String> {
    let mut args = vec![
        "-h".to_string(),
        mysql.host.clone(),
        "-P".to_string(),
        mysql.port.to_string(),
        "-u".to_string(),
        mysql.user.clone(),
    ];
    // A bare -p would prompt for a password
    if !mysql.password.is_empty() {
        args.push(format!("-p{}", mysql.password));
    }
    args
}

/// Databases to dump
///
/// `listing` is the output of [`list_databases`] and is only consulted when
/// every database was requested. The result is sorted and free of duplicates.
pub fn select_databases(mysql: &MysqlConfig, listing: &[String]) -> Vec<DatabaseSpec> {
    match &mysql.dbs {
        Databases::All => listing
            .iter()
            .filter(|name| !mysql.exclude_dbs.contains(name))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(|name| DatabaseSpec::all_tables(name.clone()))
            .collect(),
        Databases::Listed(specs) => specs.clone(),
    }
}

/// `<snapshot>/mysqldump/<db>.sql.gz`
pub fn dump_path(snapshot_dir: &str, database: &str) -> String {
    format!("{}/mysqldump/{}.sql.gz", snapshot_dir, database)
}
