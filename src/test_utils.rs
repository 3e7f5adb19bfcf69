/// # Test Utilities Module
///
/// An in-memory stand-in for a MySQL server, plugged into [`Session`]
/// through the driver seam. It understands exactly the statements
/// `QueryBuilder` produces and answers with the result shapes a real
/// server returns, including its error messages for missing objects.

use crate::config::ConnectionConfig;
use crate::core::db::connection::Session;
use crate::core::db::driver::{Connector, DriverConnection, ExecOutcome, ResultSet};
use crate::core::db::query::Statement;
use crate::core::db::records::Scalar;
use crate::core::{Result, StoreError};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

pub const FAKE_USER: &str = "app";
pub const FAKE_PASSWORD: &str = "secret";
pub const FAKE_VERSION: &str = "8.0.35-fake";

#[derive(Debug, Default)]
struct FakeTable {
    /// (name, declaration) in creation order
    columns: Vec<(String, String)>,
    rows: Vec<BTreeMap<String, Scalar>>,
    next_id: u64,
}

impl FakeTable {
    fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|(c, _)| c == name)
    }
}

#[derive(Debug, Default)]
struct FakeDatabase {
    create_statement: Option<String>,
    tables: BTreeMap<String, FakeTable>,
}

#[derive(Debug)]
struct ServerState {
    reachable: bool,
    password: String,
    databases: BTreeMap<String, FakeDatabase>,
    open_connections: usize,
    statement_count: usize,
    selected: Option<String>,
}

/// Handle to a shared fake server. Clones see the same state.
#[derive(Debug, Clone)]
pub struct FakeServer {
    state: Arc<Mutex<ServerState>>,
}

impl FakeServer {
    pub fn new() -> Self {
        FakeServer {
            state: Arc::new(Mutex::new(ServerState {
                reachable: true,
                password: FAKE_PASSWORD.to_string(),
                databases: BTreeMap::new(),
                open_connections: 0,
                statement_count: 0,
                selected: None,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_database(&self, name: &str) {
        self.lock()
            .databases
            .insert(name.to_string(), FakeDatabase::default());
    }

    pub fn add_table(&self, database: &str, table: &str, columns: &[(&str, &str)]) {
        let mut state = self.lock();
        let db = state.databases.entry(database.to_string()).or_default();
        db.tables.insert(
            table.to_string(),
            FakeTable {
                columns: columns
                    .iter()
                    .map(|(n, d)| (n.to_string(), d.to_string()))
                    .collect(),
                rows: Vec::new(),
                next_id: 1,
            },
        );
    }

    /// Replaces what `SHOW CREATE DATABASE` reports for `database`.
    pub fn override_create_statement(&self, database: &str, statement: &str) {
        if let Some(db) = self.lock().databases.get_mut(database) {
            db.create_statement = Some(statement.to_string());
        }
    }

    pub fn set_password(&self, password: &str) {
        self.lock().password = password.to_string();
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.lock().reachable = reachable;
    }

    pub fn open_connections(&self) -> usize {
        self.lock().open_connections
    }

    pub fn statement_count(&self) -> usize {
        self.lock().statement_count
    }

    pub fn selected_database(&self) -> Option<String> {
        self.lock().selected.clone()
    }

    pub fn connector(&self) -> FakeConnector {
        FakeConnector {
            server: self.clone(),
        }
    }

    /// A disconnected session whose credentials the server accepts.
    pub fn session(&self, database: &str) -> Session<FakeConnector> {
        self.session_at("fake.local", 3306, database)
    }

    pub fn session_at(&self, host: &str, port: u16, database: &str) -> Session<FakeConnector> {
        let mut config = ConnectionConfig::new(host, FAKE_USER, FAKE_PASSWORD, database, port);
        config.probe_timeout_secs = Some(1);
        Session::with_connector(config, self.connector())
    }
}

/// A session already connected to `database`.
pub fn connected_session(server: &FakeServer, database: &str) -> Session<FakeConnector> {
    let mut session = server.session(database);
    session
        .connect_to_database()
        .expect("fake server accepts the default credentials");
    session
}

pub struct FakeConnector {
    server: FakeServer,
}

impl Connector for FakeConnector {
    type Connection = FakeConnection;

    fn open(&self, config: &ConnectionConfig, database: Option<&str>) -> Result<FakeConnection> {
        let mut state = self.server.lock();
        if !state.reachable {
            return Err(StoreError::Connectivity {
                host: config.host.clone(),
                port: config.port,
                reason: "connection refused".to_string(),
            });
        }
        if config.user != FAKE_USER || config.password != state.password {
            return Err(StoreError::Authentication(format!(
                "Access denied for user '{}'@'localhost' (using password: YES)",
                config.user
            )));
        }
        if let Some(db) = database {
            if !state.databases.contains_key(db) {
                return Err(unknown_database(db));
            }
        }

        state.open_connections += 1;
        state.selected = database.map(str::to_string);
        Ok(FakeConnection {
            server: self.server.clone(),
            database: database.map(str::to_string),
        })
    }
}

pub struct FakeConnection {
    server: FakeServer,
    database: Option<String>,
}

impl Drop for FakeConnection {
    fn drop(&mut self) {
        let mut state = self.server.lock();
        state.open_connections = state.open_connections.saturating_sub(1);
    }
}

impl DriverConnection for FakeConnection {
    fn server_version(&self) -> String {
        FAKE_VERSION.to_string()
    }

    fn query(&mut self, statement: &Statement) -> Result<ResultSet> {
        match self.run(statement)? {
            Reply::Rows(rs) => Ok(rs),
            Reply::Done(_) => Ok(ResultSet::default()),
        }
    }

    fn execute(&mut self, statement: &Statement) -> Result<ExecOutcome> {
        match self.run(statement)? {
            Reply::Rows(_) => Ok(ExecOutcome::default()),
            Reply::Done(outcome) => Ok(outcome),
        }
    }
}

enum Reply {
    Rows(ResultSet),
    Done(ExecOutcome),
}

macro_rules! pattern {
    ($name:ident, $re:expr) => {
        static $name: Lazy<Regex> = Lazy::new(|| Regex::new($re).unwrap());
    };
}

pattern!(CREATE_DB, r"^CREATE DATABASE `(\w+)`$");
pattern!(DROP_DB, r"^DROP DATABASE `(\w+)`$");
pattern!(USE_DB, r"^USE `(\w+)`$");
pattern!(SHOW_CREATE_DB, r"^SHOW CREATE DATABASE `(\w+)`$");
pattern!(SCHEMA_LIKE, r"^SELECT SCHEMA_NAME FROM INFORMATION_SCHEMA\.SCHEMATA WHERE SCHEMA_NAME LIKE \?$");
pattern!(CREATE_TABLE, r"^CREATE TABLE `(\w+)` \((.*)\)$");
pattern!(DROP_TABLE, r"^DROP TABLE IF EXISTS `(\w+)`$");
pattern!(DESCRIBE, r"^DESCRIBE `(\w+)`$");
pattern!(SELECT_ALL, r"^SELECT \* FROM `(\w+)`$");
pattern!(INSERT, r"^INSERT INTO `(\w+)` \((.*)\) VALUES \((.*)\)$");
pattern!(UPDATE, r"^UPDATE `(\w+)` SET (.*) WHERE `id` = \?$");
pattern!(DELETE, r"^DELETE FROM `(\w+)` WHERE `id` = \?$");

/// Identifiers between backticks, in order.
fn quoted_names(text: &str) -> Vec<String> {
    text.split('`')
        .skip(1)
        .step_by(2)
        .map(str::to_string)
        .collect()
}

/// `(name, declaration)` pairs from a `CREATE TABLE` column list.
fn column_definitions(text: &str) -> Vec<(String, String)> {
    let parts: Vec<&str> = text.split('`').skip(1).collect();
    parts
        .chunks(2)
        .map(|pair| {
            let name = pair[0].to_string();
            let decl = pair
                .get(1)
                .map(|d| d.trim().trim_end_matches(',').trim().to_string())
                .unwrap_or_default();
            (name, decl)
        })
        .collect()
}

/// MySQL LIKE with `\` as the escape character.
fn like_matches(pattern: &str, candidate: &str) -> bool {
    let mut re = String::from("^");
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(next) = chars.next() {
                    re.push_str(&regex::escape(&next.to_string()));
                }
            }
            '%' => re.push_str(".*"),
            '_' => re.push('.'),
            other => re.push_str(&regex::escape(&other.to_string())),
        }
    }
    re.push('$');
    Regex::new(&re).map(|r| r.is_match(candidate)).unwrap_or(false)
}

fn describe_row(name: &str, declaration: &str) -> Vec<Scalar> {
    let upper = declaration.to_uppercase();
    let data_type = declaration
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_lowercase();
    let primary = upper.contains("PRIMARY KEY");
    let nullable = !(primary || upper.contains("NOT NULL"));
    let key = if primary {
        "PRI"
    } else if upper.contains("UNIQUE") {
        "UNI"
    } else {
        ""
    };
    let default = upper
        .find("DEFAULT ")
        .map(|pos| {
            let rest = &declaration[pos + "DEFAULT ".len()..];
            let value = rest.split_whitespace().next().unwrap_or_default();
            Scalar::Text(value.trim_matches('\'').to_string())
        })
        .unwrap_or(Scalar::Null);
    let extra = if upper.contains("AUTO_INCREMENT") {
        "auto_increment"
    } else {
        ""
    };

    vec![
        Scalar::Text(name.to_string()),
        Scalar::Text(data_type),
        Scalar::Text(if nullable { "YES" } else { "NO" }.to_string()),
        Scalar::Text(key.to_string()),
        default,
        Scalar::Text(extra.to_string()),
    ]
}

fn unknown_database(name: &str) -> StoreError {
    StoreError::QueryExecution(format!("Unknown database '{}' (1049)", name))
}

fn syntax_error(sql: &str) -> StoreError {
    StoreError::QueryExecution(format!(
        "You have an error in your SQL syntax near '{}' (1064)",
        sql
    ))
}

fn done(affected_rows: u64, last_insert_id: u64) -> Result<Reply> {
    Ok(Reply::Done(ExecOutcome {
        affected_rows,
        last_insert_id,
    }))
}

impl FakeConnection {
    fn run(&mut self, statement: &Statement) -> Result<Reply> {
        let server = self.server.clone();
        let mut state = server.lock();
        state.statement_count += 1;
        let sql = statement.sql.as_str();
        let params = &statement.params;

        if let Some(c) = CREATE_DB.captures(sql) {
            let name = &c[1];
            if state.databases.contains_key(name) {
                return Err(StoreError::QueryExecution(format!(
                    "Can't create database '{}'; database exists (1007)",
                    name
                )));
            }
            state.databases.insert(name.to_string(), FakeDatabase::default());
            return done(1, 0);
        }
        if let Some(c) = DROP_DB.captures(sql) {
            let name = &c[1];
            return match state.databases.remove(name) {
                Some(_) => done(0, 0),
                None => Err(StoreError::QueryExecution(format!(
                    "Can't drop database '{}'; database doesn't exist (1008)",
                    name
                ))),
            };
        }
        if let Some(c) = USE_DB.captures(sql) {
            let name = &c[1];
            if !state.databases.contains_key(name) {
                return Err(unknown_database(name));
            }
            self.database = Some(name.to_string());
            state.selected = Some(name.to_string());
            return done(0, 0);
        }
        if sql == "SHOW DATABASES" {
            let rows = state
                .databases
                .keys()
                .map(|n| vec![Scalar::Text(n.clone())])
                .collect();
            return Ok(Reply::Rows(ResultSet::new(vec!["Database".to_string()], rows)));
        }
        if SCHEMA_LIKE.is_match(sql) {
            let pattern = params.first().map(Scalar::to_text).unwrap_or_default();
            let rows = state
                .databases
                .keys()
                .filter(|n| like_matches(&pattern, n))
                .map(|n| vec![Scalar::Text(n.clone())])
                .collect();
            return Ok(Reply::Rows(ResultSet::new(vec!["SCHEMA_NAME".to_string()], rows)));
        }
        if let Some(c) = SHOW_CREATE_DB.captures(sql) {
            let name = &c[1];
            let db = state.databases.get(name).ok_or_else(|| unknown_database(name))?;
            let text = db.create_statement.clone().unwrap_or_else(|| {
                format!(
                    "CREATE DATABASE `{}` CHARACTER SET utf8mb4 COLLATE utf8mb4_general_ci",
                    name
                )
            });
            return Ok(Reply::Rows(ResultSet::new(
                vec!["Database".to_string(), "Create Database".to_string()],
                vec![vec![Scalar::Text(name.to_string()), Scalar::Text(text)]],
            )));
        }

        // Everything below works on tables of the selected database.
        let db_name = self
            .database
            .clone()
            .ok_or_else(|| StoreError::QueryExecution("No database selected (1046)".to_string()))?;
        let db = state
            .databases
            .get_mut(&db_name)
            .ok_or_else(|| unknown_database(&db_name))?;
        let missing_table = |table: &str| {
            StoreError::QueryExecution(format!("Table '{}.{}' doesn't exist (1146)", db_name, table))
        };

        if sql == "SHOW TABLES" {
            let rows = db
                .tables
                .keys()
                .map(|n| vec![Scalar::Text(n.clone())])
                .collect();
            return Ok(Reply::Rows(ResultSet::new(
                vec![format!("Tables_in_{}", db_name)],
                rows,
            )));
        }
        if let Some(c) = CREATE_TABLE.captures(sql) {
            let name = &c[1];
            if db.tables.contains_key(name) {
                return Err(StoreError::QueryExecution(format!(
                    "Table '{}' already exists (1050)",
                    name
                )));
            }
            let table = FakeTable {
                columns: column_definitions(&c[2]),
                rows: Vec::new(),
                next_id: 1,
            };
            db.tables.insert(name.to_string(), table);
            return done(0, 0);
        }
        if let Some(c) = DROP_TABLE.captures(sql) {
            db.tables.remove(&c[1]);
            return done(0, 0);
        }
        if let Some(c) = DESCRIBE.captures(sql) {
            let table = db.tables.get(&c[1]).ok_or_else(|| missing_table(&c[1]))?;
            let rows = table
                .columns
                .iter()
                .map(|(name, decl)| describe_row(name, decl))
                .collect();
            let columns = ["Field", "Type", "Null", "Key", "Default", "Extra"]
                .iter()
                .map(|s| s.to_string())
                .collect();
            return Ok(Reply::Rows(ResultSet::new(columns, rows)));
        }
        if let Some(c) = SELECT_ALL.captures(sql) {
            let table = db.tables.get(&c[1]).ok_or_else(|| missing_table(&c[1]))?;
            let columns: Vec<String> = table.columns.iter().map(|(n, _)| n.clone()).collect();
            let rows = table
                .rows
                .iter()
                .map(|row| {
                    columns
                        .iter()
                        .map(|col| row.get(col).cloned().unwrap_or(Scalar::Null))
                        .collect()
                })
                .collect();
            return Ok(Reply::Rows(ResultSet::new(columns, rows)));
        }
        if let Some(c) = INSERT.captures(sql) {
            let table = db.tables.get_mut(&c[1]).ok_or_else(|| missing_table(&c[1]))?;
            let columns = quoted_names(&c[2]);
            if columns.len() != params.len() {
                return Err(syntax_error(sql));
            }
            if let Some(unknown) = columns.iter().find(|col| !table.has_column(col)) {
                return Err(StoreError::QueryExecution(format!(
                    "Unknown column '{}' in 'field list' (1054)",
                    unknown
                )));
            }

            let mut row: BTreeMap<String, Scalar> =
                columns.into_iter().zip(params.iter().cloned()).collect();
            let mut insert_id = 0;
            if table.has_column("id") && !row.contains_key("id") {
                insert_id = table.next_id;
                table.next_id += 1;
                row.insert("id".to_string(), Scalar::Int(insert_id as i64));
            }
            table.rows.push(row);
            return done(1, insert_id);
        }
        if let Some(c) = UPDATE.captures(sql) {
            let table = db.tables.get_mut(&c[1]).ok_or_else(|| missing_table(&c[1]))?;
            let columns = quoted_names(&c[2]);
            let (id, values) = match params.split_last() {
                Some((id, values)) if values.len() == columns.len() => (id, values),
                _ => return Err(syntax_error(sql)),
            };
            let mut affected = 0;
            for row in table.rows.iter_mut().filter(|r| r.get("id") == Some(id)) {
                for (col, value) in columns.iter().zip(values) {
                    row.insert(col.clone(), value.clone());
                }
                affected += 1;
            }
            return done(affected, 0);
        }
        if let Some(c) = DELETE.captures(sql) {
            let table = db.tables.get_mut(&c[1]).ok_or_else(|| missing_table(&c[1]))?;
            let id = params.first().ok_or_else(|| syntax_error(sql))?;
            let before = table.rows.len();
            table.rows.retain(|r| r.get("id") != Some(id));
            return done((before - table.rows.len()) as u64, 0);
        }

        Err(syntax_error(sql))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_matches() {
        assert!(like_matches("my\\_db", "my_db"));
        assert!(!like_matches("my\\_db", "myxdb"));
        assert!(like_matches("my_db", "myxdb"));
        assert!(like_matches("inv%", "inventory"));
    }

    #[test]
    fn test_column_definitions() {
        let defs = column_definitions("`id` INT PRIMARY KEY, `price` DECIMAL(10,2) NOT NULL");
        assert_eq!(
            defs,
            vec![
                ("id".to_string(), "INT PRIMARY KEY".to_string()),
                ("price".to_string(), "DECIMAL(10,2) NOT NULL".to_string()),
            ]
        );
    }
}
