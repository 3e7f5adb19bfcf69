/// Schema Introspection Module
///
/// Lists databases, tables and columns, checks existence, and issues the
/// database and table DDL. Descriptors returned here are snapshots taken
/// at read time; they are not updated by later DDL.

use crate::core::db::connection::{Session, SessionState};
use crate::core::db::driver::{Connector, ResultSet};
use crate::core::db::query::{ColumnDefinition, QueryBuilder};
use crate::core::db::records::Scalar;
use crate::core::{Result, StoreError};
use serde::Serialize;
use tracing::{debug, error, info, warn};

const CREATE_DATABASE: &str = "CREATE DATABASE";
const CHARACTER_SET: &str = "CHARACTER SET";
const COLLATE: &str = "COLLATE";

/// Properties of a database parsed from its `SHOW CREATE DATABASE` text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DatabaseDescriptor {
    /// Name the database was looked up by
    pub name: String,
    /// Text between `CREATE DATABASE` and `CHARACTER SET`, trimmed.
    ///
    /// MySQL has no per-database owner: for the usual server output this is
    /// the backtick-quoted database name, followed by any version comment
    /// that precedes the character set clause. The field keeps its legacy
    /// name for existing consumers and carries no ownership meaning.
    pub owner: String,
    /// Text after `COLLATE`, trimmed; empty when there is no collation clause
    pub collation: String,
    /// The raw creation statement as reported by the server
    pub create_statement: String,
}

impl DatabaseDescriptor {
    /// A descriptor with only the name filled in.
    pub fn empty(name: &str) -> Self {
        DatabaseDescriptor {
            name: name.to_string(),
            ..Default::default()
        }
    }
}

/// How a column participates in indexes, from the `Key` column of `DESCRIBE`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum KeyRole {
    None,
    Primary,
    Unique,
    Multiple,
    Other(String),
}

impl From<&str> for KeyRole {
    fn from(key: &str) -> Self {
        match key {
            "" => KeyRole::None,
            "PRI" => KeyRole::Primary,
            "UNI" => KeyRole::Unique,
            "MUL" => KeyRole::Multiple,
            other => KeyRole::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub key: KeyRole,
    pub default: Option<String>,
    pub extra: String,
}

impl ColumnDescriptor {
    /// Builds a column from one `DESCRIBE` row:
    /// `Field, Type, Null, Key, Default, Extra`.
    fn from_describe_row(row: &[Scalar]) -> Result<Self> {
        if row.len() < 6 {
            return Err(StoreError::SchemaParse(format!(
                "DESCRIBE row has {} columns, expected 6",
                row.len()
            )));
        }
        Ok(ColumnDescriptor {
            name: row[0].to_text(),
            data_type: row[1].to_text(),
            nullable: row[2].to_text() == "YES",
            key: KeyRole::from(row[3].to_text().as_str()),
            default: (!row[4].is_null()).then(|| row[4].to_text()),
            extra: row[5].to_text(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableDescriptor {
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
}

/// Parses a `CREATE DATABASE` statement into a descriptor.
///
/// The owner field spans from after `CREATE DATABASE` to `CHARACTER SET`
/// (or the end of the text); the collation spans from after `COLLATE` to
/// the end. Both are trimmed.
///
/// # Errors
///
/// `StoreError::SchemaParse` if the text does not contain `CREATE DATABASE`
/// or the character set clause precedes it.
pub fn parse_create_database(name: &str, statement: &str) -> Result<DatabaseDescriptor> {
    let owner_start = statement
        .find(CREATE_DATABASE)
        .map(|pos| pos + CREATE_DATABASE.len())
        .ok_or_else(|| {
            StoreError::SchemaParse(format!("no {} clause in {:?}", CREATE_DATABASE, statement))
        })?;
    let owner_end = statement.find(CHARACTER_SET).unwrap_or(statement.len());
    if owner_end < owner_start {
        return Err(StoreError::SchemaParse(format!(
            "{} precedes {} in {:?}",
            CHARACTER_SET, CREATE_DATABASE, statement
        )));
    }

    let collation = statement
        .find(COLLATE)
        .map(|pos| statement[pos + COLLATE.len()..].trim())
        .unwrap_or_default();

    Ok(DatabaseDescriptor {
        name: name.to_string(),
        owner: statement[owner_start..owner_end].trim().to_string(),
        collation: collation.to_string(),
        create_statement: statement.to_string(),
    })
}

/// The creation statement is the second column of the single row returned
/// by `SHOW CREATE DATABASE`.
fn create_statement_text(rs: &ResultSet) -> Result<&str> {
    match rs.rows.first().and_then(|row| row.get(1)) {
        Some(Scalar::Text(text)) => Ok(text),
        Some(other) => Err(StoreError::SchemaParse(format!(
            "creation statement is not text: {:?}",
            other
        ))),
        None => Err(StoreError::SchemaParse(format!(
            "expected one row with two columns, got {} rows",
            rs.rows.len()
        ))),
    }
}

/// Database and table level schema operations.
///
/// Read-only database listings work as soon as the session is connected to
/// the host. Everything that mutates schema, and everything that looks at
/// tables, needs the session to be connected to a database.
pub struct SchemaCatalog<'s, C: Connector> {
    session: &'s mut Session<C>,
}

impl<'s, C: Connector> SchemaCatalog<'s, C> {
    pub fn new(session: &'s mut Session<C>) -> Self {
        SchemaCatalog { session }
    }

    /// Describes every database visible to the connected user.
    ///
    /// Only a failed `SHOW DATABASES` is an error. A database that cannot be
    /// described, e.g. one whose name needs characters outside the
    /// identifier allow-list, is listed with empty properties.
    pub fn list_databases(&mut self) -> Result<Vec<DatabaseDescriptor>> {
        let names = match self.session.query(
            "list_databases",
            SessionState::ConnectedToHost,
            &QueryBuilder::show_databases(),
        ) {
            Ok(rs) => rs.first_column_text(),
            Err(e) => {
                error!(error = %e, "Error fetching database information");
                return Err(e);
            }
        };

        let mut databases = Vec::with_capacity(names.len());
        for name in names {
            debug!(%name, "Database");
            match self.describe_database(&name) {
                Ok(descriptor) => databases.push(descriptor),
                Err(e) => {
                    warn!(database = %name, error = %e, "Could not describe database, listing it without properties");
                    databases.push(DatabaseDescriptor::empty(&name));
                }
            }
        }
        Ok(databases)
    }

    /// Fetches and parses the creation statement of `name`.
    ///
    /// A statement that cannot be parsed yields a descriptor with empty
    /// fields; only a failure to run the query is an error.
    pub fn describe_database(&mut self, name: &str) -> Result<DatabaseDescriptor> {
        let rs = match QueryBuilder::show_create_database(name).and_then(|stmt| {
            self.session
                .query("describe_database", SessionState::ConnectedToHost, &stmt)
        }) {
            Ok(rs) => rs,
            Err(e) => {
                error!(database = name, error = %e, "Error fetching database properties");
                return Err(e);
            }
        };

        let parsed = create_statement_text(&rs).and_then(|text| {
            debug!(database = name, statement = text, "Creation statement");
            parse_create_database(name, text)
        });
        match parsed {
            Ok(descriptor) => Ok(descriptor),
            Err(e) => {
                warn!(database = name, error = %e, "Could not parse creation statement");
                Ok(DatabaseDescriptor::empty(name))
            }
        }
    }

    /// Whether a database called `name` exists. Any failure, including an
    /// unconnected session or an invalid name, reads as `false`.
    pub fn database_exists(&mut self, name: &str) -> bool {
        let result = QueryBuilder::database_like(name).and_then(|stmt| {
            self.session
                .query("database_exists", SessionState::ConnectedToHost, &stmt)
        });
        match result {
            Ok(rs) => !rs.rows.is_empty(),
            Err(e) => {
                error!(database = name, error = %e, "Error checking if database exists");
                false
            }
        }
    }

    pub fn create_database(&mut self, name: &str) -> Result<()> {
        let result = QueryBuilder::create_database(name).and_then(|stmt| {
            self.session
                .execute("create_database", SessionState::ConnectedToDatabase, &stmt)
        });
        log_outcome(result, "Database created", "Error creating database", name)
    }

    pub fn drop_database(&mut self, name: &str) -> Result<()> {
        let result = QueryBuilder::drop_database(name).and_then(|stmt| {
            self.session
                .execute("drop_database", SessionState::ConnectedToDatabase, &stmt)
        });
        log_outcome(result, "Database removed", "Error removing database", name)
    }

    /// Creates `name` with the given `(column, declaration)` pairs in order.
    ///
    /// Declarations are raw type text. Outside single-quoted literals they
    /// may not contain `;`, `--`, `#`, `/*`, `*/` or backticks; literals
    /// must be closed and free of backslash escapes.
    pub fn create_table<D>(&mut self, name: &str, columns: &[D]) -> Result<()>
    where
        D: Clone + Into<ColumnDefinition>,
    {
        let columns: Vec<ColumnDefinition> = columns.iter().cloned().map(Into::into).collect();
        let result = QueryBuilder::create_table(name, &columns).and_then(|stmt| {
            self.session
                .execute("create_table", SessionState::ConnectedToDatabase, &stmt)
        });
        log_outcome(result, "Table created", "Error creating table", name)
    }

    /// Drops `name` if it exists; dropping a missing table succeeds.
    pub fn delete_table(&mut self, name: &str) -> Result<()> {
        let result = QueryBuilder::drop_table_if_exists(name).and_then(|stmt| {
            self.session
                .execute("delete_table", SessionState::ConnectedToDatabase, &stmt)
        });
        log_outcome(result, "Table deleted", "Error deleting table", name)
    }

    /// Names of the tables in the selected database.
    pub fn list_tables(&mut self) -> Result<Vec<String>> {
        self.session
            .query(
                "list_tables",
                SessionState::ConnectedToDatabase,
                &QueryBuilder::show_tables(),
            )
            .map(|rs| rs.first_column_text())
            .map_err(|e| {
                error!(error = %e, "Error listing tables");
                e
            })
    }

    /// Every table of the selected database with its columns, in the order
    /// the server reports them. A table that cannot be described is listed
    /// with no columns.
    pub fn list_tables_with_columns(&mut self) -> Result<Vec<TableDescriptor>> {
        let mut tables = Vec::new();
        for name in self.list_tables()? {
            let described = QueryBuilder::describe_table(&name)
                .and_then(|stmt| {
                    self.session
                        .query("list_tables_with_columns", SessionState::ConnectedToDatabase, &stmt)
                })
                .and_then(|rs| {
                    rs.rows
                        .iter()
                        .map(|row| ColumnDescriptor::from_describe_row(row))
                        .collect::<Result<Vec<_>>>()
                });
            let columns = match described {
                Ok(columns) => columns,
                Err(e) => {
                    warn!(table = %name, error = %e, "Could not describe table, listing it without columns");
                    Vec::new()
                }
            };
            tables.push(TableDescriptor { name, columns });
        }

        info!(count = tables.len(), "Listed tables with column details");
        for table in &tables {
            debug!(table = %table.name, columns = ?table.columns, "Table");
        }
        Ok(tables)
    }
}

fn log_outcome<T>(result: Result<T>, success: &str, failure: &str, name: &str) -> Result<()> {
    match result {
        Ok(_) => {
            info!(name, "{}", success);
            Ok(())
        }
        Err(e) => {
            error!(name, error = %e, "{}", failure);
            Err(e)
        }
    }
}
