/// Statement Construction Module
///
/// All SQL text sent to the server is produced here. Identifiers cannot be
/// bound as parameters, so they are checked against an allow-list and
/// backtick-quoted; every value travels separately as a bound parameter.

use crate::core::db::records::{Record, RecordId, Scalar};
use crate::core::{Result, StoreError};
use once_cell::sync::Lazy;
use regex::Regex;

/// MySQL limits database, table and column names to 64 characters.
pub const MAX_IDENTIFIER_LEN: usize = 64;

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9_]{1,64}$").expect("identifier pattern is valid")
});

/// A statement ready for execution: SQL text with `?` placeholders and the
/// values bound to them, in order.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Scalar>,
}

impl Statement {
    /// A statement without parameters.
    pub fn text(sql: impl Into<String>) -> Self {
        Statement {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn with_params(sql: impl Into<String>, params: Vec<Scalar>) -> Self {
        Statement {
            sql: sql.into(),
            params,
        }
    }

    pub fn has_params(&self) -> bool {
        !self.params.is_empty()
    }
}

/// One column of a `CREATE TABLE`: a name plus its raw declaration, e.g.
/// `("id", "INT AUTO_INCREMENT PRIMARY KEY")`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDefinition {
    pub name: String,
    pub declaration: String,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, declaration: impl Into<String>) -> Self {
        ColumnDefinition {
            name: name.into(),
            declaration: declaration.into(),
        }
    }
}

impl<N: Into<String>, D: Into<String>> From<(N, D)> for ColumnDefinition {
    fn from((name, declaration): (N, D)) -> Self {
        ColumnDefinition::new(name, declaration)
    }
}

/// Checks `name` against the identifier allow-list (ASCII letters, digits,
/// underscore, 1 to 64 characters).
pub fn validate_identifier(name: &str) -> Result<&str> {
    if IDENTIFIER.is_match(name) {
        Ok(name)
    } else {
        Err(StoreError::InvalidIdentifier(name.to_string()))
    }
}

/// Validates and backtick-quotes an identifier.
pub fn quote_identifier(name: &str) -> Result<String> {
    validate_identifier(name).map(|n| format!("`{}`", n))
}

/// Column declarations are free text, so they are only screened for
/// anything that could end the statement or hide the rest of it.
/// Single-quoted literals such as `DEFAULT '#ffffff'` are not screened,
/// but they must be closed and must not use backslash escapes.
fn validate_declaration(column: &str, declaration: &str) -> Result<()> {
    const FORBIDDEN: [&str; 6] = [";", "--", "#", "/*", "*/", "`"];

    if declaration.trim().is_empty() {
        return Err(StoreError::InvalidInput(format!(
            "column {} has an empty declaration",
            column
        )));
    }
    let outside = text_outside_literals(column, declaration)?;
    if let Some(token) = FORBIDDEN.iter().find(|t| outside.contains(**t)) {
        return Err(StoreError::InvalidInput(format!(
            "column {} declaration contains forbidden token {:?}",
            column, token
        )));
    }
    Ok(())
}

/// The declaration with every single-quoted literal replaced by a space.
/// A doubled quote (`'it''s'`) closes and reopens, which leaves the same
/// result.
fn text_outside_literals(column: &str, declaration: &str) -> Result<String> {
    let mut outside = String::with_capacity(declaration.len());
    let mut in_literal = false;
    for c in declaration.chars() {
        match c {
            '\'' => {
                in_literal = !in_literal;
                outside.push(' ');
            }
            // The meaning of a backslash depends on the server's SQL mode.
            '\\' if in_literal => {
                return Err(StoreError::InvalidInput(format!(
                    "column {} declaration uses a backslash escape in a literal",
                    column
                )));
            }
            _ if in_literal => {}
            other => outside.push(other),
        }
    }
    if in_literal {
        return Err(StoreError::InvalidInput(format!(
            "column {} declaration has an unterminated literal",
            column
        )));
    }
    Ok(outside)
}

fn id_param(id: RecordId) -> Result<Scalar> {
    i64::try_from(id)
        .map(Scalar::Int)
        .map_err(|_| StoreError::InvalidInput(format!("record id {} is out of range", id)))
}

/// Builds the statements used by the catalog and record store.
pub struct QueryBuilder;

impl QueryBuilder {
    pub fn create_database(name: &str) -> Result<Statement> {
        Ok(Statement::text(format!("CREATE DATABASE {}", quote_identifier(name)?)))
    }

    pub fn drop_database(name: &str) -> Result<Statement> {
        Ok(Statement::text(format!("DROP DATABASE {}", quote_identifier(name)?)))
    }

    pub fn use_database(name: &str) -> Result<Statement> {
        Ok(Statement::text(format!("USE {}", quote_identifier(name)?)))
    }

    pub fn show_databases() -> Statement {
        Statement::text("SHOW DATABASES")
    }

    pub fn show_create_database(name: &str) -> Result<Statement> {
        Ok(Statement::text(format!(
            "SHOW CREATE DATABASE {}",
            quote_identifier(name)?
        )))
    }

    /// Catalog lookup for a single database name. `_` is a LIKE wildcard,
    /// so it is escaped to keep the match literal.
    pub fn database_like(name: &str) -> Result<Statement> {
        let pattern = validate_identifier(name)?.replace('_', "\\_");
        Ok(Statement::with_params(
            "SELECT SCHEMA_NAME FROM INFORMATION_SCHEMA.SCHEMATA WHERE SCHEMA_NAME LIKE ?",
            vec![Scalar::Text(pattern)],
        ))
    }

    pub fn create_table(name: &str, columns: &[ColumnDefinition]) -> Result<Statement> {
        let table = quote_identifier(name)?;
        if columns.is_empty() {
            return Err(StoreError::InvalidInput(format!(
                "table {} needs at least one column",
                name
            )));
        }

        let definitions = columns
            .iter()
            .map(|c| {
                validate_declaration(&c.name, &c.declaration)?;
                Ok(format!("{} {}", quote_identifier(&c.name)?, c.declaration.trim()))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Statement::text(format!(
            "CREATE TABLE {} ({})",
            table,
            definitions.join(", ")
        )))
    }

    pub fn drop_table_if_exists(name: &str) -> Result<Statement> {
        Ok(Statement::text(format!(
            "DROP TABLE IF EXISTS {}",
            quote_identifier(name)?
        )))
    }

    pub fn show_tables() -> Statement {
        Statement::text("SHOW TABLES")
    }

    pub fn describe_table(name: &str) -> Result<Statement> {
        Ok(Statement::text(format!("DESCRIBE {}", quote_identifier(name)?)))
    }

    pub fn select_all(table: &str) -> Result<Statement> {
        Ok(Statement::text(format!("SELECT * FROM {}", quote_identifier(table)?)))
    }

    /// `INSERT INTO t (a, b) VALUES (?, ?)` with the record's values bound in
    /// column order.
    pub fn insert(table: &str, record: &Record) -> Result<Statement> {
        let table = quote_identifier(table)?;
        if record.is_empty() {
            return Err(StoreError::InvalidInput(format!(
                "insert into {} needs at least one column",
                table
            )));
        }

        let mut columns = Vec::with_capacity(record.len());
        let mut params = Vec::with_capacity(record.len());
        for (column, value) in record {
            columns.push(quote_identifier(column)?);
            params.push(value.clone());
        }
        let placeholders = vec!["?"; params.len()].join(", ");

        Ok(Statement::with_params(
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                table,
                columns.join(", "),
                placeholders
            ),
            params,
        ))
    }

    /// `UPDATE t SET a = ?, b = ? WHERE id = ?` touching only the columns
    /// present in `changes`.
    pub fn update(table: &str, id: RecordId, changes: &Record) -> Result<Statement> {
        let table = quote_identifier(table)?;
        if changes.is_empty() {
            return Err(StoreError::InvalidInput(format!(
                "update of {} needs at least one column",
                table
            )));
        }

        let mut assignments = Vec::with_capacity(changes.len());
        let mut params = Vec::with_capacity(changes.len() + 1);
        for (column, value) in changes {
            assignments.push(format!("{} = ?", quote_identifier(column)?));
            params.push(value.clone());
        }
        params.push(id_param(id)?);

        Ok(Statement::with_params(
            format!("UPDATE {} SET {} WHERE `id` = ?", table, assignments.join(", ")),
            params,
        ))
    }

    pub fn delete(table: &str, id: RecordId) -> Result<Statement> {
        Ok(Statement::with_params(
            format!("DELETE FROM {} WHERE `id` = ?", quote_identifier(table)?),
            vec![id_param(id)?],
        ))
    }
}
