/// MySQL Driver Module
///
/// Binds the driver seam to the synchronous `mysql` crate. Statements
/// without parameters go over the text protocol; statements with bound
/// parameters are executed as prepared statements.

use crate::config::ConnectionConfig;
use crate::core::db::driver::{Connector, DriverConnection, ExecOutcome, ResultSet};
use crate::core::db::query::Statement;
use crate::core::db::records::Scalar;
use crate::core::{Result, StoreError};
use mysql::consts::ColumnType;
use mysql::prelude::Queryable;
use mysql::{Conn, OptsBuilder, Params, Row, Value};

/// Server error codes that mean the credentials were rejected:
/// access denied for user, access denied to database, and auth plugin
/// mismatch.
const AUTH_ERROR_CODES: [u16; 3] = [1045, 1044, 1698];

/// Opens connections with the `mysql` driver.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlConnector;

impl Connector for MySqlConnector {
    type Connection = MySqlConnection;

    fn open(&self, config: &ConnectionConfig, database: Option<&str>) -> Result<MySqlConnection> {
        let opts = OptsBuilder::new()
            .ip_or_hostname(Some(config.host.clone()))
            .tcp_port(config.port)
            .user(Some(config.user.clone()))
            .pass(Some(config.password.clone()))
            .db_name(database.map(str::to_string))
            .tcp_connect_timeout(Some(config.connect_timeout()))
            .read_timeout(Some(config.statement_timeout()))
            .write_timeout(Some(config.statement_timeout()));

        let conn = Conn::new(opts).map_err(|e| classify_connect_error(config, e))?;
        Ok(MySqlConnection { conn })
    }
}

/// A live `mysql::Conn`. The driver sends `COM_QUIT` when it is dropped.
pub struct MySqlConnection {
    conn: Conn,
}

impl DriverConnection for MySqlConnection {
    fn server_version(&self) -> String {
        let (major, minor, patch) = self.conn.server_version();
        format!("{}.{}.{}", major, minor, patch)
    }

    fn query(&mut self, statement: &Statement) -> Result<ResultSet> {
        let rows = if statement.has_params() {
            self.conn
                .exec::<Row, _, _>(statement.sql.as_str(), to_params(&statement.params))
        } else {
            self.conn.query::<Row, _>(statement.sql.as_str())
        };

        rows.map(to_result_set).map_err(classify_query_error)
    }

    fn execute(&mut self, statement: &Statement) -> Result<ExecOutcome> {
        let result = if statement.has_params() {
            self.conn
                .exec_drop(statement.sql.as_str(), to_params(&statement.params))
        } else {
            self.conn.query_drop(statement.sql.as_str())
        };
        result.map_err(classify_query_error)?;

        Ok(ExecOutcome {
            affected_rows: self.conn.affected_rows(),
            last_insert_id: self.conn.last_insert_id(),
        })
    }
}

fn to_params(params: &[Scalar]) -> Params {
    Params::Positional(params.iter().map(to_value).collect())
}

fn to_value(scalar: &Scalar) -> Value {
    match scalar {
        Scalar::Null => Value::NULL,
        Scalar::Int(i) => Value::Int(*i),
        Scalar::Float(f) => Value::Double(*f),
        Scalar::Text(s) => Value::Bytes(s.as_bytes().to_vec()),
    }
}

fn to_result_set(rows: Vec<Row>) -> ResultSet {
    let columns = rows
        .first()
        .map(|row| {
            row.columns_ref()
                .iter()
                .map(|c| c.name_str().into_owned())
                .collect()
        })
        .unwrap_or_default();

    let rows = rows
        .iter()
        .map(|row| {
            row.columns_ref()
                .iter()
                .enumerate()
                .map(|(i, column)| match row.as_ref(i) {
                    Some(value) => to_scalar(value, column.column_type()),
                    None => Scalar::Null,
                })
                .collect()
        })
        .collect();

    ResultSet::new(columns, rows)
}

/// Normalizes a driver value. The text protocol delivers every value as
/// bytes, so numeric columns are parsed according to their declared type.
fn to_scalar(value: &Value, column_type: ColumnType) -> Scalar {
    match value {
        Value::NULL => Scalar::Null,
        Value::Int(i) => Scalar::Int(*i),
        Value::UInt(u) => match i64::try_from(*u) {
            Ok(i) => Scalar::Int(i),
            Err(_) => Scalar::Text(u.to_string()),
        },
        Value::Float(f) => Scalar::Float(f64::from(*f)),
        Value::Double(d) => Scalar::Float(*d),
        Value::Bytes(bytes) => {
            let text = String::from_utf8_lossy(bytes).into_owned();
            parse_text_value(text, column_type)
        }
        other => Scalar::Text(other.as_sql(true).trim_matches('\'').to_string()),
    }
}

fn parse_text_value(text: String, column_type: ColumnType) -> Scalar {
    match column_type {
        ColumnType::MYSQL_TYPE_TINY
        | ColumnType::MYSQL_TYPE_SHORT
        | ColumnType::MYSQL_TYPE_INT24
        | ColumnType::MYSQL_TYPE_LONG
        | ColumnType::MYSQL_TYPE_LONGLONG
        | ColumnType::MYSQL_TYPE_YEAR => match text.parse::<i64>() {
            Ok(i) => Scalar::Int(i),
            Err(_) => Scalar::Text(text),
        },
        ColumnType::MYSQL_TYPE_FLOAT | ColumnType::MYSQL_TYPE_DOUBLE => {
            match text.parse::<f64>() {
                Ok(f) => Scalar::Float(f),
                Err(_) => Scalar::Text(text),
            }
        }
        _ => Scalar::Text(text),
    }
}

fn classify_connect_error(config: &ConnectionConfig, err: mysql::Error) -> StoreError {
    match err {
        mysql::Error::MySqlError(e) if AUTH_ERROR_CODES.contains(&e.code) => {
            StoreError::Authentication(e.message)
        }
        mysql::Error::MySqlError(e) => {
            StoreError::QueryExecution(format!("{} ({})", e.message, e.code))
        }
        other => StoreError::Connectivity {
            host: config.host.clone(),
            port: config.port,
            reason: other.to_string(),
        },
    }
}

fn classify_query_error(err: mysql::Error) -> StoreError {
    match err {
        mysql::Error::MySqlError(e) => {
            StoreError::QueryExecution(format!("{} ({})", e.message, e.code))
        }
        other => StoreError::QueryExecution(other.to_string()),
    }
}
