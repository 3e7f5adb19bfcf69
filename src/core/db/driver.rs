/// Driver Seam Module
///
/// The session never talks to the wire protocol directly. It goes through
/// a [`Connector`] that opens [`DriverConnection`] handles, so the MySQL
/// driver can be swapped for an in-memory server in tests.

use crate::config::ConnectionConfig;
use crate::core::db::query::Statement;
use crate::core::db::records::Scalar;
use crate::core::Result;

/// Tabular result of a statement: column names plus rows of scalars in
/// the same positional order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Scalar>>,
}

impl ResultSet {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Scalar>>) -> Self {
        ResultSet { columns, rows }
    }

    /// Values of the first column, rendered as text. Used for the
    /// single-column catalog listings (`SHOW DATABASES`, `SHOW TABLES`).
    pub fn first_column_text(&self) -> Vec<String> {
        self.rows
            .iter()
            .filter_map(|row| row.first())
            .map(|value| value.to_text())
            .collect()
    }
}

/// What the server reported after a data-modifying statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecOutcome {
    pub affected_rows: u64,
    pub last_insert_id: u64,
}

/// Opens authenticated connections.
pub trait Connector {
    type Connection: DriverConnection;

    /// Authenticates against the configured host. When `database` is
    /// `Some`, that database is selected as part of the handshake.
    ///
    /// # Errors
    ///
    /// `StoreError::Connectivity` when the host cannot be reached,
    /// `StoreError::Authentication` when credentials are rejected.
    fn open(&self, config: &ConnectionConfig, database: Option<&str>) -> Result<Self::Connection>;
}

/// One live, exclusively owned connection. Dropping it releases the
/// underlying socket.
pub trait DriverConnection {
    /// Server version string captured during the handshake.
    fn server_version(&self) -> String;

    /// Runs a statement that produces rows.
    fn query(&mut self, statement: &Statement) -> Result<ResultSet>;

    /// Runs a statement that produces no rows.
    fn execute(&mut self, statement: &Statement) -> Result<ExecOutcome>;
}
