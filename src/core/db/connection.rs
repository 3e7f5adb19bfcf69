/// Connection Management Module
///
/// This module owns the connection lifecycle: reachability probing, the
/// host and database handshakes, and release of the handle.

use crate::config::ConnectionConfig;
use crate::core::db::driver::{Connector, DriverConnection, ExecOutcome, ResultSet};
use crate::core::db::mysql::MySqlConnector;
use crate::core::db::query::{QueryBuilder, Statement};
use crate::core::db::records::RecordStore;
use crate::core::db::schema::SchemaCatalog;
use crate::core::{Result, StoreError};
use std::fmt;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use tracing::{debug, error, info, warn};

/// Connection state of a [`Session`].
///
/// States only advance `Disconnected` → `ConnectedToHost` →
/// `ConnectedToDatabase`; any state may move to `Closed`, which is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No handle has been opened yet
    Disconnected,
    /// Authenticated against the server, no database selected
    ConnectedToHost,
    /// Authenticated with the configured database selected
    ConnectedToDatabase,
    /// Handle released; the session cannot be reused
    Closed,
}

impl SessionState {
    /// Whether a live handle exists in this state.
    pub fn is_connected(&self) -> bool {
        matches!(
            self,
            SessionState::ConnectedToHost | SessionState::ConnectedToDatabase
        )
    }

    /// Whether an operation requiring `required` may run in this state.
    /// `ConnectedToDatabase` also satisfies a `ConnectedToHost` requirement.
    pub fn satisfies(&self, required: SessionState) -> bool {
        match required {
            SessionState::ConnectedToHost => self.is_connected(),
            other => *self == other,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Disconnected => "disconnected",
            SessionState::ConnectedToHost => "connected to host",
            SessionState::ConnectedToDatabase => "connected to database",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// A single connection to a MySQL-compatible server and its state.
///
/// The session exclusively owns its handle and never hands it out. The
/// handle is released by [`Session::close`] or, at the latest, on drop.
/// A session is not meant to be shared; use one per worker.
pub struct Session<C: Connector = MySqlConnector> {
    config: ConnectionConfig,
    connector: C,
    handle: Option<C::Connection>,
    state: SessionState,
    server_version: Option<String>,
}

impl Session<MySqlConnector> {
    /// Creates a disconnected session that will use the MySQL driver.
    pub fn new(config: ConnectionConfig) -> Self {
        Session::with_connector(config, MySqlConnector)
    }

    /// Loads connection settings from a TOML file and creates a session.
    ///
    /// # Errors
    ///
    /// `StoreError::Config` if a required key or the `[mysql]` table is
    /// missing, `StoreError::Io` if the file cannot be read.
    pub fn from_config_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = crate::config::load_config(path)?;
        Ok(Session::new(config.mysql))
    }
}

impl<C: Connector> Session<C> {
    /// Creates a disconnected session on top of an arbitrary connector.
    pub fn with_connector(config: ConnectionConfig, connector: C) -> Self {
        info!(
            host = %config.host,
            port = config.port,
            database = %config.database,
            "Creating session"
        );
        Session {
            config,
            connector,
            handle: None,
            state: SessionState::Disconnected,
            server_version: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Server version reported by the most recent handshake.
    pub fn server_version(&self) -> Option<&str> {
        self.server_version.as_deref()
    }

    /// Schema operations borrowing this session.
    pub fn catalog(&mut self) -> SchemaCatalog<'_, C> {
        SchemaCatalog::new(self)
    }

    /// Row operations borrowing this session.
    pub fn records(&mut self) -> RecordStore<'_, C> {
        RecordStore::new(self)
    }

    /// Attempts a bare TCP connection to host:port, bounded by the probe
    /// timeout. Nothing is authenticated and no state changes.
    pub fn probe_reachability(&self) -> bool {
        let host = &self.config.host;
        let port = self.config.port;
        let timeout = self.config.probe_timeout();
        debug!(%host, port, ?timeout, "Attempting to reach host");

        let addrs = match (host.as_str(), port).to_socket_addrs() {
            Ok(addrs) => addrs.collect::<Vec<_>>(),
            Err(e) => {
                error!(%host, port, error = %e, "Failed to resolve host");
                return false;
            }
        };

        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(_) => {
                    info!(%host, port, "Can reach host");
                    return true;
                }
                Err(e) => last_error = Some(e),
            }
        }

        match last_error {
            Some(e) => error!(%host, port, error = %e, "Failed to reach host"),
            None => error!(%host, port, "Failed to reach host: no addresses resolved"),
        }
        false
    }

    /// Authenticates against the server without selecting a database.
    ///
    /// Only valid from `Disconnected`. On failure the state is unchanged.
    pub fn connect_to_host(&mut self) -> Result<()> {
        if self.state != SessionState::Disconnected {
            let err = self.not_connected("connect_to_host", SessionState::Disconnected);
            warn!(error = %err, "Refusing to connect to host");
            return Err(err);
        }

        debug!(host = %self.config.host, port = self.config.port, "Attempting to connect to host");
        match self.connector.open(&self.config, None) {
            Ok(handle) => {
                self.install(handle);
                self.state = SessionState::ConnectedToHost;
                info!(
                    host = %self.config.host,
                    port = self.config.port,
                    version = self.server_version().unwrap_or_default(),
                    "Connected to host"
                );
                Ok(())
            }
            Err(e) => {
                error!(host = %self.config.host, port = self.config.port, error = %e, "Error connecting to host");
                Err(e)
            }
        }
    }

    /// Authenticates and selects the configured database.
    ///
    /// From `Disconnected` this opens a new handle with the database
    /// selected; from `ConnectedToHost` it selects the database on the
    /// existing handle. Already being connected to the database is a no-op.
    pub fn connect_to_database(&mut self) -> Result<()> {
        let database = self.config.database.clone();
        debug!(host = %self.config.host, port = self.config.port, %database, "Attempting to connect to database");

        let result = match self.state {
            SessionState::ConnectedToDatabase => {
                debug!(%database, "Already connected to database");
                return Ok(());
            }
            SessionState::Closed => Err(self.not_connected("connect_to_database", SessionState::Disconnected)),
            SessionState::Disconnected => self
                .connector
                .open(&self.config, Some(&database))
                .map(|handle| self.install(handle)),
            SessionState::ConnectedToHost => {
                QueryBuilder::use_database(&database).and_then(|stmt| {
                    self.handle_for("connect_to_database", SessionState::ConnectedToHost)?
                        .execute(&stmt)
                        .map(|_| ())
                })
            }
        };

        match result {
            Ok(()) => {
                self.state = SessionState::ConnectedToDatabase;
                info!(
                    host = %self.config.host,
                    port = self.config.port,
                    %database,
                    version = self.server_version().unwrap_or_default(),
                    "Connected to database"
                );
                Ok(())
            }
            Err(e) => {
                error!(host = %self.config.host, port = self.config.port, %database, error = %e, "Error connecting to the database");
                Err(e)
            }
        }
    }

    /// Releases the handle and moves to `Closed`.
    ///
    /// Returns `true` if a live handle was released, `false` if there was
    /// none (never opened or already closed).
    pub fn close(&mut self) -> bool {
        let had_handle = self.handle.take().is_some();
        self.state = SessionState::Closed;
        if had_handle {
            debug!(host = %self.config.host, port = self.config.port, "Connection closed");
        }
        had_handle
    }

    /// Runs a row-producing statement, failing with `NotConnected` unless
    /// the session satisfies `required`.
    pub(crate) fn query(
        &mut self,
        operation: &'static str,
        required: SessionState,
        statement: &Statement,
    ) -> Result<ResultSet> {
        debug!(operation, sql = %statement.sql, "Executing query");
        self.handle_for(operation, required)?.query(statement)
    }

    /// Runs a statement that produces no rows, with the same state check as
    /// [`Session::query`].
    pub(crate) fn execute(
        &mut self,
        operation: &'static str,
        required: SessionState,
        statement: &Statement,
    ) -> Result<ExecOutcome> {
        debug!(operation, sql = %statement.sql, "Executing statement");
        self.handle_for(operation, required)?.execute(statement)
    }

    fn handle_for(
        &mut self,
        operation: &'static str,
        required: SessionState,
    ) -> Result<&mut C::Connection> {
        if !self.state.satisfies(required) {
            return Err(self.not_connected(operation, required));
        }
        let actual = self.state;
        self.handle.as_mut().ok_or(StoreError::NotConnected {
            operation,
            required,
            actual,
        })
    }

    fn install(&mut self, handle: C::Connection) {
        self.server_version = Some(handle.server_version());
        self.handle = Some(handle);
    }

    fn not_connected(&self, operation: &'static str, required: SessionState) -> StoreError {
        StoreError::NotConnected {
            operation,
            required,
            actual: self.state,
        }
    }
}

impl<C: Connector> Drop for Session<C> {
    fn drop(&mut self) {
        self.close();
    }
}
