/// rdstore Error Module
///
/// This module defines the error types for the access layer. Every boundary
/// operation returns a `Result<T>` carrying a `StoreError`; callers that
/// still expect the legacy `false` / `-1` / "no result" values can convert
/// through the [`Sentinel`] trait.
use crate::core::db::connection::SessionState;
use thiserror::Error;

/// Error type for the access layer.
///
/// The first five variants are the failure kinds callers branch on:
/// - network reachability and authentication while connecting
/// - operations attempted in the wrong session state
/// - statements rejected by the server
/// - server DDL text that did not have the expected shape
#[derive(Error, Debug)]
pub enum StoreError {
    /// Host or port could not be reached at the network level
    #[error("Connectivity error: cannot reach {host}:{port}: {reason}")]
    Connectivity {
        host: String,
        port: u16,
        reason: String,
    },

    /// Credentials rejected by the server
    #[error("Authentication error: {0}")]
    Authentication(String),

    /// Operation attempted while the session is not in the required state
    #[error("Not connected: {operation} requires {required}, session is {actual}")]
    NotConnected {
        operation: &'static str,
        required: SessionState,
        actual: SessionState,
    },

    /// Server rejected or failed a statement
    #[error("Query error: {0}")]
    QueryExecution(String),

    /// Server-returned DDL did not match the expected shape
    #[error("Schema parse error: {0}")]
    SchemaParse(String),

    /// Identifier failed the allow-list check and was never sent to the server
    #[error("Invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    /// Structurally invalid input, e.g. an update with no columns
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration loading and validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system and I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Discriminant of [`StoreError`], convenient for matching in callers and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Connectivity,
    Authentication,
    NotConnected,
    QueryExecution,
    SchemaParse,
    InvalidIdentifier,
    InvalidInput,
    Config,
    Io,
}

impl StoreError {
    /// Returns the kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Connectivity { .. } => ErrorKind::Connectivity,
            StoreError::Authentication(_) => ErrorKind::Authentication,
            StoreError::NotConnected { .. } => ErrorKind::NotConnected,
            StoreError::QueryExecution(_) => ErrorKind::QueryExecution,
            StoreError::SchemaParse(_) => ErrorKind::SchemaParse,
            StoreError::InvalidIdentifier(_) => ErrorKind::InvalidIdentifier,
            StoreError::InvalidInput(_) => ErrorKind::InvalidInput,
            StoreError::Config(_) => ErrorKind::Config,
            StoreError::Io(_) => ErrorKind::Io,
        }
    }
}

impl From<toml::de::Error> for StoreError {
    fn from(err: toml::de::Error) -> Self {
        StoreError::Config(err.to_string())
    }
}

/// Type alias for Result to use StoreError as the error type.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Conversion from a structured result to the legacy sentinel contract.
///
/// | result                  | sentinel on failure |
/// |-------------------------|---------------------|
/// | `Result<()>`            | `false`             |
/// | `Result<RecordId>`      | `-1`                |
/// | `Result<Vec<T>>`        | `None`              |
pub trait Sentinel {
    type Output;

    fn into_sentinel(self) -> Self::Output;
}

impl Sentinel for Result<()> {
    type Output = bool;

    fn into_sentinel(self) -> bool {
        self.is_ok()
    }
}

impl Sentinel for Result<u64> {
    type Output = i64;

    fn into_sentinel(self) -> i64 {
        // Ids beyond i64::MAX cannot be represented next to the -1 sentinel.
        self.ok()
            .and_then(|id| i64::try_from(id).ok())
            .unwrap_or(-1)
    }
}

impl<T> Sentinel for Result<Vec<T>> {
    type Output = Option<Vec<T>>;

    fn into_sentinel(self) -> Option<Vec<T>> {
        self.ok()
    }
}
