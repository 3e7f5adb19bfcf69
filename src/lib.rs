// Core infrastructure modules
pub mod core;

// Ambient concerns
pub mod config;
pub mod logging;

#[cfg(test)]
mod test_utils;

pub use crate::config::ConnectionConfig;
pub use crate::core::db::{
    ColumnDefinition, ColumnDescriptor, DatabaseDescriptor, KeyRole, QueryBuilder, Record,
    RecordId, RecordStore, Scalar, SchemaCatalog, Session, SessionState, TableDescriptor,
};
pub use crate::core::{ErrorKind, Result, Sentinel, StoreError};
