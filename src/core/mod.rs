/// Core Module for rdstore
///
/// This module contains the access layer itself: error handling and the
/// database components built on top of a single owned connection.

pub mod db;
pub mod error;

// Re-export commonly used types for convenience
pub use error::{ErrorKind, Result, Sentinel, StoreError};
