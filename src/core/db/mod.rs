/// Database Module
///
/// This module provides the access layer, organized into focused
/// submodules.
///
/// ## Architecture
///
/// - **Connection Management** (`connection.rs`): the `Session` and its state machine
/// - **Driver Seam** (`driver.rs`, `mysql.rs`): the traits the session executes through,
///   and their implementation on the `mysql` crate
/// - **Statement Construction** (`query.rs`): identifier checks, DDL text, bound DML
/// - **Schema Introspection** (`schema.rs`): databases, tables and columns
/// - **Record Access** (`records.rs`): row-level CRUD
///
/// ## Error Handling
///
/// Every operation returns `crate::core::Result` and logs its own failure;
/// nothing panics. Callers that expect boolean or `-1` results convert
/// through `crate::core::Sentinel`.
pub mod connection;
pub mod driver;
pub mod mysql;
pub mod query;
pub mod records;
pub mod schema;

pub use self::connection::*;
pub use self::driver::*;
pub use self::mysql::*;
pub use self::query::*;
pub use self::records::*;
pub use self::schema::*;
