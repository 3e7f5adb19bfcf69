/// Record Access Module
///
/// Row-level CRUD over a named table. Values are always bound as
/// statement parameters; the table and column names go through the
/// identifier allow-list in [`QueryBuilder`].

use crate::core::db::connection::{Session, SessionState};
use crate::core::db::driver::Connector;
use crate::core::db::query::QueryBuilder;
use crate::core::Result;
use serde::{Deserialize, Serialize};
use std::collections::btree_map::{self, BTreeMap};
use std::fmt;
use tracing::{debug, error, info};

/// Server-generated row identifier.
pub type RecordId = u64;

/// A single column value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Scalar::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Scalar::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Renders the value as plain text; `Null` becomes the empty string.
    pub fn to_text(&self) -> String {
        match self {
            Scalar::Null => String::new(),
            Scalar::Int(i) => i.to_string(),
            Scalar::Float(f) => f.to_string(),
            Scalar::Text(s) => s.clone(),
        }
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Int(value)
    }
}

impl From<i32> for Scalar {
    fn from(value: i32) -> Self {
        Scalar::Int(i64::from(value))
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Float(value)
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Text(value)
    }
}

impl<T: Into<Scalar>> From<Option<T>> for Scalar {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Scalar::Null)
    }
}

/// A row: column name to value. Iteration order is the sorted column
/// order, which is also the positional order used for inserts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(BTreeMap<String, Scalar>);

impl Record {
    pub fn new() -> Self {
        Record(BTreeMap::new())
    }

    /// Builder-style insert.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Scalar>) -> Self {
        self.insert(column, value);
        self
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Scalar>) -> Option<Scalar> {
        self.0.insert(column.into(), value.into())
    }

    pub fn get(&self, column: &str) -> Option<&Scalar> {
        self.0.get(column)
    }

    pub fn remove(&mut self, column: &str) -> Option<Scalar> {
        self.0.remove(column)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, Scalar> {
        self.0.iter()
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => f.write_str(&json),
            Err(_) => write!(f, "{:?}", self.0),
        }
    }
}

impl<K: Into<String>, V: Into<Scalar>> FromIterator<(K, V)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Record(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl IntoIterator for Record {
    type Item = (String, Scalar);
    type IntoIter = btree_map::IntoIter<String, Scalar>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Record {
    type Item = (&'a String, &'a Scalar);
    type IntoIter = btree_map::Iter<'a, String, Scalar>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Row-level access to the tables of the selected database.
///
/// Every method requires [`SessionState::ConnectedToDatabase`]. Table
/// existence is not checked up front; a missing table surfaces as a
/// `StoreError::QueryExecution` from the server.
pub struct RecordStore<'s, C: Connector> {
    session: &'s mut Session<C>,
}

impl<'s, C: Connector> RecordStore<'s, C> {
    pub fn new(session: &'s mut Session<C>) -> Self {
        RecordStore { session }
    }

    /// Lists every row of `table`.
    ///
    /// An `Err` means the rows could not be read at all, which is distinct
    /// from `Ok` with an empty table.
    pub fn list_entries(&mut self, table: &str) -> Result<Vec<Record>> {
        let result = QueryBuilder::select_all(table).and_then(|stmt| {
            self.session
                .query("list_entries", SessionState::ConnectedToDatabase, &stmt)
        });

        match result {
            Ok(rs) => {
                let entries: Vec<Record> = rs
                    .rows
                    .into_iter()
                    .map(|row| rs.columns.iter().cloned().zip(row).collect())
                    .collect();
                info!(table, count = entries.len(), "Listed entries");
                for entry in &entries {
                    debug!(table, %entry, "Entry");
                }
                Ok(entries)
            }
            Err(e) => {
                error!(table, error = %e, "Error listing entries in table");
                Err(e)
            }
        }
    }

    /// Inserts `record` and returns the identifier the server generated for it.
    pub fn insert_record(&mut self, table: &str, record: &Record) -> Result<RecordId> {
        let result = QueryBuilder::insert(table, record).and_then(|stmt| {
            self.session
                .execute("insert_record", SessionState::ConnectedToDatabase, &stmt)
        });

        match result {
            Ok(outcome) => {
                info!(table, record_id = outcome.last_insert_id, "Record inserted");
                Ok(outcome.last_insert_id)
            }
            Err(e) => {
                error!(table, error = %e, "Error inserting record");
                Err(e)
            }
        }
    }

    /// Updates only the columns present in `changes` on the row whose `id`
    /// column equals `id`.
    pub fn update_record(&mut self, table: &str, id: RecordId, changes: &Record) -> Result<()> {
        let result = QueryBuilder::update(table, id, changes).and_then(|stmt| {
            self.session
                .execute("update_record", SessionState::ConnectedToDatabase, &stmt)
        });

        match result {
            Ok(outcome) => {
                info!(table, record_id = id, affected = outcome.affected_rows, "Record updated");
                Ok(())
            }
            Err(e) => {
                error!(table, record_id = id, error = %e, "Error updating record");
                Err(e)
            }
        }
    }

    /// Deletes the row whose `id` column equals `id`.
    pub fn delete_record(&mut self, table: &str, id: RecordId) -> Result<()> {
        let result = QueryBuilder::delete(table, id).and_then(|stmt| {
            self.session
                .execute("delete_record", SessionState::ConnectedToDatabase, &stmt)
        });

        match result {
            Ok(outcome) => {
                info!(table, record_id = id, affected = outcome.affected_rows, "Record deleted");
                Ok(())
            }
            Err(e) => {
                error!(table, record_id = id, error = %e, "Error deleting record");
                Err(e)
            }
        }
    }
}
