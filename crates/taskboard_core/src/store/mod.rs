//! Document store contracts shared by every backend.
//!
//! # Responsibility
//! - Define the schema-flexible document shape (JSON fields grouped by collection).
//! - Define the write/read/listen operations a backend must provide.
//! - Own the error kinds reported by store round trips.
//!
//! # Invariants
//! - Document ids are assigned by the store and never change.
//! - `FieldValue::ServerTimestamp` is resolved with the store clock at write time.
//! - Every committed write to a collection re-delivers full snapshots to the
//!   listeners registered on that collection.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod listeners;
pub mod migrations;
pub mod sqlite;

pub use listeners::{ListenerId, ListenerRegistry, SnapshotEvent, Subscription};
pub use sqlite::SqliteDocumentStore;

/// Store-assigned opaque document identifier.
pub type DocumentId = String;

/// Decoded document body.
pub type FieldMap = Map<String, Value>;

/// Field set for a new document, keyed by field name.
pub type WriteFields = BTreeMap<String, FieldValue>;

pub type StoreResult<T> = Result<T, StoreError>;

/// Errors reported by document store round trips.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No store handle exists for this session.
    Unavailable(String),
    /// Read or live query failure.
    Transport(String),
    NotFound { collection: String, id: DocumentId },
    WriteFailed(String),
    /// Persisted data or a caller argument does not have the expected shape.
    InvalidData(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable(reason) => write!(f, "document store unavailable: {reason}"),
            Self::Transport(message) => write!(f, "document store transport error: {message}"),
            Self::NotFound { collection, id } => {
                write!(f, "document not found: {collection}/{id}")
            }
            Self::WriteFailed(message) => write!(f, "document write failed: {message}"),
            Self::InvalidData(message) => write!(f, "invalid document data: {message}"),
        }
    }
}

impl Error for StoreError {}

/// Value written into a document field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Value(Value),
    /// Placeholder replaced by the store clock (epoch milliseconds) on write.
    ServerTimestamp,
}

impl From<Value> for FieldValue {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Value(Value::String(value.to_string()))
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Value(Value::Bool(value))
    }
}

/// One stored document.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: DocumentId,
    pub fields: FieldMap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// Ordering clause of a collection query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

/// Whole-collection query with optional ordering.
///
/// Ties on the ordered field fall back to insertion order in the same direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub collection: String,
    pub order_by: Option<OrderBy>,
}

impl Query {
    pub fn collection(name: impl Into<String>) -> Self {
        Self {
            collection: name.into(),
            order_by: None,
        }
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }
}

/// Backend contract for collection-scoped document storage.
///
/// Each method is one round trip; implementations never retry.
pub trait DocumentStore {
    /// Inserts a document and returns its store-assigned id.
    fn add_document(&self, collection: &str, fields: WriteFields) -> StoreResult<DocumentId>;
    fn get_document(&self, collection: &str, id: &str) -> StoreResult<Option<Document>>;
    /// Point-in-time read of a whole collection.
    fn query_documents(&self, query: &Query) -> StoreResult<Vec<Document>>;
    /// Merges `patch` into the stored fields.
    ///
    /// Returns `StoreError::NotFound` when the document does not exist.
    fn update_document(&self, collection: &str, id: &str, patch: FieldMap) -> StoreResult<()>;
    /// Removes a document, returning whether anything was removed.
    fn delete_document(&self, collection: &str, id: &str) -> StoreResult<bool>;
    /// Opens a live query. The initial snapshot is queued before this returns.
    fn listen(&self, query: &Query) -> StoreResult<Subscription>;
}

pub(crate) fn validate_collection(name: &str) -> StoreResult<()> {
    if is_valid_identifier(name) {
        Ok(())
    } else {
        Err(StoreError::InvalidData(format!(
            "invalid collection name `{name}`"
        )))
    }
}

pub(crate) fn validate_field_name(name: &str) -> StoreResult<()> {
    if is_valid_identifier(name) {
        Ok(())
    } else {
        Err(StoreError::InvalidData(format!("invalid field name `{name}`")))
    }
}

pub(crate) fn is_valid_identifier(value: &str) -> bool {
    !value.is_empty()
        && value
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-')
}
