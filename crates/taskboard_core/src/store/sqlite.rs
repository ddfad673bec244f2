//! SQLite-backed document store.
//!
//! # Responsibility
//! - Persist JSON documents grouped by collection in one `documents` table.
//! - Assign document ids and server timestamps from the store's own clock.
//! - Re-run live queries after every committed write and push full snapshots.
//!
//! # Invariants
//! - Server timestamps are strictly increasing per store instance.
//! - Listeners only see state that has been committed.
//! - Read failures map to `Transport`, write failures to `WriteFailed`.

use crate::store::listeners::{ListenerRegistry, SnapshotEvent, Subscription};
use crate::store::migrations::apply_migrations;
use crate::store::{
    validate_collection, validate_field_name, Direction, Document, DocumentId, DocumentStore,
    FieldMap, FieldValue, Query, StoreError, StoreResult, WriteFields,
};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::Value;
use std::fmt::Display;
use std::path::Path;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

const PROJECT_ID_META_KEY: &str = "project_id";

struct StoreInner {
    conn: Connection,
    last_timestamp_ms: i64,
}

impl StoreInner {
    fn next_timestamp(&mut self) -> i64 {
        let next = wall_clock_ms().max(self.last_timestamp_ms + 1);
        self.last_timestamp_ms = next;
        next
    }
}

/// Document store over a single SQLite connection.
///
/// Live queries only observe writes made through this instance.
pub struct SqliteDocumentStore {
    inner: Mutex<StoreInner>,
    listeners: ListenerRegistry,
}

impl SqliteDocumentStore {
    /// Opens (or creates) a file-backed store and applies pending migrations.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        Self::open_with("file", || Connection::open(path))
    }

    /// Opens a store that lives for the lifetime of this instance.
    pub fn open_in_memory() -> StoreResult<Self> {
        Self::open_with("memory", Connection::open_in_memory)
    }

    fn open_with(
        mode: &'static str,
        connect: impl FnOnce() -> rusqlite::Result<Connection>,
    ) -> StoreResult<Self> {
        let started_at = Instant::now();
        info!("event=store_open module=store status=start mode={mode}");

        let opened = connect()
            .map_err(|err| ("store_connect_failed", err.to_string()))
            .and_then(|mut conn| {
                bootstrap_connection(&mut conn)
                    .map(|last_timestamp_ms| (conn, last_timestamp_ms))
                    .map_err(|err| ("store_bootstrap_failed", err))
            });

        match opened {
            Ok((conn, last_timestamp_ms)) => {
                info!(
                    "event=store_open module=store status=ok mode={mode} duration_ms={}",
                    started_at.elapsed().as_millis()
                );
                Ok(Self {
                    inner: Mutex::new(StoreInner {
                        conn,
                        last_timestamp_ms,
                    }),
                    listeners: ListenerRegistry::new(),
                })
            }
            Err((error_code, message)) => {
                error!(
                    "event=store_open module=store status=error mode={mode} duration_ms={} error_code={error_code} error={message}",
                    started_at.elapsed().as_millis()
                );
                Err(StoreError::Unavailable(message))
            }
        }
    }

    /// Live query listeners attached to this store.
    pub fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }

    /// Claims the store for `project_id`, or verifies an earlier claim.
    ///
    /// A database created for one project refuses sessions of another.
    pub fn bind_project(&self, project_id: &str) -> StoreResult<()> {
        let inner = self.inner.lock();
        let existing = read_meta(&inner.conn, PROJECT_ID_META_KEY)?;
        match existing {
            Some(bound) if bound == project_id => Ok(()),
            Some(bound) => Err(StoreError::Unavailable(format!(
                "store belongs to project `{bound}`, not `{project_id}`"
            ))),
            None => {
                inner
                    .conn
                    .execute(
                        "INSERT INTO store_meta (key, value) VALUES (?1, ?2);",
                        params![PROJECT_ID_META_KEY, project_id],
                    )
                    .map_err(write_failed)?;
                Ok(())
            }
        }
    }

    /// Project this store was bound to, if any.
    pub fn project_id(&self) -> StoreResult<Option<String>> {
        let inner = self.inner.lock();
        read_meta(&inner.conn, PROJECT_ID_META_KEY)
    }

    fn notify(&self, inner: &StoreInner, collection: &str) {
        for (listener_id, query) in self.listeners.listeners_for(collection) {
            let event = match run_query(&inner.conn, &query) {
                Ok(documents) => SnapshotEvent::Snapshot(documents),
                Err(err) => {
                    warn!(
                        "event=listener_refresh module=store status=error listener_id={listener_id} error={err}"
                    );
                    SnapshotEvent::Error(err)
                }
            };
            self.listeners.send(listener_id, event);
        }
    }
}

impl DocumentStore for SqliteDocumentStore {
    fn add_document(&self, collection: &str, fields: WriteFields) -> StoreResult<DocumentId> {
        validate_collection(collection)?;
        for name in fields.keys() {
            validate_field_name(name)?;
        }

        let mut inner = self.inner.lock();
        let timestamp = inner.next_timestamp();
        let body: FieldMap = fields
            .into_iter()
            .map(|(name, value)| match value {
                FieldValue::Value(value) => (name, value),
                FieldValue::ServerTimestamp => (name, Value::from(timestamp)),
            })
            .collect();
        let body_text = serde_json::to_string(&body).map_err(write_failed)?;
        let id = Uuid::new_v4().simple().to_string();

        inner
            .conn
            .execute(
                "INSERT INTO documents (collection, id, fields, create_time, update_time)
                 VALUES (?1, ?2, ?3, ?4, ?4);",
                params![collection, id, body_text, timestamp],
            )
            .map_err(write_failed)?;
        debug!("event=document_add module=store status=ok collection={collection} id={id}");

        self.notify(&inner, collection);
        Ok(id)
    }

    fn get_document(&self, collection: &str, id: &str) -> StoreResult<Option<Document>> {
        validate_collection(collection)?;
        let inner = self.inner.lock();
        let mut stmt = inner
            .conn
            .prepare("SELECT id, fields FROM documents WHERE collection = ?1 AND id = ?2;")
            .map_err(transport)?;
        let mut rows = stmt.query(params![collection, id]).map_err(transport)?;
        let document = match rows.next().map_err(transport)? {
            Some(row) => Some(parse_document_row(row)?),
            None => None,
        };
        Ok(document)
    }

    fn query_documents(&self, query: &Query) -> StoreResult<Vec<Document>> {
        let inner = self.inner.lock();
        run_query(&inner.conn, query)
    }

    fn update_document(&self, collection: &str, id: &str, patch: FieldMap) -> StoreResult<()> {
        validate_collection(collection)?;
        for name in patch.keys() {
            validate_field_name(name)?;
        }

        let mut inner = self.inner.lock();
        let timestamp = inner.next_timestamp();
        let tx = inner.conn.transaction().map_err(write_failed)?;
        let current: Option<String> = tx
            .query_row(
                "SELECT fields FROM documents WHERE collection = ?1 AND id = ?2;",
                params![collection, id],
                |row| row.get(0),
            )
            .optional()
            .map_err(write_failed)?;
        let Some(current) = current else {
            return Err(StoreError::NotFound {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        };

        let mut fields = parse_fields(&current)?;
        fields.extend(patch);
        let body_text = serde_json::to_string(&fields).map_err(write_failed)?;
        tx.execute(
            "UPDATE documents SET fields = ?1, update_time = ?2
             WHERE collection = ?3 AND id = ?4;",
            params![body_text, timestamp, collection, id],
        )
        .map_err(write_failed)?;
        tx.commit().map_err(write_failed)?;
        debug!("event=document_update module=store status=ok collection={collection} id={id}");

        self.notify(&inner, collection);
        Ok(())
    }

    fn delete_document(&self, collection: &str, id: &str) -> StoreResult<bool> {
        validate_collection(collection)?;
        let inner = self.inner.lock();
        let changed = inner
            .conn
            .execute(
                "DELETE FROM documents WHERE collection = ?1 AND id = ?2;",
                params![collection, id],
            )
            .map_err(write_failed)?;

        if changed == 0 {
            return Ok(false);
        }
        debug!("event=document_delete module=store status=ok collection={collection} id={id}");
        self.notify(&inner, collection);
        Ok(true)
    }

    fn listen(&self, query: &Query) -> StoreResult<Subscription> {
        validate_query(query)?;

        let inner = self.inner.lock();
        let subscription = self.listeners.register(query.clone());
        let initial = match run_query(&inner.conn, query) {
            Ok(documents) => SnapshotEvent::Snapshot(documents),
            Err(err) => SnapshotEvent::Error(err),
        };
        self.listeners.send(subscription.id(), initial);
        Ok(subscription)
    }
}

fn bootstrap_connection(conn: &mut Connection) -> Result<i64, String> {
    conn.busy_timeout(Duration::from_secs(5))
        .map_err(|err| err.to_string())?;
    apply_migrations(conn).map_err(|err| err.to_string())?;
    conn.query_row(
        "SELECT COALESCE(MAX(MAX(create_time), MAX(update_time)), 0) FROM documents;",
        [],
        |row| row.get::<_, i64>(0),
    )
    .map_err(|err| err.to_string())
}

fn validate_query(query: &Query) -> StoreResult<()> {
    validate_collection(&query.collection)?;
    if let Some(order) = &query.order_by {
        validate_field_name(&order.field)?;
    }
    Ok(())
}

fn run_query(conn: &Connection, query: &Query) -> StoreResult<Vec<Document>> {
    validate_query(query)?;

    let (sql, path) = match &query.order_by {
        Some(order) => {
            let direction = direction_to_sql(order.direction);
            (
                format!(
                    "SELECT id, fields FROM documents
                     WHERE collection = ?1
                     ORDER BY json_extract(fields, ?2) {direction}, seq {direction};"
                ),
                Some(format!("$.\"{}\"", order.field)),
            )
        }
        None => (
            "SELECT id, fields FROM documents WHERE collection = ?1 ORDER BY seq ASC;".to_string(),
            None,
        ),
    };

    let mut stmt = conn.prepare(&sql).map_err(transport)?;
    let mut rows = match &path {
        Some(path) => stmt.query(params![query.collection, path]),
        None => stmt.query(params![query.collection]),
    }
    .map_err(transport)?;

    let mut documents = Vec::new();
    while let Some(row) = rows.next().map_err(transport)? {
        documents.push(parse_document_row(row)?);
    }
    Ok(documents)
}

fn parse_document_row(row: &Row<'_>) -> StoreResult<Document> {
    let id: String = row.get("id").map_err(transport)?;
    let fields_text: String = row.get("fields").map_err(transport)?;
    Ok(Document {
        fields: parse_fields(&fields_text)?,
        id,
    })
}

fn parse_fields(text: &str) -> StoreResult<FieldMap> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(fields)) => Ok(fields),
        Ok(other) => Err(StoreError::InvalidData(format!(
            "document body must be an object, got `{other}`"
        ))),
        Err(err) => Err(StoreError::InvalidData(format!(
            "document body is not valid JSON: {err}"
        ))),
    }
}

fn read_meta(conn: &Connection, key: &str) -> StoreResult<Option<String>> {
    conn.query_row(
        "SELECT value FROM store_meta WHERE key = ?1;",
        [key],
        |row| row.get(0),
    )
    .optional()
    .map_err(transport)
}

fn direction_to_sql(direction: Direction) -> &'static str {
    match direction {
        Direction::Ascending => "ASC",
        Direction::Descending => "DESC",
    }
}

fn transport(err: impl Display) -> StoreError {
    StoreError::Transport(err.to_string())
}

fn write_failed(err: impl Display) -> StoreError {
    StoreError::WriteFailed(err.to_string())
}

fn wall_clock_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
