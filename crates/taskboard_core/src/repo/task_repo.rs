//! Task repository over the `todos` collection.
//!
//! # Responsibility
//! - Translate task CRUD calls into document store operations.
//! - Log every failure at the call site and return it unchanged in kind.
//!
//! # Invariants
//! - Each operation is exactly one store round trip and is never retried.
//! - Without a store handle every operation fails with `StoreError::Unavailable`.
//! - Lists and live queries are ordered by `createdAt`, newest first.
//! - Deleting an id that does not exist succeeds and is logged as a no-op.
//!
//! Calls are synchronous: each blocks the caller for one SQLite round trip,
//! and completion order is call order.

use crate::model::task::{
    Task, TaskId, TaskPatch, FIELD_COMPLETED, FIELD_CREATED_AT, FIELD_TEXT, TASKS_COLLECTION,
};
use crate::store::{
    Direction, DocumentStore, FieldValue, Query, StoreError, StoreResult, Subscription,
    WriteFields,
};
use log::{debug, error, warn};
use std::sync::Arc;

pub type RepoResult<T> = StoreResult<T>;

/// CRUD entry points for tasks.
pub struct TaskRepository<S: DocumentStore> {
    store: Result<Arc<S>, String>,
}

impl<S: DocumentStore> Clone for TaskRepository<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: DocumentStore> TaskRepository<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store: Ok(store) }
    }

    /// Repository without a store handle; `reason` is reported by every call.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self {
            store: Err(reason.into()),
        }
    }

    pub fn is_available(&self) -> bool {
        self.store.is_ok()
    }

    /// Ordered query shared by `list_all` and `watch_all`.
    pub fn ordered_query() -> Query {
        Query::collection(TASKS_COLLECTION).order_by(FIELD_CREATED_AT, Direction::Descending)
    }

    /// Creates a task with `completed = false` and a server-assigned `createdAt`.
    ///
    /// `text` is stored as given; callers normalize it first.
    pub fn create(&self, text: &str) -> RepoResult<TaskId> {
        let fields = WriteFields::from([
            (FIELD_TEXT.to_string(), FieldValue::from(text)),
            (FIELD_COMPLETED.to_string(), FieldValue::from(false)),
            (FIELD_CREATED_AT.to_string(), FieldValue::ServerTimestamp),
        ]);

        let result = self
            .handle()
            .and_then(|store| store.add_document(TASKS_COLLECTION, fields));
        match &result {
            Ok(id) => debug!("event=task_create module=repo status=ok task_id={id}"),
            Err(err) => log_failure("task_create", None, err),
        }
        result
    }

    /// Point-in-time list of every task, newest first.
    pub fn list_all(&self) -> RepoResult<Vec<Task>> {
        let result = self
            .handle()
            .and_then(|store| store.query_documents(&Self::ordered_query()))
            .and_then(|documents| documents.into_iter().map(Task::from_document).collect());
        if let Err(err) = &result {
            log_failure("task_list", None, err);
        }
        result
    }

    pub fn get(&self, id: &str) -> RepoResult<Option<Task>> {
        let result = self
            .handle()
            .and_then(|store| store.get_document(TASKS_COLLECTION, id))
            .and_then(|document| document.map(Task::from_document).transpose());
        if let Err(err) = &result {
            log_failure("task_get", Some(id), err);
        }
        result
    }

    /// Applies `patch` to an existing task.
    ///
    /// # Errors
    /// - `StoreError::NotFound` when no task has this id.
    pub fn update(&self, id: &str, patch: &TaskPatch) -> RepoResult<()> {
        let result = self
            .handle()
            .and_then(|store| store.update_document(TASKS_COLLECTION, id, patch.to_fields()));
        match &result {
            Ok(()) => debug!("event=task_update module=repo status=ok task_id={id}"),
            Err(err) => log_failure("task_update", Some(id), err),
        }
        result
    }

    /// Deletes a task. Unknown ids are accepted.
    pub fn delete(&self, id: &str) -> RepoResult<()> {
        let result = self
            .handle()
            .and_then(|store| store.delete_document(TASKS_COLLECTION, id));
        match result {
            Ok(true) => {
                debug!("event=task_delete module=repo status=ok task_id={id}");
                Ok(())
            }
            Ok(false) => {
                warn!("event=task_delete module=repo status=noop task_id={id} reason=not_found");
                Ok(())
            }
            Err(err) => {
                log_failure("task_delete", Some(id), &err);
                Err(err)
            }
        }
    }

    /// Opens a live query over all tasks, newest first.
    pub fn watch_all(&self) -> RepoResult<Subscription> {
        let result = self
            .handle()
            .and_then(|store| store.listen(&Self::ordered_query()));
        match &result {
            Ok(subscription) => debug!(
                "event=task_watch module=repo status=ok listener_id={}",
                subscription.id()
            ),
            Err(err) => log_failure("task_watch", None, err),
        }
        result
    }

    fn handle(&self) -> RepoResult<&S> {
        self.store
            .as_deref()
            .map_err(|reason| StoreError::Unavailable(reason.clone()))
    }
}

fn log_failure(event: &str, task_id: Option<&str>, err: &StoreError) {
    error!(
        "event={event} module=repo status=error error_code={} task_id={} error={err}",
        error_code(err),
        task_id.unwrap_or("-")
    );
}

fn error_code(err: &StoreError) -> &'static str {
    match err {
        StoreError::Unavailable(_) => "store_unavailable",
        StoreError::Transport(_) => "transport_error",
        StoreError::NotFound { .. } => "not_found",
        StoreError::WriteFailed(_) => "write_failed",
        StoreError::InvalidData(_) => "invalid_data",
    }
}
