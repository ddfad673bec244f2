//! Task domain model.
//!
//! # Responsibility
//! - Define the task record projected from a `todos` document.
//! - Define the only mutable subset of a task (`TaskPatch`).
//! - Provide caller-side normalization for user-entered task text.
//!
//! # Invariants
//! - `id` and `created_at` are store-assigned and never part of a patch.
//! - Documents that do not decode into a task are rejected, not defaulted.

use crate::store::{Document, DocumentId, FieldMap, StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Store-assigned task identifier.
pub type TaskId = DocumentId;

/// Collection holding task documents.
pub const TASKS_COLLECTION: &str = "todos";

pub const FIELD_TEXT: &str = "text";
pub const FIELD_COMPLETED: &str = "completed";
/// Server timestamp used for newest-first ordering.
pub const FIELD_CREATED_AT: &str = "createdAt";

/// One to-do item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub text: String,
    pub completed: bool,
    /// Unix epoch milliseconds from the store clock.
    pub created_at: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskFields {
    text: String,
    completed: bool,
    created_at: i64,
}

impl Task {
    /// Decodes a `todos` document.
    ///
    /// # Errors
    /// - Returns `StoreError::InvalidData` when a field is missing or mistyped.
    pub fn from_document(document: Document) -> StoreResult<Self> {
        let Document { id, fields } = document;
        let decoded: TaskFields = serde_json::from_value(Value::Object(fields))
            .map_err(|err| StoreError::InvalidData(format!("task document `{id}`: {err}")))?;

        Ok(Self {
            id,
            text: decoded.text,
            completed: decoded.completed,
            created_at: decoded.created_at,
        })
    }
}

/// Partial update of a task.
///
/// Only `text` and `completed` can change; identity and creation time are not
/// representable here.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
    pub text: Option<String>,
    pub completed: Option<bool>,
}

impl TaskPatch {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            completed: None,
        }
    }

    pub fn completed(completed: bool) -> Self {
        Self {
            text: None,
            completed: Some(completed),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.completed.is_none()
    }

    /// Document fields written by this patch.
    pub fn to_fields(&self) -> FieldMap {
        let mut fields = FieldMap::new();
        if let Some(text) = &self.text {
            fields.insert(FIELD_TEXT.to_string(), Value::String(text.clone()));
        }
        if let Some(completed) = self.completed {
            fields.insert(FIELD_COMPLETED.to_string(), Value::Bool(completed));
        }
        fields
    }
}

/// Rejection of user-entered task text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskTextError {
    Blank,
}

impl Display for TaskTextError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Blank => write!(f, "task text cannot be empty"),
        }
    }
}

impl Error for TaskTextError {}

/// Trims user input and rejects blank text.
///
/// Callers run this before `add`/`edit`; the repository stores text as given.
pub fn normalize_task_text(input: &str) -> Result<String, TaskTextError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(TaskTextError::Blank);
    }
    Ok(trimmed.to_string())
}
