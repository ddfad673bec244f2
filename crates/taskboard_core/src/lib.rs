//! Core of the taskboard to-do list.
//! Owns the store client, the task repository and the live task board.

pub mod client;
pub mod config;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;
pub mod store;

pub use client::{StoreClient, StoreHandle};
pub use config::{ConfigError, RuntimeContext, StoreConfig};
pub use logging::{default_log_level, init_logging, init_logging_from_env, LogSettings};
pub use model::task::{normalize_task_text, Task, TaskId, TaskPatch, TaskTextError};
pub use repo::task_repo::{RepoResult, TaskRepository};
pub use service::task_board::{TaskBoard, TaskBoardState};
pub use store::{
    DocumentStore, ListenerRegistry, SnapshotEvent, SqliteDocumentStore, StoreError, StoreResult,
    Subscription,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
