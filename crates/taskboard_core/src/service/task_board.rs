//! Live task board: subscription-driven task list state.
//!
//! # Responsibility
//! - Hold one live query over all tasks for the lifetime of a UI session.
//! - Reconcile pushed snapshots into `tasks` / `loading` / `error` state.
//! - Offer add/toggle/edit/remove actions with per-action error messages.
//!
//! # Invariants
//! - `tasks` is only ever replaced by a snapshot; actions never touch it.
//! - A subscription error keeps the previous `tasks` and the subscription open.
//! - After `release` no event changes the state again.
//!
//! Actions block for one repository call. Snapshots are applied only by
//! `sync`/`wait`, on the thread that owns the board.

use crate::model::task::{Task, TaskId, TaskPatch};
use crate::repo::task_repo::{RepoResult, TaskRepository};
use crate::store::{DocumentStore, SnapshotEvent, StoreResult, Subscription};
use log::{debug, error, info};
use std::time::Duration;

pub const STORE_UNAVAILABLE_MESSAGE: &str = "Document store is not initialized";
pub const LOAD_FAILED_MESSAGE: &str = "Failed to load tasks";
pub const CREATE_FAILED_MESSAGE: &str = "Failed to create task";
pub const UPDATE_FAILED_MESSAGE: &str = "Failed to update task";
pub const DELETE_FAILED_MESSAGE: &str = "Failed to delete task";

/// Render state exposed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskBoardState {
    /// Newest first, exactly as the last snapshot delivered it.
    pub tasks: Vec<Task>,
    /// True until the first snapshot or error arrives.
    pub loading: bool,
    pub error: Option<String>,
}

impl Default for TaskBoardState {
    fn default() -> Self {
        Self {
            tasks: Vec::new(),
            loading: true,
            error: None,
        }
    }
}

pub struct TaskBoard<S: DocumentStore> {
    repo: TaskRepository<S>,
    subscription: Option<Subscription>,
    state: TaskBoardState,
}

impl<S: DocumentStore> TaskBoard<S> {
    /// Opens the live query, or settles in the unavailable state without one.
    pub fn activate(repo: TaskRepository<S>) -> Self {
        let mut board = Self {
            repo,
            subscription: None,
            state: TaskBoardState::default(),
        };

        if !board.repo.is_available() {
            info!("event=board_activate module=board status=error error_code=store_unavailable");
            board.settle_error(STORE_UNAVAILABLE_MESSAGE);
            return board;
        }

        match board.repo.watch_all() {
            Ok(subscription) => {
                info!(
                    "event=board_activate module=board status=ok listener_id={}",
                    subscription.id()
                );
                board.subscription = Some(subscription);
            }
            Err(_) => board.settle_error(LOAD_FAILED_MESSAGE),
        }
        board
    }

    pub fn state(&self) -> &TaskBoardState {
        &self.state
    }

    pub fn tasks(&self) -> &[Task] {
        &self.state.tasks
    }

    pub fn is_loading(&self) -> bool {
        self.state.loading
    }

    pub fn error(&self) -> Option<&str> {
        self.state.error.as_deref()
    }

    /// Whether the live query is still open.
    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }

    /// Applies every queued event and returns how many were applied.
    pub fn sync(&mut self) -> usize {
        let Some(subscription) = &self.subscription else {
            return 0;
        };
        let state = &mut self.state;
        subscription.on_snapshot(|event| apply_event(state, event))
    }

    /// Waits up to `timeout` for one event, then applies everything queued.
    ///
    /// Returns `false` when nothing arrived in time.
    pub fn wait(&mut self, timeout: Duration) -> bool {
        let Some(subscription) = &self.subscription else {
            return false;
        };
        let Some(event) = subscription.next_timeout(timeout) else {
            return false;
        };
        apply_event(&mut self.state, event);
        self.sync();
        true
    }

    /// Creates a task. `text` must already be normalized by the caller.
    pub fn add(&mut self, text: &str) -> RepoResult<TaskId> {
        self.state.error = None;
        let result = self.repo.create(text);
        self.track(result, CREATE_FAILED_MESSAGE)
    }

    /// Sets the completion flag of a task.
    pub fn toggle(&mut self, id: &str, completed: bool) -> RepoResult<()> {
        self.state.error = None;
        let result = self.repo.update(id, &TaskPatch::completed(completed));
        self.track(result, UPDATE_FAILED_MESSAGE)
    }

    pub fn edit(&mut self, id: &str, text: &str) -> RepoResult<()> {
        self.state.error = None;
        let result = self.repo.update(id, &TaskPatch::text(text));
        self.track(result, UPDATE_FAILED_MESSAGE)
    }

    pub fn remove(&mut self, id: &str) -> RepoResult<()> {
        self.state.error = None;
        let result = self.repo.delete(id);
        self.track(result, DELETE_FAILED_MESSAGE)
    }

    /// Closes the live query. Later calls are no-ops.
    pub fn release(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            let listener_id = subscription.id();
            subscription.close();
            info!("event=board_release module=board status=ok listener_id={listener_id}");
        }
    }

    fn track<T>(&mut self, result: StoreResult<T>, message: &str) -> StoreResult<T> {
        if result.is_err() {
            self.state.error = Some(message.to_string());
        }
        result
    }

    fn settle_error(&mut self, message: &str) {
        self.state.error = Some(message.to_string());
        self.state.loading = false;
    }
}

impl<S: DocumentStore> Drop for TaskBoard<S> {
    fn drop(&mut self) {
        self.release();
    }
}

fn apply_event(state: &mut TaskBoardState, event: SnapshotEvent) {
    let decoded = match event {
        SnapshotEvent::Snapshot(documents) => documents
            .into_iter()
            .map(Task::from_document)
            .collect::<StoreResult<Vec<_>>>(),
        SnapshotEvent::Error(err) => Err(err),
    };

    match decoded {
        Ok(tasks) => {
            debug!(
                "event=board_snapshot module=board status=ok task_count={}",
                tasks.len()
            );
            state.tasks = tasks;
            state.loading = false;
            state.error = None;
        }
        Err(err) => {
            error!("event=board_snapshot module=board status=error error={err}");
            state.loading = false;
            state.error = Some(LOAD_FAILED_MESSAGE.to_string());
        }
    }
}
