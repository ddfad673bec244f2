//! Domain model for the task list.
//!
//! # Invariants
//! - Every task is identified by a store-assigned `TaskId`.
//! - Deletion is a hard delete in the store; there are no tombstones.

pub mod task;
