//! Repository layer over the document store.
//!
//! # Responsibility
//! - Define use-case oriented data access for tasks.
//! - Keep collection names, field names and query shapes out of callers.
//!
//! # Invariants
//! - Repository errors are store errors, returned unchanged in kind.

pub mod task_repo;
