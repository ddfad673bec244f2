//! Session-level services built on the repository layer.
//!
//! # Responsibility
//! - Turn repository calls and live queries into UI-ready state.
//! - Keep presentation layers decoupled from store details.

pub mod task_board;
