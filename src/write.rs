//! Write operations.
//!
//! Update expressions are compiled from flattened leaves, sent as one conditional update and,
//! when the store refuses a path, recovered by the write orchestrator.

/// Store-level write requests.
pub mod common;

/// Conditional update state machine.
pub(crate) mod orchestrator;

/// Shapes of the values a write returns.
pub mod returns;

/// Update expression compilation.
pub mod update_expression;
