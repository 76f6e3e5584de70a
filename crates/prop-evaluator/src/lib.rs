//! Pure account state machine.
//!
//! `evaluate` is a single deterministic decision function over a snapshot of
//! one account's state. It performs no I/O and holds no clock: the caller
//! loads the snapshot inside a transaction, asks for the transition, and
//! applies the side effects. This keeps the failure/progression ordering
//! unit-testable without a database.

mod engine;
mod types;

pub use engine::evaluate;
pub use types::{EvaluationSnapshot, Transition};
