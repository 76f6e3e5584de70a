//! Orchestrator for the prop-firm account evaluation engine.
//!
//! Wires the pure crates (rules, metrics, calendar, evaluator) to the
//! Postgres store:
//!
//! - [`linker`] — matches imported trades to accounts/phases and queues
//!   affected accounts for evaluation.
//! - [`evaluator`] — runs one account's evaluation pass inside a single
//!   transaction and applies the resulting transition.
//! - [`anchors`] — daily start-of-day equity snapshots, per account
//!   timezone, plus the scheduled batch job.

pub mod anchors;
pub mod evaluator;
pub mod linker;

pub use anchors::{create_daily_anchors, AnchorBatchReport};
pub use evaluator::{evaluate_account, record_broker_account_assignment};
pub use linker::{link_trades_and_evaluate, resolve_link, LinkDecision, LinkReport};
