use prop_metrics::PhaseMetrics;
use prop_schemas::{Account, AccountPhase, AccountStatus, BreachDetails, PhaseType};

/// Everything the decision function needs about one account, loaded
/// atomically by the caller.
#[derive(Debug, Clone)]
pub struct EvaluationSnapshot {
    pub account: Account,
    /// The account's single active phase.
    pub phase: AccountPhase,
    /// Freshly recomputed metrics for that phase.
    pub metrics: PhaseMetrics,
    /// Today's anchor equity in the account timezone.
    pub daily_start_balance_micros: i64,
    /// Breach rows already on record for this phase. Any prior breach
    /// permanently blocks progression; breaches are never forgiven.
    pub prior_breach_count: i64,
}

/// The decision: exactly one of these per evaluation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Account is already FAILED: nothing to evaluate. Re-entry is a no-op
    /// so repeated imports stay idempotent.
    AlreadyTerminal,
    /// A drawdown limit was violated. Breach wins over progression; the
    /// progression check is not even reached in this pass.
    Fail { breach: BreachDetails },
    /// No live breach, but prior breach rows exist: progression is
    /// permanently blocked. Metrics-only refresh.
    Blocked,
    /// Profit target met with zero breaches: current phase passes and a
    /// successor phase is created.
    Advance {
        next_phase_type: PhaseType,
        /// FUNDED only when the successor phase type is FUNDED, else the
        /// account stays ACTIVE.
        account_status_after: AccountStatus,
    },
    /// Metrics-only refresh. `reactivate` is set when the stored status was
    /// neither ACTIVE nor FUNDED (self-heal for stale state; see DESIGN.md).
    Refresh { reactivate: bool },
}
