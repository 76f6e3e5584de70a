//! Shared data model for the prop-firm account evaluation engine.
//!
//! Plain serde structs and string-backed enums only; all behaviour lives in
//! the rules / metrics / evaluator crates. Money is fixed-point `i64` micros
//! (1 USD = 1_000_000), percent thresholds are integer basis points.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// 1e-6 fixed-point scale.
pub const MICROS_SCALE: i64 = 1_000_000;

/// Basis-point scale (10_000 bps = 100%).
pub const BPS_SCALE: i64 = 10_000;

/// Metadata key on an [`AccountTransition`] carrying the broker account id
/// assigned when an account enters Phase 2. Linking Phase-2 trades is blocked
/// until a transition into the active phase carries this key.
pub const META_NEW_BROKER_ACCOUNT_ID: &str = "new_broker_account_id";

// ---------------------------------------------------------------------------
// Status enums
// ---------------------------------------------------------------------------

/// Account lifecycle status. FAILED is terminal for evaluation; FUNDED is
/// terminal-success.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountStatus {
    Active,
    Failed,
    Passed,
    Funded,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "ACTIVE",
            AccountStatus::Failed => "FAILED",
            AccountStatus::Passed => "PASSED",
            AccountStatus::Funded => "FUNDED",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "ACTIVE" => Ok(AccountStatus::Active),
            "FAILED" => Ok(AccountStatus::Failed),
            "PASSED" => Ok(AccountStatus::Passed),
            "FUNDED" => Ok(AccountStatus::Funded),
            other => Err(anyhow!("invalid account status: {}", other)),
        }
    }
}

/// Evaluation stage of a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhaseType {
    Phase1,
    Phase2,
    Funded,
}

impl PhaseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseType::Phase1 => "PHASE_1",
            PhaseType::Phase2 => "PHASE_2",
            PhaseType::Funded => "FUNDED",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "PHASE_1" => Ok(PhaseType::Phase1),
            "PHASE_2" => Ok(PhaseType::Phase2),
            "FUNDED" => Ok(PhaseType::Funded),
            other => Err(anyhow!("invalid phase type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PhaseStatus {
    Active,
    Passed,
    Failed,
    Pending,
}

impl PhaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseStatus::Active => "ACTIVE",
            PhaseStatus::Passed => "PASSED",
            PhaseStatus::Failed => "FAILED",
            PhaseStatus::Pending => "PENDING",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "ACTIVE" => Ok(PhaseStatus::Active),
            "PASSED" => Ok(PhaseStatus::Passed),
            "FAILED" => Ok(PhaseStatus::Failed),
            "PENDING" => Ok(PhaseStatus::Pending),
            other => Err(anyhow!("invalid phase status: {}", other)),
        }
    }
}

/// How many evaluation stages the account must clear before funding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EvaluationType {
    OneStep,
    TwoStep,
    Instant,
}

impl EvaluationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvaluationType::OneStep => "ONE_STEP",
            EvaluationType::TwoStep => "TWO_STEP",
            EvaluationType::Instant => "INSTANT",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "ONE_STEP" => Ok(EvaluationType::OneStep),
            "TWO_STEP" => Ok(EvaluationType::TwoStep),
            "INSTANT" => Ok(EvaluationType::Instant),
            other => Err(anyhow!("invalid evaluation type: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BreachType {
    DailyDrawdown,
    MaxDrawdown,
}

impl BreachType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BreachType::DailyDrawdown => "DAILY_DRAWDOWN",
            BreachType::MaxDrawdown => "MAX_DRAWDOWN",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "DAILY_DRAWDOWN" => Ok(BreachType::DailyDrawdown),
            "MAX_DRAWDOWN" => Ok(BreachType::MaxDrawdown),
            other => Err(anyhow!("invalid breach type: {}", other)),
        }
    }
}

/// Reason codes attached to transitions and status-update events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransitionReason {
    DailyDrawdownBreach,
    MaxDrawdownBreach,
    ProfitTargetReached,
    Reactivated,
    BrokerAccountAssigned,
}

impl TransitionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransitionReason::DailyDrawdownBreach => "DAILY_DRAWDOWN_BREACH",
            TransitionReason::MaxDrawdownBreach => "MAX_DRAWDOWN_BREACH",
            TransitionReason::ProfitTargetReached => "PROFIT_TARGET_REACHED",
            TransitionReason::Reactivated => "REACTIVATED",
            TransitionReason::BrokerAccountAssigned => "BROKER_ACCOUNT_ASSIGNED",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "DAILY_DRAWDOWN_BREACH" => Ok(TransitionReason::DailyDrawdownBreach),
            "MAX_DRAWDOWN_BREACH" => Ok(TransitionReason::MaxDrawdownBreach),
            "PROFIT_TARGET_REACHED" => Ok(TransitionReason::ProfitTargetReached),
            "REACTIVATED" => Ok(TransitionReason::Reactivated),
            "BROKER_ACCOUNT_ASSIGNED" => Ok(TransitionReason::BrokerAccountAssigned),
            other => Err(anyhow!("invalid transition reason: {}", other)),
        }
    }

    pub fn for_breach(breach_type: BreachType) -> Self {
        match breach_type {
            BreachType::DailyDrawdown => TransitionReason::DailyDrawdownBreach,
            BreachType::MaxDrawdown => TransitionReason::MaxDrawdownBreach,
        }
    }
}

// ---------------------------------------------------------------------------
// Drawdown configuration
// ---------------------------------------------------------------------------

/// One drawdown limit: a fixed micros amount or a percentage of a base
/// balance in basis points (500 bps = 5%).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DrawdownLimit {
    Fixed { amount_micros: i64 },
    PercentBps { bps: i64 },
}

impl DrawdownLimit {
    /// Resolve the limit to an absolute micros amount against `base_micros`.
    pub fn resolve(&self, base_micros: i64) -> i64 {
        match self {
            DrawdownLimit::Fixed { amount_micros } => *amount_micros,
            DrawdownLimit::PercentBps { bps } => {
                // i128 intermediate so large balances cannot overflow.
                ((base_micros as i128 * *bps as i128) / BPS_SCALE as i128) as i64
            }
        }
    }
}

/// Per-account drawdown rule configuration. `trailing` applies to the max
/// limit only: trailing follows the high-water mark, static is fixed to the
/// starting balance. Daily limits re-anchor each civil day by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawdownConfig {
    pub daily: DrawdownLimit,
    pub max: DrawdownLimit,
    pub trailing: bool,
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

/// One funded-account slot. Immutable once FAILED (trades may still be
/// linked for historical display, but evaluation never runs again).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub account_id: Uuid,
    pub user_id: Uuid,
    /// Broker-side account number; trades are matched against this string.
    pub account_number: String,
    /// Non-empty marks this as a prop-firm account subject to evaluation.
    pub prop_firm: Option<String>,
    pub starting_balance_micros: i64,
    /// IANA timezone name, e.g. "America/New_York". Drives the civil-day
    /// boundary for daily anchors.
    pub timezone: String,
    pub evaluation_type: EvaluationType,
    pub drawdown: DrawdownConfig,
    pub status: AccountStatus,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn is_prop_firm(&self) -> bool {
        self.prop_firm.as_deref().is_some_and(|p| !p.is_empty())
    }
}

/// One evaluation stage of an account. Phases are append-only: passing
/// creates a successor, failing terminates in place; historical records are
/// never rewritten.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountPhase {
    pub phase_id: Uuid,
    pub account_id: Uuid,
    pub phase_type: PhaseType,
    pub status: PhaseStatus,
    pub profit_target_micros: i64,
    /// Balance the phase opened with (account starting balance for Phase 1,
    /// carried equity for successors). Net profit is measured from here.
    pub starting_balance_micros: i64,
    pub current_balance_micros: i64,
    pub current_equity_micros: i64,
    /// Monotonically non-decreasing within the phase's lifetime.
    pub highest_equity_micros: i64,
    pub net_profit_micros: i64,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

/// An executed position closure with realized P&L. Unlinked trades
/// (`account_id == None`) are invisible to the evaluator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub trade_id: Uuid,
    pub user_id: Uuid,
    pub account_number: String,
    pub instrument: String,
    pub pnl_micros: i64,
    pub entry_time: DateTime<Utc>,
    pub exit_time: Option<DateTime<Utc>>,
    pub account_id: Option<Uuid>,
    pub phase_id: Option<Uuid>,
}

impl Trade {
    /// Chronological replay key: exit time, falling back to entry time.
    pub fn replay_time(&self) -> DateTime<Utc> {
        self.exit_time.unwrap_or(self.entry_time)
    }
}

/// Immutable record of a drawdown violation. One breach permanently moves
/// the owning account to FAILED.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Breach {
    pub breach_id: Uuid,
    pub account_id: Uuid,
    pub phase_id: Uuid,
    pub breach_type: BreachType,
    /// Resolved limit that was violated.
    pub limit_micros: i64,
    /// Actual drawdown at the moment of breach.
    pub breach_amount_micros: i64,
    /// Equity snapshot at breach.
    pub equity_micros: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Breach facts produced by the rules engine before persistence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreachDetails {
    pub breach_type: BreachType,
    pub limit_micros: i64,
    pub breach_amount_micros: i64,
    pub equity_micros: i64,
}

/// Immutable record of a status or phase change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountTransition {
    pub transition_id: Uuid,
    pub account_id: Uuid,
    pub from_status: AccountStatus,
    pub to_status: AccountStatus,
    pub from_phase_id: Option<Uuid>,
    pub to_phase_id: Option<Uuid>,
    pub reason: TransitionReason,
    pub metadata: Value,
    pub occurred_at: DateTime<Utc>,
}

impl AccountTransition {
    /// Broker account id assigned at Phase-2 entry, if the metadata carries
    /// one (non-empty).
    pub fn new_broker_account_id(&self) -> Option<&str> {
        self.metadata
            .get(META_NEW_BROKER_ACCOUNT_ID)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Status-change event emitted by the evaluator, consumable by a
/// notification/audit UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub account_id: Uuid,
    pub previous_status: AccountStatus,
    pub new_status: AccountStatus,
    pub reason: TransitionReason,
    pub breach: Option<BreachDetails>,
}
