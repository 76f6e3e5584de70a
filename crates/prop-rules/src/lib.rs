//! Drawdown and phase-progression rules.
//!
//! Pure deterministic threshold functions over fixed-point micros. No I/O,
//! no clock, no floats in the decision path. The evaluator treats this crate
//! as the single source of truth for thresholds; it must not re-derive them.
//!
//! Percent limits resolve in integer basis-point math:
//! - the daily limit resolves against the daily anchor equity (the day's
//!   zero-point),
//! - the max limit resolves against the account starting balance.
//!
//! Trailing mode applies to the max limit only: the floor follows the
//! high-water mark instead of the starting balance.

use prop_schemas::{
    BreachDetails, BreachType, DrawdownConfig, EvaluationType, PhaseType, BPS_SCALE,
};

/// Default profit targets in basis points of the account starting balance.
pub const TWO_STEP_PHASE1_TARGET_BPS: i64 = 800;
pub const TWO_STEP_PHASE2_TARGET_BPS: i64 = 500;
pub const ONE_STEP_PHASE1_TARGET_BPS: i64 = 1000;

// ---------------------------------------------------------------------------
// Drawdown
// ---------------------------------------------------------------------------

/// Check the phase against both drawdown limits. Returns the breach facts,
/// or `None` when neither limit is violated.
///
/// The daily check runs first, so a trade violating both limits is recorded
/// as a DAILY_DRAWDOWN breach (the account fails either way).
///
/// A limit resolving to zero or below is disabled. Arithmetic that cannot be
/// represented fails closed: a floor we cannot compute is treated as
/// breached rather than silently skipped.
pub fn calculate_drawdown(
    cfg: &DrawdownConfig,
    starting_balance_micros: i64,
    current_equity_micros: i64,
    daily_start_balance_micros: i64,
    high_water_mark_micros: i64,
) -> Option<BreachDetails> {
    // Daily: loss measured from the day's anchor equity.
    let daily_limit = cfg.daily.resolve(daily_start_balance_micros);
    if daily_limit > 0 {
        if let Some(breach) = check_floor(
            BreachType::DailyDrawdown,
            daily_start_balance_micros,
            daily_limit,
            current_equity_micros,
        ) {
            return Some(breach);
        }
    }

    // Max: loss measured from the high-water mark (trailing) or the
    // starting balance (static). Percent resolution is always against the
    // starting balance.
    let max_limit = cfg.max.resolve(starting_balance_micros);
    if max_limit > 0 {
        let reference = if cfg.trailing {
            high_water_mark_micros
        } else {
            starting_balance_micros
        };
        if let Some(breach) = check_floor(
            BreachType::MaxDrawdown,
            reference,
            max_limit,
            current_equity_micros,
        ) {
            return Some(breach);
        }
    }

    None
}

/// Breach when equity has fallen to or below `reference - limit`.
fn check_floor(
    breach_type: BreachType,
    reference_micros: i64,
    limit_micros: i64,
    current_equity_micros: i64,
) -> Option<BreachDetails> {
    let drawdown = match reference_micros.checked_sub(current_equity_micros) {
        Some(d) => d,
        // Corrupted reference: fail closed instead of masking the breach.
        None => i64::MAX,
    };

    if drawdown >= limit_micros {
        Some(BreachDetails {
            breach_type,
            limit_micros,
            breach_amount_micros: drawdown,
            equity_micros: current_equity_micros,
        })
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Phase progression
// ---------------------------------------------------------------------------

/// Outcome of the profit-target check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressOutcome {
    pub can_progress: bool,
    pub next_phase_type: Option<PhaseType>,
}

impl ProgressOutcome {
    fn no() -> Self {
        Self {
            can_progress: false,
            next_phase_type: None,
        }
    }
}

/// Whether the phase has met its profit target and, if so, which phase type
/// follows. FUNDED phases never progress; a phase with no target (<= 0)
/// never progresses.
pub fn calculate_phase_progress(
    evaluation_type: EvaluationType,
    phase_type: PhaseType,
    profit_target_micros: i64,
    net_profit_micros: i64,
) -> ProgressOutcome {
    if profit_target_micros <= 0 || net_profit_micros < profit_target_micros {
        return ProgressOutcome::no();
    }
    match next_phase_type(evaluation_type, phase_type) {
        Some(next) => ProgressOutcome {
            can_progress: true,
            next_phase_type: Some(next),
        },
        None => ProgressOutcome::no(),
    }
}

/// Phase-type successor map per evaluation type.
pub fn next_phase_type(evaluation_type: EvaluationType, current: PhaseType) -> Option<PhaseType> {
    match (evaluation_type, current) {
        (EvaluationType::TwoStep, PhaseType::Phase1) => Some(PhaseType::Phase2),
        (EvaluationType::TwoStep, PhaseType::Phase2) => Some(PhaseType::Funded),
        (EvaluationType::OneStep, PhaseType::Phase1) => Some(PhaseType::Funded),
        // FUNDED is the end of the road; INSTANT accounts start there.
        _ => None,
    }
}

/// Default profit target in micros for a freshly created phase.
/// FUNDED phases carry no target.
pub fn default_profit_target(
    phase_type: PhaseType,
    starting_balance_micros: i64,
    evaluation_type: EvaluationType,
) -> i64 {
    let bps = match (evaluation_type, phase_type) {
        (EvaluationType::TwoStep, PhaseType::Phase1) => TWO_STEP_PHASE1_TARGET_BPS,
        (EvaluationType::TwoStep, PhaseType::Phase2) => TWO_STEP_PHASE2_TARGET_BPS,
        (EvaluationType::OneStep, PhaseType::Phase1) => ONE_STEP_PHASE1_TARGET_BPS,
        _ => return 0,
    };
    ((starting_balance_micros as i128 * bps as i128) / BPS_SCALE as i128) as i64
}
