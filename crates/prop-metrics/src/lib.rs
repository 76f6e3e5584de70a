//! Phase metrics: chronological trade replay.
//!
//! Replays a phase's linked trades in trade-time order to derive the running
//! balance, net profit since phase start, and the high-water mark. Replay
//! order is always by trade time (exit time, falling back to entry time),
//! never by storage order, so a backfilled import produces the same
//! high-water mark as a live one.

use prop_schemas::{AccountPhase, Trade};

/// Derived running metrics for one phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseMetrics {
    pub current_balance_micros: i64,
    /// Equals the balance for now: no open-position mark-to-market.
    pub current_equity_micros: i64,
    /// Measured from the phase's starting balance.
    pub net_profit_micros: i64,
    /// Highest equity seen since phase start; never below the stored
    /// `highest_equity_micros` and never below the final equity.
    pub high_water_mark_micros: i64,
}

/// Replay the trades linked to `phase` and compute its metrics.
///
/// Trades not linked to this phase are ignored. The high-water mark is
/// seeded from `max(phase starting balance, stored highest equity)` so a
/// re-evaluation can never lower it.
pub fn compute_metrics(phase: &AccountPhase, trades: &[Trade]) -> PhaseMetrics {
    let mut linked: Vec<&Trade> = trades
        .iter()
        .filter(|t| t.phase_id == Some(phase.phase_id))
        .collect();
    // Stable sort with entry time and id as tie-breakers so replay is
    // deterministic when several trades close in the same instant.
    linked.sort_by_key(|t| (t.replay_time(), t.entry_time, t.trade_id));

    let mut running = phase.starting_balance_micros;
    let mut high_water = phase
        .starting_balance_micros
        .max(phase.highest_equity_micros);

    for trade in linked {
        running = running.saturating_add(trade.pnl_micros);
        if running > high_water {
            high_water = running;
        }
    }

    PhaseMetrics {
        current_balance_micros: running,
        current_equity_micros: running,
        net_profit_micros: running - phase.starting_balance_micros,
        high_water_mark_micros: high_water,
    }
}
