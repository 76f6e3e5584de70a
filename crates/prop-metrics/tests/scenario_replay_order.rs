//! Metrics replay scenarios: trade-time ordering beats storage order, the
//! high-water mark never regresses, unlinked trades are invisible.

use chrono::{DateTime, TimeZone, Utc};
use prop_metrics::compute_metrics;
use prop_schemas::{AccountPhase, PhaseStatus, PhaseType, Trade, MICROS_SCALE};
use uuid::Uuid;

const M: i64 = MICROS_SCALE;

fn ts(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, day, hour, 0, 0).unwrap()
}

fn phase(starting_micros: i64, highest_micros: i64) -> AccountPhase {
    AccountPhase {
        phase_id: Uuid::new_v4(),
        account_id: Uuid::new_v4(),
        phase_type: PhaseType::Phase1,
        status: PhaseStatus::Active,
        profit_target_micros: 800 * M,
        starting_balance_micros: starting_micros,
        current_balance_micros: starting_micros,
        current_equity_micros: starting_micros,
        highest_equity_micros: highest_micros,
        net_profit_micros: 0,
        started_at: ts(1, 0),
        ended_at: None,
    }
}

fn trade(phase: &AccountPhase, pnl_micros: i64, exit: DateTime<Utc>) -> Trade {
    Trade {
        trade_id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        account_number: "APEX-1".into(),
        instrument: "MES".into(),
        pnl_micros,
        entry_time: exit - chrono::Duration::hours(1),
        exit_time: Some(exit),
        account_id: Some(phase.account_id),
        phase_id: Some(phase.phase_id),
    }
}

/// Storage order reversed relative to trade time must still produce the
/// chronologically correct high-water mark: +$2,000 then −$1,500 peaks at
/// $12,000 no matter which row was inserted first.
#[test]
fn replay_is_by_trade_time_not_storage_order() {
    let p = phase(10_000 * M, 10_000 * M);
    let early_win = trade(&p, 2_000 * M, ts(2, 10));
    let late_loss = trade(&p, -1_500 * M, ts(3, 10));

    // Backfilled import: loss row stored before the win row.
    let metrics = compute_metrics(&p, &[late_loss.clone(), early_win.clone()]);
    assert_eq!(metrics.current_balance_micros, 10_500 * M);
    assert_eq!(metrics.current_equity_micros, 10_500 * M);
    assert_eq!(metrics.net_profit_micros, 500 * M);
    assert_eq!(metrics.high_water_mark_micros, 12_000 * M);

    // Same trades in insertion order: identical result.
    let metrics2 = compute_metrics(&p, &[early_win, late_loss]);
    assert_eq!(metrics, metrics2);
}

/// The high-water mark is seeded from the stored phase value, so a
/// re-evaluation can never lower it below an earlier pass.
#[test]
fn high_water_mark_never_regresses() {
    let mut p = phase(10_000 * M, 10_000 * M);
    let win = trade(&p, 1_000 * M, ts(2, 10));
    let first = compute_metrics(&p, &[win.clone()]);
    assert_eq!(first.high_water_mark_micros, 11_000 * M);

    // Persist the pass, then a losing day arrives.
    p.highest_equity_micros = first.high_water_mark_micros;
    let loss = trade(&p, -2_000 * M, ts(3, 10));
    let second = compute_metrics(&p, &[win, loss]);
    assert_eq!(second.current_equity_micros, 9_000 * M);
    assert!(second.high_water_mark_micros >= first.high_water_mark_micros);
    assert_eq!(second.high_water_mark_micros, 11_000 * M);
}

/// Trades without an exit time replay at their entry time.
#[test]
fn missing_exit_time_falls_back_to_entry_time() {
    let p = phase(10_000 * M, 10_000 * M);
    let mut open_style = trade(&p, 300 * M, ts(2, 10));
    open_style.exit_time = None;
    open_style.entry_time = ts(2, 9);
    let closed = trade(&p, -100 * M, ts(2, 12));

    let metrics = compute_metrics(&p, &[closed, open_style]);
    // +300 first (entry 09:00), then −100: peak 10,300.
    assert_eq!(metrics.high_water_mark_micros, 10_300 * M);
    assert_eq!(metrics.current_balance_micros, 10_200 * M);
}

/// Trades linked to another phase (or unlinked) are invisible.
#[test]
fn other_phase_trades_are_ignored() {
    let p = phase(10_000 * M, 10_000 * M);
    let other = phase(10_000 * M, 10_000 * M);

    let mine = trade(&p, 500 * M, ts(2, 10));
    let theirs = trade(&other, 9_999 * M, ts(2, 11));
    let mut unlinked = trade(&p, 9_999 * M, ts(2, 12));
    unlinked.phase_id = None;

    let metrics = compute_metrics(&p, &[mine, theirs, unlinked]);
    assert_eq!(metrics.current_balance_micros, 10_500 * M);
}

/// No trades: metrics sit at the phase starting balance.
#[test]
fn empty_replay_is_the_starting_balance() {
    let p = phase(10_000 * M, 10_250 * M);
    let metrics = compute_metrics(&p, &[]);
    assert_eq!(metrics.current_balance_micros, 10_000 * M);
    assert_eq!(metrics.net_profit_micros, 0);
    // Seeded from the stored highest equity.
    assert_eq!(metrics.high_water_mark_micros, 10_250 * M);
}
