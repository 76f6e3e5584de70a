//! Evaluation decision scenarios: breach fails, target advances, prior
//! breaches block, terminal accounts no-op, stale statuses self-heal.

use chrono::{TimeZone, Utc};
use prop_evaluator::{evaluate, EvaluationSnapshot, Transition};
use prop_metrics::PhaseMetrics;
use prop_schemas::{
    Account, AccountPhase, AccountStatus, BreachType, DrawdownConfig, DrawdownLimit,
    EvaluationType, PhaseStatus, PhaseType, MICROS_SCALE,
};
use uuid::Uuid;

const M: i64 = MICROS_SCALE;

fn account(evaluation_type: EvaluationType, status: AccountStatus) -> Account {
    Account {
        account_id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        account_number: "APEX-1".into(),
        prop_firm: Some("Apex".into()),
        starting_balance_micros: 10_000 * M,
        timezone: "America/New_York".into(),
        evaluation_type,
        drawdown: DrawdownConfig {
            daily: DrawdownLimit::PercentBps { bps: 500 },
            max: DrawdownLimit::PercentBps { bps: 1_000 },
            trailing: false,
        },
        status,
        created_at: Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap(),
    }
}

fn phase(account: &Account, phase_type: PhaseType, target_micros: i64) -> AccountPhase {
    AccountPhase {
        phase_id: Uuid::new_v4(),
        account_id: account.account_id,
        phase_type,
        status: PhaseStatus::Active,
        profit_target_micros: target_micros,
        starting_balance_micros: account.starting_balance_micros,
        current_balance_micros: account.starting_balance_micros,
        current_equity_micros: account.starting_balance_micros,
        highest_equity_micros: account.starting_balance_micros,
        net_profit_micros: 0,
        started_at: account.created_at,
        ended_at: None,
    }
}

fn metrics(equity_micros: i64, net_profit_micros: i64, hwm_micros: i64) -> PhaseMetrics {
    PhaseMetrics {
        current_balance_micros: equity_micros,
        current_equity_micros: equity_micros,
        net_profit_micros,
        high_water_mark_micros: hwm_micros,
    }
}

fn snapshot(
    account: Account,
    phase: AccountPhase,
    metrics: PhaseMetrics,
    daily_start_micros: i64,
    prior_breach_count: i64,
) -> EvaluationSnapshot {
    EvaluationSnapshot {
        account,
        phase,
        metrics,
        daily_start_balance_micros: daily_start_micros,
        prior_breach_count,
    }
}

// ---------------------------------------------------------------------------
// Breach scenarios
// ---------------------------------------------------------------------------

/// Day 1 gains $1,000; day 2 loses $1,000 from the $11,000 anchor, blowing
/// through the 5% ($550) daily limit. The account fails even though equity
/// is back at its starting balance.
#[test]
fn daily_breach_fails_the_account() {
    let a = account(EvaluationType::TwoStep, AccountStatus::Active);
    let p = phase(&a, PhaseType::Phase1, 800 * M);

    let t = evaluate(&snapshot(
        a,
        p,
        metrics(10_000 * M, 0, 11_000 * M),
        11_000 * M,
        0,
    ));

    match t {
        Transition::Fail { breach } => {
            assert_eq!(breach.breach_type, BreachType::DailyDrawdown);
            assert_eq!(breach.limit_micros, 550 * M);
            assert_eq!(breach.breach_amount_micros, 1_000 * M);
        }
        other => panic!("expected Fail, got {:?}", other),
    }
}

/// Breach wins over progression: a batch that both meets the profit target
/// and violates the daily limit fails.
#[test]
fn breach_beats_target_in_the_same_pass() {
    let a = account(EvaluationType::TwoStep, AccountStatus::Active);
    let p = phase(&a, PhaseType::Phase1, 800 * M);

    // Net +$900 overall, but today lost $700 against an $11,600 anchor
    // (limit 5% = $580).
    let t = evaluate(&snapshot(
        a,
        p,
        metrics(10_900 * M, 900 * M, 12_000 * M),
        11_600 * M,
        0,
    ));
    assert!(matches!(t, Transition::Fail { .. }));
}

// ---------------------------------------------------------------------------
// Progression scenarios
// ---------------------------------------------------------------------------

/// $800 profit on a two-step Phase 1 with a clean record advances to
/// Phase 2; the account stays ACTIVE.
#[test]
fn two_step_phase1_target_advances_to_phase2() {
    let a = account(EvaluationType::TwoStep, AccountStatus::Active);
    let p = phase(&a, PhaseType::Phase1, 800 * M);

    let t = evaluate(&snapshot(
        a,
        p,
        metrics(10_800 * M, 800 * M, 10_800 * M),
        10_500 * M,
        0,
    ));
    assert_eq!(
        t,
        Transition::Advance {
            next_phase_type: PhaseType::Phase2,
            account_status_after: AccountStatus::Active,
        }
    );
}

/// Phase 2 passing funds the account.
#[test]
fn two_step_phase2_target_funds_the_account() {
    let a = account(EvaluationType::TwoStep, AccountStatus::Active);
    let p = phase(&a, PhaseType::Phase2, 500 * M);

    let t = evaluate(&snapshot(
        a,
        p,
        metrics(10_500 * M, 500 * M, 10_500 * M),
        10_200 * M,
        0,
    ));
    assert_eq!(
        t,
        Transition::Advance {
            next_phase_type: PhaseType::Funded,
            account_status_after: AccountStatus::Funded,
        }
    );
}

/// One-step evaluations fund straight out of Phase 1.
#[test]
fn one_step_phase1_target_funds_the_account() {
    let a = account(EvaluationType::OneStep, AccountStatus::Active);
    let p = phase(&a, PhaseType::Phase1, 1_000 * M);

    let t = evaluate(&snapshot(
        a,
        p,
        metrics(11_000 * M, 1_000 * M, 11_000 * M),
        10_600 * M,
        0,
    ));
    assert_eq!(
        t,
        Transition::Advance {
            next_phase_type: PhaseType::Funded,
            account_status_after: AccountStatus::Funded,
        }
    );
}

/// A breach on record permanently blocks progression even after the trader
/// claws back past the profit target.
#[test]
fn prior_breach_blocks_progression_forever() {
    let a = account(EvaluationType::TwoStep, AccountStatus::Active);
    let p = phase(&a, PhaseType::Phase1, 800 * M);

    let t = evaluate(&snapshot(
        a,
        p,
        metrics(11_200 * M, 1_200 * M, 11_200 * M),
        11_000 * M,
        1,
    ));
    assert_eq!(t, Transition::Blocked);
}

/// Target not yet met, nothing wrong: metrics-only refresh.
#[test]
fn under_target_refreshes_only() {
    let a = account(EvaluationType::TwoStep, AccountStatus::Active);
    let p = phase(&a, PhaseType::Phase1, 800 * M);

    let t = evaluate(&snapshot(
        a,
        p,
        metrics(10_300 * M, 300 * M, 10_300 * M),
        10_100 * M,
        0,
    ));
    assert_eq!(t, Transition::Refresh { reactivate: false });
}

// ---------------------------------------------------------------------------
// Terminal and funded accounts
// ---------------------------------------------------------------------------

/// Re-running the evaluator against an already-failed account is a no-op,
/// keeping repeated imports idempotent.
#[test]
fn failed_account_is_terminal() {
    let a = account(EvaluationType::TwoStep, AccountStatus::Failed);
    let p = phase(&a, PhaseType::Phase1, 800 * M);

    // Equity deep below every limit; still a no-op.
    let t = evaluate(&snapshot(a, p, metrics(1_000 * M, -9_000 * M, 10_000 * M), 10_000 * M, 1));
    assert_eq!(t, Transition::AlreadyTerminal);
}

/// Funded accounts skip breach and progression checks entirely: even an
/// equity far below the limits only refreshes metrics.
#[test]
fn funded_account_only_refreshes_metrics() {
    let a = account(EvaluationType::TwoStep, AccountStatus::Funded);
    let p = phase(&a, PhaseType::Funded, 0);

    let t = evaluate(&snapshot(
        a,
        p,
        metrics(5_000 * M, -5_000 * M, 12_000 * M),
        11_000 * M,
        0,
    ));
    assert_eq!(t, Transition::Refresh { reactivate: false });
}

/// A stale PASSED status with an active phase and no breach self-heals back
/// to ACTIVE.
#[test]
fn stale_passed_status_reactivates() {
    let a = account(EvaluationType::TwoStep, AccountStatus::Passed);
    let p = phase(&a, PhaseType::Phase2, 500 * M);

    let t = evaluate(&snapshot(
        a,
        p,
        metrics(10_100 * M, 100 * M, 10_100 * M),
        10_050 * M,
        0,
    ));
    assert_eq!(t, Transition::Refresh { reactivate: true });
}
