//! Drawdown threshold scenarios: percent vs fixed limits, static vs
//! trailing max mode, daily-before-max ordering, disabled limits.

use prop_rules::calculate_drawdown;
use prop_schemas::{BreachType, DrawdownConfig, DrawdownLimit, MICROS_SCALE};

const M: i64 = MICROS_SCALE;

fn cfg(daily: DrawdownLimit, max: DrawdownLimit, trailing: bool) -> DrawdownConfig {
    DrawdownConfig {
        daily,
        max,
        trailing,
    }
}

// ---------------------------------------------------------------------------
// Daily limit
// ---------------------------------------------------------------------------

/// 5% daily limit on an $11,000 anchor resolves to $550; a $1,000 day loss
/// breaches it (day-2 anchor after a +$1,000 day 1, equity back at start).
#[test]
fn percent_daily_limit_breaches_on_anchor_base() {
    let c = cfg(
        DrawdownLimit::PercentBps { bps: 500 },
        DrawdownLimit::Fixed {
            amount_micros: 5_000 * M,
        },
        false,
    );

    let breach = calculate_drawdown(&c, 10_000 * M, 10_000 * M, 11_000 * M, 11_000 * M)
        .expect("daily limit must breach");
    assert_eq!(breach.breach_type, BreachType::DailyDrawdown);
    assert_eq!(breach.limit_micros, 550 * M);
    assert_eq!(breach.breach_amount_micros, 1_000 * M);
    assert_eq!(breach.equity_micros, 10_000 * M);
}

#[test]
fn fixed_daily_limit_breaches_at_exact_floor() {
    let c = cfg(
        DrawdownLimit::Fixed {
            amount_micros: 500 * M,
        },
        DrawdownLimit::Fixed {
            amount_micros: 5_000 * M,
        },
        false,
    );

    // Loss of exactly the limit counts as a breach (equity at the floor).
    let breach = calculate_drawdown(&c, 10_000 * M, 9_500 * M, 10_000 * M, 10_000 * M)
        .expect("hitting the floor is a breach");
    assert_eq!(breach.breach_type, BreachType::DailyDrawdown);
    assert_eq!(breach.breach_amount_micros, 500 * M);

    // One micro above the floor is not.
    assert!(calculate_drawdown(&c, 10_000 * M, 9_500 * M + 1, 10_000 * M, 10_000 * M).is_none());
}

#[test]
fn intraday_gain_never_breaches_daily_limit() {
    let c = cfg(
        DrawdownLimit::PercentBps { bps: 500 },
        DrawdownLimit::PercentBps { bps: 1_000 },
        false,
    );
    assert!(calculate_drawdown(&c, 10_000 * M, 10_800 * M, 10_000 * M, 10_800 * M).is_none());
}

// ---------------------------------------------------------------------------
// Max limit: static vs trailing
// ---------------------------------------------------------------------------

/// Static max drawdown is anchored to the starting balance: a large runup
/// followed by a pullback to above the static floor does not breach.
#[test]
fn static_max_ignores_high_water_mark() {
    let c = cfg(
        DrawdownLimit::Fixed {
            amount_micros: 10_000 * M,
        },
        DrawdownLimit::PercentBps { bps: 1_000 }, // 10% of $10,000 = $1,000
        false,
    );

    // Equity ran to $13,000 and fell back to $9,100: $900 below start,
    // inside the $1,000 static floor. Daily anchor equals equity (no day loss).
    assert!(calculate_drawdown(&c, 10_000 * M, 9_100 * M, 9_100 * M, 13_000 * M).is_none());

    // $9,000 is at the static floor: breach.
    let breach = calculate_drawdown(&c, 10_000 * M, 9_000 * M, 9_000 * M, 13_000 * M)
        .expect("static floor reached");
    assert_eq!(breach.breach_type, BreachType::MaxDrawdown);
    assert_eq!(breach.limit_micros, 1_000 * M);
    assert_eq!(breach.breach_amount_micros, 1_000 * M);
}

/// Trailing max drawdown follows the high-water mark: the same pullback that
/// is safe statically breaches when the floor trails the peak.
#[test]
fn trailing_max_follows_high_water_mark() {
    let c = cfg(
        DrawdownLimit::Fixed {
            amount_micros: 10_000 * M,
        },
        DrawdownLimit::PercentBps { bps: 1_000 },
        true,
    );

    // Peak $13,000, trailing floor $12,000; $11,900 breaches.
    let breach = calculate_drawdown(&c, 10_000 * M, 11_900 * M, 11_900 * M, 13_000 * M)
        .expect("trailing floor reached");
    assert_eq!(breach.breach_type, BreachType::MaxDrawdown);
    assert_eq!(breach.breach_amount_micros, 1_100 * M);

    // $12,100 is inside the trailing floor.
    assert!(calculate_drawdown(&c, 10_000 * M, 12_100 * M, 12_100 * M, 13_000 * M).is_none());
}

// ---------------------------------------------------------------------------
// Ordering and disabled limits
// ---------------------------------------------------------------------------

/// When one equity violates both limits, the daily check runs first and the
/// breach is recorded as DAILY_DRAWDOWN.
#[test]
fn daily_check_runs_before_max() {
    let c = cfg(
        DrawdownLimit::PercentBps { bps: 500 },
        DrawdownLimit::PercentBps { bps: 1_000 },
        false,
    );

    // $8,000 equity: $2,000 below both the $10,000 anchor (limit $500) and
    // the starting balance (limit $1,000).
    let breach = calculate_drawdown(&c, 10_000 * M, 8_000 * M, 10_000 * M, 10_000 * M)
        .expect("both limits violated");
    assert_eq!(breach.breach_type, BreachType::DailyDrawdown);
}

/// A limit resolving to zero is disabled, not instantly breached.
#[test]
fn zero_limit_is_disabled() {
    let c = cfg(
        DrawdownLimit::Fixed { amount_micros: 0 },
        DrawdownLimit::Fixed { amount_micros: 0 },
        false,
    );
    assert!(calculate_drawdown(&c, 10_000 * M, 1_000 * M, 10_000 * M, 10_000 * M).is_none());
}
