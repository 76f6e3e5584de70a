use prop_schemas::AccountStatus;

use crate::types::{EvaluationSnapshot, Transition};

/// Decide what happens to one account, in strict priority order:
///
/// 1. FAILED accounts are terminal: no-op.
/// 2. Breach check — a live drawdown violation fails the account before any
///    progression is considered.
/// 3. Prior breaches on record block progression permanently.
/// 4. Profit target met with a clean record advances the phase.
/// 5. Otherwise: metrics-only refresh, correcting a stale non-ACTIVE status
///    back to ACTIVE (self-heal).
///
/// FUNDED accounts never transition further through this evaluator; they
/// only ever receive the metrics refresh.
pub fn evaluate(snap: &EvaluationSnapshot) -> Transition {
    let account = &snap.account;

    if account.status == AccountStatus::Failed {
        return Transition::AlreadyTerminal;
    }

    if account.status != AccountStatus::Funded {
        // Breach wins over progression. A pass that both breaches and meets
        // the target in the same batch of trades must fail.
        if let Some(breach) = prop_rules::calculate_drawdown(
            &account.drawdown,
            account.starting_balance_micros,
            snap.metrics.current_equity_micros,
            snap.daily_start_balance_micros,
            snap.metrics.high_water_mark_micros,
        ) {
            return Transition::Fail { breach };
        }

        // Breaches are never forgiven by later profitable trading.
        if snap.prior_breach_count > 0 {
            return Transition::Blocked;
        }

        let progress = prop_rules::calculate_phase_progress(
            account.evaluation_type,
            snap.phase.phase_type,
            snap.phase.profit_target_micros,
            snap.metrics.net_profit_micros,
        );
        if progress.can_progress {
            if let Some(next) = progress.next_phase_type {
                let account_status_after = if next == prop_schemas::PhaseType::Funded {
                    AccountStatus::Funded
                } else {
                    AccountStatus::Active
                };
                return Transition::Advance {
                    next_phase_type: next,
                    account_status_after,
                };
            }
        }
    }

    Transition::Refresh {
        reactivate: !matches!(
            account.status,
            AccountStatus::Active | AccountStatus::Funded
        ),
    }
}
