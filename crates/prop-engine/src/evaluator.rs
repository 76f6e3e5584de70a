//! Account status evaluation: one transaction per account.
//!
//! Loads the account's state under a per-account advisory lock, asks the
//! pure state machine for a transition, and applies its side effects. Any
//! error rolls the whole account back; partial state is never committed.

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use serde_json::json;
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use prop_audit::AuditAction;
use prop_evaluator::{EvaluationSnapshot, Transition};
use prop_schemas::{
    AccountPhase, AccountStatus, AccountTransition, Breach, PhaseStatus, PhaseType, StatusUpdate,
    TransitionReason,
};

use crate::anchors;

/// Evaluate one account. Returns a status-update event when the pass
/// changed the account's status or phase, `None` for a metrics-only pass.
///
/// Idempotent: re-running with no new trades and no state drift leaves the
/// account/phase state byte-identical and appends nothing.
pub async fn evaluate_account(pool: &PgPool, account_id: Uuid) -> Result<Option<StatusUpdate>> {
    let mut tx = pool.begin().await.context("begin evaluation transaction")?;
    prop_db::lock_account(&mut tx, account_id).await?;

    let account = prop_db::fetch_account(&mut *tx, account_id).await?;

    // Idempotent re-entry guard: failed accounts never re-enter evaluation.
    if account.status == AccountStatus::Failed {
        tx.commit().await.context("commit no-op transaction")?;
        return Ok(None);
    }

    // A non-failed account without an active phase is an inconsistent state;
    // surface it, never silently create a phase here.
    let phase = prop_db::active_phase(&mut *tx, account_id)
        .await?
        .ok_or_else(|| anyhow!("account {} has no active phase", account_id))?;

    let trades = prop_db::trades_for_phase(&mut *tx, phase.phase_id).await?;
    let metrics = prop_metrics::compute_metrics(&phase, &trades);

    // Anchor seeds from the phase equity as stored *before* this pass: the
    // day's zero-point is yesterday's close, not the equity after today's
    // trades.
    let daily_start_balance_micros = anchors::daily_start_balance_with_seed(
        &mut tx,
        &account,
        phase.current_equity_micros,
        Utc::now(),
    )
    .await?;

    let prior_breach_count = prop_db::count_breaches(&mut *tx, phase.phase_id).await?;

    let snapshot = EvaluationSnapshot {
        account,
        phase,
        metrics,
        daily_start_balance_micros,
        prior_breach_count,
    };
    let transition = prop_evaluator::evaluate(&snapshot);
    let update = apply_transition(&mut tx, &snapshot, &transition).await?;

    tx.commit().await.context("commit evaluation transaction")?;

    if let Some(u) = &update {
        info!(
            account_id = %u.account_id,
            from = u.previous_status.as_str(),
            to = u.new_status.as_str(),
            reason = u.reason.as_str(),
            "account status updated"
        );
    }
    Ok(update)
}

/// Apply one transition's side effects inside the caller's transaction.
async fn apply_transition(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    snap: &EvaluationSnapshot,
    transition: &Transition,
) -> Result<Option<StatusUpdate>> {
    let account = &snap.account;
    let phase = &snap.phase;
    let now = Utc::now();

    match transition {
        Transition::AlreadyTerminal => Ok(None),

        Transition::Fail { breach } => {
            prop_db::update_phase_metrics(&mut **tx, phase.phase_id, &snap.metrics).await?;
            prop_db::end_phase(&mut **tx, phase.phase_id, PhaseStatus::Failed, now).await?;
            prop_db::update_account_status(&mut **tx, account.account_id, AccountStatus::Failed)
                .await?;

            prop_db::insert_breach(
                &mut **tx,
                &Breach {
                    breach_id: Uuid::new_v4(),
                    account_id: account.account_id,
                    phase_id: phase.phase_id,
                    breach_type: breach.breach_type,
                    limit_micros: breach.limit_micros,
                    breach_amount_micros: breach.breach_amount_micros,
                    equity_micros: breach.equity_micros,
                    occurred_at: now,
                },
            )
            .await?;

            let reason = TransitionReason::for_breach(breach.breach_type);
            prop_db::insert_transition(
                &mut **tx,
                &AccountTransition {
                    transition_id: Uuid::new_v4(),
                    account_id: account.account_id,
                    from_status: account.status,
                    to_status: AccountStatus::Failed,
                    from_phase_id: Some(phase.phase_id),
                    to_phase_id: None,
                    reason,
                    metadata: json!({
                        "breach_type": breach.breach_type.as_str(),
                        "limit_micros": breach.limit_micros,
                        "breach_amount_micros": breach.breach_amount_micros,
                    }),
                    occurred_at: now,
                },
            )
            .await?;

            append_audit(
                tx,
                account.account_id,
                AuditAction::AccountFailed,
                json!({
                    "phase_id": phase.phase_id,
                    "breach_type": breach.breach_type.as_str(),
                    "limit_micros": breach.limit_micros,
                    "breach_amount_micros": breach.breach_amount_micros,
                    "equity_micros": breach.equity_micros,
                    "daily_start_balance_micros": snap.daily_start_balance_micros,
                }),
            )
            .await?;

            Ok(Some(StatusUpdate {
                account_id: account.account_id,
                previous_status: account.status,
                new_status: AccountStatus::Failed,
                reason,
                breach: Some(*breach),
            }))
        }

        Transition::Blocked => {
            // Historical breach on record: progression is permanently
            // blocked; refresh metrics and nothing else.
            prop_db::update_phase_metrics(&mut **tx, phase.phase_id, &snap.metrics).await?;
            Ok(None)
        }

        Transition::Advance {
            next_phase_type,
            account_status_after,
        } => {
            prop_db::update_phase_metrics(&mut **tx, phase.phase_id, &snap.metrics).await?;
            prop_db::end_phase(&mut **tx, phase.phase_id, PhaseStatus::Passed, now).await?;

            // Successor phase seeded with the equity and high-water mark the
            // trader earned; net profit restarts from zero.
            let next_phase = AccountPhase {
                phase_id: Uuid::new_v4(),
                account_id: account.account_id,
                phase_type: *next_phase_type,
                status: PhaseStatus::Active,
                profit_target_micros: prop_rules::default_profit_target(
                    *next_phase_type,
                    account.starting_balance_micros,
                    account.evaluation_type,
                ),
                starting_balance_micros: snap.metrics.current_balance_micros,
                current_balance_micros: snap.metrics.current_balance_micros,
                current_equity_micros: snap.metrics.current_equity_micros,
                highest_equity_micros: snap.metrics.high_water_mark_micros,
                net_profit_micros: 0,
                started_at: now,
                ended_at: None,
            };
            prop_db::insert_phase(&mut **tx, &next_phase).await?;

            if *account_status_after != account.status {
                prop_db::update_account_status(&mut **tx, account.account_id, *account_status_after)
                    .await?;
            }

            prop_db::insert_transition(
                &mut **tx,
                &AccountTransition {
                    transition_id: Uuid::new_v4(),
                    account_id: account.account_id,
                    from_status: account.status,
                    to_status: *account_status_after,
                    from_phase_id: Some(phase.phase_id),
                    to_phase_id: Some(next_phase.phase_id),
                    reason: TransitionReason::ProfitTargetReached,
                    metadata: json!({
                        "passed_phase_type": phase.phase_type.as_str(),
                        "next_phase_type": next_phase_type.as_str(),
                        "net_profit_micros": snap.metrics.net_profit_micros,
                        "profit_target_micros": phase.profit_target_micros,
                    }),
                    occurred_at: now,
                },
            )
            .await?;

            let action = if *next_phase_type == PhaseType::Funded {
                AuditAction::AccountFunded
            } else {
                AuditAction::PhasePassed
            };
            append_audit(
                tx,
                account.account_id,
                action,
                json!({
                    "passed_phase_id": phase.phase_id,
                    "next_phase_id": next_phase.phase_id,
                    "next_phase_type": next_phase_type.as_str(),
                    "net_profit_micros": snap.metrics.net_profit_micros,
                }),
            )
            .await?;

            Ok(Some(StatusUpdate {
                account_id: account.account_id,
                previous_status: account.status,
                new_status: *account_status_after,
                reason: TransitionReason::ProfitTargetReached,
                breach: None,
            }))
        }

        Transition::Refresh { reactivate } => {
            prop_db::update_phase_metrics(&mut **tx, phase.phase_id, &snap.metrics).await?;

            if !reactivate {
                return Ok(None);
            }

            // Self-heal: a non-ACTIVE status with a live active phase is
            // stale state. Correct it, but loudly — this can mask a genuine
            // integrity bug upstream.
            warn!(
                account_id = %account.account_id,
                stale_status = account.status.as_str(),
                "reactivating account with stale status"
            );
            prop_db::update_account_status(&mut **tx, account.account_id, AccountStatus::Active)
                .await?;
            prop_db::insert_transition(
                &mut **tx,
                &AccountTransition {
                    transition_id: Uuid::new_v4(),
                    account_id: account.account_id,
                    from_status: account.status,
                    to_status: AccountStatus::Active,
                    from_phase_id: Some(phase.phase_id),
                    to_phase_id: Some(phase.phase_id),
                    reason: TransitionReason::Reactivated,
                    metadata: json!({ "stale_status": account.status.as_str() }),
                    occurred_at: now,
                },
            )
            .await?;
            append_audit(
                tx,
                account.account_id,
                AuditAction::AccountReactivated,
                json!({
                    "stale_status": account.status.as_str(),
                    "phase_id": phase.phase_id,
                }),
            )
            .await?;

            Ok(Some(StatusUpdate {
                account_id: account.account_id,
                previous_status: account.status,
                new_status: AccountStatus::Active,
                reason: TransitionReason::Reactivated,
                breach: None,
            }))
        }
    }
}

/// Append one hash-chained audit entry for the account's stream.
async fn append_audit(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    account_id: Uuid,
    action: AuditAction,
    details: serde_json::Value,
) -> Result<()> {
    let prev = prop_db::last_audit_hash(&mut **tx, account_id).await?;
    let entry = prop_audit::build_entry(Some(account_id), action, details, prev)?;
    prop_db::insert_audit_entry(&mut **tx, &entry).await?;
    Ok(())
}

/// Record the broker account id assigned when an account enters Phase 2.
/// Appends a transition (transitions are immutable; provisioning never edits
/// the original pass record) and unblocks Phase-2 trade linking.
pub async fn record_broker_account_assignment(
    pool: &PgPool,
    account_id: Uuid,
    broker_account_id: &str,
) -> Result<()> {
    if broker_account_id.is_empty() {
        return Err(anyhow!("broker account id must be non-empty"));
    }

    let mut tx = pool.begin().await.context("begin assignment transaction")?;
    prop_db::lock_account(&mut tx, account_id).await?;

    let account = prop_db::fetch_account(&mut *tx, account_id).await?;
    let phase = prop_db::active_phase(&mut *tx, account_id)
        .await?
        .ok_or_else(|| anyhow!("account {} has no active phase", account_id))?;
    if phase.phase_type != PhaseType::Phase2 {
        return Err(anyhow!(
            "account {} active phase is {}, not PHASE_2",
            account_id,
            phase.phase_type.as_str()
        ));
    }

    prop_db::insert_transition(
        &mut *tx,
        &AccountTransition {
            transition_id: Uuid::new_v4(),
            account_id,
            from_status: account.status,
            to_status: account.status,
            from_phase_id: Some(phase.phase_id),
            to_phase_id: Some(phase.phase_id),
            reason: TransitionReason::BrokerAccountAssigned,
            metadata: json!({ "new_broker_account_id": broker_account_id }),
            occurred_at: Utc::now(),
        },
    )
    .await?;
    append_audit(
        &mut tx,
        account_id,
        AuditAction::BrokerAccountAssigned,
        json!({
            "phase_id": phase.phase_id,
            "new_broker_account_id": broker_account_id,
        }),
    )
    .await?;

    tx.commit().await.context("commit assignment transaction")?;
    info!(%account_id, broker_account_id, "broker account assigned for phase 2");
    Ok(())
}
