//! Trade linking.
//!
//! Matches imported trades to the owning account/phase by account number,
//! persists the links, and queues each affected account for exactly one
//! evaluation pass. The per-trade branch matrix is a pure function
//! ([`resolve_link`]) so every rejection case is unit-testable without a
//! database.
//!
//! Linking errors are non-fatal: they are collected into the report and the
//! batch keeps going. The only fatal case is failing to load the account
//! list before any per-trade work begins.

use std::collections::BTreeSet;

use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::{error, info};
use uuid::Uuid;

use prop_schemas::{Account, AccountPhase, AccountStatus, PhaseType, StatusUpdate, Trade};

use crate::evaluator;

/// Outcome of one import batch.
#[derive(Debug, Default)]
pub struct LinkReport {
    /// Trades that were linked (including history-only links).
    pub linked_trades: Vec<Uuid>,
    /// Status changes produced by the post-link evaluation passes.
    pub status_updates: Vec<StatusUpdate>,
    /// Human-readable per-trade / per-account failures.
    pub errors: Vec<String>,
}

/// Pure per-trade linking decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkDecision {
    /// Link to (account, phase) and queue the account for evaluation.
    Link { account_id: Uuid, phase_id: Uuid },
    /// Account already failed: link for historical display only, phase left
    /// unset, no evaluation.
    LinkHistoryOnly { account_id: Uuid },
    /// Do not link; record the reason.
    Reject { error: String },
}

/// Decide what to do with one unlinked trade.
///
/// `phase2_broker_id` is the broker account id recorded by a transition into
/// the active phase, when that phase is PHASE_2; linking is blocked until
/// provisioning has assigned one — guessing an account id here would
/// attribute trades to the wrong broker account.
pub fn resolve_link(
    trade: &Trade,
    account: Option<&Account>,
    active_phase: Option<&AccountPhase>,
    phase2_broker_id: Option<&str>,
) -> LinkDecision {
    let Some(account) = account else {
        return LinkDecision::Reject {
            error: format!(
                "trade {}: no prop-firm account matches account number {}",
                trade.trade_id, trade.account_number
            ),
        };
    };

    if account.status == AccountStatus::Failed {
        return LinkDecision::LinkHistoryOnly {
            account_id: account.account_id,
        };
    }

    // A non-failed account with no active phase is inconsistent state; we
    // never silently create one.
    let Some(phase) = active_phase else {
        return LinkDecision::Reject {
            error: format!(
                "trade {}: account {} is {} but has no active phase",
                trade.trade_id,
                account.account_number,
                account.status.as_str()
            ),
        };
    };

    if phase.phase_type == PhaseType::Phase2 && phase2_broker_id.is_none() {
        return LinkDecision::Reject {
            error: format!(
                "trade {}: account {} is awaiting phase transition — no broker account id assigned for phase 2",
                trade.trade_id, account.account_number
            ),
        };
    }

    LinkDecision::Link {
        account_id: account.account_id,
        phase_id: phase.phase_id,
    }
}

/// Link a batch of trades and evaluate each affected account once.
///
/// Evaluation runs once per distinct account, not once per trade: several
/// same-day trades on one account produce a single recomputation and a
/// single breach check.
pub async fn link_trades_and_evaluate(
    pool: &PgPool,
    trades: &[Trade],
    user_id: Uuid,
) -> Result<LinkReport> {
    // Fatal: without the account list no per-trade work is possible.
    let accounts = prop_db::list_prop_accounts(pool, user_id)
        .await
        .context("load prop-firm account list")?;

    let mut report = LinkReport::default();
    let mut marked: BTreeSet<Uuid> = BTreeSet::new();

    for trade in trades {
        if trade.account_id.is_some() {
            // Already linked; the import collaborator deduplicates upstream.
            continue;
        }

        let account = accounts
            .iter()
            .find(|a| a.account_number == trade.account_number);

        let decision = match account {
            Some(a) if a.status != AccountStatus::Failed => {
                match load_link_context(pool, a).await {
                    Ok((phase, broker)) => {
                        resolve_link(trade, Some(a), phase.as_ref(), broker.as_deref())
                    }
                    Err(e) => {
                        report
                            .errors
                            .push(format!("trade {}: {:#}", trade.trade_id, e));
                        continue;
                    }
                }
            }
            _ => resolve_link(trade, account, None, None),
        };

        match decision {
            LinkDecision::Link {
                account_id,
                phase_id,
            } => match prop_db::link_trade(pool, trade.trade_id, account_id, Some(phase_id)).await
            {
                Ok(()) => {
                    report.linked_trades.push(trade.trade_id);
                    marked.insert(account_id);
                }
                Err(e) => report
                    .errors
                    .push(format!("trade {}: {:#}", trade.trade_id, e)),
            },
            LinkDecision::LinkHistoryOnly { account_id } => {
                match prop_db::link_trade(pool, trade.trade_id, account_id, None).await {
                    Ok(()) => report.linked_trades.push(trade.trade_id),
                    Err(e) => report
                        .errors
                        .push(format!("trade {}: {:#}", trade.trade_id, e)),
                }
            }
            LinkDecision::Reject { error: e } => report.errors.push(e),
        }
    }

    for account_id in marked {
        match evaluator::evaluate_account(pool, account_id).await {
            Ok(Some(update)) => report.status_updates.push(update),
            Ok(None) => {}
            Err(e) => {
                error!(%account_id, error = %format!("{:#}", e), "account evaluation failed");
                report
                    .errors
                    .push(format!("account {}: evaluation failed: {:#}", account_id, e));
            }
        }
    }

    info!(
        linked = report.linked_trades.len(),
        status_updates = report.status_updates.len(),
        errors = report.errors.len(),
        "trade linking batch complete"
    );
    Ok(report)
}

/// Active phase and, when it is PHASE_2, the assigned broker account id.
async fn load_link_context(
    pool: &PgPool,
    account: &Account,
) -> Result<(Option<AccountPhase>, Option<String>)> {
    let phase = prop_db::active_phase(pool, account.account_id).await?;
    let broker = match &phase {
        Some(p) if p.phase_type == PhaseType::Phase2 => {
            prop_db::broker_account_for_phase(pool, p.phase_id).await?
        }
        _ => None,
    };
    Ok((phase, broker))
}
