//! Daily anchor service.
//!
//! One equity snapshot per (account, civil day in the account timezone),
//! used as the zero-point for daily-drawdown math. Anchors are created
//! lazily on first use and by a scheduled batch job; creation is
//! insert-if-absent so concurrent callers cannot double-write a day.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgConnection, PgPool};
use tracing::{info, warn};
use uuid::Uuid;

use prop_schemas::Account;

/// Anchor lookup/creation with a caller-supplied seed equity. The evaluator
/// uses this inside its transaction so the anchor it reads is the one its
/// breach check is measured against.
pub async fn daily_start_balance_with_seed(
    conn: &mut PgConnection,
    account: &Account,
    seed_equity_micros: i64,
    now: DateTime<Utc>,
) -> Result<i64> {
    let date = prop_calendar::civil_date_string(now, &account.timezone)
        .with_context(|| format!("account {}", account.account_id))?;
    prop_db::get_or_create_daily_anchor(conn, account.account_id, &date, seed_equity_micros).await
}

/// Outcome of one scheduled anchor pass.
#[derive(Debug, Default)]
pub struct AnchorBatchReport {
    pub created: usize,
    pub skipped: usize,
    pub errors: Vec<String>,
}

/// Scheduled batch job: ensure today's anchor exists for every non-failed
/// prop-firm account, optionally scoped to one user. `force_date` pins the
/// civil date for every account regardless of timezone (backfill/testing);
/// otherwise each account's own timezone decides what "today" is.
pub async fn create_daily_anchors(
    pool: &PgPool,
    user_id: Option<Uuid>,
    force_date: Option<NaiveDate>,
) -> Result<AnchorBatchReport> {
    let accounts = prop_db::list_non_failed_prop_accounts(pool, user_id)
        .await
        .context("load accounts for anchor batch")?;

    let now = Utc::now();
    // Accounts arrive ordered by timezone; resolve each zone's civil date
    // once rather than per account.
    let mut date_by_tz: BTreeMap<String, String> = BTreeMap::new();

    let mut report = AnchorBatchReport::default();
    let mut conn = pool.acquire().await.context("acquire connection")?;

    for account in &accounts {
        let date = match force_date {
            Some(d) => prop_calendar::anchor_key(d),
            None => match date_by_tz.get(&account.timezone) {
                Some(d) => d.clone(),
                None => match prop_calendar::civil_date_string(now, &account.timezone) {
                    Ok(d) => {
                        date_by_tz.insert(account.timezone.clone(), d.clone());
                        d
                    }
                    Err(e) => {
                        warn!(account_id = %account.account_id, error = %e, "skipping account with bad timezone");
                        report
                            .errors
                            .push(format!("account {}: {:#}", account.account_id, e));
                        continue;
                    }
                },
            },
        };

        match ensure_anchor(&mut conn, account, &date).await {
            Ok(true) => report.created += 1,
            Ok(false) => report.skipped += 1,
            Err(e) => {
                warn!(account_id = %account.account_id, error = %format!("{:#}", e), "anchor creation failed");
                report
                    .errors
                    .push(format!("account {}: {:#}", account.account_id, e));
            }
        }
    }

    info!(
        created = report.created,
        skipped = report.skipped,
        errors = report.errors.len(),
        "daily anchor batch complete"
    );
    Ok(report)
}

/// Returns true if an anchor was created, false if the day already had one.
async fn ensure_anchor(conn: &mut PgConnection, account: &Account, date: &str) -> Result<bool> {
    if prop_db::anchor_exists(&mut *conn, account.account_id, date).await? {
        return Ok(false);
    }

    let seed = match prop_db::active_phase(&mut *conn, account.account_id).await? {
        Some(phase) => phase.current_equity_micros,
        None => account.starting_balance_micros,
    };
    prop_db::get_or_create_daily_anchor(conn, account.account_id, date, seed).await?;
    Ok(true)
}
