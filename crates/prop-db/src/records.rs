//! Append-only records: breaches, transitions, audit log.
//!
//! Rows in these tables are inserted once and never updated or deleted. The
//! audit log additionally carries a per-account hash chain (see prop-audit);
//! [`last_audit_hash`] fetches the chain tip inside the caller's transaction
//! so concurrent evaluations of different accounts never interleave chains.

use anyhow::{Context, Result};
use sqlx::postgres::PgRow;
use sqlx::{PgExecutor, Row};
use uuid::Uuid;

use prop_audit::AuditEntry;
use prop_schemas::{AccountStatus, AccountTransition, Breach, TransitionReason};

// ---------------------------------------------------------------------------
// Breaches
// ---------------------------------------------------------------------------

pub async fn insert_breach<'a>(ex: impl PgExecutor<'a>, breach: &Breach) -> Result<()> {
    sqlx::query(
        r#"
        insert into breaches (
          breach_id, account_id, phase_id, breach_type, limit_micros,
          breach_amount_micros, equity_micros, occurred_at
        ) values (
          $1, $2, $3, $4, $5, $6, $7, $8
        )
        "#,
    )
    .bind(breach.breach_id)
    .bind(breach.account_id)
    .bind(breach.phase_id)
    .bind(breach.breach_type.as_str())
    .bind(breach.limit_micros)
    .bind(breach.breach_amount_micros)
    .bind(breach.equity_micros)
    .bind(breach.occurred_at)
    .execute(ex)
    .await
    .context("insert_breach failed")?;
    Ok(())
}

/// Breach rows already on record for a phase. Any non-zero count permanently
/// blocks progression.
pub async fn count_breaches<'a>(ex: impl PgExecutor<'a>, phase_id: Uuid) -> Result<i64> {
    let (n,): (i64,) =
        sqlx::query_as::<_, (i64,)>("select count(*)::bigint from breaches where phase_id = $1")
            .bind(phase_id)
            .fetch_one(ex)
            .await
            .context("count_breaches failed")?;
    Ok(n)
}

// ---------------------------------------------------------------------------
// Transitions
// ---------------------------------------------------------------------------

fn transition_from_row(row: &PgRow) -> Result<AccountTransition> {
    Ok(AccountTransition {
        transition_id: row.try_get("transition_id")?,
        account_id: row.try_get("account_id")?,
        from_status: AccountStatus::parse(&row.try_get::<String, _>("from_status")?)?,
        to_status: AccountStatus::parse(&row.try_get::<String, _>("to_status")?)?,
        from_phase_id: row.try_get("from_phase_id")?,
        to_phase_id: row.try_get("to_phase_id")?,
        reason: TransitionReason::parse(&row.try_get::<String, _>("reason")?)?,
        metadata: row.try_get("metadata")?,
        occurred_at: row.try_get("occurred_at")?,
    })
}

pub async fn insert_transition<'a>(
    ex: impl PgExecutor<'a>,
    transition: &AccountTransition,
) -> Result<()> {
    sqlx::query(
        r#"
        insert into account_transitions (
          transition_id, account_id, from_status, to_status,
          from_phase_id, to_phase_id, reason, metadata, occurred_at
        ) values (
          $1, $2, $3, $4, $5, $6, $7, $8, $9
        )
        "#,
    )
    .bind(transition.transition_id)
    .bind(transition.account_id)
    .bind(transition.from_status.as_str())
    .bind(transition.to_status.as_str())
    .bind(transition.from_phase_id)
    .bind(transition.to_phase_id)
    .bind(transition.reason.as_str())
    .bind(&transition.metadata)
    .bind(transition.occurred_at)
    .execute(ex)
    .await
    .context("insert_transition failed")?;
    Ok(())
}

/// Full transition history for one account, oldest first. Feeds the
/// downstream history-timeline view.
pub async fn transitions_for_account<'a>(
    ex: impl PgExecutor<'a>,
    account_id: Uuid,
) -> Result<Vec<AccountTransition>> {
    let rows = sqlx::query(
        r#"
        select transition_id, account_id, from_status, to_status,
               from_phase_id, to_phase_id, reason, metadata, occurred_at
        from account_transitions
        where account_id = $1
        order by occurred_at, transition_id
        "#,
    )
    .bind(account_id)
    .fetch_all(ex)
    .await
    .context("transitions_for_account failed")?;

    rows.iter().map(transition_from_row).collect()
}

/// Broker account id recorded by any transition into the given phase, if one
/// has been assigned. The linker blocks Phase-2 trades until this resolves.
pub async fn broker_account_for_phase<'a>(
    ex: impl PgExecutor<'a>,
    phase_id: Uuid,
) -> Result<Option<String>> {
    let row = sqlx::query(
        r#"
        select metadata->>'new_broker_account_id' as broker_account_id
        from account_transitions
        where to_phase_id = $1
          and coalesce(metadata->>'new_broker_account_id', '') <> ''
        order by occurred_at desc, transition_id desc
        limit 1
        "#,
    )
    .bind(phase_id)
    .fetch_optional(ex)
    .await
    .context("broker_account_for_phase failed")?;

    Ok(row.and_then(|r| r.try_get("broker_account_id").ok()))
}

// ---------------------------------------------------------------------------
// Audit log
// ---------------------------------------------------------------------------

fn audit_from_row(row: &PgRow) -> Result<AuditEntry> {
    Ok(AuditEntry {
        entry_id: row.try_get("entry_id")?,
        account_id: row.try_get("account_id")?,
        action: row.try_get("action")?,
        details: row.try_get("details")?,
        hash_prev: row.try_get("hash_prev")?,
        hash_self: row.try_get("hash_self")?,
        ts_utc: row.try_get("ts_utc")?,
    })
}

/// Chain tip for one account's audit stream.
pub async fn last_audit_hash<'a>(
    ex: impl PgExecutor<'a>,
    account_id: Uuid,
) -> Result<Option<String>> {
    let row = sqlx::query(
        r#"
        select hash_self from audit_log
        where account_id = $1
        order by seq desc
        limit 1
        "#,
    )
    .bind(account_id)
    .fetch_optional(ex)
    .await
    .context("last_audit_hash failed")?;

    Ok(row.and_then(|r| r.try_get("hash_self").ok()))
}

pub async fn insert_audit_entry<'a>(ex: impl PgExecutor<'a>, entry: &AuditEntry) -> Result<()> {
    sqlx::query(
        r#"
        insert into audit_log (
          entry_id, account_id, action, details, hash_prev, hash_self, ts_utc
        ) values (
          $1, $2, $3, $4, $5, $6, $7
        )
        "#,
    )
    .bind(entry.entry_id)
    .bind(entry.account_id)
    .bind(&entry.action)
    .bind(&entry.details)
    .bind(&entry.hash_prev)
    .bind(&entry.hash_self)
    .bind(entry.ts_utc)
    .execute(ex)
    .await
    .context("insert_audit_entry failed")?;
    Ok(())
}

/// One account's audit stream in chain order, for verification.
pub async fn audit_entries_for_account<'a>(
    ex: impl PgExecutor<'a>,
    account_id: Uuid,
) -> Result<Vec<AuditEntry>> {
    let rows = sqlx::query(
        r#"
        select entry_id, account_id, action, details, hash_prev, hash_self, ts_utc
        from audit_log
        where account_id = $1
        order by seq
        "#,
    )
    .bind(account_id)
    .fetch_all(ex)
    .await
    .context("audit_entries_for_account failed")?;

    rows.iter().map(audit_from_row).collect()
}
