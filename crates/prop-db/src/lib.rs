//! Transactional Postgres store for the evaluation engine.
//!
//! Query functions are generic over `PgExecutor` so the same function works
//! against the pool or inside a transaction; the evaluator runs every
//! account pass inside one transaction guarded by a per-account advisory
//! lock (see [`lock_account`]).

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgConnection, PgExecutor, PgPool, Row};
use uuid::Uuid;

use prop_schemas::{
    Account, AccountPhase, AccountStatus, DrawdownConfig, DrawdownLimit, EvaluationType,
    PhaseStatus, PhaseType, Trade,
};

mod records;

pub use records::{
    audit_entries_for_account, broker_account_for_phase, count_breaches, insert_audit_entry,
    insert_breach, insert_transition, last_audit_hash, transitions_for_account,
};

pub const ENV_DB_URL: &str = "PROP_DATABASE_URL";

/// Connect to Postgres using PROP_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url =
        std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&url)
        .await
        .context("failed to connect to Postgres")?;

    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

/// Simple status query (connectivity + schema presence).
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;
    let ok = one == 1;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema='public' and table_name='accounts'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok,
        has_accounts_table: exists,
    })
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_accounts_table: bool,
}

/// Serialize evaluation of one account: advisory lock scoped to the
/// surrounding transaction, keyed on the account id. Two near-simultaneous
/// imports of the same account queue here instead of both reading
/// "not yet failed".
pub async fn lock_account(conn: &mut PgConnection, account_id: Uuid) -> Result<()> {
    sqlx::query("select pg_advisory_xact_lock(hashtextextended($1::text, 0))")
        .bind(account_id)
        .execute(conn)
        .await
        .context("lock_account failed")?;
    Ok(())
}

/// Detect a Postgres unique constraint violation by name.
pub fn is_unique_constraint_violation(err: &sqlx::Error, constraint: &str) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.constraint() == Some(constraint),
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn limit_from_parts(kind: &str, value: i64) -> Result<DrawdownLimit> {
    match kind {
        "FIXED" => Ok(DrawdownLimit::Fixed {
            amount_micros: value,
        }),
        "PERCENT" => Ok(DrawdownLimit::PercentBps { bps: value }),
        other => Err(anyhow!("invalid drawdown limit kind: {}", other)),
    }
}

fn limit_parts(limit: &DrawdownLimit) -> (&'static str, i64) {
    match limit {
        DrawdownLimit::Fixed { amount_micros } => ("FIXED", *amount_micros),
        DrawdownLimit::PercentBps { bps } => ("PERCENT", *bps),
    }
}

fn account_from_row(row: &PgRow) -> Result<Account> {
    Ok(Account {
        account_id: row.try_get("account_id")?,
        user_id: row.try_get("user_id")?,
        account_number: row.try_get("account_number")?,
        prop_firm: row.try_get("prop_firm")?,
        starting_balance_micros: row.try_get("starting_balance_micros")?,
        timezone: row.try_get("timezone")?,
        evaluation_type: EvaluationType::parse(&row.try_get::<String, _>("evaluation_type")?)?,
        drawdown: DrawdownConfig {
            daily: limit_from_parts(
                &row.try_get::<String, _>("daily_dd_kind")?,
                row.try_get("daily_dd_value")?,
            )?,
            max: limit_from_parts(
                &row.try_get::<String, _>("max_dd_kind")?,
                row.try_get("max_dd_value")?,
            )?,
            trailing: row.try_get("max_dd_trailing")?,
        },
        status: AccountStatus::parse(&row.try_get::<String, _>("status")?)?,
        created_at: row.try_get("created_at")?,
    })
}

fn phase_from_row(row: &PgRow) -> Result<AccountPhase> {
    Ok(AccountPhase {
        phase_id: row.try_get("phase_id")?,
        account_id: row.try_get("account_id")?,
        phase_type: PhaseType::parse(&row.try_get::<String, _>("phase_type")?)?,
        status: PhaseStatus::parse(&row.try_get::<String, _>("status")?)?,
        profit_target_micros: row.try_get("profit_target_micros")?,
        starting_balance_micros: row.try_get("starting_balance_micros")?,
        current_balance_micros: row.try_get("current_balance_micros")?,
        current_equity_micros: row.try_get("current_equity_micros")?,
        highest_equity_micros: row.try_get("highest_equity_micros")?,
        net_profit_micros: row.try_get("net_profit_micros")?,
        started_at: row.try_get("started_at")?,
        ended_at: row.try_get("ended_at")?,
    })
}

fn trade_from_row(row: &PgRow) -> Result<Trade> {
    Ok(Trade {
        trade_id: row.try_get("trade_id")?,
        user_id: row.try_get("user_id")?,
        account_number: row.try_get("account_number")?,
        instrument: row.try_get("instrument")?,
        pnl_micros: row.try_get("pnl_micros")?,
        entry_time: row.try_get("entry_time")?,
        exit_time: row.try_get("exit_time")?,
        account_id: row.try_get("account_id")?,
        phase_id: row.try_get("phase_id")?,
    })
}

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

const ACCOUNT_COLUMNS: &str = r#"
    account_id, user_id, account_number, prop_firm, starting_balance_micros,
    timezone, evaluation_type, daily_dd_kind, daily_dd_value, max_dd_kind,
    max_dd_value, max_dd_trailing, status, created_at
"#;

pub async fn insert_account<'a>(ex: impl PgExecutor<'a>, account: &Account) -> Result<()> {
    let (daily_kind, daily_value) = limit_parts(&account.drawdown.daily);
    let (max_kind, max_value) = limit_parts(&account.drawdown.max);

    sqlx::query(
        r#"
        insert into accounts (
          account_id, user_id, account_number, prop_firm,
          starting_balance_micros, timezone, evaluation_type,
          daily_dd_kind, daily_dd_value, max_dd_kind, max_dd_value,
          max_dd_trailing, status, created_at
        ) values (
          $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14
        )
        "#,
    )
    .bind(account.account_id)
    .bind(account.user_id)
    .bind(&account.account_number)
    .bind(&account.prop_firm)
    .bind(account.starting_balance_micros)
    .bind(&account.timezone)
    .bind(account.evaluation_type.as_str())
    .bind(daily_kind)
    .bind(daily_value)
    .bind(max_kind)
    .bind(max_value)
    .bind(account.drawdown.trailing)
    .bind(account.status.as_str())
    .bind(account.created_at)
    .execute(ex)
    .await
    .context("insert_account failed")?;

    Ok(())
}

pub async fn fetch_account<'a>(ex: impl PgExecutor<'a>, account_id: Uuid) -> Result<Account> {
    let row = sqlx::query(&format!(
        "select {ACCOUNT_COLUMNS} from accounts where account_id = $1"
    ))
    .bind(account_id)
    .fetch_one(ex)
    .await
    .context("fetch_account failed")?;

    account_from_row(&row)
}

/// All of a user's prop-firm accounts (non-empty prop_firm designation).
pub async fn list_prop_accounts<'a>(ex: impl PgExecutor<'a>, user_id: Uuid) -> Result<Vec<Account>> {
    let rows = sqlx::query(&format!(
        r#"
        select {ACCOUNT_COLUMNS} from accounts
        where user_id = $1 and coalesce(prop_firm, '') <> ''
        order by created_at
        "#
    ))
    .bind(user_id)
    .fetch_all(ex)
    .await
    .context("list_prop_accounts failed")?;

    rows.iter().map(account_from_row).collect()
}

/// Non-FAILED prop-firm accounts, optionally scoped to one user. Used by the
/// daily-anchor batch job.
pub async fn list_non_failed_prop_accounts<'a>(
    ex: impl PgExecutor<'a>,
    user_id: Option<Uuid>,
) -> Result<Vec<Account>> {
    let rows = sqlx::query(&format!(
        r#"
        select {ACCOUNT_COLUMNS} from accounts
        where coalesce(prop_firm, '') <> ''
          and status <> 'FAILED'
          and ($1::uuid is null or user_id = $1)
        order by timezone, created_at
        "#
    ))
    .bind(user_id)
    .fetch_all(ex)
    .await
    .context("list_non_failed_prop_accounts failed")?;

    rows.iter().map(account_from_row).collect()
}

pub async fn update_account_status<'a>(
    ex: impl PgExecutor<'a>,
    account_id: Uuid,
    status: AccountStatus,
) -> Result<()> {
    sqlx::query("update accounts set status = $2 where account_id = $1")
        .bind(account_id)
        .bind(status.as_str())
        .execute(ex)
        .await
        .context("update_account_status failed")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Phases
// ---------------------------------------------------------------------------

const PHASE_COLUMNS: &str = r#"
    phase_id, account_id, phase_type, status, profit_target_micros,
    starting_balance_micros, current_balance_micros, current_equity_micros,
    highest_equity_micros, net_profit_micros, started_at, ended_at
"#;

/// Insert a phase row. The `uq_account_active_phase` partial index rejects a
/// second ACTIVE phase for the same account; that violation is surfaced with
/// its own message so callers see the invariant, not a bare SQL error.
pub async fn insert_phase<'a>(ex: impl PgExecutor<'a>, phase: &AccountPhase) -> Result<()> {
    let res = sqlx::query(
        r#"
        insert into account_phases (
          phase_id, account_id, phase_type, status, profit_target_micros,
          starting_balance_micros, current_balance_micros,
          current_equity_micros, highest_equity_micros, net_profit_micros,
          started_at, ended_at
        ) values (
          $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12
        )
        "#,
    )
    .bind(phase.phase_id)
    .bind(phase.account_id)
    .bind(phase.phase_type.as_str())
    .bind(phase.status.as_str())
    .bind(phase.profit_target_micros)
    .bind(phase.starting_balance_micros)
    .bind(phase.current_balance_micros)
    .bind(phase.current_equity_micros)
    .bind(phase.highest_equity_micros)
    .bind(phase.net_profit_micros)
    .bind(phase.started_at)
    .bind(phase.ended_at)
    .execute(ex)
    .await;

    match res {
        Ok(_) => Ok(()),
        Err(e) => {
            if is_unique_constraint_violation(&e, "uq_account_active_phase") {
                return Err(anyhow!(
                    "account {} already has an active phase",
                    phase.account_id
                ));
            }
            Err(anyhow::Error::new(e).context("insert_phase failed"))
        }
    }
}

/// The account's single ACTIVE phase, if any.
pub async fn active_phase<'a>(
    ex: impl PgExecutor<'a>,
    account_id: Uuid,
) -> Result<Option<AccountPhase>> {
    let row = sqlx::query(&format!(
        r#"
        select {PHASE_COLUMNS} from account_phases
        where account_id = $1 and status = 'ACTIVE'
        "#
    ))
    .bind(account_id)
    .fetch_optional(ex)
    .await
    .context("active_phase failed")?;

    row.as_ref().map(phase_from_row).transpose()
}

/// Refresh a phase's running metrics. Status and history fields are never
/// touched here.
pub async fn update_phase_metrics<'a>(
    ex: impl PgExecutor<'a>,
    phase_id: Uuid,
    metrics: &prop_metrics::PhaseMetrics,
) -> Result<()> {
    sqlx::query(
        r#"
        update account_phases
        set current_balance_micros = $2,
            current_equity_micros = $3,
            net_profit_micros = $4,
            highest_equity_micros = greatest(highest_equity_micros, $5)
        where phase_id = $1
        "#,
    )
    .bind(phase_id)
    .bind(metrics.current_balance_micros)
    .bind(metrics.current_equity_micros)
    .bind(metrics.net_profit_micros)
    .bind(metrics.high_water_mark_micros)
    .execute(ex)
    .await
    .context("update_phase_metrics failed")?;
    Ok(())
}

/// Terminate a phase in place (PASSED or FAILED) with an end timestamp.
/// Errors if the phase is not ACTIVE: a zero-row update here means the
/// caller is working from stale state, and committing the rest of its
/// transition would leave the account half-applied.
pub async fn end_phase<'a>(
    ex: impl PgExecutor<'a>,
    phase_id: Uuid,
    status: PhaseStatus,
    ended_at: DateTime<Utc>,
) -> Result<()> {
    let res = sqlx::query(
        r#"
        update account_phases
        set status = $2, ended_at = $3
        where phase_id = $1 and status = 'ACTIVE'
        "#,
    )
    .bind(phase_id)
    .bind(status.as_str())
    .bind(ended_at)
    .execute(ex)
    .await
    .context("end_phase failed")?;

    if res.rows_affected() != 1 {
        return Err(anyhow!("phase {} is not active", phase_id));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Trades
// ---------------------------------------------------------------------------

const TRADE_COLUMNS: &str = r#"
    trade_id, user_id, account_number, instrument, pnl_micros,
    entry_time, exit_time, account_id, phase_id
"#;

pub async fn insert_trade<'a>(ex: impl PgExecutor<'a>, trade: &Trade) -> Result<()> {
    sqlx::query(
        r#"
        insert into trades (
          trade_id, user_id, account_number, instrument, pnl_micros,
          entry_time, exit_time, account_id, phase_id
        ) values (
          $1, $2, $3, $4, $5, $6, $7, $8, $9
        )
        "#,
    )
    .bind(trade.trade_id)
    .bind(trade.user_id)
    .bind(&trade.account_number)
    .bind(&trade.instrument)
    .bind(trade.pnl_micros)
    .bind(trade.entry_time)
    .bind(trade.exit_time)
    .bind(trade.account_id)
    .bind(trade.phase_id)
    .execute(ex)
    .await
    .context("insert_trade failed")?;
    Ok(())
}

/// Trades not yet linked to any account, oldest first.
pub async fn unlinked_trades<'a>(ex: impl PgExecutor<'a>, user_id: Uuid) -> Result<Vec<Trade>> {
    let rows = sqlx::query(&format!(
        r#"
        select {TRADE_COLUMNS} from trades
        where user_id = $1 and account_id is null
        order by entry_time, trade_id
        "#
    ))
    .bind(user_id)
    .fetch_all(ex)
    .await
    .context("unlinked_trades failed")?;

    rows.iter().map(trade_from_row).collect()
}

/// Persist a trade link. `phase_id` is None for failed accounts: the trade
/// is kept for historical display only.
pub async fn link_trade<'a>(
    ex: impl PgExecutor<'a>,
    trade_id: Uuid,
    account_id: Uuid,
    phase_id: Option<Uuid>,
) -> Result<()> {
    sqlx::query(
        r#"
        update trades
        set account_id = $2, phase_id = $3, linked_at = now()
        where trade_id = $1
        "#,
    )
    .bind(trade_id)
    .bind(account_id)
    .bind(phase_id)
    .execute(ex)
    .await
    .context("link_trade failed")?;
    Ok(())
}

pub async fn trades_for_phase<'a>(ex: impl PgExecutor<'a>, phase_id: Uuid) -> Result<Vec<Trade>> {
    let rows = sqlx::query(&format!(
        "select {TRADE_COLUMNS} from trades where phase_id = $1"
    ))
    .bind(phase_id)
    .fetch_all(ex)
    .await
    .context("trades_for_phase failed")?;

    rows.iter().map(trade_from_row).collect()
}

// ---------------------------------------------------------------------------
// Daily anchors
// ---------------------------------------------------------------------------

/// True if the account already holds an anchor for the given civil date.
pub async fn anchor_exists<'a>(
    ex: impl PgExecutor<'a>,
    account_id: Uuid,
    anchor_date: &str,
) -> Result<bool> {
    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
          select 1 from daily_anchors
          where account_id = $1 and anchor_date = $2
        )
        "#,
    )
    .bind(account_id)
    .bind(anchor_date)
    .fetch_one(ex)
    .await
    .context("anchor_exists failed")?;
    Ok(exists)
}

/// Insert-if-absent, then read back. Idempotent under concurrent callers:
/// `uq_account_anchor_day` makes the insert a no-op for the loser, and both
/// return the first writer's equity. An existing anchor is never overwritten.
pub async fn get_or_create_daily_anchor(
    conn: &mut PgConnection,
    account_id: Uuid,
    anchor_date: &str,
    equity_micros: i64,
) -> Result<i64> {
    sqlx::query(
        r#"
        insert into daily_anchors (anchor_id, account_id, anchor_date, equity_micros)
        values ($1, $2, $3, $4)
        on conflict on constraint uq_account_anchor_day do nothing
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(account_id)
    .bind(anchor_date)
    .bind(equity_micros)
    .execute(&mut *conn)
    .await
    .context("daily anchor insert failed")?;

    let (equity,): (i64,) = sqlx::query_as::<_, (i64,)>(
        r#"
        select equity_micros from daily_anchors
        where account_id = $1 and anchor_date = $2
        "#,
    )
    .bind(account_id)
    .bind(anchor_date)
    .fetch_one(&mut *conn)
    .await
    .context("daily anchor read-back failed")?;

    Ok(equity)
}
