//! `prop` — operational CLI for the account evaluation engine.
//!
//! Batch entry points only: the daily-anchor job is meant to be invoked by
//! a cron-equivalent scheduler, `import` by the trade-import pipeline.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::fs;
use uuid::Uuid;

use prop_schemas::Trade;

#[derive(Parser)]
#[command(name = "prop")]
#[command(about = "Prop-firm account evaluation engine CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Daily anchor commands
    Anchors {
        #[command(subcommand)]
        cmd: AnchorsCmd,
    },

    /// Import normalized trades, link them, and evaluate affected accounts
    Import {
        /// Owning user id
        #[arg(long)]
        user: Uuid,

        /// JSON file of normalized trade records
        #[arg(long)]
        file: String,
    },

    /// Re-run evaluation for one account
    Evaluate {
        /// Account id
        #[arg(long)]
        account: Uuid,
    },

    /// Record the broker account id assigned at Phase-2 entry
    AssignBroker {
        /// Account id
        #[arg(long)]
        account: Uuid,

        /// Broker-side account id for the new phase
        #[arg(long)]
        broker_id: String,
    },

    /// Audit trail utilities
    Audit {
        #[command(subcommand)]
        cmd: AuditCmd,
    },

    /// Print an account's transition history
    History {
        /// Account id
        #[arg(long)]
        account: Uuid,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,

    /// Apply SQL migrations
    Migrate,
}

#[derive(Subcommand)]
enum AnchorsCmd {
    /// Ensure today's anchor exists for all non-failed prop-firm accounts
    Run {
        /// Restrict to one user
        #[arg(long)]
        user: Option<Uuid>,

        /// Pin the civil date (YYYY-MM-DD) instead of per-timezone today
        #[arg(long)]
        date: Option<NaiveDate>,
    },
}

#[derive(Subcommand)]
enum AuditCmd {
    /// Verify the hash chain of one account's audit stream
    Verify {
        /// Account id
        #[arg(long)]
        account: Uuid,
    },
}

/// Normalized trade record as produced by the external import pipeline.
#[derive(Debug, Deserialize)]
struct NormalizedTrade {
    id: Uuid,
    account_number: String,
    instrument: String,
    pnl_micros: i64,
    entry_time: DateTime<Utc>,
    exit_time: Option<DateTime<Utc>>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Dev-time .env.local bootstrap; missing file is fine.
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Commands::Db { cmd } => match cmd {
            DbCmd::Status => db_status().await,
            DbCmd::Migrate => db_migrate().await,
        },
        Commands::Anchors { cmd } => match cmd {
            AnchorsCmd::Run { user, date } => anchors_run(user, date).await,
        },
        Commands::Import { user, file } => import(user, &file).await,
        Commands::Evaluate { account } => evaluate(account).await,
        Commands::AssignBroker { account, broker_id } => assign_broker(account, &broker_id).await,
        Commands::Audit { cmd } => match cmd {
            AuditCmd::Verify { account } => audit_verify(account).await,
        },
        Commands::History { account } => history(account).await,
    }
}

async fn db_status() -> Result<()> {
    let pool = prop_db::connect_from_env().await?;
    let st = prop_db::status(&pool).await?;
    println!("ok={} has_accounts_table={}", st.ok, st.has_accounts_table);
    Ok(())
}

async fn db_migrate() -> Result<()> {
    let pool = prop_db::connect_from_env().await?;
    prop_db::migrate(&pool).await?;
    println!("migrations applied");
    Ok(())
}

async fn anchors_run(user: Option<Uuid>, date: Option<NaiveDate>) -> Result<()> {
    let pool = prop_db::connect_from_env().await?;
    let report = prop_engine::create_daily_anchors(&pool, user, date).await?;
    println!(
        "created={} skipped={} errors={}",
        report.created,
        report.skipped,
        report.errors.len()
    );
    for e in &report.errors {
        eprintln!("  error: {}", e);
    }
    Ok(())
}

async fn import(user_id: Uuid, file: &str) -> Result<()> {
    let raw = fs::read_to_string(file).with_context(|| format!("read {}", file))?;
    let records: Vec<NormalizedTrade> =
        serde_json::from_str(&raw).with_context(|| format!("parse {}", file))?;

    let pool = prop_db::connect_from_env().await?;

    let mut trades = Vec::with_capacity(records.len());
    for r in records {
        let trade = Trade {
            trade_id: r.id,
            user_id,
            account_number: r.account_number,
            instrument: r.instrument,
            pnl_micros: r.pnl_micros,
            entry_time: r.entry_time,
            exit_time: r.exit_time,
            account_id: None,
            phase_id: None,
        };
        prop_db::insert_trade(&pool, &trade)
            .await
            .with_context(|| format!("persist trade {}", trade.trade_id))?;
        trades.push(trade);
    }

    let report = prop_engine::link_trades_and_evaluate(&pool, &trades, user_id).await?;

    println!(
        "linked={} status_updates={} errors={}",
        report.linked_trades.len(),
        report.status_updates.len(),
        report.errors.len()
    );
    for u in &report.status_updates {
        println!(
            "  {} {} -> {} ({})",
            u.account_id,
            u.previous_status.as_str(),
            u.new_status.as_str(),
            u.reason.as_str()
        );
    }
    for e in &report.errors {
        eprintln!("  error: {}", e);
    }
    Ok(())
}

async fn evaluate(account_id: Uuid) -> Result<()> {
    let pool = prop_db::connect_from_env().await?;
    match prop_engine::evaluate_account(&pool, account_id).await? {
        Some(u) => println!(
            "{} {} -> {} ({})",
            u.account_id,
            u.previous_status.as_str(),
            u.new_status.as_str(),
            u.reason.as_str()
        ),
        None => println!("{} no status change", account_id),
    }
    Ok(())
}

async fn assign_broker(account_id: Uuid, broker_id: &str) -> Result<()> {
    let pool = prop_db::connect_from_env().await?;
    prop_engine::record_broker_account_assignment(&pool, account_id, broker_id).await?;
    println!("broker account {} assigned to {}", broker_id, account_id);
    Ok(())
}

async fn audit_verify(account_id: Uuid) -> Result<()> {
    let pool = prop_db::connect_from_env().await?;
    let entries = prop_db::audit_entries_for_account(&pool, account_id).await?;
    match prop_audit::verify_chain(&entries)? {
        prop_audit::ChainVerdict::Valid { entries } => {
            println!("chain valid ({} entries)", entries);
            Ok(())
        }
        prop_audit::ChainVerdict::Broken { index, reason } => {
            anyhow::bail!("chain broken at entry {}: {}", index, reason)
        }
    }
}

async fn history(account_id: Uuid) -> Result<()> {
    let pool = prop_db::connect_from_env().await?;
    let transitions = prop_db::transitions_for_account(&pool, account_id).await?;
    if transitions.is_empty() {
        println!("{} no transitions", account_id);
        return Ok(());
    }
    for t in &transitions {
        println!(
            "{} {} -> {} ({}) {}",
            t.occurred_at.format("%Y-%m-%d %H:%M:%S"),
            t.from_status.as_str(),
            t.to_status.as_str(),
            t.reason.as_str(),
            t.metadata
        );
    }
    Ok(())
}
