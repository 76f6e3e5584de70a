//! The single date-in-timezone utility.
//!
//! Every "today" decision in the engine goes through this crate: daily
//! anchors are keyed by the civil `YYYY-MM-DD` date in the *account's*
//! configured timezone, not UTC. An unknown zone is an error, never a
//! silent UTC fallback — a wrong day boundary corrupts daily-drawdown math.

use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;

/// Parse an IANA timezone name.
pub fn parse_timezone(tz: &str) -> Result<Tz> {
    tz.parse::<Tz>()
        .map_err(|_| anyhow!("unknown timezone: {}", tz))
}

/// Civil date of `instant` in the given timezone.
pub fn civil_date_in_tz(instant: DateTime<Utc>, tz: &str) -> Result<NaiveDate> {
    let zone = parse_timezone(tz)?;
    Ok(instant.with_timezone(&zone).date_naive())
}

/// Civil date of `instant` in the given timezone as a `YYYY-MM-DD` string
/// (the daily-anchor key format).
pub fn civil_date_string(instant: DateTime<Utc>, tz: &str) -> Result<String> {
    Ok(civil_date_in_tz(instant, tz)?.format("%Y-%m-%d").to_string())
}

/// Format a civil date as the anchor key.
pub fn anchor_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}
