//! Append-only audit trail entries.
//!
//! Every status change, breach, and phase transition appends one entry.
//! Entries are hash-chained per account stream: each carries the sha-256 of
//! its own canonical JSON plus the previous entry's hash, so any mutation or
//! deletion of a persisted row is detectable with [`verify_chain`].
//! Persistence lives in prop-db; this crate only builds and verifies.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Actions recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditAction {
    AccountFailed,
    PhasePassed,
    AccountFunded,
    AccountReactivated,
    BrokerAccountAssigned,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::AccountFailed => "ACCOUNT_FAILED",
            AuditAction::PhasePassed => "PHASE_PASSED",
            AuditAction::AccountFunded => "ACCOUNT_FUNDED",
            AuditAction::AccountReactivated => "ACCOUNT_REACTIVATED",
            AuditAction::BrokerAccountAssigned => "BROKER_ACCOUNT_ASSIGNED",
        }
    }
}

/// One immutable audit entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub entry_id: Uuid,
    pub account_id: Option<Uuid>,
    pub action: String,
    pub details: Value,
    pub hash_prev: Option<String>,
    pub hash_self: Option<String>,
    pub ts_utc: DateTime<Utc>,
}

/// Build a sealed entry: `hash_prev` is the previous entry's `hash_self` in
/// this account's stream (None for the first entry), `hash_self` covers the
/// entry's canonical JSON.
pub fn build_entry(
    account_id: Option<Uuid>,
    action: AuditAction,
    details: Value,
    hash_prev: Option<String>,
) -> Result<AuditEntry> {
    let mut entry = AuditEntry {
        entry_id: Uuid::new_v4(),
        account_id,
        action: action.as_str().to_string(),
        details,
        hash_prev,
        hash_self: None,
        ts_utc: Utc::now(),
    };
    let hash = compute_entry_hash(&entry)?;
    entry.hash_self = Some(hash);
    Ok(entry)
}

/// Hash is computed over canonical JSON of the entry WITHOUT `hash_self`
/// (to avoid self-reference).
pub fn compute_entry_hash(entry: &AuditEntry) -> Result<String> {
    let mut clone = entry.clone();
    clone.hash_self = None;

    let canonical = canonical_json(&clone)?;
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Canonicalize by sorting keys recursively and emitting compact JSON.
fn canonical_json<T: Serialize>(v: &T) -> Result<String> {
    let raw = serde_json::to_value(v).context("serialize audit entry failed")?;
    let sorted = sort_keys(&raw);
    serde_json::to_string(&sorted).context("json stringify failed")
}

fn sort_keys(v: &Value) -> Value {
    match v {
        Value::Object(map) => {
            let mut keys: Vec<_> = map.keys().cloned().collect();
            keys.sort();
            let mut new = serde_json::Map::new();
            for k in keys {
                new.insert(k.clone(), sort_keys(&map[&k]));
            }
            Value::Object(new)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_keys).collect()),
        _ => v.clone(),
    }
}

/// Result of chain verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainVerdict {
    /// The entire chain is intact.
    Valid { entries: usize },
    /// The chain breaks at the given position (0-based).
    Broken { index: usize, reason: String },
}

/// Verify a loaded entry stream in storage order.
pub fn verify_chain(entries: &[AuditEntry]) -> Result<ChainVerdict> {
    let mut prev_hash: Option<String> = None;

    for (i, entry) in entries.iter().enumerate() {
        if entry.hash_prev != prev_hash {
            return Ok(ChainVerdict::Broken {
                index: i,
                reason: format!(
                    "hash_prev mismatch: expected {:?}, got {:?}",
                    prev_hash, entry.hash_prev
                ),
            });
        }

        if let Some(ref claimed) = entry.hash_self {
            let recomputed = compute_entry_hash(entry)?;
            if *claimed != recomputed {
                return Ok(ChainVerdict::Broken {
                    index: i,
                    reason: format!(
                        "hash_self mismatch: claimed {}, recomputed {}",
                        claimed, recomputed
                    ),
                });
            }
        }

        prev_hash = entry.hash_self.clone();
    }

    Ok(ChainVerdict::Valid {
        entries: entries.len(),
    })
}
