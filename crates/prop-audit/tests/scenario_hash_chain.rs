//! Hash-chain scenarios: sealed chains verify, any edit or deletion breaks
//! the chain at the right position.

use prop_audit::{build_entry, verify_chain, AuditAction, AuditEntry, ChainVerdict};
use serde_json::json;
use uuid::Uuid;

fn chain_of(n: usize) -> Vec<AuditEntry> {
    let account_id = Some(Uuid::new_v4());
    let mut entries = Vec::with_capacity(n);
    let mut prev: Option<String> = None;
    for i in 0..n {
        let entry = build_entry(
            account_id,
            AuditAction::PhasePassed,
            json!({ "seq": i }),
            prev.clone(),
        )
        .unwrap();
        prev = entry.hash_self.clone();
        entries.push(entry);
    }
    entries
}

#[test]
fn sealed_chain_verifies() {
    let entries = chain_of(4);
    assert_eq!(
        verify_chain(&entries).unwrap(),
        ChainVerdict::Valid { entries: 4 }
    );
}

#[test]
fn empty_chain_is_valid() {
    assert_eq!(
        verify_chain(&[]).unwrap(),
        ChainVerdict::Valid { entries: 0 }
    );
}

/// Editing a persisted entry's details invalidates its own hash.
#[test]
fn tampered_details_break_at_the_edited_entry() {
    let mut entries = chain_of(3);
    entries[1].details = json!({ "seq": 1, "injected": true });

    match verify_chain(&entries).unwrap() {
        ChainVerdict::Broken { index, reason } => {
            assert_eq!(index, 1);
            assert!(reason.contains("hash_self"));
        }
        other => panic!("expected Broken, got {:?}", other),
    }
}

/// Deleting a middle entry breaks the link for its successor.
#[test]
fn deleted_entry_breaks_the_successor_link() {
    let mut entries = chain_of(3);
    entries.remove(1);

    match verify_chain(&entries).unwrap() {
        ChainVerdict::Broken { index, reason } => {
            assert_eq!(index, 1);
            assert!(reason.contains("hash_prev"));
        }
        other => panic!("expected Broken, got {:?}", other),
    }
}

/// Reordering two entries breaks the chain at the first misplaced row.
#[test]
fn reordered_entries_break_the_chain() {
    let mut entries = chain_of(3);
    entries.swap(1, 2);
    assert!(matches!(
        verify_chain(&entries).unwrap(),
        ChainVerdict::Broken { index: 1, .. }
    ));
}

/// The hash covers the canonical form, so key order in details is
/// irrelevant but values are not.
#[test]
fn hash_is_stable_under_key_order() {
    let prev = None;
    let a = build_entry(
        None,
        AuditAction::AccountFailed,
        json!({ "a": 1, "b": 2 }),
        prev,
    )
    .unwrap();

    let mut reordered = a.clone();
    reordered.details = json!({ "b": 2, "a": 1 });
    assert_eq!(
        prop_audit::compute_entry_hash(&a).unwrap(),
        prop_audit::compute_entry_hash(&reordered).unwrap()
    );

    let mut changed = a.clone();
    changed.details = json!({ "a": 1, "b": 3 });
    assert_ne!(
        prop_audit::compute_entry_hash(&a).unwrap(),
        prop_audit::compute_entry_hash(&changed).unwrap()
    );
}
