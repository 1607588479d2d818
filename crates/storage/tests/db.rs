//! Integration tests for the ledger database.

use axiom_storage::{AppendOutcome, LedgerDb, StorageError};
use axiom_types::{Block, Fact, PeerRecord, RelationKind, ValidatorRecord};
use serde_json::json;

fn db() -> LedgerDb {
    let db = LedgerDb::open_in_memory().unwrap();
    db.ensure_genesis().unwrap();
    db
}

fn trusted_fact(db: &LedgerDb, content: &str) -> Fact {
    let fact = db.insert_fact(content, &json!({}), 1_700_000_000).unwrap();
    db.attach_source(fact.id, "alpha.example", 1_700_000_000).unwrap();
    assert!(db.attach_source(fact.id, "beta.example", 1_700_000_001).unwrap());
    db.increment_score(fact.id).unwrap();
    db.get_fact_by_id(fact.id).unwrap().unwrap()
}

fn next_block(db: &LedgerDb, facts: &[Fact]) -> Block {
    let tip = db.tip().unwrap();
    let hashes = facts.iter().map(|f| f.hash).collect();
    Block::build(tip.height + 1, tip.hash, hashes, "aa".repeat(32), 100)
}

#[test]
fn genesis_is_created_once() {
    let db = db();
    assert_eq!(db.chain_height().unwrap(), Some(0));
    db.ensure_genesis().unwrap();
    assert_eq!(db.chain_height().unwrap(), Some(0));
    assert_eq!(db.tip().unwrap(), Block::genesis());
}

#[test]
fn append_block_is_atomic_and_idempotent() {
    let db = db();
    let fact = trusted_fact(&db, "iron is a metal");
    let block = next_block(&db, &[fact.clone()]);

    assert_eq!(db.append_block(&block, &[fact.clone()]).unwrap(), AppendOutcome::Inserted);
    // Same block again: success, no state change.
    assert_eq!(db.append_block(&block, &[fact.clone()]).unwrap(), AppendOutcome::AlreadyPresent);
    assert_eq!(db.chain_height().unwrap(), Some(1));
    assert_eq!(db.sealed_in(&fact.hash).unwrap(), Some(1));
}

#[test]
fn conflicting_block_at_same_height_is_refused() {
    let db = db();
    let block = next_block(&db, &[]);
    db.append_block(&block, &[]).unwrap();

    let tip = db.tip().unwrap();
    let mut other = Block::build(tip.height, Block::genesis().hash, vec![], "bb".repeat(32), 200);
    other.hash = other.recompute_hash();
    assert!(matches!(
        db.append_block(&other, &[]),
        Err(StorageError::Conflict(_))
    ));
}

#[test]
fn sealed_fact_cannot_be_sealed_twice() {
    let db = db();
    let fact = trusted_fact(&db, "water is wet");
    let b1 = next_block(&db, &[fact.clone()]);
    db.append_block(&b1, &[fact.clone()]).unwrap();

    let b2 = next_block(&db, &[fact.clone()]);
    assert!(matches!(
        db.append_block(&b2, &[fact.clone()]),
        Err(StorageError::Conflict(_))
    ));
}

#[test]
fn unsealed_trusted_selection_honors_lifecycle() {
    let db = db();
    let trusted = trusted_fact(&db, "helium is lighter than air");
    let ingested = db.insert_fact("unverified claim", &json!({}), 0).unwrap();
    let disputed = trusted_fact(&db, "contested claim");
    db.mark_disputed(disputed.id, trusted.id).unwrap();

    // Disputing links the pair; the undisputed partner was also flagged, so
    // only fresh trusted facts qualify.
    let fresh = trusted_fact(&db, "sound needs a medium");
    let selected = db.list_unsealed_trusted_facts(16).unwrap();
    let ids: Vec<u64> = selected.iter().map(|f| f.id).collect();
    assert!(ids.contains(&fresh.id));
    assert!(!ids.contains(&ingested.id));
    assert!(!ids.contains(&disputed.id));

    // Sealing removes a fact from the selection.
    let block = next_block(&db, &[fresh.clone()]);
    db.append_block(&block, &[fresh.clone()]).unwrap();
    let after: Vec<u64> = db
        .list_unsealed_trusted_facts(16)
        .unwrap()
        .iter()
        .map(|f| f.id)
        .collect();
    assert!(!after.contains(&fresh.id));
}

#[test]
fn corroboration_requires_new_domain() {
    let db = db();
    let fact = db.insert_fact("salt dissolves in water", &json!({}), 0).unwrap();
    assert!(db.attach_source(fact.id, "alpha.example", 1).unwrap());
    // Same domain again: no new corroboration.
    assert!(!db.attach_source(fact.id, "alpha.example", 2).unwrap());
    let stored = db.get_fact_by_id(fact.id).unwrap().unwrap();
    assert_eq!(stored.sources.len(), 1);
}

#[test]
fn dispute_is_permanent_and_linked() {
    let db = db();
    let a = trusted_fact(&db, "the meeting was on monday");
    let b = trusted_fact(&db, "the meeting was on tuesday");
    db.mark_disputed(a.id, b.id).unwrap();

    for id in [a.id, b.id] {
        let fact = db.get_fact_by_id(id).unwrap().unwrap();
        assert!(fact.disputed);
        assert!(!fact.is_trusted());
    }
    let links = db.links_of(a.id).unwrap();
    assert!(links.iter().any(|l| l.kind == RelationKind::Contrast && l.fact_b == b.id));
}

#[test]
fn knowledge_graph_round_trips_unknown_kinds() {
    let db = db();
    let a = db.insert_fact("a", &json!({}), 0).unwrap();
    let b = db.insert_fact("b", &json!({}), 0).unwrap();
    db.insert_link(a.id, b.id, &RelationKind::Other("refutation".into())).unwrap();
    let links = db.links_of(b.id).unwrap();
    assert_eq!(links.len(), 1);
    assert_eq!(links[0].kind, RelationKind::Other("refutation".into()));
}

#[test]
fn signing_guard_rejects_repeat_heights() {
    let db = db();
    db.reserve_signed_height(1).unwrap();
    assert!(matches!(
        db.reserve_signed_height(1),
        Err(StorageError::AlreadySigned { height: 1, last: 1 })
    ));
    db.reserve_signed_height(2).unwrap();
    assert_eq!(db.last_signed_height().unwrap(), Some(2));
    assert!(db.reserve_signed_height(1).is_err());
}

#[test]
fn peers_listed_by_reputation() {
    let db = db();
    for (addr, rep) in [("a:1", 50), ("b:1", 900), ("c:1", 10)] {
        let mut peer = PeerRecord::new(addr.into(), String::new(), 0);
        peer.reputation = rep;
        db.upsert_peer(&peer).unwrap();
    }
    let peers = db.list_peers(20, 10).unwrap();
    let addrs: Vec<&str> = peers.iter().map(|p| p.addr.as_str()).collect();
    assert_eq!(addrs, vec!["b:1", "a:1"]);
}

#[test]
fn validators_in_canonical_order() {
    let db = db();
    for (fp, stake) in [("cc", 5u64), ("aa", 10), ("bb", 0)] {
        db.upsert_validator(&ValidatorRecord {
            fingerprint: fp.into(),
            pubkey: String::new(),
            stake,
        })
        .unwrap();
    }
    let active = db.active_validators().unwrap();
    let fps: Vec<&str> = active.iter().map(|v| v.fingerprint.as_str()).collect();
    assert_eq!(fps, vec!["aa", "cc"]);
}

#[test]
fn invariant_check_detects_missing_fact() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.db");
    {
        let db = LedgerDb::open(&path).unwrap();
        db.ensure_genesis().unwrap();
        let fact = trusted_fact(&db, "to be deleted");
        let block = next_block(&db, &[fact.clone()]);
        db.append_block(&block, &[fact]).unwrap();
        db.check_invariants().unwrap();
    }
    // Corrupt the store out-of-band: drop the fact row the block references.
    {
        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute("DELETE FROM facts", []).unwrap();
    }
    let db = LedgerDb::open(&path).unwrap();
    assert!(matches!(
        db.check_invariants(),
        Err(StorageError::InvariantViolation(_))
    ));
}

#[test]
fn blocks_since_pages_in_order() {
    let db = db();
    for _ in 0..5 {
        let block = next_block(&db, &[]);
        db.append_block(&block, &[]).unwrap();
    }
    let blocks = db.blocks_since(1, 3).unwrap();
    let heights: Vec<u64> = blocks.iter().map(|b| b.height).collect();
    assert_eq!(heights, vec![2, 3, 4]);
}
