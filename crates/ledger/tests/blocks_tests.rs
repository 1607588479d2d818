//! End-to-end tests for the block pipeline: propose, sign, validate,
//! commit, and cross-node convergence at the ledger seam.

use axiom_crypto::NodeIdentity;
use axiom_ledger::{CommitOutcome, FactLedger, LedgerError};
use axiom_storage::LedgerDb;
use axiom_types::{Block, Fact, ValidatorRecord};
use serde_json::json;
use std::sync::{Arc, OnceLock};

fn identity() -> &'static NodeIdentity {
    static IDENTITY: OnceLock<NodeIdentity> = OnceLock::new();
    IDENTITY.get_or_init(|| NodeIdentity::generate().unwrap())
}

fn ledger_with_validator() -> FactLedger {
    let ledger = FactLedger::new(Arc::new(LedgerDb::open_in_memory().unwrap())).unwrap();
    ledger
        .db()
        .upsert_validator(&ValidatorRecord {
            fingerprint: identity().fingerprint().to_string(),
            pubkey: identity().public_key_pem().unwrap(),
            stake: 100,
        })
        .unwrap();
    ledger
}

fn trusted(ledger: &FactLedger, content: &str) -> Fact {
    ledger
        .ingest_fact(content, &json!({}), "alpha.example", 10)
        .unwrap();
    ledger
        .ingest_fact(content, &json!({}), "beta.example", 11)
        .unwrap()
        .fact
}

fn signed_proposal(ledger: &FactLedger, timestamp: u64) -> (Block, Vec<Fact>) {
    let (mut block, facts) = ledger
        .build_proposal(identity().fingerprint(), timestamp)
        .unwrap();
    block.signature = identity()
        .sign_hex(block.hash.to_hex().as_bytes())
        .unwrap();
    (block, facts)
}

#[test]
fn own_proposal_flows_through_validation_and_commit() {
    let ledger = ledger_with_validator();
    trusted(&ledger, "obsidian is volcanic glass");

    let mut commits = ledger.subscribe_commits();
    let (block, facts) = signed_proposal(&ledger, 60);
    assert_eq!(block.fact_hashes.len(), 1);

    ledger
        .validate_block(&block, Some(identity().fingerprint()))
        .unwrap();
    assert_eq!(
        ledger.commit_block(&block, &facts).unwrap(),
        CommitOutcome::Committed
    );
    assert_eq!(ledger.chain_height().unwrap(), 1);

    let event = commits.try_recv().unwrap();
    assert_eq!(event.height, 1);
    assert_eq!(event.hash, block.hash);

    // Committing the identical block again is a no-op.
    assert_eq!(
        ledger.commit_block(&block, &facts).unwrap(),
        CommitOutcome::AlreadyCommitted
    );
}

#[test]
fn empty_proposal_is_valid() {
    let ledger = ledger_with_validator();
    let (block, facts) = signed_proposal(&ledger, 60);
    assert!(facts.is_empty());
    ledger.validate_block(&block, None).unwrap();
    assert_eq!(
        ledger.commit_block(&block, &facts).unwrap(),
        CommitOutcome::Committed
    );
}

#[test]
fn remote_ledger_pulls_missing_facts_then_converges() {
    let proposer = ledger_with_validator();
    trusted(&proposer, "basalt is extrusive");
    let (block, facts) = signed_proposal(&proposer, 60);
    proposer.commit_block(&block, &facts).unwrap();

    let follower = ledger_with_validator();
    match follower.validate_block(&block, None) {
        Err(LedgerError::MissingFacts(missing)) => {
            assert_eq!(missing, block.fact_hashes);
            // The fact pull answered; revalidate and commit.
            follower.commit_block(&block, &facts).unwrap();
        }
        other => panic!("expected MissingFacts, got {other:?}"),
    }
    follower.validate_block(&block, None).unwrap();

    assert_eq!(follower.chain_height().unwrap(), proposer.chain_height().unwrap());
    assert_eq!(
        follower.db().tip().unwrap().hash,
        proposer.db().tip().unwrap().hash
    );
}

#[test]
fn tampered_block_is_rejected_structurally() {
    let ledger = ledger_with_validator();
    let (mut block, _) = signed_proposal(&ledger, 60);
    block.timestamp += 1; // hash no longer matches
    assert!(matches!(
        ledger.validate_block(&block, None),
        Err(LedgerError::Structure(_))
    ));
}

#[test]
fn forged_signature_is_rejected() {
    let ledger = ledger_with_validator();
    let (mut block, _) = signed_proposal(&ledger, 60);
    block.signature = "ab".repeat(256);
    assert!(matches!(
        ledger.validate_block(&block, None),
        Err(LedgerError::BadSignature)
    ));
}

#[test]
fn wrong_leader_is_rejected() {
    let ledger = ledger_with_validator();
    let (block, _) = signed_proposal(&ledger, 60);
    assert!(matches!(
        ledger.validate_block(&block, Some("someone-else")),
        Err(LedgerError::WrongLeader { .. })
    ));
}

#[test]
fn unknown_proposer_is_rejected() {
    let ledger = ledger_with_validator();
    let stranger = FactLedger::new(Arc::new(LedgerDb::open_in_memory().unwrap())).unwrap();
    // Proposal signed by a validator this ledger has never heard of.
    let (block, _) = signed_proposal(&stranger, 60);
    let bare = FactLedger::new(Arc::new(LedgerDb::open_in_memory().unwrap())).unwrap();
    assert!(matches!(
        bare.validate_block(&block, None),
        Err(LedgerError::UnknownValidator(_))
    ));
    drop(ledger);
}

#[test]
fn block_ahead_of_tip_requests_sync() {
    let ledger = ledger_with_validator();
    let (mut block, _) = signed_proposal(&ledger, 60);
    block.height = 5;
    block.hash = block.recompute_hash();
    block.signature = identity().sign_hex(block.hash.to_hex().as_bytes()).unwrap();
    assert!(matches!(
        ledger.validate_block(&block, None),
        Err(LedgerError::AheadOfChain { height: 5, tip: 0 })
    ));
}

#[test]
fn committed_loser_refuses_the_winner_without_rollback() {
    let ledger = ledger_with_validator();
    let (first, _) = signed_proposal(&ledger, 60);
    ledger.commit_block(&first, &[]).unwrap();

    // A competing block for the same height.
    let (mut rival, _) = signed_proposal(&ledger, 90);
    rival.height = 1;
    rival.previous_hash = Block::genesis().hash;
    rival.hash = rival.recompute_hash();
    rival.signature = identity().sign_hex(rival.hash.to_hex().as_bytes()).unwrap();

    assert_eq!(
        ledger.commit_block(&rival, &[]).unwrap(),
        CommitOutcome::RefusedConflict
    );
    assert_eq!(ledger.db().tip().unwrap().hash, first.hash);
}

#[test]
fn equivocation_guard_blocks_second_signature() {
    let ledger = ledger_with_validator();
    trusted(&ledger, "first payload");
    let (first, _) = signed_proposal(&ledger, 60);
    ledger.db().reserve_signed_height(first.height).unwrap();

    // Second proposal for the same height with a different fact set must
    // fail before any signature is produced.
    trusted(&ledger, "second payload");
    let (second, _) = ledger
        .build_proposal(identity().fingerprint(), 90)
        .unwrap();
    assert_eq!(second.height, first.height);
    assert!(ledger.db().reserve_signed_height(second.height).is_err());
}
