//! Leader rotation across a growing chain, exercised at the ledger seam.

use axiom_consensus::{select_leader, slot_for};
use axiom_crypto::NodeIdentity;
use axiom_ledger::{CommitOutcome, FactLedger};
use axiom_storage::LedgerDb;
use axiom_types::ValidatorRecord;
use std::collections::HashMap;
use std::sync::Arc;

fn ledger_with(validators: &[(&NodeIdentity, u64)]) -> FactLedger {
    let ledger = FactLedger::new(Arc::new(LedgerDb::open_in_memory().unwrap())).unwrap();
    for (identity, stake) in validators {
        ledger
            .db()
            .upsert_validator(&ValidatorRecord {
                fingerprint: identity.fingerprint().to_string(),
                pubkey: identity.public_key_pem().unwrap(),
                stake: *stake,
            })
            .unwrap();
    }
    ledger
}

#[test]
fn equal_stake_validators_share_proposals_and_stay_in_sync() {
    let alice = NodeIdentity::generate().unwrap();
    let bob = NodeIdentity::generate().unwrap();
    let stakes = [(&alice, 50u64), (&bob, 50u64)];

    let proposer_side = ledger_with(&stakes);
    let follower_side = ledger_with(&stakes);

    let mut proposed: HashMap<String, u32> = HashMap::new();
    let base_slot = 60_000;

    for offset in 0..30u64 {
        let slot = base_slot + offset;
        let tip = proposer_side.db().tip().unwrap();
        let validators = proposer_side.db().active_validators().unwrap();
        let leader = select_leader(&tip.hash, slot, &validators).unwrap().clone();
        *proposed.entry(leader.fingerprint.clone()).or_default() += 1;

        let identity: &NodeIdentity = if leader.fingerprint == alice.fingerprint() {
            &alice
        } else {
            &bob
        };

        let timestamp = slot * 30;
        assert_eq!(slot_for(timestamp), slot);
        let (mut block, facts) = proposer_side
            .build_proposal(&leader.fingerprint, timestamp)
            .unwrap();
        block.signature = identity.sign_hex(block.hash.to_hex().as_bytes()).unwrap();

        // Both sides run the identical pipeline and stay identical.
        for side in [&proposer_side, &follower_side] {
            side.validate_block(&block, Some(&leader.fingerprint))
                .unwrap();
            assert_eq!(
                side.commit_block(&block, &facts).unwrap(),
                CommitOutcome::Committed
            );
        }
        assert_eq!(
            proposer_side.db().tip().unwrap().hash,
            follower_side.db().tip().unwrap().hash
        );
    }

    assert_eq!(proposer_side.chain_height().unwrap(), 30);
    // With equal stake over 30 slots, both validators propose.
    let alice_count = *proposed.get(alice.fingerprint()).unwrap_or(&0);
    let bob_count = *proposed.get(bob.fingerprint()).unwrap_or(&0);
    assert!(alice_count >= 3, "alice led only {alice_count} of 30 slots");
    assert!(bob_count >= 3, "bob led only {bob_count} of 30 slots");
}

#[test]
fn sole_staker_leads_every_slot() {
    let solo = NodeIdentity::generate().unwrap();
    let observer = NodeIdentity::generate().unwrap();
    let ledger = ledger_with(&[(&solo, 100), (&observer, 0)]);

    let tip = ledger.db().tip().unwrap();
    let validators = ledger.db().active_validators().unwrap();
    for slot in 0..20 {
        assert_eq!(
            select_leader(&tip.hash, slot, &validators)
                .unwrap()
                .fingerprint,
            solo.fingerprint()
        );
    }
}
