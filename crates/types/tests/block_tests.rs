//! Chain-shape tests for the block type.

use axiom_types::{Block, Fact, Hash256};

fn seal(height: u64, prev: &Block, facts: &[Hash256]) -> Block {
    Block::build(height, prev.hash, facts.to_vec(), "aa".repeat(32), 30 * height)
}

#[test]
fn chain_of_blocks_links_by_hash() {
    let genesis = Block::genesis();
    let f1 = Fact::compute_hash("a");
    let f2 = Fact::compute_hash("b");

    let b1 = seal(1, &genesis, &[f1]);
    let b2 = seal(2, &b1, &[f2]);

    assert_eq!(b1.previous_hash, genesis.hash);
    assert_eq!(b2.previous_hash, b1.hash);
    b1.validate_structure().unwrap();
    b2.validate_structure().unwrap();
}

#[test]
fn same_payload_different_parent_changes_hash() {
    let genesis = Block::genesis();
    let f1 = Fact::compute_hash("a");
    let b1 = seal(1, &genesis, &[f1]);
    let other_parent = seal(1, &b1, &[f1]);
    assert_ne!(b1.hash, other_parent.hash);
}

#[test]
fn empty_block_is_valid() {
    let genesis = Block::genesis();
    let empty = seal(1, &genesis, &[]);
    empty.validate_structure().unwrap();
    assert_eq!(empty.fact_count(), 0);
}

#[test]
fn conflict_winner_is_smaller_hash() {
    // Two valid blocks at the same height: the deterministic winner is the
    // lexicographically smaller hash.
    let genesis = Block::genesis();
    let f1 = Fact::compute_hash("a");
    let a = Block::build(1, genesis.hash, vec![f1], "aa".repeat(32), 30);
    let b = Block::build(1, genesis.hash, vec![], "bb".repeat(32), 31);
    let winner = if a.hash < b.hash { &a } else { &b };
    assert!(winner.hash <= a.hash && winner.hash <= b.hash);
}
