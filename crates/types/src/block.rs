//! Block type and canonical block hashing.
//!
//! A block seals a batch of facts: it carries the sorted list of their
//! hashes, links to the previous block, and is signed by its proposer.

use crate::hash::{Hash256, HASH_HEX_LEN};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;

/// Hard cap on facts per block; receivers reject larger blocks.
pub const MAX_BLOCK_FACTS: usize = 512;

/// Proposer name carried by the genesis block.
pub const GENESIS_PROPOSER: &str = "genesis";

/// A sealed batch of facts, chained to its predecessor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Position in the chain; genesis is 0.
    pub height: u64,
    /// Hash of this block, over the canonical fields below.
    pub hash: Hash256,
    /// Hash of the block at `height - 1`, or all zeros at genesis.
    pub previous_hash: Hash256,
    /// Hashes of the sealed facts, ascending lexicographic.
    pub fact_hashes: Vec<Hash256>,
    /// Fingerprint of the proposing validator's public key.
    pub proposer: String,
    /// UNIX seconds at proposal.
    pub timestamp: u64,
    /// Reserved counter, always present in the canonical encoding.
    pub nonce: u64,
    /// Proposer's signature over `hash`, hex encoded. All zeros at genesis.
    pub signature: String,
}

impl Block {
    /// Canonical block hash: SHA-256 over compact JSON with ordered keys of
    /// `{fact_hashes (ascending), height, nonce, previous_hash, proposer,
    /// timestamp}`.
    pub fn compute_hash(
        height: u64,
        previous_hash: &Hash256,
        fact_hashes: &[Hash256],
        proposer: &str,
        timestamp: u64,
        nonce: u64,
    ) -> Hash256 {
        let mut sorted: Vec<String> = fact_hashes.iter().map(Hash256::to_hex).collect();
        sorted.sort();
        let canonical = json!({
            "fact_hashes": sorted,
            "height": height,
            "nonce": nonce,
            "previous_hash": previous_hash.to_hex(),
            "proposer": proposer,
            "timestamp": timestamp,
        });
        Hash256::digest(canonical.to_string().as_bytes())
    }

    /// Builds an unsigned block, sorting the fact hashes and sealing the
    /// canonical hash. The caller signs `hash` afterwards.
    pub fn build(
        height: u64,
        previous_hash: Hash256,
        mut fact_hashes: Vec<Hash256>,
        proposer: String,
        timestamp: u64,
    ) -> Self {
        fact_hashes.sort();
        let hash = Self::compute_hash(height, &previous_hash, &fact_hashes, &proposer, timestamp, 0);
        Self {
            height,
            hash,
            previous_hash,
            fact_hashes,
            proposer,
            timestamp,
            nonce: 0,
            signature: String::new(),
        }
    }

    /// The well-known genesis block, identical on every node.
    pub fn genesis() -> Self {
        let mut block = Self::build(0, Hash256::ZERO, Vec::new(), GENESIS_PROPOSER.into(), 0);
        block.signature = "0".repeat(HASH_HEX_LEN);
        block
    }

    /// Checks whether this is the genesis block.
    pub fn is_genesis(&self) -> bool {
        self.height == 0 && self.previous_hash.is_zero() && self.proposer == GENESIS_PROPOSER
    }

    /// Recomputes the canonical hash from the block's fields.
    pub fn recompute_hash(&self) -> Hash256 {
        Self::compute_hash(
            self.height,
            &self.previous_hash,
            &self.fact_hashes,
            &self.proposer,
            self.timestamp,
            self.nonce,
        )
    }

    /// Structural validation, independent of chain state:
    /// declared hash matches the canonical hash, fact hashes are sorted
    /// ascending without duplicates, and the size cap holds.
    pub fn validate_structure(&self) -> Result<()> {
        if self.fact_hashes.len() > MAX_BLOCK_FACTS {
            return Err(Error::InvalidBlock(format!(
                "{} facts exceeds cap of {}",
                self.fact_hashes.len(),
                MAX_BLOCK_FACTS
            )));
        }
        for pair in self.fact_hashes.windows(2) {
            if pair[0] >= pair[1] {
                return Err(Error::InvalidBlock(
                    "fact hashes not strictly ascending".into(),
                ));
            }
        }
        if self.height > 0 && self.previous_hash.is_zero() {
            return Err(Error::InvalidBlock(
                "non-genesis block with zero previous hash".into(),
            ));
        }
        if self.proposer.is_empty() {
            return Err(Error::InvalidBlock("empty proposer".into()));
        }
        let expected = self.recompute_hash();
        if expected != self.hash {
            return Err(Error::InvalidBlock(format!(
                "declared hash {} does not match canonical hash {}",
                self.hash, expected
            )));
        }
        Ok(())
    }

    /// Number of facts sealed by this block.
    pub fn fact_count(&self) -> usize {
        self.fact_hashes.len()
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Block #{} ({}, {} facts, proposer {})",
            self.height,
            self.hash,
            self.fact_hashes.len(),
            self.proposer
        )
    }
}
