//! Block construction, validation and commit.

use crate::{FactLedger, LedgerError, Result};
use axiom_crypto::identity::verify_hex_with_pem;
use axiom_storage::AppendOutcome;
use axiom_types::{Block, Fact, Hash256, MAX_BLOCK_FACTS};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Emitted after every successful commit; consumed by the consensus loop.
#[derive(Debug, Clone)]
pub struct CommitEvent {
    /// Height of the committed block.
    pub height: u64,
    /// Hash of the committed block.
    pub hash: Hash256,
}

/// What a commit attempt did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The block is now part of the local chain.
    Committed,
    /// The identical block was already committed (idempotent).
    AlreadyCommitted,
    /// A different block at this height was committed first; the protocol
    /// performs no rollback, so this block is refused.
    RefusedConflict,
}

impl FactLedger {
    /// Builds the proposal payload for `height = tip + 1`: up to
    /// [`MAX_BLOCK_FACTS`] unsealed trusted facts, deterministic order, with
    /// the canonical hash sealed. The caller signs the result.
    pub fn build_proposal(&self, proposer: &str, timestamp: u64) -> Result<(Block, Vec<Fact>)> {
        let tip = self.db().tip()?;
        let facts = self.db().list_unsealed_trusted_facts(MAX_BLOCK_FACTS)?;
        let hashes: Vec<Hash256> = facts.iter().map(|f| f.hash).collect();
        let block = Block::build(tip.height + 1, tip.hash, hashes, proposer.into(), timestamp);
        info!(height = block.height, facts = facts.len(), "proposal payload built");
        Ok((block, facts))
    }

    /// Validates a block against local state.
    ///
    /// `expected_leader` is the fingerprint selected by the consensus rule
    /// for the block's slot; `None` skips the authority check (genesis,
    /// trusted test fixtures).
    ///
    /// The error variant tells the caller how to react:
    /// [`LedgerError::MissingFacts`] warrants a fact pull and a retry,
    /// [`LedgerError::AheadOfChain`] warrants buffering plus chain-sync,
    /// everything else is a rejection.
    pub fn validate_block(&self, block: &Block, expected_leader: Option<&str>) -> Result<()> {
        block.validate_structure()?;

        if block.is_genesis() {
            // Accepted only if absent locally; commit handles idempotence.
            return Ok(());
        }

        let tip = self.db().tip()?;
        if block.height > tip.height + 1 {
            return Err(LedgerError::AheadOfChain {
                height: block.height,
                tip: tip.height,
            });
        }
        if block.height <= tip.height {
            // Idempotent re-delivery of a committed block is fine.
            if let Some(existing) = self.db().get_block_by_height(block.height)? {
                if existing.hash == block.hash {
                    return Ok(());
                }
            }
            return Err(LedgerError::Stale {
                height: block.height,
                tip: tip.height,
            });
        }
        if block.previous_hash != tip.hash {
            return Err(LedgerError::BrokenLink {
                height: block.height,
            });
        }

        let validator = self
            .db()
            .get_validator(&block.proposer)?
            .filter(|v| v.is_active())
            .ok_or_else(|| LedgerError::UnknownValidator(block.proposer.clone()))?;

        if let Some(expected) = expected_leader {
            if expected != block.proposer {
                return Err(LedgerError::WrongLeader {
                    expected: expected.to_string(),
                    got: block.proposer.clone(),
                });
            }
        }

        verify_hex_with_pem(
            &validator.pubkey,
            block.hash.to_hex().as_bytes(),
            &block.signature,
        )
        .map_err(|_| LedgerError::BadSignature)?;

        let mut missing = Vec::new();
        for fact_hash in &block.fact_hashes {
            if let Some(height) = self.db().sealed_in(fact_hash)? {
                warn!(%fact_hash, height, "block references already-sealed fact");
                return Err(LedgerError::FactAlreadySealed(*fact_hash));
            }
            if self.db().get_fact_by_hash(fact_hash)?.is_none() {
                missing.push(*fact_hash);
            }
        }
        if !missing.is_empty() {
            return Err(LedgerError::MissingFacts(missing));
        }

        Ok(())
    }

    /// Commits a validated block. `facts` supplies any fact bodies that were
    /// pulled from the sender; facts already stored locally need not be
    /// repeated. Emits [`CommitEvent`] on success.
    pub fn commit_block(&self, block: &Block, facts: &[Fact]) -> Result<CommitOutcome> {
        match self.db().append_block(block, facts) {
            Ok(AppendOutcome::Inserted) => {
                info!(height = block.height, hash = %block.hash, "block committed");
                let _ = self.commit_tx.send(CommitEvent {
                    height: block.height,
                    hash: block.hash,
                });
                Ok(CommitOutcome::Committed)
            }
            Ok(AppendOutcome::AlreadyPresent) => Ok(CommitOutcome::AlreadyCommitted),
            Err(axiom_storage::StorageError::Conflict(reason)) => {
                warn!(height = block.height, %reason, "refusing conflicting block");
                Ok(CommitOutcome::RefusedConflict)
            }
            Err(other) => Err(other.into()),
        }
    }

    /// Local chain height (genesis guaranteed by construction).
    pub fn chain_height(&self) -> Result<u64> {
        Ok(self.db().chain_height()?.unwrap_or(0))
    }
}

/// Bounded holding buffer for blocks ahead of the local tip.
///
/// Keyed by height; a later arrival at the same height is ignored (the
/// deterministic conflict rule applies at commit time, not here).
pub struct PendingBlocks {
    inner: Mutex<BTreeMap<u64, Block>>,
    capacity: usize,
}

impl PendingBlocks {
    /// A buffer holding at most `capacity` blocks.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(BTreeMap::new()),
            capacity,
        }
    }

    /// Stores a block if there is room and none is held for its height.
    pub fn insert(&self, block: Block) -> bool {
        let mut inner = self.inner.lock();
        if inner.len() >= self.capacity && !inner.contains_key(&block.height) {
            return false;
        }
        inner.entry(block.height).or_insert(block);
        true
    }

    /// Removes and returns the block held for `height`, if any.
    pub fn take(&self, height: u64) -> Option<Block> {
        self.inner.lock().remove(&height)
    }

    /// Drops every held block at or below `height`.
    pub fn prune_through(&self, height: u64) {
        self.inner.lock().retain(|h, _| *h > height);
    }

    /// Number of held blocks.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}
