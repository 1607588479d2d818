//! # Axiom Ledger
//!
//! The fact lifecycle and its mapping to block contents:
//!
//! - [`FactLedger`] - ingest, corroborate, link and dispute facts; build
//!   proposal payloads; validate and commit blocks received from anywhere
//!   (a peer or this node's own proposer).
//! - [`PendingBlocks`] - holding buffer for blocks that arrive ahead of the
//!   local tip, drained after chain-sync.
//!
//! Commits are announced on a broadcast channel so the consensus loop can
//! reset its slot timer without polling storage.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod blocks;
pub mod facts;

pub use blocks::{CommitEvent, CommitOutcome, PendingBlocks};
pub use facts::IngestOutcome;

use axiom_storage::{LedgerDb, StorageError};
use axiom_types::Hash256;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;

/// Errors from ledger operations.
///
/// Validation failures carry enough context for the caller to choose the
/// right reaction: reputation penalty, fact pull, or chain sync.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Structural defect in a value (bad hash, unsorted payload, oversize).
    #[error(transparent)]
    Structure(#[from] axiom_types::Error),

    /// Backing store failed or refused the write.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The declared proposer is not a known active validator.
    #[error("unknown validator: {0}")]
    UnknownValidator(String),

    /// The proposer is not the leader expected for this slot.
    #[error("wrong leader: expected {expected}, block names {got}")]
    WrongLeader {
        /// Leader selected by the deterministic rule.
        expected: String,
        /// Proposer named by the block.
        got: String,
    },

    /// The block signature did not verify against the proposer's key.
    #[error("block signature invalid")]
    BadSignature,

    /// Fact hashes referenced by the block are not present locally; the
    /// caller should pull them from the sender and revalidate.
    #[error("{} facts missing locally", .0.len())]
    MissingFacts(Vec<Hash256>),

    /// A referenced fact is already sealed in an ancestor block.
    #[error("fact {0} already sealed")]
    FactAlreadySealed(Hash256),

    /// Block height is beyond `tip + 1`; hold it and chain-sync.
    #[error("block at height {height} is ahead of tip {tip}")]
    AheadOfChain {
        /// Height of the offered block.
        height: u64,
        /// Local tip height.
        tip: u64,
    },

    /// Block height is at or below the tip and does not match what was
    /// committed there.
    #[error("stale block at height {height} (tip {tip})")]
    Stale {
        /// Height of the offered block.
        height: u64,
        /// Local tip height.
        tip: u64,
    },

    /// The block does not link to the local tip's hash.
    #[error("previous_hash mismatch at height {height}")]
    BrokenLink {
        /// Height of the offered block.
        height: u64,
    },

    /// Ingested content was empty after trimming.
    #[error("empty fact content")]
    EmptyContent,
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Capacity of the commit-event broadcast channel.
const COMMIT_CHANNEL_CAPACITY: usize = 64;

/// The node's view of the fact ledger.
pub struct FactLedger {
    db: Arc<LedgerDb>,
    commit_tx: broadcast::Sender<CommitEvent>,
}

impl FactLedger {
    /// Wraps an opened store. Creates the genesis block if absent.
    pub fn new(db: Arc<LedgerDb>) -> Result<Self> {
        db.ensure_genesis()?;
        let (commit_tx, _) = broadcast::channel(COMMIT_CHANNEL_CAPACITY);
        Ok(Self { db, commit_tx })
    }

    /// Subscribe to block commit events.
    pub fn subscribe_commits(&self) -> broadcast::Receiver<CommitEvent> {
        self.commit_tx.subscribe()
    }

    /// The underlying store.
    pub fn db(&self) -> &Arc<LedgerDb> {
        &self.db
    }
}
