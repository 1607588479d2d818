//! # Axiom Consensus
//!
//! Slotted, stake-weighted leader rotation with best-effort convergence:
//!
//! - [`leader`] - the deterministic leader-selection rule every node
//!   computes independently
//! - [`clock`] - the 30-second slot clock
//! - [`engine`] - the consensus loop: propose when leader, accept announced
//!   blocks through one validation pipeline, catch up when behind
//!
//! There is no vote exchange and no rollback; convergence relies on the
//! deterministic selector, the single-vote rule, and the smaller-hash
//! tie-break for same-height conflicts.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod clock;
pub mod engine;
pub mod leader;

pub use clock::{slot_for, SlotClock, SLOT_DURATION};
pub use engine::{ConsensusEngine, EngineHandle, EngineInput, EngineState, EngineStatus};
pub use leader::select_leader;

use thiserror::Error;

/// Errors from the consensus loop.
#[derive(Debug, Error)]
pub enum ConsensusError {
    /// No active validator is registered, so no leader exists.
    #[error("no active validators")]
    NoValidators,

    /// The single-vote rule refused a second signature for a height.
    #[error(transparent)]
    AlreadySigned(#[from] axiom_storage::StorageError),

    /// The ledger rejected a block or proposal.
    #[error(transparent)]
    Ledger(#[from] axiom_ledger::LedgerError),

    /// Identity or signature machinery failed.
    #[error(transparent)]
    Crypto(#[from] axiom_crypto::CryptoError),

    /// The network layer failed.
    #[error(transparent)]
    Network(#[from] axiom_p2p::Error),
}

/// Result type for consensus operations.
pub type Result<T> = std::result::Result<T, ConsensusError>;
