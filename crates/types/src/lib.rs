//! # Axiom Types
//!
//! Core data model shared by every component of the Axiom fact network:
//!
//! - [`Hash256`] - 64-hex SHA-256 digest used for fact and block identity
//! - [`Fact`] - an extracted objective statement with provenance
//! - [`Block`] - a sealed, signed batch of fact hashes chained to its parent
//! - [`PeerRecord`] / [`ValidatorRecord`] - network participant records
//!
//! Hashing is canonical: the digest input is compact JSON with
//! lexicographically ordered keys, so every node derives the same identity
//! for the same logical value.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod block;
pub mod fact;
pub mod hash;
pub mod peer;

pub use block::{Block, GENESIS_PROPOSER, MAX_BLOCK_FACTS};
pub use fact::{Fact, FactLink, FactStatus, RelationKind, SourceRecord};
pub use hash::{sha256_hex, Hash256, HASH_HEX_LEN};
pub use peer::{PeerRecord, ValidatorRecord};

use thiserror::Error;

/// Errors raised while constructing or checking core values.
#[derive(Debug, Error)]
pub enum Error {
    /// A hex hash string had the wrong length or invalid characters.
    #[error("invalid hash: {0}")]
    InvalidHash(String),

    /// A block failed a structural rule.
    #[error("invalid block: {0}")]
    InvalidBlock(String),

    /// A fact failed a structural rule.
    #[error("invalid fact: {0}")]
    InvalidFact(String),
}

/// Result type for core value operations.
pub type Result<T> = std::result::Result<T, Error>;
