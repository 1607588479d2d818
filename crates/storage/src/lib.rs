//! # Axiom Storage
//!
//! Durable, transactional store behind every node: facts, the knowledge
//! graph, sealed blocks, peers and validators live in a single SQLite file
//! (`ledger.db`).
//!
//! Concurrency discipline: all writes are serialized behind one mutex on the
//! connection; multi-row updates run inside a single transaction so a block,
//! its facts and their join rows land atomically or not at all. The startup
//! invariant check refuses to serve from a broken chain.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod db;

pub use db::{AppendOutcome, LedgerDb};

use thiserror::Error;

/// Storage error taxonomy.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backing database failed.
    #[error("database error: {0}")]
    Database(String),

    /// The requested row does not exist. Benign: surfaced as 404 over HTTP
    /// and as an empty reply over P2P.
    #[error("not found: {0}")]
    NotFound(String),

    /// The stored chain violates a structural invariant. Fatal: the process
    /// must exit with code 2 rather than hide a corrupt ledger.
    #[error("ledger invariant violation: {0}")]
    InvariantViolation(String),

    /// A second signature was requested for an already-reserved height.
    #[error("height {height} already signed (last signed: {last})")]
    AlreadySigned {
        /// The requested height.
        height: u64,
        /// The highest height a signature was issued for.
        last: u64,
    },

    /// A row conflicts with existing state (e.g. a different block at the
    /// same height).
    #[error("conflict: {0}")]
    Conflict(String),
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::QueryReturnedNoRows => StorageError::NotFound("no rows".into()),
            other => StorageError::Database(other.to_string()),
        }
    }
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
