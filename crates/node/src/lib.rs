//! # Axiom Node
//!
//! Runtime assembly of a complete node: storage, identity, the network
//! service, the consensus loop, the fact-intake seam and the HTTP surface,
//! all owned by one [`Node`] value constructed at startup and torn down on
//! shutdown after every task has joined.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod intake;
pub mod node;

pub use intake::{FactIntake, FactSubmission};
pub use node::Node;

/// Node software version, surfaced by `GET /status`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
