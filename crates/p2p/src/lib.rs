//! # Axiom P2P
//!
//! The peer-to-peer overlay: TLS-encrypted connections carrying
//! length-prefixed JSON frames.
//!
//! - [`wire`] - the frame codec and the closed message set
//! - [`peers`] - the peer table: reputation, blacklist, gossip selection
//! - [`dedup`] - broadcast duplicate suppression
//! - [`network`] - the [`NetworkService`] task and its cloneable
//!   [`NetworkHandle`]
//!
//! ## Architecture
//!
//! One acceptor task owns the listening socket; every live peer gets a
//! reader task and a writer task with a bounded outbound queue. The service
//! task multiplexes commands from handles, gossip/ping timers, and
//! connection lifecycle. Request/reply pairs are correlated by the frame's
//! 128-bit `id`.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod dedup;
pub mod network;
pub mod peers;
pub mod wire;

pub use network::{ChainSource, Command, NetworkEvent, NetworkHandle, NetworkService, PeerSnapshot};
pub use wire::{Envelope, HelloBody, Message};

use std::time::Duration;

/// Maximum simultaneous connections.
pub const MAX_PEERS: usize = 32;

/// Hard cap on a single frame, including the JSON payload.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Bound of the per-peer outbound queue; a full queue drops that peer's copy.
pub const OUTBOUND_QUEUE_FRAMES: usize = 256;

/// How often the node exchanges peer lists with a random active peer.
pub const PEER_GOSSIP_INTERVAL: Duration = Duration::from_secs(60);

/// Liveness probe cadence.
pub const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Default request/reply deadline.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Deadline for a fact pull during block validation.
pub const FACT_PULL_TIMEOUT: Duration = Duration::from_secs(30);

/// Deadline for a bulk block pull during catch-up.
pub const BLOCK_PULL_TIMEOUT: Duration = Duration::from_secs(60);

/// How long a misbehaving peer stays blacklisted.
pub const BLACKLIST_TTL: Duration = Duration::from_secs(3600);

/// Peers carried in a `PEER_LIST` reply.
pub const PEER_LIST_MAX: usize = 64;

/// Blocks carried in a `BLOCKS` reply.
pub const BLOCKS_REPLY_MAX: usize = 100;

use thiserror::Error;

/// Errors in the networking layer.
#[derive(Debug, Error)]
pub enum Error {
    /// Socket-level failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS setup or handshake failure.
    #[error("tls error: {0}")]
    Tls(String),

    /// Malformed frame: bad length prefix, invalid JSON, unknown type.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Frame above [`MAX_FRAME_LEN`]; dropped with the heavier penalty.
    #[error("frame of {0} bytes exceeds the {MAX_FRAME_LEN} byte limit")]
    FrameTooLarge(usize),

    /// The peer failed the `HELLO` exchange.
    #[error("handshake error: {0}")]
    Handshake(String),

    /// No live connection to the named peer.
    #[error("peer not connected: {0}")]
    PeerNotConnected(String),

    /// The expected reply did not arrive in time.
    #[error("request timed out")]
    Timeout,

    /// The service task is gone.
    #[error("network service unavailable")]
    ServiceClosed,
}

/// Result type for network operations.
pub type Result<T> = std::result::Result<T, Error>;
