//! Frame codec and the closed message set.
//!
//! Every frame on the wire is `[4-byte big-endian length][JSON payload]`.
//! The payload is an [`Envelope`]: `{type, id, from, body}` where `type`
//! names a variant of [`Message`], `id` is a 128-bit correlation token and
//! `from` is the sender's public-key fingerprint. A frame above
//! [`crate::MAX_FRAME_LEN`] or with an unknown `type` is a protocol error.

use crate::{Error, Result, MAX_FRAME_LEN};
use axiom_types::{Block, Fact, Hash256};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Handshake body, also re-sent when a node's height or stake changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloBody {
    /// PEM-encoded public key; its fingerprint must equal `from`.
    pub pubkey: String,
    /// Address (`host:port`) this node accepts connections on.
    pub listen_addr: String,
    /// The sender's committed chain height.
    pub chain_height: u64,
    /// The sender's self-declared validator stake.
    #[serde(default)]
    pub stake: u64,
}

/// One entry of a `PEER_LIST` reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerEntry {
    /// Listen address of the peer.
    pub addr: String,
    /// PEM public key, possibly empty if never handshaken.
    pub pubkey: String,
    /// UNIX seconds the sharing node last saw this peer.
    pub last_seen: u64,
}

/// The closed message set of the overlay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body")]
pub enum Message {
    /// First frame after the TLS handshake.
    #[serde(rename = "HELLO")]
    Hello(HelloBody),
    /// Completes the handshake; the connection becomes active.
    #[serde(rename = "HELLO_ACK")]
    HelloAck(HelloBody),
    /// Ask for known peers.
    #[serde(rename = "PEER_REQUEST")]
    PeerRequest {},
    /// Up to 64 peers by descending reputation.
    #[serde(rename = "PEER_LIST")]
    PeerList {
        /// The shared peers.
        peers: Vec<PeerEntry>,
    },
    /// Flood-gossipped full block.
    #[serde(rename = "BLOCK_ANNOUNCE")]
    BlockAnnounce(Block),
    /// Ask for blocks with height greater than `since_height`.
    #[serde(rename = "REQUEST_BLOCKS")]
    RequestBlocks {
        /// Exclusive lower bound.
        since_height: u64,
    },
    /// Up to 100 blocks, ascending by height.
    #[serde(rename = "BLOCKS")]
    Blocks {
        /// The blocks.
        blocks: Vec<Block>,
    },
    /// Ask for specific facts by content hash.
    #[serde(rename = "REQUEST_FACTS")]
    RequestFacts {
        /// The wanted hashes.
        hashes: Vec<Hash256>,
    },
    /// Fact bodies for a `REQUEST_FACTS`.
    #[serde(rename = "FACTS")]
    Facts {
        /// The facts.
        facts: Vec<Fact>,
    },
    /// Liveness probe.
    #[serde(rename = "PING")]
    Ping {
        /// Sender's clock, UNIX seconds.
        ts: u64,
    },
    /// Liveness answer.
    #[serde(rename = "PONG")]
    Pong {
        /// Echoed clock value.
        ts: u64,
    },
}

impl Message {
    /// The wire name of this message's type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Message::Hello(_) => "HELLO",
            Message::HelloAck(_) => "HELLO_ACK",
            Message::PeerRequest {} => "PEER_REQUEST",
            Message::PeerList { .. } => "PEER_LIST",
            Message::BlockAnnounce(_) => "BLOCK_ANNOUNCE",
            Message::RequestBlocks { .. } => "REQUEST_BLOCKS",
            Message::Blocks { .. } => "BLOCKS",
            Message::RequestFacts { .. } => "REQUEST_FACTS",
            Message::Facts { .. } => "FACTS",
            Message::Ping { .. } => "PING",
            Message::Pong { .. } => "PONG",
        }
    }
}

/// A framed payload: correlation id, sender fingerprint, and the message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// 128-bit request identifier, hex. Replies echo the request's id.
    pub id: String,
    /// Sender's public-key fingerprint.
    pub from: String,
    /// The message itself (`type` + `body` on the wire).
    #[serde(flatten)]
    pub message: Message,
}

impl Envelope {
    /// Wraps a message in a fresh envelope.
    pub fn new(from: impl Into<String>, message: Message) -> Self {
        Self {
            id: new_message_id(),
            from: from.into(),
            message,
        }
    }

    /// Wraps a reply, echoing the request's correlation id.
    pub fn reply_to(request: &Envelope, from: impl Into<String>, message: Message) -> Self {
        Self {
            id: request.id.clone(),
            from: from.into(),
            message,
        }
    }
}

/// A random 128-bit correlation token, 32 hex characters.
pub fn new_message_id() -> String {
    format!("{:032x}", rand::random::<u128>())
}

/// Serializes an envelope into a length-prefixed frame.
pub fn encode_frame(envelope: &Envelope) -> Result<Vec<u8>> {
    let payload = serde_json::to_vec(envelope).map_err(|e| Error::Protocol(e.to_string()))?;
    if payload.len() > MAX_FRAME_LEN {
        return Err(Error::FrameTooLarge(payload.len()));
    }
    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Writes one frame to the stream.
pub async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, envelope: &Envelope) -> Result<()> {
    let frame = encode_frame(envelope)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one frame from the stream. Oversize or malformed payloads are
/// protocol errors; the caller drops the connection and applies the penalty.
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Envelope> {
    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes).await?;
    let len = u32::from_be_bytes(len_bytes) as usize;
    if len > MAX_FRAME_LEN {
        return Err(Error::FrameTooLarge(len));
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;
    decode_payload(&payload)
}

/// Parses a frame payload into an envelope.
pub fn decode_payload(payload: &[u8]) -> Result<Envelope> {
    serde_json::from_slice(payload).map_err(|e| Error::Protocol(e.to_string()))
}
