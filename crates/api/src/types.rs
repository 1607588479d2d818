//! Response and request DTOs.

use axiom_types::{Block, Fact, RelationKind};
use serde::{Deserialize, Serialize};

/// `GET /status`
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// Always `"ok"`.
    pub status: &'static str,
    /// Node software version.
    pub version: String,
    /// Local committed chain height.
    pub chain_height: u64,
    /// Live peer connections.
    pub peer_count: usize,
    /// Validator summary.
    pub validator: ValidatorSummary,
}

/// Validator block of the status response.
#[derive(Debug, Serialize)]
pub struct ValidatorSummary {
    /// Current stake.
    pub stake: u64,
    /// Whether stake is positive.
    pub is_validator: bool,
}

/// `GET /get_chain_height`
#[derive(Debug, Serialize)]
pub struct ChainHeightResponse {
    /// Always `"ok"`.
    pub status: &'static str,
    /// Local committed chain height.
    pub height: u64,
}

/// `GET /get_blocks?since=<h>`
#[derive(Debug, Serialize)]
pub struct BlocksResponse {
    /// Always `"ok"`.
    pub status: &'static str,
    /// Up to 100 blocks, ascending.
    pub blocks: Vec<Block>,
}

/// Query parameters of `GET /get_blocks`.
#[derive(Debug, Deserialize)]
pub struct SinceQuery {
    /// Exclusive lower height bound; defaults to 0.
    #[serde(default)]
    pub since: u64,
}

/// One row of `GET /get_peers`.
#[derive(Debug, Serialize)]
pub struct PeerSummary {
    /// Peer listen address.
    pub addr: String,
    /// Peer public key (PEM).
    pub pubkey: String,
    /// Behaviour score.
    pub reputation: i32,
    /// UNIX seconds last observed.
    pub last_seen: u64,
}

/// `GET /get_peers`
#[derive(Debug, Serialize)]
pub struct PeersResponse {
    /// Always `"ok"`.
    pub status: &'static str,
    /// Known peers.
    pub peers: Vec<PeerSummary>,
}

/// `GET /get_fact_ids`
#[derive(Debug, Serialize)]
pub struct FactIdsResponse {
    /// Always `"ok"`.
    pub status: &'static str,
    /// All local fact ids, ascending.
    pub ids: Vec<u64>,
}

/// Body of `POST /get_facts_by_id`.
#[derive(Debug, Deserialize)]
pub struct FactsByIdRequest {
    /// Requested ids; unknown ids are skipped.
    pub fact_ids: Vec<u64>,
}

/// `POST /get_facts_by_id`
#[derive(Debug, Serialize)]
pub struct FactsResponse {
    /// Always `"ok"`.
    pub status: &'static str,
    /// The resolved facts.
    pub facts: Vec<Fact>,
}

/// One neighbor in a fact-context reply.
#[derive(Debug, Serialize)]
pub struct RelatedFact {
    /// The relationship kind.
    pub relation: RelationKind,
    /// The neighboring fact.
    pub fact: Fact,
}

/// `GET /get_fact_context/{hash}`
#[derive(Debug, Serialize)]
pub struct FactContextResponse {
    /// Always `"ok"`.
    pub status: &'static str,
    /// The requested fact.
    pub target_fact: Fact,
    /// Its knowledge-graph neighborhood.
    pub related_facts: Vec<RelatedFact>,
}

/// Body of `POST /validator/stake`.
#[derive(Debug, Deserialize)]
pub struct StakeRequest {
    /// The new absolute stake for this node.
    pub stake_amount: u64,
}

/// `POST /validator/stake`
#[derive(Debug, Serialize)]
pub struct StakeResponse {
    /// Always `"ok"`.
    pub status: &'static str,
    /// Acknowledgement flag.
    pub ok: bool,
    /// The stake now registered for this node.
    pub total_stake: u64,
}

/// Body of `POST /chat`.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    /// Free-text query.
    pub query: String,
}

/// `POST /chat`
#[derive(Debug, Serialize)]
pub struct ChatResponse {
    /// Always `"ok"`.
    pub status: &'static str,
    /// Matching facts, best first.
    pub results: Vec<Fact>,
}

/// Generic acknowledgement.
#[derive(Debug, Serialize)]
pub struct OkResponse {
    /// Always `"ok"`.
    pub status: &'static str,
}
