//! Endpoint handlers.
//!
//! Handlers are plain async functions over [`ApiContext`] state so tests
//! can call them directly with typed results.

use crate::server::ApiContext;
use crate::types::*;
use crate::{ApiError, ApiResult};
use axum::extract::{Path, Query, State};
use axum::Json;
use axiom_types::{Hash256, ValidatorRecord};
use std::sync::Arc;
use tracing::info;

const OK: &str = "ok";

/// `GET /status`
pub async fn status(State(ctx): State<Arc<ApiContext>>) -> ApiResult<Json<StatusResponse>> {
    let chain_height = ctx.ledger.chain_height()?;
    let peer_count = ctx
        .network
        .get_peers()
        .await
        .map(|peers| peers.iter().filter(|p| p.connected).count())
        .unwrap_or(0);
    let stake = ctx
        .ledger
        .db()
        .get_validator(ctx.identity.fingerprint())?
        .map(|v| v.stake)
        .unwrap_or(0);
    Ok(Json(StatusResponse {
        status: OK,
        version: ctx.version.clone(),
        chain_height,
        peer_count,
        validator: ValidatorSummary {
            stake,
            is_validator: stake > 0,
        },
    }))
}

/// `GET /get_chain_height`
pub async fn get_chain_height(
    State(ctx): State<Arc<ApiContext>>,
) -> ApiResult<Json<ChainHeightResponse>> {
    Ok(Json(ChainHeightResponse {
        status: OK,
        height: ctx.ledger.chain_height()?,
    }))
}

/// `GET /get_blocks?since=<h>`
pub async fn get_blocks(
    State(ctx): State<Arc<ApiContext>>,
    Query(query): Query<SinceQuery>,
) -> ApiResult<Json<BlocksResponse>> {
    let blocks = ctx
        .ledger
        .db()
        .blocks_since(query.since, axiom_p2p::BLOCKS_REPLY_MAX)?;
    Ok(Json(BlocksResponse { status: OK, blocks }))
}

/// `GET /get_peers`
pub async fn get_peers(State(ctx): State<Arc<ApiContext>>) -> ApiResult<Json<PeersResponse>> {
    let peers = ctx
        .network
        .get_peers()
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .into_iter()
        .map(|p| PeerSummary {
            addr: p.listen_addr,
            pubkey: p.pubkey,
            reputation: p.reputation,
            last_seen: p.last_seen,
        })
        .collect();
    Ok(Json(PeersResponse { status: OK, peers }))
}

/// `GET /get_fact_ids`
pub async fn get_fact_ids(State(ctx): State<Arc<ApiContext>>) -> ApiResult<Json<FactIdsResponse>> {
    Ok(Json(FactIdsResponse {
        status: OK,
        ids: ctx.ledger.db().list_fact_ids()?,
    }))
}

/// `POST /get_facts_by_id`
pub async fn get_facts_by_id(
    State(ctx): State<Arc<ApiContext>>,
    Json(request): Json<FactsByIdRequest>,
) -> ApiResult<Json<FactsResponse>> {
    Ok(Json(FactsResponse {
        status: OK,
        facts: ctx.ledger.db().facts_by_ids(&request.fact_ids)?,
    }))
}

/// `GET /get_fact_context/{hash}`
pub async fn get_fact_context(
    State(ctx): State<Arc<ApiContext>>,
    Path(hash): Path<String>,
) -> ApiResult<Json<FactContextResponse>> {
    let hash: Hash256 = hash
        .parse()
        .map_err(|_| ApiError::BadRequest("malformed fact hash".into()))?;
    let (target_fact, neighbors) = ctx
        .ledger
        .fact_context(&hash)?
        .ok_or_else(|| ApiError::NotFound(format!("fact {hash}")))?;
    let related_facts = neighbors
        .into_iter()
        .map(|(link, fact)| RelatedFact {
            relation: link.kind,
            fact,
        })
        .collect();
    Ok(Json(FactContextResponse {
        status: OK,
        target_fact,
        related_facts,
    }))
}

/// `POST /validator/stake`
pub async fn set_stake(
    State(ctx): State<Arc<ApiContext>>,
    Json(request): Json<StakeRequest>,
) -> ApiResult<Json<StakeResponse>> {
    let pubkey = ctx
        .identity
        .public_key_pem()
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    ctx.ledger.db().upsert_validator(&ValidatorRecord {
        fingerprint: ctx.identity.fingerprint().to_string(),
        pubkey,
        stake: request.stake_amount,
    })?;
    info!(stake = request.stake_amount, "validator stake updated");

    // Tell the network about the new stake right away.
    let height = ctx.ledger.chain_height()?;
    let _ = ctx.network.announce(height, request.stake_amount).await;

    Ok(Json(StakeResponse {
        status: OK,
        ok: true,
        total_stake: request.stake_amount,
    }))
}

/// `POST /chat` — delegates to the search collaborator.
pub async fn chat(
    State(ctx): State<Arc<ApiContext>>,
    Json(request): Json<ChatRequest>,
) -> ApiResult<Json<ChatResponse>> {
    if request.query.trim().is_empty() {
        return Err(ApiError::BadRequest("empty query".into()));
    }
    let results = ctx.search.search(&request.query, 20);
    Ok(Json(ChatResponse {
        status: OK,
        results,
    }))
}

/// `POST /debug/propose_block` — only with `AXIOM_DEBUG=true`.
pub async fn debug_propose_block(
    State(ctx): State<Arc<ApiContext>>,
) -> ApiResult<Json<OkResponse>> {
    if !ctx.debug {
        return Err(ApiError::NotFound("no such endpoint".into()));
    }
    ctx.engine.force_propose().await;
    Ok(Json(OkResponse { status: OK }))
}
