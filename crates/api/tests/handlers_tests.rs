//! Handler tests against a real context: in-memory ledger, a live network
//! service on an ephemeral port, and an unstarted engine.

use axiom_api::types::{ChatRequest, FactsByIdRequest, SinceQuery, StakeRequest};
use axiom_api::{handlers, ApiContext, LocalContentSearch};
use axiom_consensus::ConsensusEngine;
use axiom_crypto::{client_config, ensure_tls_material, server_config, NodeIdentity};
use axiom_ledger::FactLedger;
use axiom_p2p::{ChainSource, NetworkService};
use axiom_storage::LedgerDb;
use axiom_types::{Block, Fact, Hash256, RelationKind};
use axum::extract::{Path, Query, State};
use axum::Json;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

struct LedgerSource(Arc<LedgerDb>);

impl ChainSource for LedgerSource {
    fn chain_height(&self) -> u64 {
        self.0.chain_height().ok().flatten().unwrap_or(0)
    }
    fn blocks_since(&self, since: u64, limit: usize) -> Vec<Block> {
        self.0.blocks_since(since, limit).unwrap_or_default()
    }
    fn facts_by_hashes(&self, hashes: &[Hash256]) -> Vec<Fact> {
        self.0.facts_by_hashes(hashes).unwrap_or_default()
    }
}

struct Harness {
    ctx: Arc<ApiContext>,
    // Held so the engine's input channel stays open.
    _engine: ConsensusEngine,
    _events: mpsc::Receiver<axiom_p2p::NetworkEvent>,
}

async fn harness(debug: bool) -> Harness {
    let tmp = tempfile::tempdir().unwrap();
    let identity = Arc::new(NodeIdentity::generate().unwrap());
    let db = Arc::new(LedgerDb::open_in_memory().unwrap());
    let ledger = Arc::new(FactLedger::new(db.clone()).unwrap());

    let material = ensure_tls_material(&tmp.path().join("tls")).unwrap();
    let (event_tx, events) = mpsc::channel(64);
    let (service, network) = NetworkService::new(
        identity.clone(),
        Arc::new(LedgerSource(db.clone())),
        server_config(&material).unwrap(),
        client_config().unwrap(),
        "127.0.0.1:0".to_string(),
        "127.0.0.1:0".to_string(),
        event_tx,
    );
    tokio::spawn(service.run());

    let (shutdown_tx, _) = broadcast::channel(1);
    let (engine, engine_handle) = ConsensusEngine::new(
        ledger.clone(),
        identity.clone(),
        network.clone(),
        shutdown_tx.subscribe(),
    );

    let ctx = Arc::new(ApiContext {
        version: "0.4.0-test".into(),
        ledger,
        network,
        engine: engine_handle,
        identity,
        search: Arc::new(LocalContentSearch::new(db)),
        debug,
    });
    Harness {
        ctx,
        _engine: engine,
        _events: events,
    }
}

fn trusted(ctx: &Arc<ApiContext>, content: &str) -> Fact {
    ctx.ledger
        .ingest_fact(content, &json!({}), "alpha.example", 1)
        .unwrap();
    ctx.ledger
        .ingest_fact(content, &json!({}), "beta.example", 2)
        .unwrap()
        .fact
}

#[tokio::test]
async fn status_reports_height_and_validator() {
    let h = harness(false).await;
    let Json(before) = handlers::status(State(h.ctx.clone())).await.unwrap();
    assert_eq!(before.status, "ok");
    assert_eq!(before.chain_height, 0);
    assert!(!before.validator.is_validator);

    handlers::set_stake(
        State(h.ctx.clone()),
        Json(StakeRequest { stake_amount: 100 }),
    )
    .await
    .unwrap();

    let Json(after) = handlers::status(State(h.ctx.clone())).await.unwrap();
    assert_eq!(after.validator.stake, 100);
    assert!(after.validator.is_validator);
}

#[tokio::test]
async fn chain_height_and_blocks_follow_the_ledger() {
    let h = harness(false).await;
    let Json(height) = handlers::get_chain_height(State(h.ctx.clone()))
        .await
        .unwrap();
    assert_eq!(height.height, 0);

    let Json(blocks) = handlers::get_blocks(
        State(h.ctx.clone()),
        Query(SinceQuery { since: 0 }),
    )
    .await
    .unwrap();
    assert!(blocks.blocks.is_empty());
}

#[tokio::test]
async fn fact_endpoints_round_trip() {
    let h = harness(false).await;
    let fact = trusted(&h.ctx, "the library opened in 1911");

    let Json(ids) = handlers::get_fact_ids(State(h.ctx.clone())).await.unwrap();
    assert_eq!(ids.ids, vec![fact.id]);

    let Json(facts) = handlers::get_facts_by_id(
        State(h.ctx.clone()),
        Json(FactsByIdRequest {
            fact_ids: vec![fact.id, 999],
        }),
    )
    .await
    .unwrap();
    assert_eq!(facts.facts.len(), 1);
    assert_eq!(facts.facts[0].hash, fact.hash);
    assert_eq!(facts.facts[0].score, 2);
}

#[tokio::test]
async fn fact_context_returns_neighbors_or_404() {
    let h = harness(false).await;
    let a = trusted(&h.ctx, "the bridge spans the river");
    let b = trusted(&h.ctx, "the bridge was rebuilt after the flood");
    h.ctx
        .ledger
        .insert_relationship(a.id, b.id, RelationKind::Elaboration)
        .unwrap();

    let Json(context) = handlers::get_fact_context(
        State(h.ctx.clone()),
        Path(a.hash.to_hex()),
    )
    .await
    .unwrap();
    assert_eq!(context.target_fact.id, a.id);
    assert_eq!(context.related_facts.len(), 1);
    assert_eq!(context.related_facts[0].fact.id, b.id);

    let missing = handlers::get_fact_context(
        State(h.ctx.clone()),
        Path(Hash256::digest(b"nope").to_hex()),
    )
    .await;
    assert!(matches!(missing, Err(axiom_api::ApiError::NotFound(_))));
}

#[tokio::test]
async fn chat_delegates_to_the_search_provider() {
    let h = harness(false).await;
    trusted(&h.ctx, "saturn has prominent rings");
    trusted(&h.ctx, "jupiter is the largest planet");

    let Json(reply) = handlers::chat(
        State(h.ctx.clone()),
        Json(ChatRequest {
            query: "saturn rings".into(),
        }),
    )
    .await
    .unwrap();
    assert_eq!(reply.results.len(), 1);
    assert!(reply.results[0].content.contains("saturn"));

    let empty = handlers::chat(
        State(h.ctx.clone()),
        Json(ChatRequest { query: "  ".into() }),
    )
    .await;
    assert!(matches!(empty, Err(axiom_api::ApiError::BadRequest(_))));
}

#[tokio::test]
async fn debug_proposal_is_gated() {
    let hidden = harness(false).await;
    let result = handlers::debug_propose_block(State(hidden.ctx.clone())).await;
    assert!(matches!(result, Err(axiom_api::ApiError::NotFound(_))));

    let exposed = harness(true).await;
    handlers::debug_propose_block(State(exposed.ctx.clone()))
        .await
        .unwrap();
}
