//! Router construction and the HTTP serving task.

use crate::handlers;
use crate::search::SearchProvider;
use axiom_consensus::EngineHandle;
use axiom_crypto::NodeIdentity;
use axiom_ledger::FactLedger;
use axiom_p2p::NetworkHandle;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

/// Everything the handlers reach for.
pub struct ApiContext {
    /// Node software version string.
    pub version: String,
    /// The ledger.
    pub ledger: Arc<FactLedger>,
    /// Network service handle.
    pub network: NetworkHandle,
    /// Consensus engine handle.
    pub engine: EngineHandle,
    /// This node's identity.
    pub identity: Arc<NodeIdentity>,
    /// The `/chat` collaborator.
    pub search: Arc<dyn SearchProvider>,
    /// Whether `/debug/*` endpoints exist.
    pub debug: bool,
}

/// Builds the router over a shared context.
pub fn build_router(ctx: Arc<ApiContext>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/status", get(handlers::status))
        .route("/get_chain_height", get(handlers::get_chain_height))
        .route("/get_blocks", get(handlers::get_blocks))
        .route("/get_peers", get(handlers::get_peers))
        .route("/get_fact_ids", get(handlers::get_fact_ids))
        .route("/get_facts_by_id", post(handlers::get_facts_by_id))
        .route("/get_fact_context/:hash", get(handlers::get_fact_context))
        .route("/validator/stake", post(handlers::set_stake))
        .route("/chat", post(handlers::chat))
        .route("/debug/propose_block", post(handlers::debug_propose_block))
        .layer(cors)
        .with_state(ctx)
}

/// Serves the API until the shutdown signal fires.
pub async fn serve(
    ctx: Arc<ApiContext>,
    bind_addr: String,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> std::io::Result<()> {
    let router = build_router(ctx);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "http api listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
        })
        .await
}
