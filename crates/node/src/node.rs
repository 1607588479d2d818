//! The node runtime: construct every service, route events, shut down.

use crate::intake::{spawn_intake, FactIntake};
use crate::VERSION;
use anyhow::Context;
use axiom_api::{ApiContext, LocalContentSearch};
use axiom_config::Config;
use axiom_consensus::{ConsensusEngine, EngineHandle};
use axiom_crypto::{client_config, ensure_tls_material, server_config, NodeIdentity};
use axiom_ledger::FactLedger;
use axiom_p2p::{ChainSource, NetworkEvent, NetworkHandle, NetworkService};
use axiom_storage::LedgerDb;
use axiom_types::{Block, Fact, Hash256, PeerRecord, ValidatorRecord};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Deadline for tasks to exit after the shutdown signal.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Adapter giving the network service read access to chain data.
struct LedgerSource {
    db: Arc<LedgerDb>,
}

impl ChainSource for LedgerSource {
    fn chain_height(&self) -> u64 {
        self.db.chain_height().ok().flatten().unwrap_or(0)
    }

    fn blocks_since(&self, since: u64, limit: usize) -> Vec<Block> {
        self.db.blocks_since(since, limit).unwrap_or_default()
    }

    fn facts_by_hashes(&self, hashes: &[Hash256]) -> Vec<Fact> {
        self.db.facts_by_hashes(hashes).unwrap_or_default()
    }
}

/// A running node and the handles to its tasks.
pub struct Node {
    config: Config,
    db: Arc<LedgerDb>,
    ledger: Arc<FactLedger>,
    identity: Arc<NodeIdentity>,
    network: NetworkHandle,
    engine: EngineHandle,
    intake: FactIntake,
    shutdown_tx: broadcast::Sender<()>,
    tasks: Vec<JoinHandle<()>>,
}

impl Node {
    /// Brings up storage, identity, transport, consensus, ingestion and the
    /// HTTP surface. Fails fast on config, invariant or I/O problems.
    pub async fn start(config: Config) -> anyhow::Result<Self> {
        config.prepare_data_dir()?;

        let identity = Arc::new(if config.shared_keys {
            warn!("using the shared test keypair; never do this outside a test net");
            NodeIdentity::generate_shared()?
        } else {
            NodeIdentity::load_or_generate(config.identity_path())?
        });
        info!(fingerprint = %identity.fingerprint(), "node identity ready");

        let db = Arc::new(LedgerDb::open(&config.ledger_path())?);
        // A corrupt ledger must never be served from.
        db.check_invariants()?;
        let ledger = Arc::new(FactLedger::new(db.clone())?);

        let material = ensure_tls_material(&config.tls_dir())?;
        let tls_server = server_config(&material)?;
        let tls_client = client_config()?;

        let (shutdown_tx, _) = broadcast::channel(4);
        let (event_tx, event_rx) = mpsc::channel::<NetworkEvent>(256);

        let (network_service, network) = NetworkService::new(
            identity.clone(),
            Arc::new(LedgerSource { db: db.clone() }),
            tls_server,
            tls_client,
            config.p2p_addr(),
            config.p2p_addr(),
            event_tx,
        );

        let (engine, engine_handle) = ConsensusEngine::new(
            ledger.clone(),
            identity.clone(),
            network.clone(),
            shutdown_tx.subscribe(),
        );

        let (intake, intake_task) = spawn_intake(ledger.clone(), shutdown_tx.subscribe());

        let mut tasks = Vec::new();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = network_service.run().await {
                warn!(error = %e, "network service exited with error");
            }
        }));
        tasks.push(tokio::spawn(async move {
            if let Err(e) = engine.run().await {
                warn!(error = %e, "consensus engine exited with error");
            }
        }));
        tasks.push(intake_task);
        tasks.push(spawn_event_router(
            db.clone(),
            engine_handle.clone(),
            event_rx,
            shutdown_tx.subscribe(),
        ));

        let api_ctx = Arc::new(ApiContext {
            version: VERSION.to_string(),
            ledger: ledger.clone(),
            network: network.clone(),
            engine: engine_handle.clone(),
            identity: identity.clone(),
            search: Arc::new(LocalContentSearch::new(db.clone())),
            debug: config.debug,
        });
        let api_addr = config.api_addr();
        let api_shutdown = shutdown_tx.subscribe();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = axiom_api::serve(api_ctx, api_addr, api_shutdown).await {
                warn!(error = %e, "http api exited with error");
            }
        }));

        let node = Self {
            config,
            db,
            ledger,
            identity,
            network,
            engine: engine_handle,
            intake,
            shutdown_tx,
            tasks,
        };
        node.join_network().await;
        Ok(node)
    }

    /// Dials the bootstrap peers and advertises the local state.
    async fn join_network(&self) {
        for peer in &self.config.bootstrap_peers {
            info!(peer = %peer, "dialing bootstrap peer");
            let _ = self.network.connect(peer).await;
        }
        let height = self.ledger.chain_height().unwrap_or(0);
        let stake = self
            .db
            .get_validator(self.identity.fingerprint())
            .ok()
            .flatten()
            .map(|v| v.stake)
            .unwrap_or(0);
        let _ = self.network.announce(height, stake).await;
    }

    /// Handle for the fact-extraction collaborator.
    pub fn intake(&self) -> FactIntake {
        self.intake.clone()
    }

    /// Handle for the network service.
    pub fn network(&self) -> NetworkHandle {
        self.network.clone()
    }

    /// Handle for the consensus engine.
    pub fn engine(&self) -> EngineHandle {
        self.engine.clone()
    }

    /// This node's identity.
    pub fn identity(&self) -> &Arc<NodeIdentity> {
        &self.identity
    }

    /// The underlying ledger.
    pub fn ledger(&self) -> &Arc<FactLedger> {
        &self.ledger
    }

    /// Runs until interrupted, then shuts down gracefully.
    pub async fn run_until_signalled(mut self) -> anyhow::Result<()> {
        tokio::signal::ctrl_c()
            .await
            .context("waiting for shutdown signal")?;
        info!("shutdown signal received");
        self.shutdown().await;
        Ok(())
    }

    /// Cancels every task and waits up to the grace deadline.
    pub async fn shutdown(&mut self) {
        let _ = self.network.shutdown().await;
        let _ = self.shutdown_tx.send(());
        for task in self.tasks.drain(..) {
            if tokio::time::timeout(SHUTDOWN_GRACE, task).await.is_err() {
                warn!("task did not stop within the grace period, aborting");
            }
        }
        info!("node stopped");
    }
}

/// Routes network events into storage records and the consensus engine.
fn spawn_event_router(
    db: Arc<LedgerDb>,
    engine: EngineHandle,
    mut event_rx: mpsc::Receiver<NetworkEvent>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                event = event_rx.recv() => {
                    let Some(event) = event else { break };
                    route_event(&db, &engine, event).await;
                }
            }
        }
    })
}

async fn route_event(db: &Arc<LedgerDb>, engine: &EngineHandle, event: NetworkEvent) {
    match event {
        NetworkEvent::PeerSeen {
            fingerprint,
            listen_addr,
            pubkey,
            chain_height: _,
            stake,
        } => {
            let now = unix_now();
            let _ = db.upsert_peer(&PeerRecord::new(listen_addr, pubkey.clone(), now));
            // Validator records are learned from self-declared stakes; the
            // authority check still binds blocks to the selection rule.
            let _ = db.upsert_validator(&ValidatorRecord {
                fingerprint,
                pubkey,
                stake,
            });
        }
        NetworkEvent::PeerDisconnected { fingerprint } => {
            info!(peer = %fingerprint, "peer disconnected");
        }
        NetworkEvent::BlockAnnounce { from, block } => {
            engine.submit_block(from, block).await;
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
