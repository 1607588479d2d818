//! The consensus loop.
//!
//! One engine task per node. Inputs: the slot tick, blocks forwarded from
//! the network, ledger commit events, and a shutdown signal. The engine
//! proposes when the deterministic rule names this node, routes every
//! received block (its own included) through the one validation pipeline,
//! and enters catch-up when the network advertises a taller chain.

use crate::clock::{slot_for, SlotClock};
use crate::leader::select_leader;
use crate::{ConsensusError, Result};
use axiom_crypto::NodeIdentity;
use axiom_ledger::{CommitEvent, CommitOutcome, FactLedger, LedgerError, PendingBlocks};
use axiom_p2p::peers::{REP_BAD_BLOCK, REP_FACT_PULL, REP_VALID_BLOCK};
use axiom_p2p::{Message, NetworkHandle};
use axiom_types::{Block, Fact, Hash256};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

/// How many blocks ahead of the tip are buffered while syncing.
const PENDING_CAPACITY: usize = 128;

/// Engine poll cadence.
const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// States of the consensus loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    /// Starting up.
    Init,
    /// Behind the network; proposal suspended while pulling blocks.
    Syncing,
    /// Caught up, watching the slot clock.
    Ready,
    /// Building and signing a proposal.
    Proposing,
    /// Proposal broadcast; waiting for its commit or slot expiry.
    Awaiting,
}

/// Shared snapshot of the loop, read by the HTTP surface.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    /// Current state.
    pub state: EngineState,
    /// Current slot number.
    pub slot: u64,
    /// Local committed chain height.
    pub chain_height: u64,
    /// Whether this node currently holds stake.
    pub is_validator: bool,
    /// The node's stake.
    pub stake: u64,
}

/// Inputs fed to the engine from outside.
#[derive(Debug)]
pub enum EngineInput {
    /// A block received from a peer.
    Block {
        /// Sender fingerprint.
        from: String,
        /// The block.
        block: Block,
    },
    /// Force a proposal attempt (debug surface).
    ForcePropose,
}

/// Cloneable sender half for feeding the engine.
#[derive(Clone)]
pub struct EngineHandle {
    input_tx: mpsc::Sender<EngineInput>,
}

impl EngineHandle {
    /// Forward a block announcement.
    pub async fn submit_block(&self, from: String, block: Block) {
        let _ = self.input_tx.send(EngineInput::Block { from, block }).await;
    }

    /// Force a proposal attempt.
    pub async fn force_propose(&self) {
        let _ = self.input_tx.send(EngineInput::ForcePropose).await;
    }
}

/// The consensus loop task.
pub struct ConsensusEngine {
    core: EngineCore,
    input_rx: mpsc::Receiver<EngineInput>,
    commit_rx: broadcast::Receiver<CommitEvent>,
    shutdown_rx: broadcast::Receiver<()>,
}

struct EngineCore {
    ledger: Arc<FactLedger>,
    identity: Arc<NodeIdentity>,
    network: NetworkHandle,
    clock: SlotClock,
    pending: PendingBlocks,
    status: Arc<Mutex<EngineStatus>>,
    /// Last slot a proposal was attempted in; one attempt per slot.
    attempted_slot: Option<u64>,
    /// Hash of our in-flight proposal, if any.
    awaiting: Option<(u64, Hash256)>,
}

impl ConsensusEngine {
    /// Builds the engine and its input handle.
    pub fn new(
        ledger: Arc<FactLedger>,
        identity: Arc<NodeIdentity>,
        network: NetworkHandle,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> (Self, EngineHandle) {
        let commit_rx = ledger.subscribe_commits();
        let (input_tx, input_rx) = mpsc::channel(256);
        let status = Arc::new(Mutex::new(EngineStatus {
            state: EngineState::Init,
            slot: 0,
            chain_height: 0,
            is_validator: false,
            stake: 0,
        }));
        let engine = Self {
            core: EngineCore {
                ledger,
                identity,
                network,
                clock: SlotClock,
                pending: PendingBlocks::new(PENDING_CAPACITY),
                status,
                attempted_slot: None,
                awaiting: None,
            },
            input_rx,
            commit_rx,
            shutdown_rx,
        };
        let handle = EngineHandle { input_tx };
        (engine, handle)
    }

    /// Shared status snapshot for the HTTP surface.
    pub fn status_handle(&self) -> Arc<Mutex<EngineStatus>> {
        self.core.status.clone()
    }

    /// Runs until shutdown.
    pub async fn run(self) -> Result<()> {
        let Self {
            mut core,
            mut input_rx,
            mut commit_rx,
            mut shutdown_rx,
        } = self;

        // Join the network before the first slot: pull whatever peers have.
        core.catch_up().await;
        core.set_state(EngineState::Ready);
        info!("consensus loop ready");

        let mut tick = tokio::time::interval(TICK_INTERVAL);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                input = input_rx.recv() => match input {
                    Some(EngineInput::Block { from, block }) => core.receive_block(&from, block).await,
                    Some(EngineInput::ForcePropose) => {
                        let now = core.clock.now();
                        if let Err(e) = core.propose(now, true).await {
                            warn!(error = %e, "forced proposal failed");
                            core.set_state(EngineState::Ready);
                        }
                    }
                    None => break,
                },
                event = commit_rx.recv() => {
                    if let Ok(event) = event {
                        core.on_commit(event).await;
                    }
                }
                _ = tick.tick() => core.on_tick().await,
            }
        }
        info!("consensus loop stopped");
        Ok(())
    }
}

impl EngineCore {
    fn fingerprint(&self) -> &str {
        self.identity.fingerprint()
    }

    fn set_state(&mut self, state: EngineState) {
        self.status.lock().state = state;
    }

    fn state(&self) -> EngineState {
        self.status.lock().state
    }

    fn refresh_status(&self, slot: u64) {
        let chain_height = self.ledger.chain_height().unwrap_or(0);
        let stake = self
            .ledger
            .db()
            .get_validator(self.fingerprint())
            .ok()
            .flatten()
            .map(|v| v.stake)
            .unwrap_or(0);
        let mut status = self.status.lock();
        status.slot = slot;
        status.chain_height = chain_height;
        status.stake = stake;
        status.is_validator = stake > 0;
    }

    async fn on_tick(&mut self) {
        let now = self.clock.now();
        let slot = slot_for(now);
        self.refresh_status(slot);

        // A node behind the network suspends proposal and pulls.
        if self.is_behind().await {
            self.catch_up().await;
            return;
        }

        match self.state() {
            EngineState::Ready => {
                if self.attempted_slot != Some(slot) {
                    self.attempted_slot = Some(slot);
                    if let Err(e) = self.propose(now, false).await {
                        match e {
                            ConsensusError::AlreadySigned(err) => {
                                warn!(error = %err, "single-vote rule refused proposal")
                            }
                            other => warn!(error = %other, "proposal attempt failed"),
                        }
                        self.set_state(EngineState::Ready);
                    }
                }
            }
            EngineState::Awaiting => {
                // Slot expired without our block committing: re-run the
                // selection next slot; absent leaders are skipped naturally.
                if let Some((proposed_slot, _)) = self.awaiting {
                    if slot > proposed_slot {
                        self.awaiting = None;
                        self.set_state(EngineState::Ready);
                    }
                }
            }
            _ => {}
        }
    }

    async fn is_behind(&self) -> bool {
        let local = self.ledger.chain_height().unwrap_or(0);
        let Ok(peers) = self.network.get_peers().await else {
            return false;
        };
        let network_max = peers
            .iter()
            .filter(|p| p.connected)
            .map(|p| p.chain_height)
            .max()
            .unwrap_or(0);
        local + 1 < network_max
    }

    /// Proposes for the slot containing `now` if this node is the leader
    /// (or unconditionally when `force`).
    async fn propose(&mut self, now: u64, force: bool) -> Result<()> {
        let slot = slot_for(now);
        let validators = self.ledger.db().active_validators()?;
        let tip = self.ledger.db().tip()?;

        if !force {
            let Some(leader) = select_leader(&tip.hash, slot, &validators) else {
                return Ok(()); // nobody staked, nothing to do
            };
            if leader.fingerprint != self.fingerprint() {
                return Ok(());
            }
        }

        self.set_state(EngineState::Proposing);
        let (mut block, facts) = self.ledger.build_proposal(self.fingerprint(), now)?;

        // Single-vote rule: the reservation is durable before any signature
        // leaves the signer.
        self.ledger.db().reserve_signed_height(block.height)?;
        block.signature = self.identity.sign_hex(block.hash.to_hex().as_bytes())?;

        info!(height = block.height, slot, facts = facts.len(), "proposing block");
        self.network
            .broadcast(Message::BlockAnnounce(block.clone()))
            .await?;
        self.awaiting = Some((slot, block.hash));
        self.set_state(EngineState::Awaiting);

        // Accept our own proposal through the same pipeline as a remote one.
        self.ledger.validate_block(&block, Some(self.fingerprint()))?;
        self.ledger.commit_block(&block, &facts)?;
        self.announce_height().await;
        Ok(())
    }

    /// Routes a block from the network through validation and commit.
    async fn receive_block(&mut self, from: &str, block: Block) {
        match self.apply_block(from, block.clone()).await {
            BlockDisposition::Applied => self.drain_pending(from).await,
            BlockDisposition::Ignored => {}
            BlockDisposition::Ahead => {
                debug!(height = block.height, "buffering block ahead of tip");
                self.pending.insert(block);
                self.catch_up().await;
            }
        }
    }

    /// Validates and commits one block; never recurses into catch-up.
    async fn apply_block(&mut self, from: &str, block: Block) -> BlockDisposition {
        let expected = self.expected_leader(&block);
        match self.ledger.validate_block(&block, expected.as_deref()) {
            Ok(()) => self.commit_applied(from, block, Vec::new()).await,
            Err(LedgerError::MissingFacts(hashes)) => {
                debug!(peer = from, missing = hashes.len(), "pulling facts for block");
                match self.network.request_facts(from, hashes).await {
                    Ok(facts) => {
                        let _ = self.network.adjust_reputation(from, REP_FACT_PULL).await;
                        // Revalidate with the bodies at hand.
                        match self.ledger.validate_block(&block, expected.as_deref()) {
                            Err(LedgerError::MissingFacts(_)) => {
                                self.commit_applied(from, block, facts).await
                            }
                            Ok(()) => self.commit_applied(from, block, facts).await,
                            Err(e) => {
                                self.reject(from, &block, &e).await;
                                BlockDisposition::Ignored
                            }
                        }
                    }
                    Err(e) => {
                        // Timeout penalty was applied by the transport.
                        warn!(peer = from, error = %e, "fact pull failed, rejecting block");
                        BlockDisposition::Ignored
                    }
                }
            }
            Err(LedgerError::AheadOfChain { .. }) => BlockDisposition::Ahead,
            Err(LedgerError::Stale { .. }) => BlockDisposition::Ignored,
            Err(e) => {
                self.reject(from, &block, &e).await;
                BlockDisposition::Ignored
            }
        }
    }

    async fn reject(&self, from: &str, block: &Block, error: &LedgerError) {
        warn!(peer = from, height = block.height, error = %error, "block rejected");
        let penalty = match error {
            LedgerError::Structure(_)
            | LedgerError::BadSignature
            | LedgerError::WrongLeader { .. }
            | LedgerError::UnknownValidator(_)
            | LedgerError::FactAlreadySealed(_) => REP_BAD_BLOCK,
            _ => 0,
        };
        if penalty != 0 && !from.is_empty() {
            let _ = self.network.adjust_reputation(from, penalty).await;
        }
    }

    async fn commit_applied(
        &mut self,
        from: &str,
        block: Block,
        facts: Vec<Fact>,
    ) -> BlockDisposition {
        match self.ledger.commit_block(&block, &facts) {
            Ok(CommitOutcome::Committed) => {
                if !from.is_empty() {
                    let _ = self.network.adjust_reputation(from, REP_VALID_BLOCK).await;
                    let _ = self
                        .network
                        .broadcast_except(from, Message::BlockAnnounce(block.clone()))
                        .await;
                }
                self.announce_height().await;
                BlockDisposition::Applied
            }
            Ok(CommitOutcome::AlreadyCommitted) => BlockDisposition::Ignored,
            Ok(CommitOutcome::RefusedConflict) => {
                // We committed the other branch first; no rollback.
                BlockDisposition::Ignored
            }
            Err(e) => {
                warn!(height = block.height, error = %e, "commit failed");
                BlockDisposition::Ignored
            }
        }
    }

    /// Applies buffered blocks that now extend the tip.
    async fn drain_pending(&mut self, from: &str) {
        loop {
            let next_height = self.ledger.chain_height().unwrap_or(0) + 1;
            let Some(block) = self.pending.take(next_height) else {
                break;
            };
            debug!(height = block.height, "applying buffered block");
            if matches!(
                self.apply_block(from, block).await,
                BlockDisposition::Ignored | BlockDisposition::Ahead
            ) {
                break;
            }
        }
    }

    /// Pulls blocks from the best-advertised peer until within one height
    /// of the network maximum. Proposal stays suspended meanwhile.
    async fn catch_up(&mut self) {
        let previous = self.state();
        self.set_state(EngineState::Syncing);

        loop {
            let Ok(peers) = self.network.get_peers().await else {
                break;
            };
            let Some(best) = peers
                .iter()
                .filter(|p| p.connected)
                .max_by_key(|p| p.chain_height)
                .map(|p| (p.fingerprint.clone(), p.chain_height))
            else {
                break;
            };
            let local = self.ledger.chain_height().unwrap_or(0);
            if local + 1 >= best.1 {
                break;
            }

            info!(peer = %best.0, local, remote = best.1, "catch-up: requesting blocks");
            match self.network.request_blocks(&best.0, local).await {
                Ok(blocks) if !blocks.is_empty() => {
                    for block in blocks {
                        if matches!(
                            self.apply_block(&best.0, block).await,
                            BlockDisposition::Ignored | BlockDisposition::Ahead
                        ) {
                            break;
                        }
                    }
                }
                Ok(_) => break,
                Err(e) => {
                    warn!(peer = %best.0, error = %e, "catch-up pull failed");
                    break;
                }
            }
        }

        self.drain_pending("").await;
        self.set_state(match previous {
            EngineState::Init => EngineState::Ready,
            EngineState::Syncing => EngineState::Ready,
            other => other,
        });
    }

    async fn on_commit(&mut self, event: CommitEvent) {
        self.pending.prune_through(event.height);
        if let Some((_, hash)) = self.awaiting {
            if hash == event.hash {
                self.awaiting = None;
                self.set_state(EngineState::Ready);
            }
        }
        self.refresh_status(self.clock.current_slot());
    }

    /// The leader the deterministic rule expects for a block's slot.
    fn expected_leader(&self, block: &Block) -> Option<String> {
        if block.is_genesis() {
            return None;
        }
        let validators = self.ledger.db().active_validators().ok()?;
        select_leader(
            &block.previous_hash,
            slot_for(block.timestamp),
            &validators,
        )
        .map(|v| v.fingerprint.clone())
    }

    async fn announce_height(&self) {
        let height = self.ledger.chain_height().unwrap_or(0);
        let stake = self
            .ledger
            .db()
            .get_validator(self.fingerprint())
            .ok()
            .flatten()
            .map(|v| v.stake)
            .unwrap_or(0);
        let _ = self.network.announce(height, stake).await;
    }
}

/// What the engine did with a received block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockDisposition {
    Applied,
    Ignored,
    Ahead,
}
