//! The network service: acceptor, per-peer connection tasks, gossip.
//!
//! The [`NetworkService`] task owns the listener and the timers; every live
//! peer gets a reader task and a writer task joined by a bounded outbound
//! queue. Other components talk to the service through a cloneable
//! [`NetworkHandle`].

use crate::dedup::SeenCache;
use crate::peers::{PeerTable, REP_MALFORMED, REP_TIMEOUT};
use crate::wire::{read_frame, write_frame, Envelope, HelloBody, Message, PeerEntry};
use crate::{
    Error, Result, BLOCKS_REPLY_MAX, BLOCK_PULL_TIMEOUT, FACT_PULL_TIMEOUT, OUTBOUND_QUEUE_FRAMES,
    PEER_GOSSIP_INTERVAL, PING_INTERVAL, REQUEST_TIMEOUT,
};
use axiom_crypto::identity::fingerprint_of_pem;
use axiom_crypto::NodeIdentity;
use axiom_types::{Block, Fact, Hash256};
use parking_lot::Mutex;
use rustls::pki_types::ServerName;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot, Notify};
use tokio_rustls::{TlsAcceptor, TlsConnector};
use tracing::{debug, info, warn};

pub use crate::peers::PeerState as PeerSnapshot;

/// Read-only view of local chain data the service answers requests from.
///
/// Implemented by the node over its storage handle, keeping this crate free
/// of a storage dependency.
pub trait ChainSource: Send + Sync + 'static {
    /// Local committed chain height.
    fn chain_height(&self) -> u64;
    /// Blocks with height greater than `since`, ascending, up to `limit`.
    fn blocks_since(&self, since: u64, limit: usize) -> Vec<Block>;
    /// Locally known facts for the given hashes; unknown ones are skipped.
    fn facts_by_hashes(&self, hashes: &[Hash256]) -> Vec<Fact>;
}

/// Commands accepted by the service.
#[derive(Debug)]
pub enum Command {
    /// Send to every connected peer.
    Broadcast(Message),
    /// Send to every connected peer except one (gossip re-broadcast).
    BroadcastExcept {
        /// Fingerprint to skip.
        except: String,
        /// The message.
        message: Message,
    },
    /// Request/reply with a deadline.
    Request {
        /// Target fingerprint.
        peer: String,
        /// The request message.
        message: Message,
        /// Reply deadline.
        timeout: Duration,
        /// Fulfilled with the reply envelope or an error.
        reply: oneshot::Sender<Result<Envelope>>,
    },
    /// Dial a listen address.
    Connect(String),
    /// Snapshot the peer table.
    GetPeers(oneshot::Sender<Vec<PeerSnapshot>>),
    /// Update the advertised height/stake and re-HELLO all peers.
    Announce {
        /// New committed chain height.
        chain_height: u64,
        /// New validator stake.
        stake: u64,
    },
    /// Apply a reputation delta observed by a higher layer.
    AdjustReputation {
        /// Target fingerprint.
        peer: String,
        /// Signed delta.
        delta: i32,
    },
    /// Stop the service.
    Shutdown,
}

/// Events delivered to the node loop.
#[derive(Debug, Clone)]
pub enum NetworkEvent {
    /// A handshake completed, or a peer re-announced itself.
    PeerSeen {
        /// Peer fingerprint.
        fingerprint: String,
        /// Peer listen address.
        listen_addr: String,
        /// Peer public key (PEM).
        pubkey: String,
        /// Advertised chain height.
        chain_height: u64,
        /// Advertised stake.
        stake: u64,
    },
    /// A connection closed.
    PeerDisconnected {
        /// Peer fingerprint.
        fingerprint: String,
    },
    /// A not-seen-before block announcement.
    BlockAnnounce {
        /// Sender fingerprint.
        from: String,
        /// The announced block.
        block: Block,
    },
}

/// Cloneable handle for talking to the service.
#[derive(Clone)]
pub struct NetworkHandle {
    command_tx: mpsc::Sender<Command>,
}

impl NetworkHandle {
    /// Broadcast a message to all connected peers.
    pub async fn broadcast(&self, message: Message) -> Result<()> {
        self.send(Command::Broadcast(message)).await
    }

    /// Broadcast to all peers except `except`.
    pub async fn broadcast_except(&self, except: &str, message: Message) -> Result<()> {
        self.send(Command::BroadcastExcept {
            except: except.to_string(),
            message,
        })
        .await
    }

    /// Issue a request and await its reply.
    pub async fn request(
        &self,
        peer: &str,
        message: Message,
        timeout: Duration,
    ) -> Result<Envelope> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Request {
            peer: peer.to_string(),
            message,
            timeout,
            reply: tx,
        })
        .await?;
        rx.await.map_err(|_| Error::ServiceClosed)?
    }

    /// Pull blocks after `since` from a peer (60 s deadline).
    pub async fn request_blocks(&self, peer: &str, since: u64) -> Result<Vec<Block>> {
        let reply = self
            .request(
                peer,
                Message::RequestBlocks {
                    since_height: since,
                },
                BLOCK_PULL_TIMEOUT,
            )
            .await?;
        match reply.message {
            Message::Blocks { blocks } => Ok(blocks),
            other => Err(Error::Protocol(format!(
                "expected BLOCKS, got {}",
                other.type_name()
            ))),
        }
    }

    /// Pull fact bodies from a peer (30 s deadline).
    pub async fn request_facts(&self, peer: &str, hashes: Vec<Hash256>) -> Result<Vec<Fact>> {
        let reply = self
            .request(peer, Message::RequestFacts { hashes }, FACT_PULL_TIMEOUT)
            .await?;
        match reply.message {
            Message::Facts { facts } => Ok(facts),
            other => Err(Error::Protocol(format!(
                "expected FACTS, got {}",
                other.type_name()
            ))),
        }
    }

    /// Dial a peer address.
    pub async fn connect(&self, addr: &str) -> Result<()> {
        self.send(Command::Connect(addr.to_string())).await
    }

    /// Snapshot of the peer table.
    pub async fn get_peers(&self) -> Result<Vec<PeerSnapshot>> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::GetPeers(tx)).await?;
        rx.await.map_err(|_| Error::ServiceClosed)
    }

    /// Advertise a new chain height and stake to every peer.
    pub async fn announce(&self, chain_height: u64, stake: u64) -> Result<()> {
        self.send(Command::Announce {
            chain_height,
            stake,
        })
        .await
    }

    /// Apply a reputation delta for a peer.
    pub async fn adjust_reputation(&self, peer: &str, delta: i32) -> Result<()> {
        self.send(Command::AdjustReputation {
            peer: peer.to_string(),
            delta,
        })
        .await
    }

    /// Stop the service.
    pub async fn shutdown(&self) -> Result<()> {
        self.send(Command::Shutdown).await
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| Error::ServiceClosed)
    }
}

struct LocalInfo {
    listen_addr: String,
    chain_height: u64,
    stake: u64,
}

struct ConnHandle {
    outbound: mpsc::Sender<Envelope>,
    closed: Arc<Notify>,
}

struct Shared {
    identity: Arc<NodeIdentity>,
    table: PeerTable,
    dedup: SeenCache,
    source: Arc<dyn ChainSource>,
    event_tx: mpsc::Sender<NetworkEvent>,
    pending: Mutex<HashMap<String, oneshot::Sender<Envelope>>>,
    conns: Mutex<HashMap<String, ConnHandle>>,
    local: Mutex<LocalInfo>,
    connector: TlsConnector,
}

impl Shared {
    fn fingerprint(&self) -> String {
        self.identity.fingerprint().to_string()
    }

    fn local_hello(&self) -> HelloBody {
        let local = self.local.lock();
        HelloBody {
            pubkey: self
                .identity
                .public_key_pem()
                .unwrap_or_default(),
            listen_addr: local.listen_addr.clone(),
            chain_height: local.chain_height,
            stake: local.stake,
        }
    }

    /// Queue an envelope for one peer; a full queue drops this peer's copy.
    fn send_to(&self, fingerprint: &str, envelope: Envelope) -> Result<()> {
        let conns = self.conns.lock();
        let conn = conns
            .get(fingerprint)
            .ok_or_else(|| Error::PeerNotConnected(fingerprint.to_string()))?;
        if conn.outbound.try_send(envelope).is_err() {
            debug!(peer = fingerprint, "outbound queue full, dropping frame");
        }
        Ok(())
    }

    fn broadcast(&self, message: &Message, except: Option<&str>) {
        let from = self.fingerprint();
        let conns = self.conns.lock();
        for (fingerprint, conn) in conns.iter() {
            if Some(fingerprint.as_str()) == except {
                continue;
            }
            let envelope = Envelope::new(from.clone(), message.clone());
            if conn.outbound.try_send(envelope).is_err() {
                debug!(peer = %fingerprint, "outbound queue full, dropping broadcast");
            }
        }
    }

    /// Apply a delta; below zero the peer is blacklisted and disconnected.
    fn penalize(&self, fingerprint: &str, delta: i32) {
        if self.table.adjust_reputation(fingerprint, delta) {
            self.drop_connection(fingerprint);
        }
    }

    fn drop_connection(&self, fingerprint: &str) {
        if let Some(conn) = self.conns.lock().remove(fingerprint) {
            conn.closed.notify_one();
        }
    }

    async fn connection_closed(&self, fingerprint: &str) {
        self.conns.lock().remove(fingerprint);
        self.table.disconnected(fingerprint);
        let _ = self
            .event_tx
            .send(NetworkEvent::PeerDisconnected {
                fingerprint: fingerprint.to_string(),
            })
            .await;
    }

    /// Register a request, send it, and await the correlated reply.
    async fn send_request(
        &self,
        peer: &str,
        message: Message,
        timeout: Duration,
    ) -> Result<Envelope> {
        let envelope = Envelope::new(self.fingerprint(), message);
        let id = envelope.id.clone();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id.clone(), tx);

        if let Err(e) = self.send_to(peer, envelope) {
            self.pending.lock().remove(&id);
            return Err(e);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) => {
                self.pending.lock().remove(&id);
                Err(Error::ServiceClosed)
            }
            Err(_) => {
                self.pending.lock().remove(&id);
                self.penalize(peer, REP_TIMEOUT);
                Err(Error::Timeout)
            }
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// The network service task.
pub struct NetworkService {
    shared: Arc<Shared>,
    command_rx: mpsc::Receiver<Command>,
    bind_addr: String,
    acceptor: TlsAcceptor,
}

impl NetworkService {
    /// Builds the service. `bind_addr` is the socket to listen on;
    /// `advertised_addr` is what peers are told to dial back.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        identity: Arc<NodeIdentity>,
        source: Arc<dyn ChainSource>,
        server_config: Arc<rustls::ServerConfig>,
        client_config: Arc<rustls::ClientConfig>,
        bind_addr: String,
        advertised_addr: String,
        event_tx: mpsc::Sender<NetworkEvent>,
    ) -> (Self, NetworkHandle) {
        let (command_tx, command_rx) = mpsc::channel(256);
        let shared = Arc::new(Shared {
            identity,
            table: PeerTable::new(),
            dedup: SeenCache::with_defaults(),
            source,
            event_tx,
            pending: Mutex::new(HashMap::new()),
            conns: Mutex::new(HashMap::new()),
            local: Mutex::new(LocalInfo {
                listen_addr: advertised_addr,
                chain_height: 0,
                stake: 0,
            }),
            connector: TlsConnector::from(client_config),
        });
        let service = Self {
            shared,
            command_rx,
            bind_addr,
            acceptor: TlsAcceptor::from(server_config),
        };
        let handle = NetworkHandle { command_tx };
        (service, handle)
    }

    /// Runs until `Shutdown`.
    pub async fn run(mut self) -> Result<()> {
        let listener = TcpListener::bind(&self.bind_addr).await?;
        info!(addr = %self.bind_addr, "p2p listener started");

        let mut gossip = tokio::time::interval(PEER_GOSSIP_INTERVAL);
        gossip.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut ping = tokio::time::interval(PING_INTERVAL);
        ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((tcp, remote)) => {
                            if !self.shared.table.can_accept() {
                                debug!(%remote, "at peer capacity, refusing connection");
                                continue;
                            }
                            let shared = self.shared.clone();
                            let acceptor = self.acceptor.clone();
                            tokio::spawn(async move {
                                if let Err(e) = accept_connection(shared, acceptor, tcp).await {
                                    debug!(%remote, error = %e, "inbound connection failed");
                                }
                            });
                        }
                        Err(e) => warn!(error = %e, "accept failed"),
                    }
                }
                command = self.command_rx.recv() => {
                    match command {
                        Some(Command::Shutdown) | None => break,
                        Some(command) => self.handle_command(command),
                    }
                }
                _ = gossip.tick() => {
                    let shared = self.shared.clone();
                    tokio::spawn(async move { gossip_round(shared).await });
                }
                _ = ping.tick() => {
                    self.shared.table.expire_blacklist();
                    let shared = self.shared.clone();
                    tokio::spawn(async move { ping_round(shared).await });
                }
            }
        }

        // Graceful stop: wake every reader so queues flush and tasks exit.
        let fingerprints: Vec<String> = self.shared.conns.lock().keys().cloned().collect();
        for fingerprint in fingerprints {
            self.shared.drop_connection(&fingerprint);
        }
        info!("p2p service stopped");
        Ok(())
    }

    fn handle_command(&self, command: Command) {
        match command {
            Command::Broadcast(message) => self.shared.broadcast(&message, None),
            Command::BroadcastExcept { except, message } => {
                self.shared.broadcast(&message, Some(&except))
            }
            Command::Request {
                peer,
                message,
                timeout,
                reply,
            } => {
                let shared = self.shared.clone();
                tokio::spawn(async move {
                    let result = shared.send_request(&peer, message, timeout).await;
                    let _ = reply.send(result);
                });
            }
            Command::Connect(addr) => {
                let shared = self.shared.clone();
                tokio::spawn(async move {
                    if let Err(e) = dial(shared, &addr).await {
                        debug!(%addr, error = %e, "dial failed");
                    }
                });
            }
            Command::GetPeers(reply) => {
                let _ = reply.send(self.shared.table.snapshot());
            }
            Command::Announce {
                chain_height,
                stake,
            } => {
                {
                    let mut local = self.shared.local.lock();
                    local.chain_height = chain_height;
                    local.stake = stake;
                }
                let hello = Message::Hello(self.shared.local_hello());
                self.shared.broadcast(&hello, None);
            }
            Command::AdjustReputation { peer, delta } => {
                self.shared.penalize(&peer, delta);
            }
            Command::Shutdown => unreachable!("handled in run loop"),
        }
    }
}

/// Outbound handshake: TLS connect, send HELLO, expect HELLO_ACK.
async fn dial(shared: Arc<Shared>, addr: &str) -> Result<()> {
    if shared.table.is_blacklisted(addr) {
        return Err(Error::Handshake(format!("{addr} is blacklisted")));
    }
    if !shared.table.can_accept() {
        return Err(Error::Handshake("at peer capacity".into()));
    }
    {
        // Already connected to whoever listens there?
        let known = shared
            .table
            .snapshot()
            .into_iter()
            .any(|p| p.connected && p.listen_addr == addr);
        if known {
            return Ok(());
        }
    }

    let tcp = tokio::time::timeout(REQUEST_TIMEOUT, TcpStream::connect(addr))
        .await
        .map_err(|_| Error::Timeout)??;
    let server_name = ServerName::try_from("axiom-node".to_string())
        .map_err(|e| Error::Tls(e.to_string()))?;
    let mut stream = shared
        .connector
        .connect(server_name, tcp)
        .await
        .map_err(|e| Error::Tls(e.to_string()))?;

    let hello = Envelope::new(shared.fingerprint(), Message::Hello(shared.local_hello()));
    write_frame(&mut stream, &hello).await?;

    let ack = tokio::time::timeout(REQUEST_TIMEOUT, read_frame(&mut stream))
        .await
        .map_err(|_| Error::Timeout)??;
    let Message::HelloAck(body) = ack.message.clone() else {
        return Err(Error::Handshake(format!(
            "expected HELLO_ACK, got {}",
            ack.message.type_name()
        )));
    };
    check_hello_identity(&ack.from, &body)?;

    register_connection(shared, stream, ack.from, body).await;
    Ok(())
}

/// Inbound handshake: TLS accept, expect HELLO, reply HELLO_ACK.
async fn accept_connection(
    shared: Arc<Shared>,
    acceptor: TlsAcceptor,
    tcp: TcpStream,
) -> Result<()> {
    let mut stream = acceptor
        .accept(tcp)
        .await
        .map_err(|e| Error::Tls(e.to_string()))?;

    let first = tokio::time::timeout(REQUEST_TIMEOUT, read_frame(&mut stream))
        .await
        .map_err(|_| Error::Timeout)??;
    let Message::Hello(body) = first.message.clone() else {
        return Err(Error::Handshake(format!(
            "expected HELLO, got {}",
            first.message.type_name()
        )));
    };
    check_hello_identity(&first.from, &body)?;
    if shared.table.is_blacklisted(&first.from) {
        return Err(Error::Handshake(format!("{} is blacklisted", first.from)));
    }

    let ack = Envelope::reply_to(
        &first,
        shared.fingerprint(),
        Message::HelloAck(shared.local_hello()),
    );
    write_frame(&mut stream, &ack).await?;

    register_connection(shared, stream, first.from, body).await;
    Ok(())
}

/// The `HELLO` sender must own the key it presents.
fn check_hello_identity(from: &str, body: &HelloBody) -> Result<()> {
    let derived = fingerprint_of_pem(&body.pubkey)
        .map_err(|e| Error::Handshake(format!("unparseable pubkey: {e}")))?;
    if derived != from {
        return Err(Error::Handshake(
            "fingerprint does not match presented key".into(),
        ));
    }
    Ok(())
}

/// Wires a handshaken stream into reader/writer tasks and the peer table.
async fn register_connection<S>(shared: Arc<Shared>, stream: S, fingerprint: String, hello: HelloBody)
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let now = unix_now();
    shared.table.connected(
        &fingerprint,
        &hello.listen_addr,
        &hello.pubkey,
        hello.chain_height,
        hello.stake,
        now,
    );

    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_FRAMES);
    let closed = Arc::new(Notify::new());
    let previous = shared.conns.lock().insert(
        fingerprint.clone(),
        ConnHandle {
            outbound: outbound_tx,
            closed: closed.clone(),
        },
    );
    if let Some(previous) = previous {
        previous.closed.notify_one();
    }

    let _ = shared
        .event_tx
        .send(NetworkEvent::PeerSeen {
            fingerprint: fingerprint.clone(),
            listen_addr: hello.listen_addr.clone(),
            pubkey: hello.pubkey.clone(),
            chain_height: hello.chain_height,
            stake: hello.stake,
        })
        .await;

    info!(peer = %fingerprint, addr = %hello.listen_addr, height = hello.chain_height, "peer connected");

    let (read_half, write_half) = tokio::io::split(stream);
    tokio::spawn(writer_task(write_half, outbound_rx));
    tokio::spawn(reader_task(shared, read_half, fingerprint, closed));
}

async fn writer_task<W: AsyncWrite + Unpin>(mut writer: W, mut rx: mpsc::Receiver<Envelope>) {
    while let Some(envelope) = rx.recv().await {
        if let Err(e) = write_frame(&mut writer, &envelope).await {
            debug!(error = %e, "write failed, closing writer");
            break;
        }
    }
}

async fn reader_task<R: AsyncRead + Unpin>(
    shared: Arc<Shared>,
    mut reader: R,
    fingerprint: String,
    closed: Arc<Notify>,
) {
    loop {
        tokio::select! {
            _ = closed.notified() => break,
            frame = read_frame(&mut reader) => {
                match frame {
                    Ok(envelope) => handle_envelope(&shared, &fingerprint, envelope).await,
                    Err(Error::FrameTooLarge(len)) => {
                        warn!(peer = %fingerprint, len, "oversize frame, dropping peer");
                        shared.penalize(&fingerprint, crate::peers::REP_BAD_BLOCK);
                        break;
                    }
                    Err(Error::Protocol(reason)) => {
                        warn!(peer = %fingerprint, %reason, "malformed frame, dropping peer");
                        shared.penalize(&fingerprint, REP_MALFORMED);
                        break;
                    }
                    Err(_) => break, // connection gone
                }
            }
        }
    }
    shared.connection_closed(&fingerprint).await;
}

async fn handle_envelope(shared: &Arc<Shared>, conn_fingerprint: &str, envelope: Envelope) {
    if envelope.from != conn_fingerprint {
        warn!(peer = %conn_fingerprint, claimed = %envelope.from, "frame with forged sender");
        shared.penalize(conn_fingerprint, REP_MALFORMED);
        return;
    }

    // Replies first: correlate by id.
    if let Some(waiter) = shared.pending.lock().remove(&envelope.id) {
        let _ = waiter.send(envelope);
        return;
    }

    let msg_id = envelope.id.clone();
    let now = unix_now();
    match envelope.message.clone() {
        Message::Hello(body) => {
            // Re-announcement on a live connection: refresh height/stake.
            if check_hello_identity(&envelope.from, &body).is_err() {
                shared.penalize(conn_fingerprint, REP_MALFORMED);
                return;
            }
            shared
                .table
                .observed(&envelope.from, body.chain_height, body.stake, now);
            let _ = shared
                .event_tx
                .send(NetworkEvent::PeerSeen {
                    fingerprint: envelope.from.clone(),
                    listen_addr: body.listen_addr,
                    pubkey: body.pubkey,
                    chain_height: body.chain_height,
                    stake: body.stake,
                })
                .await;
        }
        Message::HelloAck(_) => {
            // Only meaningful during the handshake; ignore afterwards.
        }
        Message::PeerRequest {} => {
            let peers = shared
                .table
                .share_list()
                .into_iter()
                .map(|p| PeerEntry {
                    addr: p.listen_addr,
                    pubkey: p.pubkey,
                    last_seen: p.last_seen,
                })
                .collect();
            let reply = Envelope::reply_to(
                &envelope,
                shared.fingerprint(),
                Message::PeerList { peers },
            );
            let _ = shared.send_to(conn_fingerprint, reply);
        }
        Message::PeerList { peers } => {
            // Unsolicited share: remember the addresses.
            for entry in peers {
                shared.table.add_candidate(&entry.addr, entry.last_seen);
            }
        }
        Message::BlockAnnounce(block) => {
            if !shared.dedup.first_seen("BLOCK_ANNOUNCE", block.hash) {
                return;
            }
            debug!(peer = %conn_fingerprint, %msg_id, height = block.height, "block announced");
            let _ = shared
                .event_tx
                .send(NetworkEvent::BlockAnnounce {
                    from: envelope.from.clone(),
                    block,
                })
                .await;
        }
        Message::RequestBlocks { since_height } => {
            let blocks = shared.source.blocks_since(since_height, BLOCKS_REPLY_MAX);
            let reply =
                Envelope::reply_to(&envelope, shared.fingerprint(), Message::Blocks { blocks });
            let _ = shared.send_to(conn_fingerprint, reply);
        }
        Message::RequestFacts { hashes } => {
            let facts = shared.source.facts_by_hashes(&hashes);
            let reply =
                Envelope::reply_to(&envelope, shared.fingerprint(), Message::Facts { facts });
            let _ = shared.send_to(conn_fingerprint, reply);
        }
        Message::Ping { ts } => {
            shared.table.touch(&envelope.from, now);
            let reply = Envelope::reply_to(&envelope, shared.fingerprint(), Message::Pong { ts });
            let _ = shared.send_to(conn_fingerprint, reply);
        }
        Message::Pong { .. } | Message::Blocks { .. } | Message::Facts { .. } => {
            // Replies without a registered waiter: the request timed out.
            debug!(peer = %conn_fingerprint, %msg_id, "late reply discarded");
        }
    }
}

/// Periodic peer exchange with one random connected peer.
async fn gossip_round(shared: Arc<Shared>) {
    let Some(peer) = shared.table.random_connected() else {
        return;
    };
    match shared
        .send_request(&peer, Message::PeerRequest {}, REQUEST_TIMEOUT)
        .await
    {
        Ok(reply) => {
            if let Message::PeerList { peers } = reply.message {
                for entry in peers {
                    shared.table.add_candidate(&entry.addr, entry.last_seen);
                }
            }
        }
        Err(e) => debug!(peer = %peer, error = %e, "peer exchange failed"),
    }

    // Dial a few candidates while below capacity.
    for addr in shared.table.take_candidates(4) {
        if !shared.table.can_accept() {
            break;
        }
        let shared = shared.clone();
        tokio::spawn(async move {
            if let Err(e) = dial(shared, &addr).await {
                debug!(%addr, error = %e, "candidate dial failed");
            }
        });
    }
}

/// Liveness probe of every connected peer.
async fn ping_round(shared: Arc<Shared>) {
    for peer in shared.table.connected_peers() {
        let shared = shared.clone();
        tokio::spawn(async move {
            let _ = shared
                .send_request(&peer, Message::Ping { ts: unix_now() }, REQUEST_TIMEOUT)
                .await;
        });
    }
}
