//! The peer table: reputation, blacklist and gossip selection.
//!
//! Reputation deltas follow observed behaviour; a peer that sinks below
//! zero is disconnected and blacklisted for [`crate::BLACKLIST_TTL`].

use crate::{BLACKLIST_TTL, MAX_PEERS, PEER_LIST_MAX};
use axiom_types::peer::{REPUTATION_INITIAL, REPUTATION_MAX};
use parking_lot::Mutex;
use rand::seq::IteratorRandom;
use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, warn};

/// Reward for a correctly validated block delivery.
pub const REP_VALID_BLOCK: i32 = 1;
/// Reward for answering a fact pull.
pub const REP_FACT_PULL: i32 = 1;
/// Penalty for a structurally malformed message.
pub const REP_MALFORMED: i32 = -5;
/// Penalty for a block failing the signature or authority check.
pub const REP_BAD_BLOCK: i32 = -20;
/// Penalty for a timed-out request.
pub const REP_TIMEOUT: i32 = -1;

/// Everything the table knows about one peer, keyed by fingerprint.
#[derive(Debug, Clone)]
pub struct PeerState {
    /// Public-key fingerprint (the table key, duplicated for snapshots).
    pub fingerprint: String,
    /// Address the peer accepts connections on.
    pub listen_addr: String,
    /// PEM public key from the handshake.
    pub pubkey: String,
    /// Last advertised chain height.
    pub chain_height: u64,
    /// Last advertised stake.
    pub stake: u64,
    /// Behaviour score.
    pub reputation: i32,
    /// UNIX seconds of first contact.
    pub first_seen: u64,
    /// UNIX seconds of last contact.
    pub last_seen: u64,
    /// Whether a live connection exists right now.
    pub connected: bool,
}

/// Shared peer table.
pub struct PeerTable {
    inner: Mutex<TableInner>,
}

struct TableInner {
    peers: HashMap<String, PeerState>,
    /// Known listen addresses we have not handshaken with yet.
    candidates: HashMap<String, u64>,
    /// fingerprint/addr -> expiry.
    blacklist: HashMap<String, Instant>,
}

impl PeerTable {
    /// An empty table.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(TableInner {
                peers: HashMap::new(),
                candidates: HashMap::new(),
                blacklist: HashMap::new(),
            }),
        }
    }

    /// Registers (or refreshes) a peer after a completed handshake.
    pub fn connected(
        &self,
        fingerprint: &str,
        listen_addr: &str,
        pubkey: &str,
        chain_height: u64,
        stake: u64,
        now: u64,
    ) {
        let mut inner = self.inner.lock();
        inner.candidates.remove(listen_addr);
        let entry = inner
            .peers
            .entry(fingerprint.to_string())
            .or_insert_with(|| PeerState {
                fingerprint: fingerprint.to_string(),
                listen_addr: listen_addr.to_string(),
                pubkey: pubkey.to_string(),
                chain_height,
                stake,
                reputation: REPUTATION_INITIAL,
                first_seen: now,
                last_seen: now,
                connected: true,
            });
        entry.listen_addr = listen_addr.to_string();
        entry.pubkey = pubkey.to_string();
        entry.chain_height = chain_height;
        entry.stake = stake;
        entry.last_seen = now;
        entry.connected = true;
    }

    /// Marks a peer disconnected.
    pub fn disconnected(&self, fingerprint: &str) {
        if let Some(peer) = self.inner.lock().peers.get_mut(fingerprint) {
            peer.connected = false;
        }
    }

    /// Updates the advertised height/stake from a repeated `HELLO` or reply.
    pub fn observed(&self, fingerprint: &str, chain_height: u64, stake: u64, now: u64) {
        if let Some(peer) = self.inner.lock().peers.get_mut(fingerprint) {
            peer.chain_height = chain_height;
            peer.stake = stake;
            peer.last_seen = now;
        }
    }

    /// Refreshes a peer's last-seen clock.
    pub fn touch(&self, fingerprint: &str, now: u64) {
        if let Some(peer) = self.inner.lock().peers.get_mut(fingerprint) {
            peer.last_seen = now;
        }
    }

    /// Remembers a shared listen address for later dialing.
    pub fn add_candidate(&self, addr: &str, last_seen: u64) {
        let mut inner = self.inner.lock();
        if inner.is_blacklisted_locked(addr) {
            return;
        }
        let known = inner
            .peers
            .values()
            .any(|p| p.listen_addr == addr);
        if !known {
            inner.candidates.entry(addr.to_string()).or_insert(last_seen);
        }
    }

    /// Takes up to `limit` unconnected candidate addresses to dial.
    pub fn take_candidates(&self, limit: usize) -> Vec<String> {
        let mut inner = self.inner.lock();
        let keys: Vec<String> = inner.candidates.keys().take(limit).cloned().collect();
        for key in &keys {
            inner.candidates.remove(key);
        }
        keys
    }

    /// Applies a reputation delta. Returns `true` when the peer fell below
    /// zero and was blacklisted; the caller must drop the connection.
    pub fn adjust_reputation(&self, fingerprint: &str, delta: i32) -> bool {
        let mut inner = self.inner.lock();
        let Some(peer) = inner.peers.get_mut(fingerprint) else {
            return false;
        };
        peer.reputation = (peer.reputation + delta).min(REPUTATION_MAX);
        debug!(peer = fingerprint, delta, reputation = peer.reputation, "reputation adjusted");
        if peer.reputation < 0 {
            let addr = peer.listen_addr.clone();
            peer.connected = false;
            let until = Instant::now() + BLACKLIST_TTL;
            inner.blacklist.insert(fingerprint.to_string(), until);
            inner.blacklist.insert(addr, until);
            warn!(peer = fingerprint, "peer blacklisted");
            return true;
        }
        false
    }

    /// Whether a fingerprint or address is currently blacklisted.
    pub fn is_blacklisted(&self, key: &str) -> bool {
        self.inner.lock().is_blacklisted_locked(key)
    }

    /// Removes expired blacklist entries.
    pub fn expire_blacklist(&self) {
        let now = Instant::now();
        self.inner.lock().blacklist.retain(|_, until| *until > now);
    }

    /// Whether the table accepts another live connection.
    pub fn can_accept(&self) -> bool {
        self.connected_count() < MAX_PEERS
    }

    /// Number of live connections.
    pub fn connected_count(&self) -> usize {
        self.inner.lock().peers.values().filter(|p| p.connected).count()
    }

    /// A uniformly random connected peer, for the gossip exchange.
    pub fn random_connected(&self) -> Option<String> {
        let inner = self.inner.lock();
        inner
            .peers
            .values()
            .filter(|p| p.connected)
            .map(|p| p.fingerprint.clone())
            .choose(&mut rand::thread_rng())
    }

    /// All connected fingerprints.
    pub fn connected_peers(&self) -> Vec<String> {
        self.inner
            .lock()
            .peers
            .values()
            .filter(|p| p.connected)
            .map(|p| p.fingerprint.clone())
            .collect()
    }

    /// The connected peer advertising the greatest chain height.
    pub fn best_height_peer(&self) -> Option<(String, u64)> {
        self.inner
            .lock()
            .peers
            .values()
            .filter(|p| p.connected)
            .max_by_key(|p| p.chain_height)
            .map(|p| (p.fingerprint.clone(), p.chain_height))
    }

    /// Up to [`PEER_LIST_MAX`] known peers by descending reputation, for a
    /// `PEER_LIST` reply.
    pub fn share_list(&self) -> Vec<PeerState> {
        let mut peers: Vec<PeerState> = self
            .inner
            .lock()
            .peers
            .values()
            .filter(|p| !p.listen_addr.is_empty())
            .cloned()
            .collect();
        peers.sort_by(|a, b| b.reputation.cmp(&a.reputation));
        peers.truncate(PEER_LIST_MAX);
        peers
    }

    /// A snapshot of one peer.
    pub fn get(&self, fingerprint: &str) -> Option<PeerState> {
        self.inner.lock().peers.get(fingerprint).cloned()
    }

    /// A snapshot of the whole table.
    pub fn snapshot(&self) -> Vec<PeerState> {
        self.inner.lock().peers.values().cloned().collect()
    }
}

impl Default for PeerTable {
    fn default() -> Self {
        Self::new()
    }
}

impl TableInner {
    fn is_blacklisted_locked(&self, key: &str) -> bool {
        self.blacklist
            .get(key)
            .map(|until| *until > Instant::now())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_with_peer(fingerprint: &str) -> PeerTable {
        let table = PeerTable::new();
        table.connected(fingerprint, "10.0.0.1:7000", "PEM", 3, 0, 100);
        table
    }

    #[test]
    fn handshake_registers_and_updates() {
        let table = table_with_peer("fp1");
        let peer = table.get("fp1").unwrap();
        assert_eq!(peer.reputation, REPUTATION_INITIAL);
        assert_eq!(peer.chain_height, 3);

        table.observed("fp1", 9, 50, 200);
        let peer = table.get("fp1").unwrap();
        assert_eq!(peer.chain_height, 9);
        assert_eq!(peer.stake, 50);
    }

    #[test]
    fn negative_reputation_blacklists() {
        let table = table_with_peer("fp1");
        // Five bad blocks: 100 - 5*20 = 0, still tolerated.
        for _ in 0..5 {
            assert!(!table.adjust_reputation("fp1", REP_BAD_BLOCK));
        }
        // One more push below zero.
        assert!(table.adjust_reputation("fp1", REP_TIMEOUT));
        assert!(table.is_blacklisted("fp1"));
        assert!(table.is_blacklisted("10.0.0.1:7000"));
        assert!(!table.get("fp1").unwrap().connected);
    }

    #[test]
    fn share_list_orders_by_reputation() {
        let table = PeerTable::new();
        table.connected("a", "h:1", "", 0, 0, 0);
        table.connected("b", "h:2", "", 0, 0, 0);
        table.adjust_reputation("a", -30);
        table.adjust_reputation("b", 20);
        let list = table.share_list();
        assert_eq!(list[0].fingerprint, "b");
        assert_eq!(list[1].fingerprint, "a");
    }

    #[test]
    fn candidates_skip_known_addresses() {
        let table = table_with_peer("fp1");
        table.add_candidate("10.0.0.1:7000", 0); // already connected
        table.add_candidate("10.0.0.2:7000", 0);
        let candidates = table.take_candidates(8);
        assert_eq!(candidates, vec!["10.0.0.2:7000".to_string()]);
        assert!(table.take_candidates(8).is_empty());
    }

    #[test]
    fn best_height_prefers_tallest_chain() {
        let table = PeerTable::new();
        table.connected("a", "h:1", "", 4, 0, 0);
        table.connected("b", "h:2", "", 9, 0, 0);
        let (best, height) = table.best_height_peer().unwrap();
        assert_eq!(best, "b");
        assert_eq!(height, 9);
    }
}
