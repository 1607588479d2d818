//! Broadcast duplicate suppression.
//!
//! Flood gossip re-delivers every announcement along many paths; a small
//! TTL-bounded cache keyed by `(type, hash)` keeps each one from being
//! processed or re-broadcast more than once.

use axiom_types::Hash256;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

/// Default capacity of the cache.
pub const DEDUP_CAPACITY: usize = 4096;

/// Default entry lifetime.
pub const DEDUP_TTL: Duration = Duration::from_secs(600);

type Key = (&'static str, Hash256);

/// Bounded first-seen cache.
pub struct SeenCache {
    inner: Mutex<Inner>,
    capacity: usize,
    ttl: Duration,
}

struct Inner {
    entries: HashMap<Key, Instant>,
    order: VecDeque<Key>,
}

impl SeenCache {
    /// A cache with explicit bounds.
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::with_capacity(capacity),
                order: VecDeque::with_capacity(capacity),
            }),
            capacity,
            ttl,
        }
    }

    /// A cache with the protocol defaults (4096 entries, 10 minutes).
    pub fn with_defaults() -> Self {
        Self::new(DEDUP_CAPACITY, DEDUP_TTL)
    }

    /// Records `(kind, hash)` and reports whether it was first seen.
    pub fn first_seen(&self, kind: &'static str, hash: Hash256) -> bool {
        let now = Instant::now();
        let mut inner = self.inner.lock();

        // Expire from the front; insertion order is also time order.
        while let Some(front) = inner.order.front().copied() {
            match inner.entries.get(&front) {
                Some(at) if now.duration_since(*at) >= self.ttl => {
                    inner.order.pop_front();
                    inner.entries.remove(&front);
                }
                _ => break,
            }
        }

        let key = (kind, hash);
        if inner.entries.contains_key(&key) {
            return false;
        }
        if inner.entries.len() >= self.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.entries.remove(&oldest);
            }
        }
        inner.entries.insert(key, now);
        inner.order.push_back(key);
        true
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hash(n: u64) -> Hash256 {
        Hash256::digest(&n.to_be_bytes())
    }

    #[test]
    fn suppresses_repeats() {
        let cache = SeenCache::with_defaults();
        assert!(cache.first_seen("BLOCK_ANNOUNCE", hash(1)));
        assert!(!cache.first_seen("BLOCK_ANNOUNCE", hash(1)));
        // Different type, same hash: distinct key.
        assert!(cache.first_seen("FACTS", hash(1)));
    }

    #[test]
    fn capacity_evicts_oldest() {
        let cache = SeenCache::new(2, Duration::from_secs(600));
        assert!(cache.first_seen("A", hash(1)));
        assert!(cache.first_seen("A", hash(2)));
        assert!(cache.first_seen("A", hash(3)));
        assert_eq!(cache.len(), 2);
        // The oldest entry fell out and is fresh again.
        assert!(cache.first_seen("A", hash(1)));
    }

    #[test]
    fn ttl_expires_entries() {
        let cache = SeenCache::new(8, Duration::from_millis(10));
        assert!(cache.first_seen("A", hash(1)));
        std::thread::sleep(Duration::from_millis(20));
        assert!(cache.first_seen("A", hash(1)));
    }
}
