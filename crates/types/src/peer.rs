//! Network participant records.

use serde::{Deserialize, Serialize};

/// Reputation ceiling for a peer.
pub const REPUTATION_MAX: i32 = 1000;

/// Reputation assigned to a newly seen peer.
pub const REPUTATION_INITIAL: i32 = 100;

/// A known remote node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRecord {
    /// Network address (`host:port`) the peer listens on.
    pub addr: String,
    /// PEM-encoded public key, if learned through a handshake.
    pub pubkey: String,
    /// UNIX seconds when first observed.
    pub first_seen: u64,
    /// UNIX seconds when last observed.
    pub last_seen: u64,
    /// Behaviour score in `[0, 1000]`.
    pub reputation: i32,
}

impl PeerRecord {
    /// A fresh record for a peer observed now.
    pub fn new(addr: String, pubkey: String, now: u64) -> Self {
        Self {
            addr,
            pubkey,
            first_seen: now,
            last_seen: now,
            reputation: REPUTATION_INITIAL,
        }
    }

    /// Applies a reputation delta, clamping to the ceiling. The result may
    /// go negative; callers disconnect and blacklist below zero.
    pub fn adjust_reputation(&mut self, delta: i32) -> i32 {
        self.reputation = (self.reputation + delta).min(REPUTATION_MAX);
        self.reputation
    }
}

/// A staking participant of the consensus protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorRecord {
    /// SHA-256 fingerprint of the validator's public key (hex).
    pub fingerprint: String,
    /// PEM-encoded public key used to verify block signatures.
    #[serde(default)]
    pub pubkey: String,
    /// Non-negative stake; zero means "not an active validator".
    pub stake: u64,
}

impl ValidatorRecord {
    /// Whether this validator participates in leader selection.
    pub fn is_active(&self) -> bool {
        self.stake > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reputation_clamps_at_ceiling_only() {
        let mut peer = PeerRecord::new("127.0.0.1:7000".into(), String::new(), 0);
        assert_eq!(peer.reputation, REPUTATION_INITIAL);
        peer.adjust_reputation(5000);
        assert_eq!(peer.reputation, REPUTATION_MAX);
        peer.adjust_reputation(-2000);
        assert_eq!(peer.reputation, REPUTATION_MAX - 2000);
    }

    #[test]
    fn zero_stake_is_inactive() {
        let v = ValidatorRecord {
            fingerprint: "ff".into(),
            pubkey: String::new(),
            stake: 0,
        };
        assert!(!v.is_active());
    }
}
