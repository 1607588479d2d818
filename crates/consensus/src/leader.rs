//! Deterministic stake-weighted leader selection.
//!
//! Every node computes the leader for a slot independently; no coordination
//! is needed. The rule: sort active validators by fingerprint, build a
//! stake prefix-sum, and pick with a SHA-256 selector over
//! `previous_block_hash || slot`.

use axiom_types::{Hash256, ValidatorRecord};
use sha2::{Digest, Sha256};

/// Selects the leader for `slot` on top of `previous_hash`.
///
/// Returns `None` when no validator has stake. `validators` may arrive in
/// any order; the canonical ascending-fingerprint order is established
/// here so every caller agrees.
pub fn select_leader<'a>(
    previous_hash: &Hash256,
    slot: u64,
    validators: &'a [ValidatorRecord],
) -> Option<&'a ValidatorRecord> {
    let mut active: Vec<&ValidatorRecord> = validators.iter().filter(|v| v.is_active()).collect();
    if active.is_empty() {
        return None;
    }
    active.sort_by(|a, b| a.fingerprint.cmp(&b.fingerprint));

    let total: u128 = active.iter().map(|v| v.stake as u128).sum();
    let selector = selector_mod(previous_hash, slot, total);

    let mut prefix: u128 = 0;
    for validator in active {
        prefix += validator.stake as u128;
        if prefix > selector {
            return Some(validator);
        }
    }
    unreachable!("prefix sum covers the selector range")
}

/// `SHA-256(previous_hash || slot_be) mod total`, reducing the digest as a
/// big-endian integer.
fn selector_mod(previous_hash: &Hash256, slot: u64, total: u128) -> u128 {
    debug_assert!(total > 0);
    let mut hasher = Sha256::new();
    hasher.update(previous_hash.as_bytes());
    hasher.update(slot.to_be_bytes());
    let digest = hasher.finalize();

    let mut remainder: u128 = 0;
    for byte in digest {
        remainder = (remainder << 8 | byte as u128) % total;
    }
    remainder
}
