//! XOR-filter prefilter variant.
//!
//! Grounded on the teacher's `bdz.rs` peeling core via `solver::peel_hypergraph`:
//! fingerprint assignment by peeling is the same "3-regular hypergraph,
//! degree-1 queue, reverse-order assignment" shape as BDZ's index assignment,
//! just assigning a `fingerprint_bits`-wide tag per slot (XOR of the other two
//! slots plus the key's own fingerprint) instead of an index. Per spec.md
//! §4.7: `m ~= 1.23 * n` slots, retry under a new seed on peeling failure.

use crate::error::{CaramelError, Result};
use crate::hash::{splitmix64, Hash128};
use crate::solver::{peel_hypergraph, PeelResult};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

const EXPANSION: f64 = 1.23;

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone)]
pub struct XorFilter {
    seed: u64,
    m: u32,
    fingerprint_bits: u8,
    slots: Vec<u32>,
}

fn edges_for(keys: &[Hash128], seed: u64, m: u32) -> Vec<(u32, u32, u32)> {
    let third = m as u64 / 3;
    keys.iter()
        .map(|h| {
            let base = h.as_u128() ^ (seed as u128).wrapping_mul(0x9E3779B97F4A7C15);
            let r0 = splitmix64((base >> 64) as u64 ^ 0x2545_F491_4F6C_DD1D);
            let r1 = splitmix64(base as u64 ^ 0x9E37_79B9_7F4A_7C15);
            let r2 = splitmix64((base as u64).wrapping_add((base >> 64) as u64) ^ 0x853C_49E6_0A6C_9D39);
            let h0 = (r0 % third) as u32;
            let h1 = third as u32 + (r1 % third) as u32;
            let h2 = 2 * third as u32 + (r2 % third) as u32;
            (h0, h1, h2)
        })
        .collect()
}

fn fingerprint(h: &Hash128, bits: u8) -> u32 {
    let mask = if bits >= 32 { u32::MAX } else { (1u32 << bits) - 1 };
    (h.tag() as u32) & mask
}

impl XorFilter {
    /// `majority_hashes` are checked for false positives before a candidate
    /// build is accepted, so every known majority key is guaranteed to
    /// resolve without touching the minority CSF (see `Prefilter::build`).
    pub fn build(keys: &[Hash128], fingerprint_bits: u8, majority_hashes: &[Hash128], rehash_limit: u32) -> Result<Self> {
        let n = keys.len();
        let raw_m = ((EXPANSION * n as f64).ceil() as u32).max(3);
        let m = raw_m.div_ceil(3) * 3;

        for round in 0..rehash_limit {
            let seed = crate::hash::mix_seed(0xF11BED, round);
            let edges = edges_for(keys, seed, m);
            let PeelResult { order, removed_row } = peel_hypergraph(m as usize, &edges);
            if removed_row.iter().any(|&r| !r) {
                log::debug!("xor filter: round {round} left a non-peelable 2-core over {} keys, reseeding", keys.len());
                continue; // residual 2-core; XOR filters only retry, they don't fall back to Gaussian elimination
            }

            let mut slots = vec![0u32; m as usize];
            for rec in order.into_iter().rev() {
                let (h0, h1, h2) = edges[rec.row as usize];
                let (pivot, o1, o2) = match rec.pivot {
                    0 => (h0, h1, h2),
                    1 => (h1, h0, h2),
                    _ => (h2, h0, h1),
                };
                let fp = fingerprint(&keys[rec.row as usize], fingerprint_bits);
                slots[pivot as usize] = fp ^ slots[o1 as usize] ^ slots[o2 as usize];
            }

            let candidate = Self { seed, m, fingerprint_bits, slots };
            if majority_hashes.iter().all(|h| !candidate.contains(h)) {
                return Ok(candidate);
            }
            log::debug!("xor filter: round {round} peeled but a majority key false-positived, reseeding");
        }

        log::warn!("xor filter: exhausted {rehash_limit} seed retries over {} keys", keys.len());
        Err(CaramelError::FilterExhausted { attempts: rehash_limit })
    }

    pub fn contains(&self, h: &Hash128) -> bool {
        let edges = edges_for(std::slice::from_ref(h), self.seed, self.m);
        let (h0, h1, h2) = edges[0];
        let fp = fingerprint(h, self.fingerprint_bits);
        (self.slots[h0 as usize] ^ self.slots[h1 as usize] ^ self.slots[h2 as usize]) == fp
    }

    pub fn size_bits(&self) -> usize {
        self.slots.len() * self.fingerprint_bits as usize + 64 + 32 + 8
    }

    pub fn num_elements(&self) -> usize {
        self.slots.len()
    }

    pub fn fingerprint_bits(&self) -> u8 {
        self.fingerprint_bits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(i: u128) -> Hash128 {
        let v = i.wrapping_mul(0x9e3779b97f4a7c15) ^ (i << 64);
        Hash128 { hi: (v >> 64) as u64, lo: v as u64 }
    }

    #[test]
    fn no_false_negatives() {
        let keys: Vec<Hash128> = (0..2000u128).map(key).collect();
        let filter = XorFilter::build(&keys, 12, &[], 32).unwrap();
        for k in &keys {
            assert!(filter.contains(k));
        }
    }

    #[test]
    fn false_positive_rate_roughly_matches_fingerprint_width() {
        let keys: Vec<Hash128> = (0..5000u128).map(key).collect();
        let filter = XorFilter::build(&keys, 8, &[], 32).unwrap();
        let offset = 10_000_000u128;
        let trials = 50_000u128;
        let mut false_positives = 0u64;
        for i in 0..trials {
            if filter.contains(&key(i + offset)) {
                false_positives += 1;
            }
        }
        let fpr = false_positives as f64 / trials as f64;
        assert!(fpr < 0.05, "fpr too high for 8-bit fingerprint: {fpr}");
    }
}
