//! Bloom-filter prefilter variant.
//!
//! A word-packed `Vec<u64>` bit vector with an enhanced-double-hashing
//! probe scheme: split the key's two 64-bit halves and derive
//! `num_hashes` probe positions from them (with the second half forced odd
//! so it's coprime with the power-of-two-sized bit vector some callers may
//! pick) rather than computing `num_hashes` independent hashes. Takes its
//! 128-bit keys straight from `Hash128` and sizes itself from an explicit
//! `bits_per_element`/`num_hashes` pair rather than fixed crate constants.

use crate::hash::Hash128;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone)]
pub struct BloomFilter {
    bits: Vec<u64>,
    num_bits: usize,
    num_hashes: u32,
    /// Perturbs probe positions so the caller can retry under a fresh
    /// derivation when the initial build false-positives on a known
    /// majority key (see `Prefilter::build`'s fidelity check).
    seed: u64,
}

fn probe_positions(key: u128, seed: u64, num_hashes: u32, num_bits: usize) -> impl Iterator<Item = usize> {
    let perturbed = key ^ (seed as u128).wrapping_mul(0x9E3779B97F4A7C15);
    let bytes = perturbed.to_le_bytes();
    let h1 = u64::from_le_bytes(bytes[0..8].try_into().unwrap());
    let h2 = u64::from_le_bytes(bytes[8..16].try_into().unwrap()) | 1;
    (0..num_hashes as u64).map(move |i| (h1.wrapping_add(i.wrapping_mul(h2)) % (num_bits as u64)) as usize)
}

impl BloomFilter {
    /// Builds a filter sized for `keys.len()` insertions at the given
    /// `bits_per_element`/`num_hashes` (`k / ln 2` hashes at the
    /// size-optimal point). Bit count is rounded up to a multiple of 64,
    /// minimum 64.
    pub fn build(keys: &[Hash128], bits_per_element: f64, num_hashes: u32, seed: u64) -> Self {
        let raw_bits = (keys.len() as f64 * bits_per_element).ceil() as usize;
        let num_bits = (raw_bits.max(64) + 63) & !63;
        let word_count = num_bits / 64;
        let mut filter = Self { bits: vec![0u64; word_count], num_bits, num_hashes: num_hashes.max(1), seed };
        for h in keys {
            filter.insert(h);
        }
        filter
    }

    fn insert(&mut self, h: &Hash128) {
        for pos in probe_positions(h.as_u128(), self.seed, self.num_hashes, self.num_bits) {
            self.bits[pos / 64] |= 1u64 << (pos % 64);
        }
    }

    pub fn contains(&self, h: &Hash128) -> bool {
        probe_positions(h.as_u128(), self.seed, self.num_hashes, self.num_bits)
            .all(|pos| self.bits[pos / 64] & (1u64 << (pos % 64)) != 0)
    }

    pub fn size_bits(&self) -> usize {
        self.bits.len() * 64 + 32 + 8
    }

    pub fn num_hashes(&self) -> u32 {
        self.num_hashes
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
    fn empty_filter_contains_nothing() {
        let f = BloomFilter::build(&[], 10.0, 7, 0);
        assert_eq!(f.num_bits, 64);
        for i in 0u128..100 {
            assert!(!f.contains(&key(i)));
        }
    }

    #[test]
    fn no_false_negatives() {
        let n = 1000u128;
        let keys: Vec<Hash128> = (0..n).map(key).collect();
        let f = BloomFilter::build(&keys, 10.0, 7, 0);
        for k in &keys {
            assert!(f.contains(k), "false negative");
        }
    }

    #[test]
    fn false_positive_rate_stays_low() {
        let n = 10_000u128;
        let keys: Vec<Hash128> = (0..n).map(key).collect();
        let f = BloomFilter::build(&keys, 10.0, 7, 0);

        let offset = n + 1_000_000;
        let mut false_positives = 0u64;
        let trials = 100_000u128;
        for i in 0..trials {
            let probe = key(i + offset);
            if f.contains(&probe) {
                false_positives += 1;
            }
        }
        let fpr = false_positives as f64 / trials as f64;
        assert!(fpr < 0.02, "fpr too high: {fpr}");
    }
}
