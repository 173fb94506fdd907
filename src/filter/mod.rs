//! AMQ (Approximate Membership Query) prefilter layer.
//!
//! Three variants — Bloom, XOR, Binary Fuse — share one contract: given a
//! key, answer `Majority` (return the stored majority value, skip the CSF
//! entirely) or `Unknown` (consult the wrapped minority-only CSF). Every
//! minority key used to build the filter is guaranteed `Unknown`; the
//! filter's false-positive rate only ever misreports keys *outside* the
//! input set.

pub mod binary_fuse;
pub mod bloom;
pub mod xor;

use crate::error::{CaramelError, Result};
use crate::hash::Hash128;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Result of a prefilter lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterDecision {
    /// The stored majority value applies; no CSF lookup needed.
    Majority,
    /// Key is (probably) in the minority set; consult the CSF.
    Unknown,
}

/// Construction parameters for each variant, per spec.md §6's
/// `prefilter` constructor option.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy)]
pub enum PrefilterSpec {
    None,
    Bloom { bits_per_element: f64, num_hashes: u32 },
    Xor { fingerprint_bits: u8 },
    BinaryFuse { fingerprint_bits: u8 },
}

/// A built prefilter, ready for lookups and serialization.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone)]
pub enum Prefilter {
    Bloom(bloom::BloomFilter),
    Xor(xor::XorFilter),
    BinaryFuse(binary_fuse::BinaryFuseFilter),
}

impl Prefilter {
    /// Builds the requested variant over `minority_hashes`, the 128-bit
    /// hashes of every key whose value differs from the bucket/global
    /// majority. `rehash_limit` bounds the XOR/Binary-Fuse peeling retry
    /// loop (spec.md §4.7, "on failure, retry with a new seed").
    ///
    /// `majority_hashes` are the hashes of every key the filter must report
    /// `Majority` for. A raw AMQ only guarantees no false *negatives* on its
    /// own insertion set; it says nothing about false positives on a
    /// specific other known set. Since the full majority key set is known at
    /// build time, this loop additionally verifies no majority key
    /// round-trips as a false positive, and reseeds until it doesn't — the
    /// "Filter fidelity" property of spec.md §8 requires every input key,
    /// majority or minority, to resolve to its exact stored value.
    pub fn build(
        spec: PrefilterSpec,
        minority_hashes: &[Hash128],
        majority_hashes: &[Hash128],
        rehash_limit: u32,
    ) -> Result<Option<Self>> {
        match spec {
            PrefilterSpec::None => Ok(None),
            PrefilterSpec::Bloom { bits_per_element, num_hashes } => {
                for round in 0..rehash_limit {
                    let seed = crate::hash::mix_seed(0xB10013, round);
                    let f = bloom::BloomFilter::build(minority_hashes, bits_per_element, num_hashes, seed);
                    if majority_hashes.iter().all(|h| !f.contains(h)) {
                        return Ok(Some(Prefilter::Bloom(f)));
                    }
                    log::debug!("bloom filter: round {round} false-positived a majority key, reseeding");
                }
                log::warn!("bloom filter: exhausted {rehash_limit} seed retries over {} minority keys", minority_hashes.len());
                Err(CaramelError::FilterExhausted { attempts: rehash_limit })
            }
            PrefilterSpec::Xor { fingerprint_bits } => Ok(Some(Prefilter::Xor(xor::XorFilter::build(
                minority_hashes,
                fingerprint_bits,
                majority_hashes,
                rehash_limit,
            )?))),
            PrefilterSpec::BinaryFuse { fingerprint_bits } => Ok(Some(Prefilter::BinaryFuse(
                binary_fuse::BinaryFuseFilter::build(minority_hashes, fingerprint_bits, majority_hashes, rehash_limit)?,
            ))),
        }
    }

    pub fn contains(&self, h: &Hash128) -> FilterDecision {
        let positive = match self {
            Prefilter::Bloom(f) => f.contains(h),
            Prefilter::Xor(f) => f.contains(h),
            Prefilter::BinaryFuse(f) => f.contains(h),
        };
        if positive {
            FilterDecision::Unknown
        } else {
            FilterDecision::Majority
        }
    }

    pub fn size_bits(&self) -> usize {
        match self {
            Prefilter::Bloom(f) => f.size_bits(),
            Prefilter::Xor(f) => f.size_bits(),
            Prefilter::BinaryFuse(f) => f.size_bits(),
        }
    }
}
