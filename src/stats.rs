//! Size/shape introspection for a built `Csf`, returned by `get_stats()`.
//!
//! A `solution_bytes`/`filter_bytes`/`metadata_bytes` breakdown, a Huffman
//! summary (`num_unique_symbols`, `max_code_length`, `avg_bits_per_symbol`,
//! a length histogram), a bucket-size summary, and an `Option<FilterStats>`
//! that is `None` when no prefilter was built and carries
//! `{kind, size_bytes, size_bits, num_hashes | fingerprint_bits,
//! num_elements}` when one was.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Default)]
pub struct HuffmanStats {
    pub num_unique_symbols: usize,
    pub max_code_length: u8,
    pub avg_bits_per_symbol: f64,
    /// `code_length_histogram[len]` = number of symbols assigned that
    /// length, across every bucket.
    pub code_length_histogram: Vec<u64>,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Default)]
pub struct BucketStats {
    pub num_buckets: usize,
    pub min_solution_bits: u64,
    pub avg_solution_bits: f64,
    pub max_solution_bits: u64,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone)]
pub struct FilterStats {
    pub kind: &'static str,
    pub size_bytes: usize,
    pub size_bits: usize,
    pub num_elements: usize,
    /// `Some` only for the Bloom variant.
    pub num_hashes: Option<u32>,
    /// `Some` only for the XOR/Binary-Fuse variants.
    pub fingerprint_bits: Option<u8>,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Default)]
pub struct CsfStats {
    pub in_memory_bytes: usize,
    pub solution_bytes: usize,
    pub filter_bytes: usize,
    pub metadata_bytes: usize,
    pub huffman_stats: HuffmanStats,
    pub bucket_stats: BucketStats,
    pub filter_stats: Option<FilterStats>,
}
