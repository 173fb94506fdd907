//! caramel — compressed static functions: near-entropy immutable key/value
//! maps over GF(2) hypergraphs.
//!
//! - Build once on a fixed `(key, value)` set: every key hashes into a
//!   bucket, each bucket gets a canonical Huffman codebook and a solved
//!   GF(2) linear system, and the per-bucket solutions concatenate into one
//!   packed bitstring close to `N * H(V)` bits.
//! - O(1) query: hash, bucket lookup, three bit-reads, one XOR, one Huffman
//!   decode.
//! - An optional AMQ prefilter (Bloom / XOR / Binary Fuse) can carve off a
//!   dominant "majority" value so the CSF body only needs to cover the
//!   minority keys.
//! - `MultisetCsf` composes `L` independent scalar CSFs for vector-valued
//!   `V`, one per transposed column.

pub mod auto;
pub mod bitarray;
pub mod bucket;
pub mod codec;
pub mod config;
pub mod cpu;
pub mod csf;
pub mod error;
pub mod filter;
pub mod hash;
pub mod multiset;
pub mod serialize;
pub mod solver;
pub mod stats;
pub mod system;
pub mod value;

pub use auto::{load_auto, AnyCsf};
pub use config::BuildConfig;
pub use csf::{BucketDescriptor, Csf};
pub use error::{CaramelError, Result};
pub use filter::{FilterDecision, Prefilter, PrefilterSpec};
pub use multiset::MultisetCsf;
pub use stats::{BucketStats, CsfStats, FilterStats, HuffmanStats};
pub use value::{CsfValue, ValueTypeTag};
