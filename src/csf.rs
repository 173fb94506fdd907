//! Top-level CSF orchestrator: the scalar `Csf<V>`.
//!
//! Build control flow: hash every key once under the master seed, check for
//! a 128-bit collision across the *whole* input (`KeyCollision` covers the
//! full key set, independent of any prefilter split) → optionally pick a
//! majority value and split into majority/minority sets, building an AMQ
//! prefilter over the minority hashes → bucket the effective (minority, or
//! full) key set → per bucket: build a codebook, then retry-solve a GF(2)
//! system → concatenate every bucket's solution into one global `S` at
//! precomputed offsets. Query reverses this: hash → filter decision →
//! bucket → three `S` reads → XOR → Huffman decode.
//!
//! Collect once, validate, loop with bounded retries, return a sealed
//! immutable struct — the build flattens into "bucket, then codec+solve
//! per bucket, then filter-wrap" but keeps that
//! validate-once/retry-bounded/return-sealed shape throughout.

use hashbrown::HashMap;
use std::hash::Hash;

use crate::bitarray::BitArray;
use crate::bucket::BucketedHashStore;
use crate::codec::Codebook;
use crate::config::BuildConfig;
use crate::error::{CaramelError, Result};
use crate::filter::{FilterDecision, Prefilter};
use crate::hash::Hash128;
use crate::serialize::{self, Reader, Writer};
use crate::solver::{self, SolveError};
use crate::stats::{BucketStats, CsfStats, FilterStats, HuffmanStats};
use crate::system::{self, LinearSystem};
use crate::value::CsfValue;

/// Per-bucket metadata: where its solution lives in the global `S`, the
/// seed that solved its system (needed to re-derive `(h0, h1, h2)` at query
/// time, so it must be stored alongside the offset and codebook), and its
/// codebook.
#[derive(Debug, Clone)]
pub struct BucketDescriptor<V> {
    pub start_offset: u64,
    pub seed: u64,
    pub codebook: Codebook<V>,
}

/// A built, queryable Compressed Static Function over values of type `V`.
#[derive(Debug, Clone)]
pub struct Csf<V> {
    hasher_seed: u64,
    bucket_bits: u32,
    buckets: Vec<BucketDescriptor<V>>,
    s: BitArray,
    filter: Option<Prefilter>,
    majority_value: Option<V>,
}

/// A bucket's precomputed plan, ready to solve: its member keys (as global
/// indices paired with their values) and the codebook those values produced.
struct BucketPlan<V> {
    entries: Vec<(u32, V)>,
    codebook: Codebook<V>,
}

impl<V: CsfValue> Csf<V> {
    /// Builds a CSF mapping `keys[i] -> values[i]` for every `i`, per
    /// `config`'s constructor options.
    pub fn build<K: AsRef<[u8]> + Sync>(keys: &[K], values: &[V], config: &BuildConfig) -> Result<Self> {
        if keys.is_empty() || values.is_empty() {
            return Err(CaramelError::EmptyInput);
        }
        if keys.len() != values.len() {
            return Err(CaramelError::LengthMismatch { keys: keys.len(), values: values.len() });
        }
        let n = keys.len();

        let master_hashes: Vec<Hash128> = keys.iter().map(|k| Hash128::of(k.as_ref(), config.hasher_seed)).collect();
        detect_global_collisions(&master_hashes)?;

        // Computed unconditionally, not just when a prefilter is configured:
        // besides feeding the filter's majority decision, it's the fallback
        // value for the zero-key bucket a sparse, high-`bucket_bits` build
        // can allocate (`BucketedHashStore` sizes every bucket slot up
        // front regardless of occupancy), so an out-of-set query landing in
        // one never has to panic.
        let majority_value = select_majority_value(values);

        let (effective_indices, minority_hashes, majority_hashes) = match config.prefilter {
            crate::filter::PrefilterSpec::None => ((0..n as u32).collect::<Vec<u32>>(), Vec::new(), Vec::new()),
            _ => {
                let mut minority_idx = Vec::new();
                let mut minority_h = Vec::new();
                let mut majority_h = Vec::new();
                for i in 0..n {
                    if values[i] == majority_value {
                        majority_h.push(master_hashes[i]);
                    } else {
                        minority_idx.push(i as u32);
                        minority_h.push(master_hashes[i]);
                    }
                }
                (minority_idx, minority_h, majority_h)
            }
        };

        let filter = Prefilter::build(config.prefilter, &minority_hashes, &majority_hashes, config.rehash_limit)?;

        if config.verbose {
            println!(
                "caramel: {} keys, {} in minority set, prefilter={}",
                n,
                effective_indices.len(),
                !matches!(config.prefilter, crate::filter::PrefilterSpec::None)
            );
        }

        if effective_indices.is_empty() {
            // Every key is the majority value; the filter alone resolves
            // every query and no CSF body is needed.
            return Ok(Self {
                hasher_seed: config.hasher_seed,
                bucket_bits: 0,
                buckets: Vec::new(),
                s: BitArray::new(0),
                filter,
                majority_value: Some(majority_value),
            });
        }

        let store = BucketedHashStore::build(effective_indices.len(), config.hasher_seed, config.target_bucket_size, |local_i| {
            master_hashes[effective_indices[local_i] as usize]
        })?;
        let bucket_bits = store.bucket_bits;

        // Phase A: per-bucket codebook + width, sequential (cheap, and
        // needed up front to precompute every bucket's offset into `S`).
        let mut plans: Vec<BucketPlan<V>> = Vec::with_capacity(store.buckets.len());
        for bucket in &store.buckets {
            let entries: Vec<(u32, V)> = bucket
                .iter()
                .map(|e| {
                    let global = effective_indices[e.value_index as usize];
                    (global, values[global as usize].clone())
                })
                .collect();
            let vals: Vec<V> = entries.iter().map(|(_, v)| v.clone()).collect();
            let codebook = Codebook::build(&vals);
            plans.push(BucketPlan { entries, codebook });
        }

        let widths: Vec<u32> = plans
            .iter()
            .map(|p| system::compute_m(p.entries.len(), p.codebook.code_length(), config.delta))
            .collect();
        let mut offsets: Vec<u64> = Vec::with_capacity(plans.len());
        let mut cursor = 0u64;
        for (plan, &m) in plans.iter().zip(widths.iter()) {
            offsets.push(cursor);
            cursor += m as u64 * plan.codebook.code_length() as u64;
        }
        let total_bits = cursor as usize;

        // Phase B: per-bucket solve (parallel over the rayon pool when
        // enabled).
        let solved = solve_all_buckets(keys, &plans, config);

        let mut s = BitArray::new(total_bits);
        let mut buckets = Vec::with_capacity(plans.len());
        for (bucket_id, (plan, result)) in plans.into_iter().zip(solved.into_iter()).enumerate() {
            let (seed, x) = result?;
            if plan.codebook.code_length() > 0 {
                s.copy_range(offsets[bucket_id] as usize, &x, 0, x.len())?;
            }
            buckets.push(BucketDescriptor { start_offset: offsets[bucket_id], seed, codebook: plan.codebook });
        }

        Ok(Self { hasher_seed: config.hasher_seed, bucket_bits, buckets, s, filter, majority_value: Some(majority_value) })
    }

    /// Maps `key` back to its stored value. Keys outside the original input
    /// set return a defined but meaningless value.
    pub fn query(&self, key: &[u8]) -> V {
        if let Some(filter) = &self.filter {
            let h = Hash128::of(key, self.hasher_seed);
            if let FilterDecision::Majority = filter.contains(&h) {
                return self.majority_value.clone().expect("filter implies a stored majority value");
            }
        }
        if self.buckets.is_empty() {
            return self
                .majority_value
                .clone()
                .expect("an empty CSF body is only valid when the filter covers every key");
        }
        let h_master = Hash128::of(key, self.hasher_seed);
        let bucket_id = h_master.bucket_id(self.bucket_bits) as usize;
        let desc = &self.buckets[bucket_id];
        let l = desc.codebook.code_length();
        if l == 0 {
            // A single-symbol bucket decodes to that symbol directly. A
            // zero-symbol bucket (an allocated-but-empty slot; see
            // `Codebook::build`) has nothing to decode to, so fall back to
            // the global majority value rather than panicking on an
            // out-of-set query that happens to land there.
            if let Some(v) = desc.codebook.value_at(0) {
                return v.clone();
            }
            return self
                .majority_value
                .clone()
                .expect("majority_value is always populated once any bucket exists");
        }
        let m = self.bucket_m(bucket_id);
        let h_bucket = Hash128::of(key, desc.seed);
        let (h0, h1, h2) = h_bucket.edges(m);
        let base = desc.start_offset as usize;
        let l32 = l as u32;
        let window = self.s.read_bits(base + h0 as usize * l as usize, l32).unwrap_or(0)
            ^ self.s.read_bits(base + h1 as usize * l as usize, l32).unwrap_or(0)
            ^ self.s.read_bits(base + h2 as usize * l as usize, l32).unwrap_or(0);
        desc.codebook.decode(window).cloned().expect("window always decodes to a stored symbol")
    }

    fn bucket_m(&self, idx: usize) -> u32 {
        let l = self.buckets[idx].codebook.code_length() as u64;
        if l == 0 {
            return 0;
        }
        let start = self.buckets[idx].start_offset;
        let end = if idx + 1 < self.buckets.len() { self.buckets[idx + 1].start_offset } else { self.s.len() as u64 };
        ((end - start) / l) as u32
    }

    pub fn get_stats(&self) -> CsfStats {
        let solution_bytes = self.s.len().div_ceil(8);
        let filter_bytes = self.filter.as_ref().map(|f| f.size_bits().div_ceil(8)).unwrap_or(0);

        let mut num_unique_symbols = 0usize;
        let mut max_code_length = 0u8;
        let mut total_code_bits = 0u64;
        let mut total_symbols = 0u64;
        let mut histogram: Vec<u64> = Vec::new();
        let mut metadata_bytes = 0usize;
        let mut min_bits = u64::MAX;
        let mut max_bits = 0u64;
        let mut sum_bits = 0u64;

        for (idx, desc) in self.buckets.iter().enumerate() {
            num_unique_symbols += desc.codebook.num_symbols();
            max_code_length = max_code_length.max(desc.codebook.code_length());
            for &len in desc.codebook.lengths() {
                total_code_bits += len as u64;
                total_symbols += 1;
                if histogram.len() <= len as usize {
                    histogram.resize(len as usize + 1, 0);
                }
                histogram[len as usize] += 1;
            }
            metadata_bytes += 8 + 8 + 1 + codebook_blob_len(desc);
            let m = self.bucket_m(idx);
            let bits = m as u64 * desc.codebook.code_length() as u64;
            min_bits = min_bits.min(bits);
            max_bits = max_bits.max(bits);
            sum_bits += bits;
        }
        if self.buckets.is_empty() {
            min_bits = 0;
        }

        let filter_stats = self.filter.as_ref().map(filter_stats_of);

        CsfStats {
            in_memory_bytes: solution_bytes + filter_bytes + metadata_bytes,
            solution_bytes,
            filter_bytes,
            metadata_bytes,
            huffman_stats: HuffmanStats {
                num_unique_symbols,
                max_code_length,
                avg_bits_per_symbol: if total_symbols > 0 { total_code_bits as f64 / total_symbols as f64 } else { 0.0 },
                code_length_histogram: histogram,
            },
            bucket_stats: BucketStats {
                num_buckets: self.buckets.len(),
                min_solution_bits: min_bits,
                avg_solution_bits: if self.buckets.is_empty() { 0.0 } else { sum_bits as f64 / self.buckets.len() as f64 },
                max_solution_bits: max_bits,
            },
            filter_stats,
        }
    }

    pub fn save_bytes(&self) -> Vec<u8> {
        let mut w = Writer::new();
        serialize::write_header(&mut w, V::TAG, self.hasher_seed, self.buckets.len() as u32);
        for b in &self.buckets {
            w.u64(b.start_offset);
            w.u64(b.seed);
            serialize::write_codebook(&mut w, &b.codebook);
        }
        serialize::write_bitarray(&mut w, &self.s);
        serialize::write_filter(&mut w, &self.filter);
        serialize::write_majority(&mut w, &self.majority_value);
        w.buf
    }

    pub fn save(&self, path: impl AsRef<std::path::Path>) -> Result<()> {
        std::fs::write(path, self.save_bytes())?;
        Ok(())
    }

    pub fn load_bytes(bytes: &[u8]) -> Result<Self> {
        let mut r = Reader::new(bytes);
        let (hasher_seed, bucket_count) = serialize::read_header(&mut r, V::TAG)?;
        let mut buckets = Vec::with_capacity(bucket_count as usize);
        for _ in 0..bucket_count {
            let start_offset = r.u64()?;
            let seed = r.u64()?;
            let codebook = serialize::read_codebook::<V>(&mut r)?;
            buckets.push(BucketDescriptor { start_offset, seed, codebook });
        }
        let s = serialize::read_bitarray(&mut r)?;
        let filter = serialize::read_filter(&mut r)?;
        let majority_value = serialize::read_majority::<V>(&mut r)?;
        let bucket_bits = if buckets.is_empty() { 0 } else { (buckets.len() as u64).trailing_zeros() };
        Ok(Self { hasher_seed, bucket_bits, buckets, s, filter, majority_value })
    }

    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::load_bytes(&bytes)
    }
}

/// Post-query transformation for fixed-length byte-string values: trims
/// trailing zero padding and lossily decodes the rest as UTF-8. A thin
/// wrapper around the CSF's byte-level output, not part of the core query
/// contract.
fn bytes_to_str(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

impl Csf<[u8; 10]> {
    pub fn query_str(&self, key: &[u8]) -> String {
        bytes_to_str(&self.query(key))
    }
}

impl Csf<[u8; 12]> {
    pub fn query_str(&self, key: &[u8]) -> String {
        bytes_to_str(&self.query(key))
    }
}

fn codebook_blob_len<V: CsfValue>(desc: &BucketDescriptor<V>) -> usize {
    let mut w = Writer::new();
    serialize::write_codebook(&mut w, &desc.codebook);
    w.buf.len()
}

fn filter_stats_of(f: &Prefilter) -> FilterStats {
    let size_bits = f.size_bits();
    match f {
        Prefilter::Bloom(b) => FilterStats {
            kind: "bloom",
            size_bytes: size_bits.div_ceil(8),
            size_bits,
            num_elements: 0,
            num_hashes: Some(b.num_hashes()),
            fingerprint_bits: None,
        },
        Prefilter::Xor(x) => FilterStats {
            kind: "xor",
            size_bytes: size_bits.div_ceil(8),
            size_bits,
            num_elements: x.num_elements(),
            num_hashes: None,
            fingerprint_bits: Some(x.fingerprint_bits()),
        },
        Prefilter::BinaryFuse(x) => FilterStats {
            kind: "binary_fuse",
            size_bytes: size_bits.div_ceil(8),
            size_bits,
            num_elements: x.num_elements(),
            num_hashes: None,
            fingerprint_bits: Some(x.fingerprint_bits()),
        },
    }
}

fn detect_global_collisions(hashes: &[Hash128]) -> Result<()> {
    let mut seen: HashMap<u128, usize> = HashMap::with_capacity(hashes.len());
    for (i, h) in hashes.iter().enumerate() {
        let full = h.as_u128();
        if let Some(&first) = seen.get(&full) {
            return Err(CaramelError::KeyCollision(first, i));
        }
        seen.insert(full, i);
    }
    Ok(())
}

/// Deterministic majority-value selection: highest frequency, ties broken
/// by the smaller value under `Ord` so the choice doesn't depend on hash
/// iteration order — build must pick the same majority value every run.
fn select_majority_value<V: Clone + Hash + Eq + Ord>(values: &[V]) -> V {
    let mut freq: HashMap<V, u64> = HashMap::new();
    for v in values {
        *freq.entry(v.clone()).or_insert(0) += 1;
    }
    let mut best: Option<(V, u64)> = None;
    for (v, c) in freq {
        best = Some(match best {
            None => (v, c),
            Some((bv, bc)) => {
                if c > bc || (c == bc && v < bv) {
                    (v, c)
                } else {
                    (bv, bc)
                }
            }
        });
    }
    best.expect("values is non-empty").0
}

/// Solves one bucket's system, retrying under freshly-mixed seeds up to
/// `config.rehash_limit` times before giving up on an unsolvable system.
fn solve_one_bucket<K: AsRef<[u8]>, V: CsfValue>(
    keys: &[K],
    bucket_id: usize,
    plan: &BucketPlan<V>,
    config: &BuildConfig,
) -> Result<(u64, BitArray)> {
    if plan.codebook.code_length() == 0 {
        return Ok((0, BitArray::new(0)));
    }
    let base_seed = crate::hash::mix_seed(config.hasher_seed, 0x4000_0000u32.wrapping_add(bucket_id as u32));
    for round in 0..config.rehash_limit {
        let bucket_seed = crate::hash::mix_seed(base_seed, round);
        let system: LinearSystem =
            LinearSystem::build(bucket_seed, &plan.entries, &plan.codebook, config.delta, |idx, seed| {
                Hash128::of(keys[idx as usize].as_ref(), seed)
            })
            .expect("code_length() == 0 already handled above");
        match solver::solve(&system) {
            Ok(x) => return Ok((bucket_seed, x)),
            Err(SolveError::Unsolvable) => {
                log::debug!("bucket {bucket_id}: round {round} unsolvable under seed {bucket_seed:#x}, reseeding");
                continue;
            }
        }
    }
    log::warn!("bucket {bucket_id}: exhausted {} seed retries ({} keys)", config.rehash_limit, plan.entries.len());
    Err(CaramelError::SolverExhausted { bucket: bucket_id, attempts: config.rehash_limit })
}

#[cfg(feature = "parallel")]
fn solve_all_buckets<K: AsRef<[u8]> + Sync, V: CsfValue>(
    keys: &[K],
    plans: &[BucketPlan<V>],
    config: &BuildConfig,
) -> Vec<Result<(u64, BitArray)>> {
    use rayon::prelude::*;
    if config.parallel {
        plans.par_iter().enumerate().map(|(i, plan)| solve_one_bucket(keys, i, plan, config)).collect()
    } else {
        plans.iter().enumerate().map(|(i, plan)| solve_one_bucket(keys, i, plan, config)).collect()
    }
}

#[cfg(not(feature = "parallel"))]
fn solve_all_buckets<K: AsRef<[u8]>, V: CsfValue>(
    keys: &[K],
    plans: &[BucketPlan<V>],
    config: &BuildConfig,
) -> Vec<Result<(u64, BitArray)>> {
    plans.iter().enumerate().map(|(i, plan)| solve_one_bucket(keys, i, plan, config)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BuildConfig;

    fn keys_values(n: usize) -> (Vec<String>, Vec<u32>) {
        let keys: Vec<String> = (0..n).map(|i| format!("key-{i}")).collect();
        let values: Vec<u32> = (0..n).map(|i| (i % 7) as u32).collect();
        (keys, values)
    }

    #[test]
    fn build_and_query_roundtrip() {
        let (keys, values) = keys_values(5_000);
        let config = BuildConfig { parallel: false, ..Default::default() };
        let csf = Csf::build(&keys, &values, &config).unwrap();
        for (k, &v) in keys.iter().zip(values.iter()) {
            assert_eq!(csf.query(k.as_bytes()), v);
        }
    }

    #[test]
    fn degenerate_single_value() {
        let keys: Vec<String> = (0..200).map(|i| format!("k{i}")).collect();
        let values: Vec<u32> = vec![42; 200];
        let config = BuildConfig { parallel: false, ..Default::default() };
        let csf = Csf::build(&keys, &values, &config).unwrap();
        for k in &keys {
            assert_eq!(csf.query(k.as_bytes()), 42);
        }
    }

    #[test]
    fn zero_symbol_bucket_falls_back_to_majority_instead_of_panicking() {
        // A bucket can be allocated with zero member keys (bucket.rs sizes
        // every slot up front, occupancy notwithstanding); its codebook is
        // then the zero-symbol case. Build a `Csf` with exactly that shape
        // by hand and confirm `query` returns the majority value rather
        // than panicking on `Codebook::value_at(0)`.
        let codebook: Codebook<u32> = Codebook::build(&[]);
        assert_eq!(codebook.num_symbols(), 0);
        let csf = Csf {
            hasher_seed: 1,
            bucket_bits: 0,
            buckets: vec![BucketDescriptor { start_offset: 0, seed: 0, codebook }],
            s: BitArray::new(0),
            filter: None,
            majority_value: Some(7u32),
        };
        assert_eq!(csf.query(b"anything"), 7);
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let keys = vec!["same".to_string(), "same".to_string()];
        let values = vec![1u32, 2u32];
        let config = BuildConfig::default();
        let err = Csf::build(&keys, &values, &config).unwrap_err();
        assert!(matches!(err, CaramelError::KeyCollision(0, 1)));
    }

    #[test]
    fn save_load_roundtrip() {
        let (keys, values) = keys_values(2_000);
        let config = BuildConfig { parallel: false, ..Default::default() };
        let csf = Csf::build(&keys, &values, &config).unwrap();
        let bytes = csf.save_bytes();
        let loaded = Csf::<u32>::load_bytes(&bytes).unwrap();
        for (k, &v) in keys.iter().zip(values.iter()) {
            assert_eq!(loaded.query(k.as_bytes()), v);
        }
    }

    #[test]
    fn query_str_trims_padding_on_fixed_length_values() {
        let keys: Vec<String> = (0..100).map(|i| format!("k{i}")).collect();
        let values: Vec<[u8; 10]> = (0..100)
            .map(|i| {
                let mut buf = [0u8; 10];
                let s = format!("v{i}");
                buf[..s.len()].copy_from_slice(s.as_bytes());
                buf
            })
            .collect();
        let config = BuildConfig { parallel: false, ..Default::default() };
        let csf = Csf::build(&keys, &values, &config).unwrap();
        for i in 0..100 {
            assert_eq!(csf.query_str(keys[i].as_bytes()), format!("v{i}"));
        }
    }

    #[test]
    fn prefilter_shrinks_minority_set_and_preserves_correctness() {
        let n = 10_000;
        let keys: Vec<String> = (0..n).map(|i| format!("k{i}")).collect();
        let values: Vec<u32> = (0..n).map(|i| if i % 50 == 0 { 99 } else { (i % 5) as u32 }).collect();
        let config = BuildConfig {
            parallel: false,
            prefilter: crate::filter::PrefilterSpec::Xor { fingerprint_bits: 8 },
            ..Default::default()
        };
        let csf = Csf::build(&keys, &values, &config).unwrap();
        for (k, &v) in keys.iter().zip(values.iter()) {
            assert_eq!(csf.query(k.as_bytes()), v);
        }
    }
}
