//! Per-bucket canonical, length-limited Huffman codec.
//!
//! A fixed canonical-style table driving bit-packed encode/decode, built
//! fresh per bucket from that bucket's own empirical value distribution
//! rather than once globally, with an explicit staged decode path. The
//! code is additionally length-limited (package-merge) since the GF(2)
//! system's row width is bounded at `L_b <= 32`.
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::hash::Hash;

/// Hard cap on a bucket's Huffman code length.
pub const MAX_CODE_LENGTH: u8 = 32;

/// Above this many bits a direct `2^L_b`-entry decode table would be too
/// large to build per bucket; switch to the length-by-length staged decode
/// path instead.
const DIRECT_TABLE_MAX_BITS: u8 = 16;

/// One node in a package-merge level: either an original symbol (a "coin")
/// or the fusion of two nodes from the previous level, referenced by index
/// rather than by a copy of their contents. Walking the `Package` links
/// back to `Leaf`s is how lengths get recovered without every node
/// carrying a full per-symbol membership vector.
#[derive(Clone, Copy)]
enum Node {
    Leaf(u32),
    Package(u32, u32),
}

#[derive(Clone, Copy)]
struct Item {
    weight: u64,
    node: Node,
}

/// Merges two weight-ascending lists, keeping only the first `limit`
/// results — the standard "boundary" trick: entries past `limit` can never
/// be selected by the final top-`2n-2` cut, so there's no reason to keep
/// merging them.
fn merge_by_weight(a: &[Item], b: &[Item], limit: usize) -> Vec<Item> {
    let mut out = Vec::with_capacity(limit.min(a.len() + b.len()));
    let (mut i, mut j) = (0usize, 0usize);
    while out.len() < limit && (i < a.len() || j < b.len()) {
        let take_a = match (a.get(i), b.get(j)) {
            (Some(x), Some(y)) => x.weight <= y.weight,
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => break,
        };
        if take_a {
            out.push(a[i]);
            i += 1;
        } else {
            out.push(b[j]);
            j += 1;
        }
    }
    out
}

/// Walks a selected top-level node back down to its constituent leaves,
/// incrementing each one's length by one. Each node in the package-merge
/// forest is referenced by exactly one parent (every level partitions its
/// predecessor into disjoint consecutive pairs), so this never revisits a
/// node twice and the whole pass costs `O(n)` per level.
fn expand(item: &Item, levels: &[Vec<Item>], level_idx: usize, lengths: &mut [u32]) {
    match item.node {
        Node::Leaf(i) => lengths[i as usize] += 1,
        Node::Package(l, r) => {
            let prev = &levels[level_idx - 1];
            expand(&prev[l as usize], levels, level_idx - 1, lengths);
            expand(&prev[r as usize], levels, level_idx - 1, lengths);
        }
    }
}

/// Length-limited code lengths via package-merge (the Larmore-Hirschberg
/// "coin collector" construction), which is the standard way to get an
/// *optimal* code subject to a maximum length — plain Huffman followed by
/// ad hoc length-clamping is not optimal and can violate the Kraft
/// inequality.
///
/// `freqs[i]` is the occurrence count of symbol `i`; returns one length per
/// symbol, `1 <= length <= max_len`, satisfying Kraft's inequality with
/// equality where possible. Runs in `O(n * max_len)` time and space via the
/// boundary package-merge formulation: each level keeps at most `2n-2`
/// items, and packages reference their two parents by index into the
/// previous level instead of carrying a full per-symbol count vector.
fn package_merge(freqs: &[u64], max_len: u8) -> Vec<u8> {
    let n = freqs.len();
    debug_assert!(n >= 2);
    let max_len = max_len as usize;
    let limit = 2 * n - 2;

    let mut leaves: Vec<Item> =
        (0..n).map(|i| Item { weight: freqs[i], node: Node::Leaf(i as u32) }).collect();
    leaves.sort_by(|a, b| a.weight.cmp(&b.weight));

    // `levels[t]` is the depth-`t+1` coin list: the merge of `leaves` with
    // packages formed from adjacent pairs of `levels[t-1]`. `levels[0]` is
    // just the sorted leaves themselves (depth 1 has no packages yet).
    let mut levels: Vec<Vec<Item>> = Vec::with_capacity(max_len);
    levels.push(leaves.clone());

    for _ in 2..=max_len {
        let prev = &levels[levels.len() - 1];
        let mut packages = Vec::with_capacity(prev.len() / 2);
        let mut i = 0;
        while i + 1 < prev.len() {
            packages.push(Item {
                weight: prev[i].weight + prev[i + 1].weight,
                node: Node::Package(i as u32, i as u32 + 1),
            });
            i += 2;
        }
        let merged = merge_by_weight(&packages, &leaves, limit);
        levels.push(merged);
    }

    let last = &levels[levels.len() - 1];
    let take = limit.min(last.len());
    let last_idx = levels.len() - 1;

    let mut lengths = vec![0u32; n];
    for item in &levels[last_idx][..take] {
        expand(item, &levels, last_idx, &mut lengths);
    }
    lengths.iter().map(|&l| l.max(1).min(max_len as u32) as u8).collect()
}

/// Assigns canonical codes given per-symbol lengths: sort by `(length,
/// index)`, walk in order, shifting the running code left whenever the
/// length increases and incrementing after each assignment. Standard
/// canonical-Huffman code assignment (the same scheme DEFLATE's dynamic
/// Huffman tables use).
fn canonical_codes(lengths: &[u8]) -> Vec<u32> {
    let mut order: Vec<usize> = (0..lengths.len()).collect();
    order.sort_by_key(|&i| (lengths[i], i));

    let mut codes = vec![0u32; lengths.len()];
    let mut code: u32 = 0;
    let mut prev_len = 0u8;
    for &i in &order {
        let len = lengths[i];
        if prev_len != 0 {
            code <<= len - prev_len;
        }
        codes[i] = code;
        code += 1;
        prev_len = len;
    }
    codes
}

/// Per-bucket canonical Huffman codebook over a concrete value type `V`.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone)]
pub struct Codebook<V> {
    /// Distinct values observed in the bucket, sorted ascending by `Ord` for
    /// a deterministic, reproducible symbol ordering.
    symbols: Vec<V>,
    lengths: Vec<u8>,
    codes: Vec<u32>,
    /// `L_b`: 0 for a degenerate single-symbol or zero-symbol bucket (no
    /// system needed).
    code_length: u8,
}

impl<V: Ord + Clone + Hash + Eq> Codebook<V> {
    /// Builds the canonical codebook from a bucket's values (with
    /// repetition — frequency matters).
    pub fn build(values: &[V]) -> Self {
        // A bucket store allocates every bucket slot up front regardless of
        // occupancy, so an empty bucket is representable even though it's
        // vanishingly rare at any reasonable target bucket size. Give it a
        // zero-symbol codebook rather than falling into package-merge with
        // nothing to encode.
        if values.is_empty() {
            return Self { symbols: Vec::new(), lengths: Vec::new(), codes: Vec::new(), code_length: 0 };
        }

        let mut freq: hashbrown::HashMap<V, u64> = hashbrown::HashMap::new();
        for v in values {
            *freq.entry(v.clone()).or_insert(0) += 1;
        }
        let mut symbols: Vec<V> = freq.keys().cloned().collect();
        symbols.sort();
        let counts: Vec<u64> = symbols.iter().map(|s| freq[s]).collect();

        if symbols.len() == 1 {
            return Self { symbols, lengths: vec![0], codes: vec![0], code_length: 0 };
        }

        let lengths = package_merge(&counts, MAX_CODE_LENGTH);
        let codes = canonical_codes(&lengths);
        let code_length = *lengths.iter().max().unwrap_or(&0);
        Self { symbols, lengths, codes, code_length }
    }

    /// Reconstructs a codebook from its serialized `(symbol, length)` pairs,
    /// recomputing canonical codes from lengths alone — canonical codes
    /// don't need their code *values* serialized, only lengths.
    /// `symbols` must already be in the same ascending `Ord` order `build`
    /// produces, since canonical code assignment breaks ties on that order.
    pub fn from_parts(symbols: Vec<V>, lengths: Vec<u8>) -> Self {
        debug_assert_eq!(symbols.len(), lengths.len());
        if symbols.len() == 1 {
            return Self { symbols, lengths: vec![0], codes: vec![0], code_length: 0 };
        }
        let codes = canonical_codes(&lengths);
        let code_length = *lengths.iter().max().unwrap_or(&0);
        Self { symbols, lengths, codes, code_length }
    }

    pub fn code_length(&self) -> u8 {
        self.code_length
    }

    pub fn num_symbols(&self) -> usize {
        self.symbols.len()
    }

    pub fn symbols(&self) -> &[V] {
        &self.symbols
    }

    pub fn lengths(&self) -> &[u8] {
        &self.lengths
    }

    fn symbol_index(&self, v: &V) -> Option<usize> {
        self.symbols.binary_search(v).ok()
    }

    /// The system-row RHS for value `v`: its canonical code, placed in the
    /// *high* `length` bits of an `L_b`-wide field with the remaining low
    /// bits zero, right-padded with zeros to width `L_b`. This is what
    /// makes the fixed-width, length-dispatched decode in
    /// `decode` below well-defined: the first `length` bits of any
    /// `L_b`-bit read are exactly the codeword.
    pub fn rhs_bits(&self, v: &V) -> Option<u64> {
        let idx = self.symbol_index(v)?;
        if self.code_length == 0 {
            return Some(0);
        }
        let len = self.lengths[idx] as u32;
        let code = self.codes[idx] as u64;
        Some(code << (self.code_length as u32 - len))
    }

    pub fn value_at(&self, index: usize) -> Option<&V> {
        self.symbols.get(index)
    }

    /// Decodes an `L_b`-bit window (right-aligned integer, logically
    /// MSB-first within the `L_b`-bit field) to the stored value.
    pub fn decode(&self, window: u64) -> Option<&V> {
        if self.code_length == 0 {
            return self.symbols.first();
        }
        for len in 1..=self.code_length {
            let candidate = (window >> (self.code_length - len)) as u32;
            if let Some(idx) = self.find_by_code(candidate, len) {
                return self.symbols.get(idx);
            }
        }
        None
    }

    fn find_by_code(&self, code: u32, len: u8) -> Option<usize> {
        self.codes
            .iter()
            .zip(self.lengths.iter())
            .position(|(&c, &l)| l == len && c == code)
    }

    /// Builds a direct `2^L_b`-entry decode table, when `L_b` is small
    /// enough that the table fits comfortably in cache. For
    /// larger `L_b`, callers should use `decode` directly (the staged,
    /// length-by-length path), matching the Decoder this produces.
    pub fn build_direct_table(&self) -> Option<Vec<u16>> {
        if self.code_length == 0 || self.code_length > DIRECT_TABLE_MAX_BITS {
            return None;
        }
        let size = 1usize << self.code_length;
        let mut table = vec![u16::MAX; size];
        for (idx, (&code, &len)) in self.codes.iter().zip(self.lengths.iter()).enumerate() {
            if len == 0 {
                continue;
            }
            let shift = self.code_length - len;
            let lo = (code as usize) << shift;
            let hi = lo + (1usize << shift);
            for entry in table[lo..hi].iter_mut() {
                *entry = idx as u16;
            }
        }
        Some(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_bucket_is_zero_symbols() {
        let book: Codebook<u32> = Codebook::build(&[]);
        assert_eq!(book.code_length(), 0);
        assert_eq!(book.num_symbols(), 0);
        assert_eq!(book.value_at(0), None);
        assert_eq!(book.decode(0), None);
    }

    #[test]
    fn single_symbol_is_trivial() {
        let values = vec![5u32; 1000];
        let book = Codebook::build(&values);
        assert_eq!(book.code_length(), 0);
        assert_eq!(book.rhs_bits(&5u32), Some(0));
    }

    #[test]
    fn roundtrip_small_alphabet() {
        let mut values = Vec::new();
        for _ in 0..500 {
            values.push(0u32);
        }
        for _ in 0..300 {
            values.push(1u32);
        }
        for _ in 0..150 {
            values.push(2u32);
        }
        for _ in 0..50 {
            values.push(3u32);
        }
        let book = Codebook::build(&values);
        assert!(book.code_length() > 0 && book.code_length() <= MAX_CODE_LENGTH);

        for v in [0u32, 1, 2, 3] {
            let rhs = book.rhs_bits(&v).unwrap();
            let decoded = book.decode(rhs).unwrap();
            assert_eq!(*decoded, v);
        }
    }

    #[test]
    fn length_limited_respects_cap() {
        // Skewed Zipf-like distribution over many symbols, forcing what
        // would be a very deep Huffman tree without length limiting.
        let mut freqs = Vec::new();
        for i in 0..2000u64 {
            freqs.push(1 + i / 500); // mostly weight-1 symbols
        }
        let values: Vec<u32> = freqs
            .iter()
            .enumerate()
            .flat_map(|(i, &f)| std::iter::repeat(i as u32).take(f as usize))
            .collect();
        let book = Codebook::build(&values);
        assert!(book.code_length() <= MAX_CODE_LENGTH);
        for v in 0..2000u32 {
            let rhs = book.rhs_bits(&v).unwrap();
            let decoded = book.decode(rhs).unwrap();
            assert_eq!(*decoded, v);
        }
    }

    #[test]
    fn direct_table_matches_staged_decode() {
        let mut values = Vec::new();
        for i in 0..40u32 {
            for _ in 0..(i + 1) {
                values.push(i);
            }
        }
        let book = Codebook::build(&values);
        if let Some(table) = book.build_direct_table() {
            for v in 0..40u32 {
                let rhs = book.rhs_bits(&v).unwrap();
                let staged = book.decode(rhs).unwrap();
                let direct = &book.symbols[table[rhs as usize] as usize];
                assert_eq!(staged, direct);
            }
        }
    }
}
