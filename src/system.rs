//! GF(2) linear system assembly for one bucket.
//!
//! Each key contributes one row over three hash-derived variables (the
//! same parallel-array edge representation the hypergraph peel in
//! `solver.rs` consumes), generalized from a single-bit unknown to an
//! `L_b`-bit-wide unknown lane carrying a GF(2) right-hand side.

use crate::codec::Codebook;
use crate::hash::Hash128;

/// One row: `x[h0] ^ x[h1] ^ x[h2] = rhs`, where each `x[h]` is an `L_b`-bit
/// slice and `rhs` is the key's Huffman code, right-padded with zeros to
/// `L_b` bits (see `Codebook::rhs_bits`).
#[derive(Clone, Copy, Debug)]
pub struct Row {
    pub h0: u32,
    pub h1: u32,
    pub h2: u32,
    pub rhs: u64,
}

/// A bucket's assembled system: `m` variables, each `code_length` bits wide,
/// one row per key in the bucket.
pub struct LinearSystem {
    pub code_length: u8,
    pub m: u32,
    pub rows: Vec<Row>,
}

/// Ribbon-style peeling expansion factor `delta`. Reference sources
/// disagree between `1.10` and `delta = 1.089`; caramel takes the more
/// conservative (larger) `1.10` as the default so bucket build-failure
/// probability stays comfortably low across the target `N` range, and
/// exposes it as a tunable in `BuildConfig`. See DESIGN.md.
pub const DEFAULT_DELTA: f64 = 1.10;

/// Number of `L_b`-bit column groups backing a bucket's unknown vector:
/// `ceil(delta * n_b)`, rounded up to a multiple of 3 so `Hash128::edges` can
/// split `[0, m)` into three equal thirds. The total *bit* width of the
/// resulting vector is `m * L_b`, computed once here and reused everywhere
/// (`x`'s bit length in `solver::solve`, each bucket's stride into the
/// global `S` in `Csf::build`) rather than re-derived, since multiplying by
/// `code_length` a second time downstream would inflate storage by a
/// further factor of `L_b`. Factored out of `LinearSystem::build` so the
/// top-level builder can precompute every bucket's width (and therefore its
/// offset into the global `S`) before running any solver, via a single-pass
/// prefix sum over bucket sizes.
pub fn compute_m(n_b: usize, code_length: u8, delta: f64) -> u32 {
    if code_length == 0 {
        return 0;
    }
    let raw_m = (delta * n_b as f64).ceil() as u32;
    raw_m.max(3).div_ceil(3) * 3
}

impl LinearSystem {
    /// Builds the system for a bucket of `n_b` keys. `hash_of` maps a
    /// key's global value-index to its 128-bit hash under the bucket's
    /// current seed; `codebook` supplies each value's RHS code.
    ///
    /// Returns `None` for the degenerate single-symbol bucket
    /// (`codebook.code_length() == 0`): no system is needed since every key
    /// decodes to the same value regardless of `x`.
    pub fn build<V, F>(
        bucket_seed: u64,
        entries: &[(u32, V)],
        codebook: &Codebook<V>,
        delta: f64,
        hash_of: F,
    ) -> Option<Self>
    where
        V: Ord + Clone + std::hash::Hash + Eq,
        F: Fn(u32, u64) -> Hash128,
    {
        let code_length = codebook.code_length();
        if code_length == 0 {
            return None;
        }
        let n_b = entries.len();
        let m = compute_m(n_b, code_length, delta);

        let rows = entries
            .iter()
            .map(|(value_index, value)| {
                let h = hash_of(*value_index, bucket_seed);
                let (h0, h1, h2) = h.edges(m);
                let rhs = codebook.rhs_bits(value).expect("value was used to build this codebook");
                Row { h0, h1, h2, rhs }
            })
            .collect();

        Some(Self { code_length, m, rows })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trivial_codebook_yields_no_system() {
        let values = vec![7u32; 50];
        let book = Codebook::build(&values);
        let entries: Vec<(u32, u32)> = (0..50).map(|i| (i, 7u32)).collect();
        let sys = LinearSystem::build(0x1337, &entries, &book, DEFAULT_DELTA, |i, s| {
            Hash128::of(format!("k{i}").as_bytes(), s)
        });
        assert!(sys.is_none());
    }

    #[test]
    fn builds_one_row_per_key() {
        let values: Vec<u32> = (0..200).map(|i| i % 5).collect();
        let book = Codebook::build(&values);
        let entries: Vec<(u32, u32)> = values.iter().enumerate().map(|(i, &v)| (i as u32, v)).collect();
        let sys = LinearSystem::build(0x1337, &entries, &book, DEFAULT_DELTA, |i, s| {
            Hash128::of(format!("k{i}").as_bytes(), s)
        })
        .unwrap();
        assert_eq!(sys.rows.len(), 200);
        assert!(sys.m % 3 == 0);
        for row in &sys.rows {
            assert!(row.h0 < sys.m && row.h1 < sys.m && row.h2 < sys.m);
        }
    }
}
