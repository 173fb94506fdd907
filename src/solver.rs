//! Three-phase per-bucket solver: hypergraph peeling, lazy Gaussian
//! elimination on the 2-core, dense Gaussian elimination on the residual.
//!
//! Phase 1 is a 3-regular hypergraph peel: CSR adjacency built from parallel
//! `h0/h1/h2` arrays, a degree array, a queue of degree-1 vertices, and a
//! `Peel{edge, pivot}` stack recording removal order for back-substitution,
//! generalized from single-bit modular assignment to `L_b`-bit XOR
//! assignment. Phases 2 and 3 handle the residual 2-core a pure peel leaves
//! behind at the tighter expansion factor this crate targets — built fresh
//! here, in the same array-oriented, explicit-degree-tracking style as
//! phase 1. Row/variable incidence is kept in `BTreeMap`/`BTreeSet` rather
//! than a hashed map: at this crate's delta the 2-core is rarely empty, so
//! which variables end up "idle" (substituted) versus pivots in the dense
//! block is decided by iteration order, and that order has to be a pure
//! function of the variable id, not of a hasher's per-process seed, for the
//! build to be deterministic.

use crate::bitarray::BitArray;
use crate::system::{LinearSystem, Row};
use hashbrown::HashMap;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug)]
pub enum SolveError {
    /// A phase detected the system has no solution under this seed
    /// (non-zero residual after reduction). The caller should re-seed and
    /// rebuild the system.
    Unsolvable,
}

/// One peeled edge: which row, and which of its three endpoints (0/1/2) was
/// the unique (degree-1) variable at the moment it was peeled.
#[derive(Clone, Copy, Debug)]
pub struct PeelRecord {
    pub row: u32,
    pub pivot: u8,
}

/// Result of running the peeling phase alone over a 3-uniform hypergraph on
/// `m` vertices. `order` lists peeled edges in the order they were removed
/// (reverse order is the correct back-substitution order); `removed_row[i]`
/// tells whether row `i` was peeled at all — rows left unpeeled form the
/// residual 2-core.
pub struct PeelResult {
    pub order: Vec<PeelRecord>,
    pub removed_row: Vec<bool>,
}

/// Peels a 3-uniform hypergraph: repeatedly remove an edge incident to a
/// degree-1 vertex, recording it and decrementing its other two endpoints'
/// degree, until no degree-1 vertex remains. Shared by the CSF solver's
/// phase 1 and the XOR/Binary-Fuse filter builders — all three need exactly
/// this "3-regular hypergraph, degree array, queue of degree-1 vertices,
/// reverse-order assignment" procedure.
pub fn peel_hypergraph(m: usize, edges: &[(u32, u32, u32)]) -> PeelResult {
    let n = edges.len();
    let mut degree = vec![0u32; m];
    for &(h0, h1, h2) in edges {
        degree[h0 as usize] += 1;
        degree[h1 as usize] += 1;
        degree[h2 as usize] += 1;
    }

    let mut offsets = vec![0u32; m + 1];
    for v in 0..m {
        offsets[v + 1] = offsets[v] + degree[v];
    }
    let mut cursor = offsets.clone();
    let mut adjacency = vec![0u32; offsets[m] as usize];
    for (ri, &(h0, h1, h2)) in edges.iter().enumerate() {
        for v in [h0, h1, h2] {
            let slot = cursor[v as usize];
            adjacency[slot as usize] = ri as u32;
            cursor[v as usize] = slot + 1;
        }
    }

    let mut live_degree = degree.clone();
    let mut removed_row = vec![false; n];
    let mut queue: Vec<u32> = (0..m as u32).filter(|&v| live_degree[v as usize] == 1).collect();
    let mut qh = 0usize;
    let mut order: Vec<PeelRecord> = Vec::with_capacity(n);

    while qh < queue.len() {
        let v = queue[qh];
        qh += 1;
        if live_degree[v as usize] != 1 {
            continue;
        }
        let start = offsets[v as usize] as usize;
        let end = offsets[v as usize + 1] as usize;
        let incident: Vec<u32> = adjacency[start..end]
            .iter()
            .copied()
            .filter(|&r| !removed_row[r as usize])
            .collect();
        for r in incident {
            if removed_row[r as usize] || live_degree[v as usize] == 0 {
                continue;
            }
            let (h0, h1, h2) = edges[r as usize];
            let pivot = if live_degree[h0 as usize] == 1 {
                0u8
            } else if live_degree[h1 as usize] == 1 {
                1u8
            } else if live_degree[h2 as usize] == 1 {
                2u8
            } else {
                continue;
            };
            removed_row[r as usize] = true;
            order.push(PeelRecord { row: r, pivot });
            let others = match pivot {
                0 => [h1, h2],
                1 => [h0, h2],
                _ => [h0, h1],
            };
            for o in others {
                let d = &mut live_degree[o as usize];
                if *d > 0 {
                    *d -= 1;
                    if *d == 1 {
                        queue.push(o);
                    }
                }
            }
        }
    }

    PeelResult { order, removed_row }
}

struct LazyRecord {
    var: u32,
    /// The other variables in `var`'s defining row at the time of
    /// elimination, and that row's (possibly already-substituted) RHS.
    other_vars: Vec<u32>,
    rhs: u64,
}

/// Solves one bucket's linear system, returning the bucket's local solution
/// vector `x_b` (width `m * code_length` bits) or `SolveError::Unsolvable`
/// if this seed's system has no solution (in which case the caller should
/// re-derive the system under a new seed and retry, bounded by
/// `rehash_limit`).
pub fn solve(system: &LinearSystem) -> Result<BitArray, SolveError> {
    let m = system.m as usize;
    let l = system.code_length as u32;

    // ---- Phase 1: hypergraph peeling ----------------------------------
    let edges: Vec<(u32, u32, u32)> = system.rows.iter().map(|r| (r.h0, r.h1, r.h2)).collect();
    let PeelResult { order: peel_stack, removed_row } = peel_hypergraph(m, &edges);

    // ---- Phase 2: lazy Gaussian elimination on the 2-core --------------
    // Active rows are every row not yet peeled. Represent each active row's
    // variable set as a sorted Vec (fill-in keeps these small in practice);
    // `var_rows` is the reverse incidence used to find degree-2 variables.
    let mut row_vars: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
    let mut row_rhs: BTreeMap<u32, u64> = BTreeMap::new();
    let mut var_rows: BTreeMap<u32, BTreeSet<u32>> = BTreeMap::new();

    for (ri, row) in system.rows.iter().enumerate() {
        if removed_row[ri] {
            continue;
        }
        let ri = ri as u32;
        let vars = vec![row.h0, row.h1, row.h2];
        for &v in &vars {
            var_rows.entry(v).or_default().insert(ri);
        }
        row_vars.insert(ri, vars);
        row_rhs.insert(ri, row.rhs);
    }

    let mut lazy_stack: Vec<LazyRecord> = Vec::new();
    // Variables with exactly one incident active row after phase 1 are
    // genuinely unconstrained except by that row and can't be the "idle"
    // pivot here (phase 1 already exhausted degree-1 vertices); candidates
    // are variables with degree exactly 2.
    let mut idle_candidates: Vec<u32> = var_rows
        .iter()
        .filter(|(_, rows)| rows.len() == 2)
        .map(|(&v, _)| v)
        .collect();

    loop {
        // Refill candidate list lazily; cheap relative to bucket size.
        idle_candidates.retain(|v| var_rows.get(v).map(|r| r.len()) == Some(2));
        if idle_candidates.is_empty() {
            idle_candidates = var_rows
                .iter()
                .filter(|(_, rows)| rows.len() == 2)
                .map(|(&v, _)| v)
                .collect();
        }
        let Some(v) = idle_candidates.pop() else { break };
        let Some(rows_of_v) = var_rows.get(&v).cloned() else { continue };
        if rows_of_v.len() != 2 {
            continue;
        }
        let mut it = rows_of_v.into_iter();
        let r_a = it.next().unwrap();
        let r_b = it.next().unwrap();

        // Eliminate using whichever row has fewer other variables, to
        // minimize fill-in in the substitution target.
        let (def_row, other_row) = if row_vars[&r_a].len() <= row_vars[&r_b].len() {
            (r_a, r_b)
        } else {
            (r_b, r_a)
        };

        let def_vars = row_vars.remove(&def_row).unwrap();
        let def_rhs = row_rhs.remove(&def_row).unwrap();
        let other_vars_for_v: Vec<u32> = def_vars.iter().copied().filter(|&x| x != v).collect();

        // Remove def_row from incidence of all its variables.
        for &dv in &def_vars {
            if let Some(set) = var_rows.get_mut(&dv) {
                set.remove(&def_row);
            }
        }

        lazy_stack.push(LazyRecord { var: v, other_vars: other_vars_for_v, rhs: def_rhs });

        // Substitute v out of other_row: symmetric difference of variable
        // sets, XOR of RHS.
        let other_vars = row_vars.remove(&other_row).unwrap();
        let other_rhs = row_rhs.remove(&other_row).unwrap();
        for &dv in &other_vars {
            if let Some(set) = var_rows.get_mut(&dv) {
                set.remove(&other_row);
            }
        }

        let mut merged: Vec<u32> = Vec::with_capacity(other_vars.len() + def_vars.len());
        let mut counts: HashMap<u32, u32> = HashMap::new();
        for &x in other_vars.iter().chain(def_vars.iter()) {
            *counts.entry(x).or_insert(0) += 1;
        }
        for (&x, &c) in &counts {
            if c % 2 == 1 {
                merged.push(x);
            }
        }
        merged.sort_unstable();
        let merged_rhs = other_rhs ^ def_rhs;

        if merged.is_empty() {
            if merged_rhs != 0 {
                return Err(SolveError::Unsolvable);
            }
            // Tautological row: drop it, nothing left to solve for it.
            continue;
        }

        for &x in &merged {
            var_rows.entry(x).or_default().insert(other_row);
        }
        row_vars.insert(other_row, merged);
        row_rhs.insert(other_row, merged_rhs);
    }

    // ---- Phase 3: dense Gaussian elimination on the residual -----------
    let mut remaining_rows: Vec<u32> = row_vars.keys().copied().collect();
    remaining_rows.sort_unstable();

    let mut var_set: Vec<u32> = var_rows.keys().copied().collect();
    var_set.sort_unstable();
    let local_index: HashMap<u32, usize> = var_set.iter().enumerate().map(|(i, &v)| (v, i)).collect();
    let k = var_set.len();

    let mut dense_vars: Vec<Vec<bool>> =
        remaining_rows.iter().map(|r| {
            let mut bits = vec![false; k];
            for &v in &row_vars[r] {
                bits[local_index[&v]] = true;
            }
            bits
        }).collect();
    let mut dense_rhs: Vec<u64> = remaining_rows.iter().map(|r| row_rhs[r]).collect();

    let rows_total = dense_vars.len();
    let mut pivot_row_of_col = vec![usize::MAX; k];
    let mut next_free_row = 0usize;
    for col in 0..k {
        if next_free_row >= rows_total {
            break;
        }
        let Some(found) = (next_free_row..rows_total).find(|&r| dense_vars[r][col]) else { continue };
        dense_vars.swap(next_free_row, found);
        dense_rhs.swap(next_free_row, found);
        let pivot = next_free_row;
        pivot_row_of_col[col] = pivot;
        for r in 0..rows_total {
            if r != pivot && dense_vars[r][col] {
                for c in 0..k {
                    dense_vars[r][c] ^= dense_vars[pivot][c];
                }
                dense_rhs[r] ^= dense_rhs[pivot];
            }
        }
        next_free_row += 1;
    }

    for r in next_free_row..rows_total {
        if dense_rhs[r] != 0 || dense_vars[r].iter().any(|&b| b) {
            return Err(SolveError::Unsolvable);
        }
    }

    // ---- Back-substitution ---------------------------------------------
    let mut solved: HashMap<u32, u64> = HashMap::new();
    for (col, &pivot) in pivot_row_of_col.iter().enumerate() {
        if pivot == usize::MAX {
            continue;
        }
        solved.insert(var_set[col], dense_rhs[pivot]);
    }

    for rec in lazy_stack.into_iter().rev() {
        let mut acc = rec.rhs;
        for ov in &rec.other_vars {
            acc ^= *solved.get(ov).unwrap_or(&0);
        }
        solved.insert(rec.var, acc);
    }

    let mut x = BitArray::new(m * l as usize);
    for (v, &val) in &solved {
        x.write_bits(*v as usize * l as usize, l, val).expect("variable offset in range");
    }

    for rec in peel_stack.into_iter().rev() {
        let row = &system.rows[rec.row as usize];
        let (pivot_var, o1, o2) = match rec.pivot {
            0 => (row.h0, row.h1, row.h2),
            1 => (row.h1, row.h0, row.h2),
            _ => (row.h2, row.h0, row.h1),
        };
        let v1 = x.read_bits(o1 as usize * l as usize, l).unwrap_or(0);
        let v2 = x.read_bits(o2 as usize * l as usize, l).unwrap_or(0);
        let value = row.rhs ^ v1 ^ v2;
        x.write_bits(pivot_var as usize * l as usize, l, value).expect("variable offset in range");
        solved.insert(pivot_var, value);
    }

    Ok(x)
}

/// Reads back the `L_b`-bit slice for variable `v` from a solved bucket's
/// `x_b`, defaulting unassigned (never touched by any row) variables to 0.
pub fn read_var(x: &BitArray, v: u32, code_length: u8) -> u64 {
    x.read_bits(v as usize * code_length as usize, code_length as u32).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Codebook;
    use crate::hash::Hash128;

    fn build_and_solve(values: &[u32]) -> (u64, LinearSystem, BitArray) {
        let book = Codebook::build(values);
        let entries: Vec<(u32, u32)> = values.iter().enumerate().map(|(i, &v)| (i as u32, v)).collect();
        for round in 0..32u32 {
            let seed = crate::hash::mix_seed(0x1337, round);
            let sys = LinearSystem::build(seed, &entries, &book, crate::system::DEFAULT_DELTA, |i, s| {
                Hash128::of(format!("key{i}").as_bytes(), s)
            })
            .unwrap();
            match solve(&sys) {
                Ok(x) => return (seed, sys, x),
                Err(SolveError::Unsolvable) => continue,
            }
        }
        panic!("solver did not converge in 32 rounds");
    }

    fn query(sys: &LinearSystem, x: &BitArray, key_index: u32, seed: u64) -> u64 {
        let h = Hash128::of(format!("key{key_index}").as_bytes(), seed);
        let (h0, h1, h2) = h.edges(sys.m);
        read_var(x, h0, sys.code_length) ^ read_var(x, h1, sys.code_length) ^ read_var(x, h2, sys.code_length)
    }

    #[test]
    fn solves_small_bucket_with_few_symbols() {
        let values: Vec<u32> = (0..300).map(|i| i % 4).collect();
        let (seed, sys, x) = build_and_solve(&values);
        let book = Codebook::build(&values);
        for (i, &v) in values.iter().enumerate() {
            let window = query(&sys, &x, i as u32, seed);
            let decoded = book.decode(window).copied().unwrap();
            assert_eq!(decoded, v);
        }
    }

    #[test]
    fn solves_larger_bucket_with_many_symbols() {
        let values: Vec<u32> = (0..4000).map(|i| (i % 60) as u32).collect();
        let (seed, sys, x) = build_and_solve(&values);
        let book = Codebook::build(&values);
        for (i, &v) in values.iter().enumerate() {
            let window = query(&sys, &x, i as u32, seed);
            let decoded = book.decode(window).copied().unwrap();
            assert_eq!(decoded, v);
        }
    }
}
