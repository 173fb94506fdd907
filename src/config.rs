//! Build-time configuration shared by `Csf::build` and `MultisetCsf::build`.
//!
//! A plain struct of tunable knobs with a documented `Default`, passed by
//! value into the build entry point rather than threaded through as loose
//! parameters. Covers both the genuinely open tuning knobs (`delta`,
//! `target_bucket_size`) and the constructor options a caller picks
//! explicitly (`prefilter`, `permute`, `max_to_infer`, `verbose`).

use crate::filter::PrefilterSpec;
use crate::system::DEFAULT_DELTA;

/// Deterministic default master hasher seed, so a caller who doesn't care
/// can still get byte-identical builds across runs without picking one.
pub const DEFAULT_HASHER_SEED: u64 = 0x1337;

/// Default per-bucket/per-filter seed-retry bound.
pub const DEFAULT_REHASH_LIMIT: u32 = 32;

#[derive(Debug, Clone)]
pub struct BuildConfig {
    /// Master hasher seed. Build is a pure function of `(keys, values,
    /// config)`, so fixing this is what makes two runs byte-identical.
    pub hasher_seed: u64,
    /// Ribbon-style peeling expansion factor `delta`. Reference sources
    /// disagree between `1.10` and `delta = 1.089`; caramel defaults to
    /// the more conservative `1.10` — see DESIGN.md.
    pub delta: f64,
    /// Target mean bucket size. Default `1000.0`.
    pub target_bucket_size: f64,
    /// Bound on a bucket's (or a filter's) seed-retry loop before surfacing
    /// `SolverExhausted`/`FilterExhausted`.
    pub rehash_limit: u32,
    /// AMQ prefilter to build over the minority key set, if any.
    pub prefilter: PrefilterSpec,
    /// Multiset-only: request column permutation to place least-entropic
    /// columns first. Ignored by the scalar `Csf::build`.
    pub permute: bool,
    /// Cap on the number of elements examined when a caller auto-dispatches
    /// on a value iterator's runtime type. Not consulted by
    /// `Csf::build`/`MultisetCsf::build` themselves — those are already
    /// monomorphic in `V` — but carried through so a dynamic dispatcher
    /// built on top of this crate has a place to read it from.
    pub max_to_infer: Option<usize>,
    /// Emit human-readable progress via `println!`, independent of the
    /// structured `log` diagnostics that fire regardless of this flag.
    pub verbose: bool,
    /// Use a bounded rayon worker pool across buckets when the `parallel`
    /// feature is enabled. Ignored (falls back to sequential) when the
    /// feature is off.
    pub parallel: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            hasher_seed: DEFAULT_HASHER_SEED,
            delta: DEFAULT_DELTA,
            target_bucket_size: crate::bucket::DEFAULT_TARGET_BUCKET_SIZE,
            rehash_limit: DEFAULT_REHASH_LIMIT,
            prefilter: PrefilterSpec::None,
            permute: false,
            max_to_infer: None,
            verbose: false,
            parallel: true,
        }
    }
}

impl BuildConfig {
    /// Applies the CPU-detected defaults from `cpu::CpuFeatures` on top of
    /// `BuildConfig::default()` — cache-aware `target_bucket_size` and
    /// whether a rayon pool is worth spinning up for this machine.
    pub fn auto() -> Self {
        crate::cpu::detect_features().optimal_config()
    }
}
