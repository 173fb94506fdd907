use crate::config::BuildConfig;

/// CPU feature detection and optimal configuration selection
#[derive(Debug, Clone)]
pub struct CpuFeatures {
    pub has_avx2: bool,
    pub has_bmi1: bool,
    pub has_bmi2: bool,
    pub has_popcnt: bool,
    pub has_lzcnt: bool,
    pub has_fma: bool,
    pub has_avx512f: bool,
    pub cache_line_size: usize,
    pub estimated_l3_size_mb: usize,
}

impl CpuFeatures {
    /// Detect available CPU features at runtime
    pub fn detect() -> Self {
        Self {
            has_avx2: Self::check_avx2(),
            has_bmi1: Self::check_bmi1(),
            has_bmi2: Self::check_bmi2(),
            has_popcnt: Self::check_popcnt(),
            has_lzcnt: Self::check_lzcnt(),
            has_fma: Self::check_fma(),
            has_avx512f: Self::check_avx512f(),
            cache_line_size: 64, // Standard for x86_64
            estimated_l3_size_mb: estimate_l3_cache_size(),
        }
    }

    #[cfg(target_arch = "x86_64")]
    fn check_avx2() -> bool {
        is_x86_feature_detected!("avx2")
    }

    #[cfg(not(target_arch = "x86_64"))]
    fn check_avx2() -> bool {
        false
    }

    #[cfg(target_arch = "x86_64")]
    fn check_bmi1() -> bool {
        is_x86_feature_detected!("bmi1")
    }

    #[cfg(not(target_arch = "x86_64"))]
    fn check_bmi1() -> bool {
        false
    }

    #[cfg(target_arch = "x86_64")]
    fn check_bmi2() -> bool {
        is_x86_feature_detected!("bmi2")
    }

    #[cfg(not(target_arch = "x86_64"))]
    fn check_bmi2() -> bool {
        false
    }

    #[cfg(target_arch = "x86_64")]
    fn check_popcnt() -> bool {
        is_x86_feature_detected!("popcnt")
    }

    #[cfg(not(target_arch = "x86_64"))]
    fn check_popcnt() -> bool {
        false
    }

    #[cfg(target_arch = "x86_64")]
    fn check_lzcnt() -> bool {
        is_x86_feature_detected!("lzcnt")
    }

    #[cfg(not(target_arch = "x86_64"))]
    fn check_lzcnt() -> bool {
        false
    }

    #[cfg(target_arch = "x86_64")]
    fn check_fma() -> bool {
        is_x86_feature_detected!("fma")
    }

    #[cfg(not(target_arch = "x86_64"))]
    fn check_fma() -> bool {
        false
    }

    #[cfg(target_arch = "x86_64")]
    fn check_avx512f() -> bool {
        is_x86_feature_detected!("avx512f")
    }

    #[cfg(not(target_arch = "x86_64"))]
    fn check_avx512f() -> bool {
        false
    }

    /// Get optimal `BuildConfig` based on detected CPU features.
    ///
    /// A larger L3 cache can comfortably hold a bigger bucket's dense
    /// Gaussian-elimination working set, so caramel grows
    /// `target_bucket_size` with estimated cache size rather than leaving it
    /// fixed at the default `1000.0` everywhere.
    pub fn optimal_config(&self) -> BuildConfig {
        let use_parallel =
            cfg!(feature = "parallel") && std::thread::available_parallelism().map_or(1, |n| n.get()) > 2;

        let target_bucket_size = if self.estimated_l3_size_mb > 16 {
            1400.0
        } else {
            1000.0
        };

        BuildConfig {
            target_bucket_size,
            parallel: use_parallel,
            ..Default::default()
        }
    }

    /// Print feature summary
    pub fn print_summary(&self) {
        println!("CPU features detected:");
        println!("  AVX2:      {}", format_bool(self.has_avx2));
        println!("  BMI1/2:    {}/{}", format_bool(self.has_bmi1), format_bool(self.has_bmi2));
        println!("  POPCNT:    {}", format_bool(self.has_popcnt));
        println!("  LZCNT:     {}", format_bool(self.has_lzcnt));
        println!("  FMA:       {}", format_bool(self.has_fma));
        println!("  AVX-512:   {}", format_bool(self.has_avx512f));
        println!("  L3 cache:  ~{}MB", self.estimated_l3_size_mb);

        let config = self.optimal_config();
        println!(
            "  Optimal:   parallel={}, target_bucket_size={}",
            config.parallel, config.target_bucket_size
        );
    }
}

/// Estimate L3 cache size (rough heuristic)
fn estimate_l3_cache_size() -> usize {
    let cores = std::thread::available_parallelism().map_or(4, |n| n.get());

    // Rough estimates based on common CPU configurations
    match cores {
        1..=2 => 4,   // 4MB (older/mobile CPUs)
        3..=4 => 8,   // 8MB (mainstream quad-core)
        5..=8 => 12,  // 12MB (mainstream 6-8 core)
        9..=12 => 20, // 20MB (high-end 8-12 core)
        13..=16 => 32, // 32MB (enthusiast 12-16 core)
        _ => 48,      // 48MB+ (HEDT/server)
    }
}

fn format_bool(b: bool) -> &'static str {
    if b { "✓" } else { "✗" }
}

/// Global function for easy access
pub fn detect_features() -> CpuFeatures {
    CpuFeatures::detect()
}