use caramel::{BuildConfig, CaramelError, Csf};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::collections::HashSet;
use std::time::Instant;

const N_KEYS: usize = 1_000_000;
const GEN_SEED: u64 = 42;

fn main() -> Result<(), CaramelError> {
    println!("--- caramel million-key build ---");
    println!("n = {N_KEYS}");

    let t0 = Instant::now();
    let keys = gen_unique_keys(N_KEYS, GEN_SEED);
    let values: Vec<u32> = (0..N_KEYS as u32).collect();
    let gen_s = t0.elapsed().as_secs_f64();
    println!("gen:    {:>8.3} s   ({:.1} M keys/s)", gen_s, N_KEYS as f64 / gen_s / 1e6);

    let config = BuildConfig::auto();
    println!("config: target_bucket_size={}, parallel={}", config.target_bucket_size, config.parallel);

    let t1 = Instant::now();
    let csf = Csf::build(&keys, &values, &config)?;
    let build_s = t1.elapsed().as_secs_f64();
    println!("build:  {:>8.3} s   ({:.1} M keys/s)", build_s, N_KEYS as f64 / build_s / 1e6);

    let t2 = Instant::now();
    let mut acc: u32 = 0;
    for chunk in keys.chunks(32_768) {
        for k in chunk {
            acc ^= csf.query(k);
        }
    }
    let lookup_s = t2.elapsed().as_secs_f64();
    println!("lookup: {:>8.3} s   ({:.1} M lookups/s)   (acc={acc})", lookup_s, N_KEYS as f64 / lookup_s / 1e6);

    let stats = csf.get_stats();
    println!(
        "size:   {} bytes ({:.2} bits/key)",
        stats.in_memory_bytes,
        stats.in_memory_bytes as f64 * 8.0 / N_KEYS as f64
    );

    println!("----------------------------------------------");
    println!("Total (gen + build + lookup): {:.3} s", gen_s + build_s + lookup_s);

    Ok(())
}

/// Generates N unique 16-byte keys, deterministically.
fn gen_unique_keys(n: usize, seed: u64) -> Vec<[u8; 16]> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut set = HashSet::with_capacity(n * 2);
    let mut keys = Vec::with_capacity(n);
    while keys.len() < n {
        let mut buf = [0u8; 16];
        rng.fill_bytes(&mut buf);
        if set.insert(buf) {
            keys.push(buf);
        }
    }
    keys
}
