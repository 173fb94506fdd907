use crate::error::{CaramelError, Result};
use crate::hash::Hash128;
use hashbrown::HashMap;

/// Target mean bucket size. A small fixed displacement search can afford a
/// bucket of a handful of keys, but here each key's per-bucket cost also
/// carries an `L_b`-bit Huffman code, so a much larger bucket amortizes the
/// codebook header better. See DESIGN.md.
pub const DEFAULT_TARGET_BUCKET_SIZE: f64 = 1000.0;

/// One key's slot inside its bucket: the full 128-bit hash (for collision
/// detection and edge derivation) plus the index into the caller's value
/// array.
#[derive(Clone, Copy, Debug)]
pub struct BucketEntry {
    pub hash: Hash128,
    pub value_index: u32,
}

/// Partitions the input key set into buckets by the top `bucket_bits` bits
/// of each key's 128-bit hash.
pub struct BucketedHashStore {
    pub buckets: Vec<Vec<BucketEntry>>,
    pub bucket_bits: u32,
}

/// `b = ceil(log2(n / target_bucket_size))`, clamped to `>= 0`.
pub fn bucket_bits_for(n: usize, target_bucket_size: f64) -> u32 {
    if n == 0 {
        return 0;
    }
    let ratio = n as f64 / target_bucket_size;
    if ratio <= 1.0 {
        return 0;
    }
    ratio.log2().ceil() as u32
}

impl BucketedHashStore {
    /// Hash and bucket `n` keys under seed `sigma`. `hash_of` is called once
    /// per key index; the caller (the top-level builder) owns key storage
    /// so the store itself only ever holds hashes, never key bytes — a
    /// built CSF never retains the key set.
    ///
    /// Returns `KeyCollision(i, j)` naming the offending index pair if two
    /// distinct input keys hash identically under the 128-bit oracle.
    pub fn build<F>(n: usize, sigma: u64, target_bucket_size: f64, mut hash_of: F) -> Result<Self>
    where
        F: FnMut(usize) -> Hash128,
    {
        let bucket_bits = bucket_bits_for(n, target_bucket_size);
        let bucket_count = 1usize << bucket_bits;
        let mut buckets: Vec<Vec<BucketEntry>> = vec![Vec::new(); bucket_count];
        let mut seen: HashMap<u128, usize> = HashMap::with_capacity(n);

        for i in 0..n {
            let h = hash_of(i);
            let full = h.as_u128();
            if let Some(&first_index) = seen.get(&full) {
                return Err(CaramelError::KeyCollision(first_index, i));
            }
            seen.insert(full, i);

            let b = h.bucket_id(bucket_bits) as usize;
            buckets[b].push(BucketEntry { hash: h, value_index: i as u32 });
        }

        Ok(Self { buckets, bucket_bits })
    }

    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_bits_grows_with_n() {
        assert_eq!(bucket_bits_for(0, 1000.0), 0);
        assert_eq!(bucket_bits_for(500, 1000.0), 0);
        assert_eq!(bucket_bits_for(1000, 1000.0), 0);
        assert_eq!(bucket_bits_for(2001, 1000.0), 2);
        assert_eq!(bucket_bits_for(8001, 1000.0), 4);
    }

    #[test]
    fn partitions_all_keys() {
        let n = 5000;
        let store = BucketedHashStore::build(n, 0x1337, 1000.0, |i| {
            Hash128::of(format!("key{i}").as_bytes(), 0x1337)
        })
        .unwrap();
        let total: usize = store.buckets.iter().map(|b| b.len()).sum();
        assert_eq!(total, n);
    }

    #[test]
    fn detects_collision() {
        // Force a collision by hashing the same bytes for two distinct
        // indices.
        let err = BucketedHashStore::build(5, 0x1337, 1000.0, |i| {
            if i == 4 {
                Hash128::of(b"dup", 0x1337)
            } else if i == 1 {
                Hash128::of(b"dup", 0x1337)
            } else {
                Hash128::of(format!("k{i}").as_bytes(), 0x1337)
            }
        });
        assert!(matches!(err, Err(CaramelError::KeyCollision(1, 4))));
    }
}
