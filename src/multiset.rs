//! Multiset/vector-valued composition: `L` independent scalar CSFs over the
//! same key set, one per transposed column.
//!
//! An `N x L` value matrix transposes into `L` column vectors, each handed
//! to its own `Csf::build`; `query` maps across the column CSFs; `save`
//! writes one `column_{i}.csf` file per column into a directory, and `load`
//! reads that directory back in index order, rejecting any gap.

use crate::config::BuildConfig;
use crate::csf::Csf;
use crate::error::{CaramelError, Result};
use crate::value::CsfValue;

/// `L` independent CSFs, one per column of a fixed-width multiset value.
#[derive(Debug, Clone)]
pub struct MultisetCsf<V> {
    csfs: Vec<Csf<V>>,
}

impl<V: CsfValue> MultisetCsf<V> {
    /// Builds one CSF per column of `values` (each row of length `L`,
    /// `values[i][c]` the value of key `i` in column `c`).
    ///
    /// `config.permute` is accepted for interface parity with the scalar
    /// constructor but has no effect here: columns don't share codebooks or
    /// any other state, so reordering them changes neither the on-disk size
    /// nor correctness.
    pub fn build<K: AsRef<[u8]> + Sync>(keys: &[K], values: &[Vec<V>], config: &BuildConfig) -> Result<Self> {
        if keys.is_empty() || values.is_empty() {
            return Err(CaramelError::EmptyInput);
        }
        if keys.len() != values.len() {
            return Err(CaramelError::LengthMismatch { keys: keys.len(), values: values.len() });
        }
        let l = values[0].len();
        for row in values {
            if row.len() != l {
                return Err(CaramelError::LengthMismatch { keys: l, values: row.len() });
            }
        }

        let mut csfs = Vec::with_capacity(l);
        for col in 0..l {
            let column: Vec<V> = values.iter().map(|row| row[col].clone()).collect();
            csfs.push(Csf::build(keys, &column, config)?);
        }
        Ok(Self { csfs })
    }

    /// Maps `key` to its full `L`-length value vector, one entry per column,
    /// in the original column order.
    pub fn query(&self, key: &[u8]) -> Vec<V> {
        self.csfs.iter().map(|c| c.query(key)).collect()
    }

    pub fn num_columns(&self) -> usize {
        self.csfs.len()
    }

    /// Writes one `column_{i}.csf` file per column into `dir` (created if
    /// missing).
    pub fn save(&self, dir: impl AsRef<std::path::Path>) -> Result<()> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        for (i, csf) in self.csfs.iter().enumerate() {
            csf.save(dir.join(format!("column_{i}.csf")))?;
        }
        Ok(())
    }

    /// Reads back a directory written by `save`, requiring a contiguous
    /// `column_0.csf .. column_{L-1}.csf` sequence with no gaps.
    pub fn load(dir: impl AsRef<std::path::Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let mut entries: Vec<(usize, std::path::PathBuf)> = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else { continue };
            let Some(idx_str) = name.strip_prefix("column_") else { continue };
            let Some(ext) = path.extension().and_then(|e| e.to_str()) else { continue };
            if ext != "csf" {
                continue;
            }
            let idx: usize = idx_str
                .parse()
                .map_err(|_| CaramelError::Deserialization(format!("non-numeric column file name: {name}")))?;
            entries.push((idx, path));
        }
        entries.sort_by_key(|(idx, _)| *idx);
        for (expected, (idx, _)) in entries.iter().enumerate() {
            if *idx != expected {
                return Err(CaramelError::Deserialization(format!(
                    "missing column {expected}: found index {idx} instead"
                )));
            }
        }
        let mut csfs = Vec::with_capacity(entries.len());
        for (_, path) in &entries {
            csfs.push(Csf::load(path)?);
        }
        Ok(Self { csfs })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BuildConfig;

    fn sample(n: usize, l: usize) -> (Vec<String>, Vec<Vec<u32>>) {
        let keys: Vec<String> = (0..n).map(|i| format!("k{i}")).collect();
        let values: Vec<Vec<u32>> = (0..n).map(|i| (0..l).map(|c| ((i + c) % 11) as u32).collect()).collect();
        (keys, values)
    }

    #[test]
    fn build_and_query_each_column() {
        let (keys, values) = sample(3_000, 4);
        let config = BuildConfig { parallel: false, ..Default::default() };
        let ms = MultisetCsf::build(&keys, &values, &config).unwrap();
        assert_eq!(ms.num_columns(), 4);
        for (i, k) in keys.iter().enumerate() {
            assert_eq!(ms.query(k.as_bytes()), values[i]);
        }
    }

    #[test]
    fn ragged_rows_are_rejected() {
        let keys = vec!["a".to_string(), "b".to_string()];
        let values = vec![vec![1u32, 2u32], vec![1u32]];
        let config = BuildConfig::default();
        let err = MultisetCsf::build(&keys, &values, &config).unwrap_err();
        assert!(matches!(err, CaramelError::LengthMismatch { .. }));
    }

    #[test]
    fn save_load_roundtrip() {
        let (keys, values) = sample(2_000, 3);
        let config = BuildConfig { parallel: false, ..Default::default() };
        let ms = MultisetCsf::build(&keys, &values, &config).unwrap();

        let mut dir = std::env::temp_dir();
        dir.push(format!("caramel-multiset-test-{}", rand::random::<u64>()));
        ms.save(&dir).unwrap();
        let loaded = MultisetCsf::<u32>::load(&dir).unwrap();
        for (i, k) in keys.iter().enumerate() {
            assert_eq!(loaded.query(k.as_bytes()), values[i]);
        }
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn load_rejects_missing_column() {
        let mut dir = std::env::temp_dir();
        dir.push(format!("caramel-multiset-gap-{}", rand::random::<u64>()));
        std::fs::create_dir_all(&dir).unwrap();

        let (keys, _) = sample(500, 1);
        let config = BuildConfig { parallel: false, ..Default::default() };
        let const_values: Vec<u32> = vec![0u32; keys.len()];
        let single = Csf::build(&keys, &const_values, &config).unwrap();
        single.save(dir.join("column_1.csf")).unwrap();

        let err = MultisetCsf::<u32>::load(&dir).unwrap_err();
        assert!(matches!(err, CaramelError::Deserialization(_)));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
