//! Auto-typed loader: one loader by filename with sequential `ValueType`-tag
//! dispatch, rather than the caller naming a concrete value type up front.
//!
//! Tries each candidate value type's `load_bytes` in a fixed order, moving
//! to the next one on a deserialization failure, until one succeeds or
//! every candidate is exhausted. `Csf::load_bytes` already surfaces a tag
//! mismatch as `CaramelError::Deserialization` (see `serialize::
//! read_header`), so this loader reads the file once and retries
//! `load_bytes` under each `CsfValue` in turn rather than re-reading the
//! path per candidate.

use crate::csf::Csf;
use crate::error::{CaramelError, Result};
use crate::multiset::MultisetCsf;

/// A CSF loaded from disk with its concrete value type resolved by trying
/// every `ValueType` tag in turn.
pub enum AnyCsf {
    U32(Csf<u32>),
    U64(Csf<u64>),
    Char10(Csf<[u8; 10]>),
    Char12(Csf<[u8; 12]>),
    String(Csf<String>),
    MultisetU32(MultisetCsf<u32>),
    MultisetU64(MultisetCsf<u64>),
}

/// Loads `path`, auto-dispatching on value type. A directory is tried as a
/// multiset (`column_0.csf .. column_{L-1}.csf`, per `MultisetCsf::load`);
/// a file is tried as each scalar `ValueType` in a fixed order. Returns
/// `UnsupportedValueType` if every candidate is rejected.
pub fn load_auto(path: impl AsRef<std::path::Path>) -> Result<AnyCsf> {
    let path = path.as_ref();
    if path.is_dir() {
        if let Ok(ms) = MultisetCsf::<u32>::load(path) {
            return Ok(AnyCsf::MultisetU32(ms));
        }
        if let Ok(ms) = MultisetCsf::<u64>::load(path) {
            return Ok(AnyCsf::MultisetU64(ms));
        }
        log::debug!("caramel auto-load: {} is a directory but matches no known multiset column type", path.display());
        return Err(CaramelError::UnsupportedValueType);
    }

    let bytes = std::fs::read(path)?;
    if let Ok(csf) = Csf::<u32>::load_bytes(&bytes) {
        return Ok(AnyCsf::U32(csf));
    }
    if let Ok(csf) = Csf::<u64>::load_bytes(&bytes) {
        return Ok(AnyCsf::U64(csf));
    }
    if let Ok(csf) = Csf::<[u8; 10]>::load_bytes(&bytes) {
        return Ok(AnyCsf::Char10(csf));
    }
    if let Ok(csf) = Csf::<[u8; 12]>::load_bytes(&bytes) {
        return Ok(AnyCsf::Char12(csf));
    }
    if let Ok(csf) = Csf::<String>::load_bytes(&bytes) {
        return Ok(AnyCsf::String(csf));
    }
    log::debug!("caramel auto-load: {} matches no known scalar value type", path.display());
    Err(CaramelError::UnsupportedValueType)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BuildConfig;

    #[test]
    fn dispatches_to_the_right_scalar_type() {
        let keys: Vec<String> = (0..500).map(|i| format!("k{i}")).collect();
        let values: Vec<u64> = (0..500).map(|i| i as u64 * 7).collect();
        let config = BuildConfig { parallel: false, ..Default::default() };
        let csf = Csf::build(&keys, &values, &config).unwrap();

        let mut path = std::env::temp_dir();
        path.push(format!("caramel-auto-test-{}.csf", rand::random::<u64>()));
        csf.save(&path).unwrap();

        match load_auto(&path).unwrap() {
            AnyCsf::U64(loaded) => {
                for (k, &v) in keys.iter().zip(values.iter()) {
                    assert_eq!(loaded.query(k.as_bytes()), v);
                }
            }
            _ => panic!("expected AnyCsf::U64"),
        }
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn rejects_garbage_file() {
        let mut path = std::env::temp_dir();
        path.push(format!("caramel-auto-garbage-{}.csf", rand::random::<u64>()));
        std::fs::write(&path, b"not a caramel file at all, just noise").unwrap();
        let err = load_auto(&path).unwrap_err();
        assert!(matches!(err, CaramelError::UnsupportedValueType));
        std::fs::remove_file(&path).unwrap();
    }
}
