//! Value types a `Csf` can store, and their on-wire type tag.
//!
//! Fixed-width 32/64-bit unsigned integers, fixed-length byte strings of
//! width 10 or 12, or a variable-length byte string, plus multiset
//! variants composed from the scalar ones. A closed tag enum names the
//! concrete type explicitly on disk rather than leaving it to the type
//! system alone, adapted from the usual "codec generic over an associated
//! value type" pattern since the serialized format needs a tag it can read
//! before committing to any concrete `V`.
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::hash::Hash;

/// Wire tag identifying which concrete `V` a serialized CSF stores, so a
/// filename loader can auto-dispatch without the caller naming `V` up
/// front. `MultisetU32`/`MultisetU64` are reserved discriminants for
/// `AnyCsf`'s variant set; a multiset build never writes this tag itself
/// since its on-disk form is a `column_i.csf` directory of ordinary scalar
/// containers (each already tagged `U32`/`U64`), not a single tagged blob.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ValueTypeTag {
    U32 = 1,
    U64 = 2,
    Char10 = 3,
    Char12 = 4,
    String = 5,
    MultisetU32 = 6,
    MultisetU64 = 7,
}

impl ValueTypeTag {
    pub fn from_u16(tag: u16) -> Option<Self> {
        Some(match tag {
            1 => Self::U32,
            2 => Self::U64,
            3 => Self::Char10,
            4 => Self::Char12,
            5 => Self::String,
            6 => Self::MultisetU32,
            7 => Self::MultisetU64,
            _ => return None,
        })
    }

    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

/// A value type the CSF layer can encode: orderable and hashable (for
/// per-bucket canonical codebook construction), losslessly convertible
/// to/from a caller-chosen byte encoding for serialization, and `Send +
/// Sync` so the per-bucket build pipeline can run across the rayon worker
/// pool.
pub trait CsfValue: Ord + Clone + Hash + Eq + Send + Sync + 'static {
    const TAG: ValueTypeTag;

    /// Encodes `self` into `out`, appending a fixed or explicitly
    /// length-prefixed representation depending on the type.
    fn write_to(&self, out: &mut Vec<u8>);

    /// Decodes one value starting at `input[*pos]`, advancing `*pos` past
    /// it. Returns `None` on truncated input.
    fn read_from(input: &[u8], pos: &mut usize) -> Option<Self>;
}

impl CsfValue for u32 {
    const TAG: ValueTypeTag = ValueTypeTag::U32;

    fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }

    fn read_from(input: &[u8], pos: &mut usize) -> Option<Self> {
        let bytes = input.get(*pos..*pos + 4)?;
        *pos += 4;
        Some(u32::from_le_bytes(bytes.try_into().unwrap()))
    }
}

impl CsfValue for u64 {
    const TAG: ValueTypeTag = ValueTypeTag::U64;

    fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.to_le_bytes());
    }

    fn read_from(input: &[u8], pos: &mut usize) -> Option<Self> {
        let bytes = input.get(*pos..*pos + 8)?;
        *pos += 8;
        Some(u64::from_le_bytes(bytes.try_into().unwrap()))
    }
}

impl CsfValue for [u8; 10] {
    const TAG: ValueTypeTag = ValueTypeTag::Char10;

    fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self);
    }

    fn read_from(input: &[u8], pos: &mut usize) -> Option<Self> {
        let bytes = input.get(*pos..*pos + 10)?;
        *pos += 10;
        Some(bytes.try_into().unwrap())
    }
}

impl CsfValue for [u8; 12] {
    const TAG: ValueTypeTag = ValueTypeTag::Char12;

    fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self);
    }

    fn read_from(input: &[u8], pos: &mut usize) -> Option<Self> {
        let bytes = input.get(*pos..*pos + 12)?;
        *pos += 12;
        Some(bytes.try_into().unwrap())
    }
}

impl CsfValue for String {
    const TAG: ValueTypeTag = ValueTypeTag::String;

    fn write_to(&self, out: &mut Vec<u8>) {
        let bytes = self.as_bytes();
        out.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        out.extend_from_slice(bytes);
    }

    fn read_from(input: &[u8], pos: &mut usize) -> Option<Self> {
        let len_bytes = input.get(*pos..*pos + 4)?;
        let len = u32::from_le_bytes(len_bytes.try_into().unwrap()) as usize;
        *pos += 4;
        let bytes = input.get(*pos..*pos + len)?;
        *pos += len;
        String::from_utf8(bytes.to_vec()).ok()
    }
}

/// Caps the number of elements `max_to_infer` examines when the builder
/// auto-dispatches on a value iterator's runtime type.
pub const DEFAULT_MAX_TO_INFER: usize = 10_000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u32_roundtrip() {
        let mut buf = Vec::new();
        42u32.write_to(&mut buf);
        7u32.write_to(&mut buf);
        let mut pos = 0;
        assert_eq!(u32::read_from(&buf, &mut pos), Some(42));
        assert_eq!(u32::read_from(&buf, &mut pos), Some(7));
    }

    #[test]
    fn string_roundtrip() {
        let mut buf = Vec::new();
        "hello caramel".to_string().write_to(&mut buf);
        let mut pos = 0;
        assert_eq!(String::read_from(&buf, &mut pos), Some("hello caramel".to_string()));
        assert_eq!(pos, buf.len());
    }

    #[test]
    fn char10_roundtrip() {
        let v: [u8; 10] = *b"abcdefghij";
        let mut buf = Vec::new();
        v.write_to(&mut buf);
        let mut pos = 0;
        assert_eq!(<[u8; 10]>::read_from(&buf, &mut pos), Some(v));
    }

    #[test]
    fn truncated_input_is_none() {
        let mut pos = 0;
        assert_eq!(u32::read_from(&[1, 2], &mut pos), None);
    }
}
