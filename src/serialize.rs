//! The versioned, typed binary container.
//!
//! A `write_to<W: Write>`/`from_bytes(&[u8])` idiom (explicit little-endian
//! fields, length checks before each read) for the top-level container
//! layout, fixed byte-for-byte rather than handed to an opaque `bincode`
//! blob, since the value-type tag needs to be readable before committing to
//! a concrete value type. The optional `FILTER_BLOB` sub-section is itself
//! a length-prefixed `bincode` encoding of the `Prefilter` enum, gated
//! behind the `serde` feature the same way the rest of the crate's
//! sub-blobs are.

use crate::codec::Codebook;
use crate::error::{CaramelError, Result};
use crate::filter::Prefilter;
use crate::value::{CsfValue, ValueTypeTag};

pub const MAGIC: [u8; 4] = *b"CARA";
pub const FORMAT_VERSION: u16 = 1;

/// Sequential little-endian byte writer, writing into an in-memory
/// `Vec<u8>` since the whole container is built once and then written out
/// (or returned) in one piece.
#[derive(Default)]
pub struct Writer {
    pub buf: Vec<u8>,
}

impl Writer {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }
    pub fn u16(&mut self, v: u16) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }
    pub fn u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }
    pub fn u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }
    pub fn bytes(&mut self, b: &[u8]) {
        self.buf.extend_from_slice(b);
    }
}

/// Sequential little-endian byte reader with bounds-checked reads, each
/// failure surfacing as `CaramelError::Deserialization` so a `load()`
/// dispatcher trying multiple `ValueType`s in turn can catch it and move on
/// to the next candidate.
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn need(&self, n: usize) -> Result<()> {
        if self.pos + n > self.buf.len() {
            return Err(CaramelError::Deserialization(format!(
                "truncated input: need {n} bytes at offset {}, have {}",
                self.pos,
                self.buf.len()
            )));
        }
        Ok(())
    }

    pub fn u8(&mut self) -> Result<u8> {
        self.need(1)?;
        let v = self.buf[self.pos];
        self.pos += 1;
        Ok(v)
    }
    pub fn u16(&mut self) -> Result<u16> {
        self.need(2)?;
        let v = u16::from_le_bytes(self.buf[self.pos..self.pos + 2].try_into().unwrap());
        self.pos += 2;
        Ok(v)
    }
    pub fn u32(&mut self) -> Result<u32> {
        self.need(4)?;
        let v = u32::from_le_bytes(self.buf[self.pos..self.pos + 4].try_into().unwrap());
        self.pos += 4;
        Ok(v)
    }
    pub fn u64(&mut self) -> Result<u64> {
        self.need(8)?;
        let v = u64::from_le_bytes(self.buf[self.pos..self.pos + 8].try_into().unwrap());
        self.pos += 8;
        Ok(v)
    }
    pub fn bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.need(n)?;
        let v = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(v)
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Backs the cursor up by `n` bytes. Used after a `CsfValue::read_from`
    /// call that was handed the whole remaining tail but only consumed a
    /// prefix of it, to put the cursor back immediately past what was
    /// actually read.
    fn rewind(&mut self, n: usize) {
        self.pos -= n;
    }
}

/// `codebook_blob`: `num_symbols(u32) | code_length(u8) | [length(u8) |
/// V::write_to bytes] * num_symbols`, symbols in the same ascending order
/// `Codebook::build` produced them in — codes themselves are never written,
/// since canonical assignment means lengths alone, replayed through
/// `Codebook::from_parts`, recover identical codes.
pub fn write_codebook<V: CsfValue>(w: &mut Writer, book: &Codebook<V>) {
    w.u32(book.num_symbols() as u32);
    w.u8(book.code_length());
    for (sym, len) in book.symbols().iter().zip(book.lengths().iter()) {
        w.u8(*len);
        sym.write_to(&mut w.buf);
    }
}

pub fn read_codebook<V: CsfValue>(r: &mut Reader) -> Result<Codebook<V>> {
    let num_symbols = r.u32()? as usize;
    let _code_length = r.u8()?; // redundant with lengths' max; kept for quick sanity display
    let mut symbols = Vec::with_capacity(num_symbols);
    let mut lengths = Vec::with_capacity(num_symbols);
    for _ in 0..num_symbols {
        lengths.push(r.u8()?);
        // V::read_from reads from a plain byte slice with an explicit
        // cursor; bridge the Reader's position across the call.
        let mut pos = 0usize;
        let remaining = r.bytes(r.remaining())?;
        let sym = V::read_from(remaining, &mut pos)
            .ok_or_else(|| CaramelError::Deserialization("truncated codebook symbol".into()))?;
        // Un-consume the bytes read_from didn't use: rewind the reader to
        // just past this symbol by re-slicing. Reader has already advanced
        // past `remaining`'s full length, so back up.
        let unused = remaining.len() - pos;
        r.rewind(unused);
        symbols.push(sym);
    }
    Ok(Codebook::from_parts(symbols, lengths))
}

pub fn write_filter(w: &mut Writer, filter: &Option<Prefilter>) {
    match filter {
        None => w.u8(0),
        Some(f) => {
            w.u8(1);
            #[cfg(feature = "serde")]
            {
                let blob = bincode::serialize(f).expect("Prefilter serialization is infallible");
                w.u32(blob.len() as u32);
                w.bytes(&blob);
            }
            #[cfg(not(feature = "serde"))]
            {
                let _ = f;
                panic!("prefilter serialization requires the `serde` feature");
            }
        }
    }
}

pub fn read_filter(r: &mut Reader) -> Result<Option<Prefilter>> {
    let has_filter = r.u8()?;
    if has_filter == 0 {
        return Ok(None);
    }
    #[cfg(feature = "serde")]
    {
        let len = r.u32()? as usize;
        let blob = r.bytes(len)?;
        let filter: Prefilter = bincode::deserialize(blob)
            .map_err(|e| CaramelError::Deserialization(format!("filter blob: {e}")))?;
        Ok(Some(filter))
    }
    #[cfg(not(feature = "serde"))]
    {
        Err(CaramelError::Deserialization(
            "prefilter deserialization requires the `serde` feature".into(),
        ))
    }
}

pub fn write_majority<V: CsfValue>(w: &mut Writer, majority: &Option<V>) {
    match majority {
        None => w.u8(0),
        Some(v) => {
            w.u8(1);
            v.write_to(&mut w.buf);
        }
    }
}

pub fn read_majority<V: CsfValue>(r: &mut Reader) -> Result<Option<V>> {
    let has_majority = r.u8()?;
    if has_majority == 0 {
        return Ok(None);
    }
    let mut pos = 0usize;
    let remaining = r.bytes(r.remaining())?;
    let v = V::read_from(remaining, &mut pos)
        .ok_or_else(|| CaramelError::Deserialization("truncated majority value".into()))?;
    let unused = remaining.len() - pos;
    r.rewind(unused);
    Ok(Some(v))
}

/// Validates the fixed header and returns `(hasher_seed, bucket_count)`,
/// failing with `Deserialization` on any magic/version/type-tag mismatch so
/// a dispatcher trying several `ValueType`s can continue to the next
/// candidate.
pub fn read_header(r: &mut Reader, expected_tag: ValueTypeTag) -> Result<(u64, u32)> {
    let magic = r.bytes(4)?;
    if magic != MAGIC {
        log::warn!("caramel deserialization: bad magic {magic:?}");
        return Err(CaramelError::Deserialization("bad magic".into()));
    }
    let version = r.u16()?;
    if version != FORMAT_VERSION {
        log::warn!("caramel deserialization: unsupported version {version}");
        return Err(CaramelError::Deserialization(format!("unsupported version {version}")));
    }
    let tag = r.u16()?;
    let tag = ValueTypeTag::from_u16(tag)
        .ok_or_else(|| CaramelError::Deserialization(format!("unknown value type tag {tag}")))?;
    if tag != expected_tag {
        log::debug!("caramel deserialization: tag mismatch (expected {expected_tag:?}, found {tag:?}), letting the caller try the next candidate type");
        return Err(CaramelError::Deserialization(format!(
            "value type tag mismatch: expected {expected_tag:?}, found {tag:?}"
        )));
    }
    let hasher_seed = r.u64()?;
    let bucket_count = r.u32()?;
    Ok((hasher_seed, bucket_count))
}

/// `S_LENGTH_BITS(u64) | S_BYTES(ceil(len/8))`, words packed little-endian —
/// the same layout `BitArray`'s own word vector already uses, so this is a
/// direct byte-copy of `words()` rather than a bit-by-bit re-encode.
pub fn write_bitarray(w: &mut Writer, bits: &crate::bitarray::BitArray) {
    w.u64(bits.len() as u64);
    let nbytes = bits.len().div_ceil(8);
    for word in bits.words() {
        w.bytes(&word.to_le_bytes());
    }
    // Trim trailing padding bytes beyond `nbytes` that `words()` carries as
    // zero-fill; readers recompute the word count from `S_LENGTH_BITS` so
    // this is cosmetic, but keeps the container exactly `ceil(len/8)` bytes.
    let written = bits.words().len() * 8;
    if written > nbytes {
        w.buf.truncate(w.buf.len() - (written - nbytes));
    }
}

pub fn read_bitarray(r: &mut Reader) -> Result<crate::bitarray::BitArray> {
    let len = r.u64()? as usize;
    let nbytes = len.div_ceil(8);
    let raw = r.bytes(nbytes)?;
    let nwords = len.div_ceil(64);
    let mut words = vec![0u64; nwords];
    for (i, chunk) in raw.chunks(8).enumerate() {
        let mut b = [0u8; 8];
        b[..chunk.len()].copy_from_slice(chunk);
        words[i] = u64::from_le_bytes(b);
    }
    Ok(crate::bitarray::BitArray::from_words(words, len))
}

pub fn write_header(w: &mut Writer, tag: ValueTypeTag, hasher_seed: u64, bucket_count: u32) {
    w.bytes(&MAGIC);
    w.u16(FORMAT_VERSION);
    w.u16(tag.as_u16());
    w.u64(hasher_seed);
    w.u32(bucket_count);
}
