use alloy_primitives::{I256, U256};

use crate::Error;

/// Appending RLP encoder.
///
/// Items are written in order into an internal buffer; nested lists are
/// encoded through [`Encoder::list`], which measures the children before
/// emitting the list header.
#[derive(Debug, Default)]
pub struct Encoder {
    out: Vec<u8>,
}

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a byte string.
    pub fn bytes(&mut self, b: &[u8]) -> &mut Self {
        write_bytes(&mut self.out, b);
        self
    }

    /// Append a UTF-8 string as its byte representation.
    pub fn string(&mut self, s: &str) -> &mut Self {
        self.bytes(s.as_bytes())
    }

    /// Append an unsigned integer as its minimal big-endian byte string.
    ///
    /// Zero encodes as the empty string (`0x80`).
    pub fn uint(&mut self, v: u64) -> &mut Self {
        self.bytes(&to_be_minimal(v))
    }

    /// Append an arbitrary-precision non-negative integer.
    pub fn big_int(&mut self, v: &U256) -> &mut Self {
        if v.is_zero() {
            return self.bytes(&[]);
        }
        let bytes = v.to_be_bytes_trimmed_vec();
        self.bytes(&bytes)
    }

    /// Append a list whose children are written by `f`.
    pub fn list<F: FnOnce(&mut Encoder)>(&mut self, f: F) -> &mut Self {
        let mut children = Encoder::new();
        f(&mut children);
        write_size(&mut self.out, children.out.len(), 0xC0, 0xF7);
        self.out.extend_from_slice(&children.out);
        self
    }

    /// Append raw, already-encoded RLP.
    pub fn raw(&mut self, encoded: &[u8]) -> &mut Self {
        self.out.extend_from_slice(encoded);
        self
    }

    pub fn finish(self) -> Vec<u8> {
        self.out
    }
}

/// Encode a single byte string.
pub fn encode_bytes(b: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(b.len() + 9);
    write_bytes(&mut out, b);
    out
}

/// Encode a UTF-8 string.
pub fn encode_string(s: &str) -> Vec<u8> {
    encode_bytes(s.as_bytes())
}

/// Encode an unsigned integer.
pub fn encode_uint(v: u64) -> Vec<u8> {
    encode_bytes(&to_be_minimal(v))
}

/// Encode an arbitrary-precision non-negative integer.
pub fn encode_big_int(v: &U256) -> Vec<u8> {
    if v.is_zero() {
        return encode_bytes(&[]);
    }
    encode_bytes(&v.to_be_bytes_trimmed_vec())
}

/// Encode a signed arbitrary-precision integer.
///
/// RLP has no representation for negative integers; they are rejected with
/// [`Error::InvalidValue`].
pub fn encode_signed(v: I256) -> Result<Vec<u8>, Error> {
    if v.is_negative() {
        return Err(Error::InvalidValue("negative integer"));
    }
    Ok(encode_big_int(&v.unsigned_abs()))
}

fn write_bytes(out: &mut Vec<u8>, b: &[u8]) {
    // a single byte below 0x80 is its own encoding
    if b.len() == 1 && b[0] < 0x80 {
        out.push(b[0]);
        return;
    }
    write_size(out, b.len(), 0x80, 0xB7);
    out.extend_from_slice(b);
}

fn write_size(out: &mut Vec<u8>, size: usize, short_base: u8, long_base: u8) {
    if size < 56 {
        out.push(short_base + size as u8);
        return;
    }
    let be = to_be_minimal(size as u64);
    out.push(long_base + be.len() as u8);
    out.extend_from_slice(&be);
}

fn to_be_minimal(v: u64) -> Vec<u8> {
    if v == 0 {
        return Vec::new();
    }
    let bytes = v.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    bytes[skip..].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_byte_is_its_own_encoding() {
        assert_eq!(encode_bytes(&[0x00]), vec![0x00]);
        assert_eq!(encode_bytes(&[0x7f]), vec![0x7f]);
        assert_eq!(encode_bytes(&[0x80]), vec![0x81, 0x80]);
    }

    #[test]
    fn test_short_string() {
        assert_eq!(encode_string("dog"), vec![0x83, b'd', b'o', b'g']);
        assert_eq!(encode_bytes(&[]), vec![0x80]);
    }

    #[test]
    fn test_long_string() {
        let s = "a".repeat(56);
        let encoded = encode_string(&s);
        assert_eq!(encoded[0], 0xB8);
        assert_eq!(encoded[1], 56);
        assert_eq!(&encoded[2..], s.as_bytes());
    }

    #[test]
    fn test_uint_zero_is_empty_string() {
        assert_eq!(encode_uint(0), vec![0x80]);
        assert_eq!(encode_uint(15), vec![0x0f]);
        assert_eq!(encode_uint(1024), vec![0x82, 0x04, 0x00]);
    }

    #[test]
    fn test_big_int() {
        assert_eq!(encode_big_int(&U256::ZERO), vec![0x80]);
        assert_eq!(encode_big_int(&U256::from(1024u64)), vec![0x82, 0x04, 0x00]);
    }

    #[test]
    fn test_negative_signed_rejected() {
        let err = encode_signed(I256::MINUS_ONE).unwrap_err();
        assert_eq!(err, Error::InvalidValue("negative integer"));
        assert_eq!(encode_signed(I256::ONE).unwrap(), vec![0x01]);
    }

    #[test]
    fn test_canonical_list() {
        let mut enc = Encoder::new();
        enc.list(|e| {
            e.string("cat").string("dog");
        });
        assert_eq!(
            enc.finish(),
            vec![0xC8, 0x83, b'c', b'a', b't', 0x83, b'd', b'o', b'g']
        );
    }

    #[test]
    fn test_empty_list() {
        let mut enc = Encoder::new();
        enc.list(|_| {});
        assert_eq!(enc.finish(), vec![0xC0]);
    }

    #[test]
    fn test_long_list() {
        let mut enc = Encoder::new();
        enc.list(|e| {
            for _ in 0..20 {
                e.string("ab");
            }
        });
        let out = enc.finish();
        // 20 * 3 = 60 payload bytes, long form with one length byte
        assert_eq!(out[0], 0xF8);
        assert_eq!(out[1], 60);
        assert_eq!(out.len(), 62);
    }
}
