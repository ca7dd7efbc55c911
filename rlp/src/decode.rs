use alloy_primitives::U256;

use crate::Error;

/// The shape of the next item under the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// A single byte below 0x80, its own encoding.
    Byte,
    /// A byte string with a length header.
    Bytes,
    /// A list with a length header.
    List,
}

/// Streaming RLP decoder.
///
/// A cursor over a byte slice with a stack of enclosing-list end offsets.
/// The header of the next item is read once and cached until the item is
/// consumed, so `kind()`/`size()` can be called repeatedly.
///
/// All reads are bounded by the innermost open list; crossing that boundary
/// fails with [`Error::UnexpectedEnd`].
#[derive(Debug)]
pub struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
    // kind and payload size of the current item, header already consumed.
    // For Kind::Byte the size field carries the value itself.
    peeked: Option<(Kind, usize)>,
    lists: Vec<usize>,
}

impl<'a> Decoder<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            peeked: None,
            lists: Vec::new(),
        }
    }

    /// Kind of the next item.
    pub fn kind(&mut self) -> Result<Kind, Error> {
        self.peek().map(|(kind, _)| kind)
    }

    /// Payload length of the next item (for `Byte`, the value itself).
    pub fn size(&mut self) -> Result<usize, Error> {
        self.peek().map(|(_, size)| size)
    }

    /// Whether another item is available before the current boundary.
    pub fn has_more(&self) -> bool {
        self.peeked.is_some() || self.pos < self.limit()
    }

    /// Consume the next item as a byte string.
    pub fn take_bytes(&mut self) -> Result<Vec<u8>, Error> {
        let (kind, size) = self.peek()?;
        match kind {
            Kind::List => Err(Error::UnexpectedKind {
                expected: Kind::Bytes,
                found: Kind::List,
            }),
            Kind::Byte => {
                self.peeked = None;
                Ok(vec![size as u8])
            }
            Kind::Bytes => {
                let bytes = self.read_slice(size)?.to_vec();
                self.peeked = None;
                Ok(bytes)
            }
        }
    }

    /// Consume the next item as a UTF-8 string.
    pub fn take_string(&mut self) -> Result<String, Error> {
        let bytes = self.take_bytes()?;
        String::from_utf8(bytes).map_err(|_| Error::InvalidValue("invalid utf-8"))
    }

    /// Consume the next item as an unsigned integer of at most `max_bits`.
    ///
    /// Rejects leading zero bytes; zero is only the empty string.
    pub fn take_uint(&mut self, max_bits: usize) -> Result<u64, Error> {
        let bytes = self.take_int_bytes()?;
        if bytes.len() * 8 > max_bits.min(64) {
            return Err(Error::InvalidValue("integer overflow"));
        }
        Ok(bytes.iter().fold(0u64, |acc, b| acc << 8 | *b as u64))
    }

    /// Consume the next item as an arbitrary-precision non-negative integer.
    pub fn take_big_int(&mut self) -> Result<U256, Error> {
        let bytes = self.take_int_bytes()?;
        if bytes.len() > 32 {
            return Err(Error::InvalidValue("integer overflow"));
        }
        Ok(U256::from_be_slice(&bytes))
    }

    /// Open the next item as a list, returning its payload length.
    pub fn enter_list(&mut self) -> Result<usize, Error> {
        let (kind, size) = self.peek()?;
        if kind != Kind::List {
            return Err(Error::UnexpectedKind {
                expected: Kind::List,
                found: kind,
            });
        }
        if self.pos + size > self.limit() {
            return Err(Error::UnexpectedEnd);
        }
        self.peeked = None;
        self.lists.push(self.pos + size);
        Ok(size)
    }

    /// Close the innermost list.
    ///
    /// Fails unless the cursor sits exactly at the recorded end position.
    pub fn exit_list(&mut self) -> Result<(), Error> {
        let Some(end) = self.lists.last().copied() else {
            return Err(Error::InvalidValue("not inside a list"));
        };
        if self.peeked.is_some() || self.pos != end {
            return Err(Error::InvalidValue("list not fully consumed"));
        }
        self.lists.pop();
        Ok(())
    }

    fn take_int_bytes(&mut self) -> Result<Vec<u8>, Error> {
        let bytes = self.take_bytes()?;
        if !bytes.is_empty() && bytes[0] == 0 {
            return Err(Error::InvalidValue("leading zero bytes"));
        }
        Ok(bytes)
    }

    fn peek(&mut self) -> Result<(Kind, usize), Error> {
        if let Some(item) = self.peeked {
            return Ok(item);
        }
        let cur = self.read_byte()?;
        let item = match cur {
            0x00..=0x7F => (Kind::Byte, cur as usize),
            0x80..=0xB7 => {
                let size = (cur - 0x80) as usize;
                if size == 1 && self.peek_byte()? < 0x80 {
                    // a value byte must not be wrapped in a string header
                    return Err(Error::NonCanonicalSize);
                }
                (Kind::Bytes, size)
            }
            0xB8..=0xBF => (Kind::Bytes, self.read_size((cur - 0xB7) as usize)?),
            0xC0..=0xF7 => (Kind::List, (cur - 0xC0) as usize),
            0xF8..=0xFF => (Kind::List, self.read_size((cur - 0xF7) as usize)?),
        };
        self.peeked = Some(item);
        Ok(item)
    }

    // Big-endian length following a long-form marker. Lengths below 56 must
    // have used the short form; leading zero bytes are non-canonical too.
    fn read_size(&mut self, len: usize) -> Result<usize, Error> {
        let bytes = self.read_slice(len)?;
        if bytes[0] == 0 {
            return Err(Error::NonCanonicalSize);
        }
        let size = bytes.iter().fold(0usize, |acc, b| acc << 8 | *b as usize);
        if size < 56 {
            return Err(Error::NonCanonicalSize);
        }
        Ok(size)
    }

    fn limit(&self) -> usize {
        self.lists.last().copied().unwrap_or(self.data.len())
    }

    fn read_byte(&mut self) -> Result<u8, Error> {
        if self.pos >= self.limit() {
            return Err(Error::UnexpectedEnd);
        }
        let b = self.data[self.pos];
        self.pos += 1;
        Ok(b)
    }

    fn peek_byte(&self) -> Result<u8, Error> {
        if self.pos >= self.limit() {
            return Err(Error::UnexpectedEnd);
        }
        Ok(self.data[self.pos])
    }

    fn read_slice(&mut self, len: usize) -> Result<&'a [u8], Error> {
        if self.pos + len > self.limit() {
            return Err(Error::UnexpectedEnd);
        }
        let slice = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_canonical_list() {
        let data = [0xC8, 0x83, b'c', b'a', b't', 0x83, b'd', b'o', b'g'];
        let mut dec = Decoder::new(&data);
        assert_eq!(dec.kind().unwrap(), Kind::List);
        dec.enter_list().unwrap();
        assert_eq!(dec.take_string().unwrap(), "cat");
        assert_eq!(dec.take_string().unwrap(), "dog");
        dec.exit_list().unwrap();
        assert!(!dec.has_more());
    }

    #[test]
    fn test_single_byte_value() {
        let mut dec = Decoder::new(&[0x05]);
        assert_eq!(dec.kind().unwrap(), Kind::Byte);
        assert_eq!(dec.take_uint(64).unwrap(), 5);
    }

    #[test]
    fn test_long_form_of_short_string_rejected() {
        // one byte of payload announced with the long form
        let mut dec = Decoder::new(&[0xB8, 0x01, 0x05]);
        assert_eq!(dec.kind().unwrap_err(), Error::NonCanonicalSize);
    }

    #[test]
    fn test_wrapped_value_byte_rejected() {
        let mut dec = Decoder::new(&[0x81, 0x05]);
        assert_eq!(dec.kind().unwrap_err(), Error::NonCanonicalSize);

        let mut dec = Decoder::new(&[0x81, 0x80]);
        assert_eq!(dec.take_bytes().unwrap(), vec![0x80]);
    }

    #[test]
    fn test_length_with_leading_zero_rejected() {
        let mut data = vec![0xB9, 0x00, 0x38];
        data.extend(std::iter::repeat(b'a').take(56));
        let mut dec = Decoder::new(&data);
        assert_eq!(dec.kind().unwrap_err(), Error::NonCanonicalSize);
    }

    #[test]
    fn test_integer_leading_zero_rejected() {
        let mut dec = Decoder::new(&[0x82, 0x00, 0x01]);
        assert_eq!(
            dec.take_uint(64).unwrap_err(),
            Error::InvalidValue("leading zero bytes")
        );

        // zero is only the empty string
        let mut dec = Decoder::new(&[0x80]);
        assert_eq!(dec.take_uint(64).unwrap(), 0);
        let mut dec = Decoder::new(&[0x00]);
        assert_eq!(
            dec.take_uint(64).unwrap_err(),
            Error::InvalidValue("leading zero bytes")
        );
    }

    #[test]
    fn test_uint_overflow() {
        let mut dec = Decoder::new(&[0x89, 1, 2, 3, 4, 5, 6, 7, 8, 9]);
        assert_eq!(
            dec.take_uint(64).unwrap_err(),
            Error::InvalidValue("integer overflow")
        );
    }

    #[test]
    fn test_big_int() {
        let mut dec = Decoder::new(&[0x82, 0x04, 0x00]);
        assert_eq!(dec.take_big_int().unwrap(), U256::from(1024u64));
    }

    #[test]
    fn test_truncated_payload() {
        let mut dec = Decoder::new(&[0x83, b'd', b'o']);
        assert_eq!(dec.take_bytes().unwrap_err(), Error::UnexpectedEnd);
    }

    #[test]
    fn test_read_past_list_end() {
        let data = [0xC1, 0x01, 0x02];
        let mut dec = Decoder::new(&data);
        dec.enter_list().unwrap();
        assert_eq!(dec.take_uint(64).unwrap(), 1);
        // 0x02 sits outside the list payload
        assert_eq!(dec.take_bytes().unwrap_err(), Error::UnexpectedEnd);
    }

    #[test]
    fn test_exit_list_away_from_end() {
        let data = [0xC2, 0x01, 0x02];
        let mut dec = Decoder::new(&data);
        dec.enter_list().unwrap();
        dec.take_uint(64).unwrap();
        assert_eq!(
            dec.exit_list().unwrap_err(),
            Error::InvalidValue("list not fully consumed")
        );
        dec.take_uint(64).unwrap();
        dec.exit_list().unwrap();
    }

    #[test]
    fn test_exit_without_list() {
        let mut dec = Decoder::new(&[0x01]);
        assert_eq!(
            dec.exit_list().unwrap_err(),
            Error::InvalidValue("not inside a list")
        );
    }

    #[test]
    fn test_bytes_where_list_expected() {
        let mut dec = Decoder::new(&[0x83, b'c', b'a', b't']);
        let err = dec.enter_list().unwrap_err();
        assert_eq!(
            err,
            Error::UnexpectedKind {
                expected: Kind::List,
                found: Kind::Bytes,
            }
        );
    }
}
