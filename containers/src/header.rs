use alloy_primitives::{b256, keccak256, U256};
use serde::{Deserialize, Serialize};

use crate::Bytes32;
use rlp::{Decoder, Encoder, Error};

/// Root hash of an empty trie, the marker for "no transactions" and
/// "no receipts" under a header (keccak-256 of the RLP empty string).
pub const EMPTY_ROOT: Bytes32 = Bytes32(b256!(
    "56e81f171bcc55a6ff8345e692c0f86e5b48e01b996cadc001622fb5e363b421"
));

/// A block header.
///
/// Identity is the keccak-256 hash of the canonical RLP encoding. Fields the
/// chain core does not interpret are carried as one opaque `extra` blob.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Header {
    pub parent_hash: Bytes32,
    pub transactions_root: Bytes32,
    pub receipts_root: Bytes32,
    pub difficulty: U256,
    pub number: u64,
    pub extra: Vec<u8>,
}

impl Header {
    /// Content hash of the canonical encoding.
    pub fn hash(&self) -> Bytes32 {
        Bytes32(keccak256(self.encode()))
    }

    /// Whether the header announces a non-empty transaction set.
    pub fn has_body(&self) -> bool {
        self.transactions_root != EMPTY_ROOT
    }

    /// Whether the header announces a non-empty receipt set.
    pub fn has_receipts(&self) -> bool {
        self.receipts_root != EMPTY_ROOT
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut enc = Encoder::new();
        self.encode_into(&mut enc);
        enc.finish()
    }

    pub fn encode_into(&self, enc: &mut Encoder) {
        enc.list(|e| {
            e.bytes(self.parent_hash.as_bytes());
            e.bytes(self.transactions_root.as_bytes());
            e.bytes(self.receipts_root.as_bytes());
            e.big_int(&self.difficulty);
            e.uint(self.number);
            e.bytes(&self.extra);
        });
    }

    pub fn decode(data: &[u8]) -> Result<Self, Error> {
        let mut dec = Decoder::new(data);
        Self::decode_from(&mut dec)
    }

    pub fn decode_from(dec: &mut Decoder<'_>) -> Result<Self, Error> {
        dec.enter_list()?;
        let header = Header {
            parent_hash: Bytes32::decode_from(dec)?,
            transactions_root: Bytes32::decode_from(dec)?,
            receipts_root: Bytes32::decode_from(dec)?,
            difficulty: dec.take_big_int()?,
            number: dec.take_uint(64)?,
            extra: dec.take_bytes()?,
        };
        dec.exit_list()?;
        Ok(header)
    }
}
