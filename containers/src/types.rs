use alloy_primitives::B256;
use hex::FromHex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use rlp::{Decoder, Error};

/// 32-byte content hash.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct Bytes32(pub B256);

impl Bytes32 {
    pub const ZERO: Bytes32 = Bytes32(B256::ZERO);

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_slice()
    }

    /// Read a 32-byte string off an RLP decoder.
    pub fn decode_from(dec: &mut Decoder<'_>) -> Result<Self, Error> {
        let bytes = dec.take_bytes()?;
        let raw: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| Error::InvalidValue("expected 32 bytes"))?;
        Ok(Bytes32(B256::from(raw)))
    }
}

impl From<[u8; 32]> for Bytes32 {
    fn from(raw: [u8; 32]) -> Self {
        Bytes32(B256::from(raw))
    }
}

impl From<B256> for Bytes32 {
    fn from(raw: B256) -> Self {
        Bytes32(raw)
    }
}

impl FromStr for Bytes32 {
    type Err = hex::FromHexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes: [u8; 32] = <[u8; 32]>::from_hex(s)?;
        Ok(Bytes32(B256::from(bytes)))
    }
}

impl fmt::Display for Bytes32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0.as_slice()))
    }
}
