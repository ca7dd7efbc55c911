use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

use crate::Bytes32;
use rlp::{Decoder, Encoder, Error};

/// ETH/63 handshake payload.
///
/// Exchanged once per connection; `network_id` and `genesis_block` must
/// match for the connection to survive, while `total_difficulty` and
/// `current_block` describe the remote tip and may differ freely.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Status {
    pub protocol_version: u64,
    pub network_id: u64,
    pub total_difficulty: U256,
    pub current_block: Bytes32,
    pub genesis_block: Bytes32,
}

impl Status {
    pub fn encode(&self) -> Vec<u8> {
        let mut enc = Encoder::new();
        enc.list(|e| {
            e.uint(self.protocol_version);
            e.uint(self.network_id);
            e.big_int(&self.total_difficulty);
            e.bytes(self.current_block.as_bytes());
            e.bytes(self.genesis_block.as_bytes());
        });
        enc.finish()
    }

    pub fn decode(data: &[u8]) -> Result<Self, Error> {
        let mut dec = Decoder::new(data);
        dec.enter_list()?;
        let status = Status {
            protocol_version: dec.take_uint(64)?,
            network_id: dec.take_uint(64)?,
            total_difficulty: dec.take_big_int()?,
            current_block: Bytes32::decode_from(&mut dec)?,
            genesis_block: Bytes32::decode_from(&mut dec)?,
        };
        dec.exit_list()?;
        Ok(status)
    }
}
