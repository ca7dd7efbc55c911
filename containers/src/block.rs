use alloy_primitives::keccak256;
use serde::{Deserialize, Serialize};

use crate::{Bytes32, Header};
use rlp::{Decoder, Encoder, Error};

/// A transaction carried in a block body.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Transaction {
    pub nonce: u64,
    pub payload: Vec<u8>,
}

impl Transaction {
    pub fn hash(&self) -> Bytes32 {
        Bytes32(keccak256(self.encode()))
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut enc = Encoder::new();
        self.encode_into(&mut enc);
        enc.finish()
    }

    pub fn encode_into(&self, enc: &mut Encoder) {
        enc.list(|e| {
            e.uint(self.nonce);
            e.bytes(&self.payload);
        });
    }

    pub fn decode_from(dec: &mut Decoder<'_>) -> Result<Self, Error> {
        dec.enter_list()?;
        let tx = Transaction {
            nonce: dec.take_uint(64)?,
            payload: dec.take_bytes()?,
        };
        dec.exit_list()?;
        Ok(tx)
    }
}

/// The ordered transactions under a header.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Body {
    pub transactions: Vec<Transaction>,
}

impl Body {
    pub fn encode(&self) -> Vec<u8> {
        let mut enc = Encoder::new();
        self.encode_into(&mut enc);
        enc.finish()
    }

    pub fn encode_into(&self, enc: &mut Encoder) {
        enc.list(|e| {
            for tx in &self.transactions {
                tx.encode_into(e);
            }
        });
    }

    pub fn decode(data: &[u8]) -> Result<Self, Error> {
        let mut dec = Decoder::new(data);
        Self::decode_from(&mut dec)
    }

    pub fn decode_from(dec: &mut Decoder<'_>) -> Result<Self, Error> {
        dec.enter_list()?;
        let mut transactions = Vec::new();
        while dec.has_more() {
            transactions.push(Transaction::decode_from(dec)?);
        }
        dec.exit_list()?;
        Ok(Body { transactions })
    }
}

/// A per-transaction execution outcome.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Receipt {
    pub cumulative_gas_used: u64,
    pub tx_hash: Bytes32,
}

impl Receipt {
    pub fn encode_into(&self, enc: &mut Encoder) {
        enc.list(|e| {
            e.uint(self.cumulative_gas_used);
            e.bytes(self.tx_hash.as_bytes());
        });
    }

    pub fn decode_from(dec: &mut Decoder<'_>) -> Result<Self, Error> {
        dec.enter_list()?;
        let receipt = Receipt {
            cumulative_gas_used: dec.take_uint(64)?,
            tx_hash: Bytes32::decode_from(dec)?,
        };
        dec.exit_list()?;
        Ok(receipt)
    }

    /// Encode a receipt list as one record.
    pub fn encode_list(receipts: &[Receipt]) -> Vec<u8> {
        let mut enc = Encoder::new();
        enc.list(|e| {
            for receipt in receipts {
                receipt.encode_into(e);
            }
        });
        enc.finish()
    }

    /// Decode a receipt list record.
    pub fn decode_list(data: &[u8]) -> Result<Vec<Receipt>, Error> {
        let mut dec = Decoder::new(data);
        dec.enter_list()?;
        let mut receipts = Vec::new();
        while dec.has_more() {
            receipts.push(Receipt::decode_from(&mut dec)?);
        }
        dec.exit_list()?;
        Ok(receipts)
    }
}

/// A header together with its body.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Block {
    pub header: Header,
    pub body: Body,
}

impl Block {
    pub fn new(header: Header, body: Body) -> Self {
        Self { header, body }
    }

    pub fn hash(&self) -> Bytes32 {
        self.header.hash()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_body_round_trip() {
        let body = Body {
            transactions: vec![
                Transaction {
                    nonce: 1,
                    payload: b"one".to_vec(),
                },
                Transaction {
                    nonce: 2,
                    payload: Vec::new(),
                },
            ],
        };
        assert_eq!(Body::decode(&body.encode()).unwrap(), body);
    }

    #[test]
    fn test_empty_body_is_empty_list() {
        let body = Body::default();
        assert_eq!(body.encode(), vec![0xC0]);
        assert_eq!(Body::decode(&[0xC0]).unwrap(), body);
    }

    #[test]
    fn test_receipt_list_round_trip() {
        let tx = Transaction {
            nonce: 9,
            payload: Vec::new(),
        };
        let receipts = vec![Receipt {
            cumulative_gas_used: 9,
            tx_hash: tx.hash(),
        }];
        let encoded = Receipt::encode_list(&receipts);
        assert_eq!(Receipt::decode_list(&encoded).unwrap(), receipts);
    }
}
