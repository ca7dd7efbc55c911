use alloy_primitives::U256;
use async_trait::async_trait;
use containers::{Body, Bytes32, Header, Receipt, Status};

use crate::error::{PeerError, SyncError};

/// A connected remote peer speaking the ETH/63 wire protocol.
///
/// Implementations carry the transport, framing, and per-request timeouts;
/// every call suspends the calling worker until the peer answers or the
/// request fails with one of the [`PeerError`] kinds.
#[async_trait]
pub trait EthPeer: Send + Sync {
    /// Fetch `count` consecutive headers starting at block `start`.
    async fn request_headers(&self, start: u64, count: u64) -> Result<Vec<Header>, PeerError>;

    /// Fetch the bodies for the given header hashes.
    async fn request_bodies(&self, hashes: &[Bytes32]) -> Result<Vec<Body>, PeerError>;

    /// Fetch the receipt lists for the given header hashes.
    async fn request_receipts(&self, hashes: &[Bytes32]) -> Result<Vec<Vec<Receipt>>, PeerError>;

    /// Fetch a single header by hash, if the peer has it.
    async fn request_header_by_hash(&self, hash: Bytes32) -> Result<Option<Header>, PeerError>;

    /// Fetch a single header by number, if the peer has it.
    async fn request_header_by_number(&self, number: u64) -> Result<Option<Header>, PeerError>;

    /// The head hash the peer advertised in its status.
    fn head(&self) -> Bytes32;

    /// The total difficulty the peer advertised in its status.
    fn total_difficulty(&self) -> U256;
}

/// Validate the status exchange of a fresh connection.
///
/// Network id and genesis must agree; tip hash and total difficulty are the
/// peer's own business.
pub fn handshake(local: &Status, remote: &Status) -> Result<(), SyncError> {
    if local.network_id != remote.network_id {
        return Err(SyncError::HandshakeMismatch {
            field: "network_id",
        });
    }
    if local.genesis_block != remote.genesis_block {
        return Err(SyncError::HandshakeMismatch {
            field: "genesis_block",
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::B256;

    fn status() -> Status {
        Status {
            protocol_version: crate::ETH63,
            network_id: 1,
            total_difficulty: U256::from(1u64),
            current_block: Bytes32(B256::repeat_byte(0x01)),
            genesis_block: Bytes32(B256::repeat_byte(0x01)),
        }
    }

    #[test]
    fn test_handshake_matching() {
        assert!(handshake(&status(), &status()).is_ok());
    }

    #[test]
    fn test_handshake_network_id_mismatch() {
        let mut remote = status();
        remote.network_id = 2;
        assert_eq!(
            handshake(&status(), &remote).unwrap_err(),
            SyncError::HandshakeMismatch {
                field: "network_id"
            }
        );
    }

    #[test]
    fn test_handshake_tip_may_differ() {
        let mut remote = status();
        remote.current_block = Bytes32(B256::repeat_byte(0x02));
        remote.total_difficulty = U256::from(99u64);
        assert!(handshake(&status(), &remote).is_ok());
    }

    #[test]
    fn test_handshake_genesis_mismatch() {
        let mut remote = status();
        remote.genesis_block = Bytes32(B256::repeat_byte(0x02));
        assert_eq!(
            handshake(&status(), &remote).unwrap_err(),
            SyncError::HandshakeMismatch {
                field: "genesis_block"
            }
        );
    }
}
