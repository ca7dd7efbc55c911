use alloy_primitives::b256;
use containers::Bytes32;
use serde::{Deserialize, Serialize};

/// ETH/63 protocol version advertised in the handshake.
pub const ETH63: u64 = 63;

/// Headers requested per batch job.
pub const HEADERS_BATCH_SIZE: u64 = 100;

/// Failures after which a peer is taken out of rotation.
pub const MAX_PEER_FAILURES: u32 = 10;

/// Sync engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub network_id: u64,
    /// Requests a single peer may have in flight at once.
    pub max_requests_per_peer: usize,
    /// Concurrent worker tasks driving downloads.
    pub num_workers: usize,
    /// Optional check that a peer's chain includes a well-known historical
    /// header, run once when the peer is added.
    pub dao_challenge: Option<DaoChallenge>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            network_id: 1,
            max_requests_per_peer: 5,
            num_workers: 2,
            dao_challenge: None,
        }
    }
}

/// A historical header a peer must agree on, used to tell apart networks
/// that share a genesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaoChallenge {
    pub number: u64,
    pub hash: Bytes32,
}

impl DaoChallenge {
    /// The mainnet DAO hard-fork block.
    pub fn mainnet() -> Self {
        Self {
            number: 1_920_000,
            hash: Bytes32(b256!(
                "4985f5ca3d2afbec36529aa96f74de3cc10a2a4a6c44f2157a57d2c6059a11bb"
            )),
        }
    }
}
