pub mod chain;
pub mod config;
pub mod error;
pub mod peer;
pub mod peer_manager;
pub mod queue;
pub mod service;

pub use chain::HeaderChain;
pub use config::{DaoChallenge, SyncConfig, ETH63, HEADERS_BATCH_SIZE, MAX_PEER_FAILURES};
pub use error::{PeerError, SyncError};
pub use peer::{handshake, EthPeer};
pub use peer_manager::{PeerSet, SyncPeer};
pub use queue::{CompletedBatch, Job, JobKind, JobReply, Queue};
pub use service::Syncer;
