use blockchain::StoreError;

/// Failures of a single peer RPC.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PeerError {
    /// The request did not complete within the peer's timeout.
    #[error("request timed out")]
    Timeout,

    /// The connection went away while the request was in flight.
    #[error("peer disconnected")]
    Disconnected,

    /// The peer answered with something the protocol does not allow.
    #[error("protocol violation: {0}")]
    Protocol(String),
}

/// Failures of the sync engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// Status fields that must match across the connection differ.
    #[error("handshake mismatch on {field}")]
    HandshakeMismatch { field: &'static str },

    /// A delivered batch failed validation; the serving peer is dropped.
    #[error("malformed batch: {0}")]
    BatchMalformed(String),

    #[error(transparent)]
    Peer(#[from] PeerError),

    /// A store failure during reassembly; fatal for the engine.
    #[error(transparent)]
    Store(#[from] StoreError),
}
