use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::warn;

use crate::config::MAX_PEER_FAILURES;
use crate::peer::EthPeer;

/// Per-peer bookkeeping for the scheduler.
pub struct SyncPeer {
    pub id: String,
    pub conn: Arc<dyn EthPeer>,
    pub active: bool,
    /// Failed requests so far; at [`MAX_PEER_FAILURES`] the peer leaves the
    /// rotation.
    pub failed: u32,
    /// Requests currently in flight on this peer.
    pub pending: usize,
}

/// Peer membership, request slots, and the worker waiter list.
///
/// All of it lives under one lock so that checking for a free slot and
/// parking are a single atomic step.
pub struct PeerSet {
    peers: HashMap<String, SyncPeer>,
    waiters: VecDeque<oneshot::Sender<()>>,
    max_pending: usize,
}

impl PeerSet {
    pub fn new(max_pending: usize) -> Self {
        Self {
            peers: HashMap::new(),
            waiters: VecDeque::new(),
            max_pending,
        }
    }

    pub fn insert(&mut self, id: String, conn: Arc<dyn EthPeer>) {
        self.peers.insert(
            id.clone(),
            SyncPeer {
                id,
                conn,
                active: true,
                failed: 0,
                pending: 0,
            },
        );
    }

    pub fn contains(&self, id: &str) -> bool {
        self.peers.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&SyncPeer> {
        self.peers.get(id)
    }

    /// Pick the best available peer and claim one request slot on it.
    ///
    /// Candidates are active peers below their slot limit, least-failed
    /// first, least-loaded second.
    pub fn select(&mut self) -> Option<(String, Arc<dyn EthPeer>)> {
        let mut candidates: Vec<&SyncPeer> = self
            .peers
            .values()
            .filter(|peer| peer.active && peer.pending < self.max_pending)
            .collect();
        candidates.sort_by_key(|peer| (peer.failed, peer.pending));

        let id = candidates.first()?.id.clone();
        let peer = self.peers.get_mut(&id)?;
        peer.pending += 1;
        Some((id, peer.conn.clone()))
    }

    /// Acknowledge a finished request, freeing the slot and signalling one
    /// parked worker.
    pub fn ack(&mut self, id: &str, failed: bool) {
        if let Some(peer) = self.peers.get_mut(id) {
            peer.pending = peer.pending.saturating_sub(1);
            if failed {
                peer.failed += 1;
                if peer.failed >= MAX_PEER_FAILURES && peer.active {
                    peer.active = false;
                    warn!(peer = id, failures = peer.failed, "peer taken out of rotation");
                }
            }
        }
        self.wake(1);
    }

    /// Give back an unused slot without signalling anyone.
    ///
    /// Used when a worker claimed a slot and then found no work; waking
    /// another parked worker here would only bounce the empty queue back
    /// and forth.
    pub fn release(&mut self, id: &str) {
        if let Some(peer) = self.peers.get_mut(id) {
            peer.pending = peer.pending.saturating_sub(1);
        }
    }

    /// Take a peer out of rotation without touching its slots.
    pub fn deactivate(&mut self, id: &str) {
        if let Some(peer) = self.peers.get_mut(id) {
            peer.active = false;
        }
    }

    /// Register the caller on the waiter list.
    ///
    /// The returned receiver fires on the next wake-up; the woken worker must
    /// re-check state, a stale signal promises nothing.
    pub fn park(&mut self) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        self.waiters.push_back(tx);
        rx
    }

    /// Signal up to `n` parked workers.
    pub fn wake(&mut self, n: usize) {
        let mut woken = 0;
        while woken < n {
            let Some(waiter) = self.waiters.pop_front() else {
                return;
            };
            // a dropped receiver just means that worker already moved on
            if waiter.send(()).is_ok() {
                woken += 1;
            }
        }
    }

    pub fn wake_all(&mut self) {
        while let Some(waiter) = self.waiters.pop_front() {
            let _ = waiter.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PeerError;
    use alloy_primitives::U256;
    use async_trait::async_trait;
    use containers::{Body, Bytes32, Header, Receipt};

    struct NullPeer;

    #[async_trait]
    impl EthPeer for NullPeer {
        async fn request_headers(&self, _: u64, _: u64) -> Result<Vec<Header>, PeerError> {
            Err(PeerError::Disconnected)
        }
        async fn request_bodies(&self, _: &[Bytes32]) -> Result<Vec<Body>, PeerError> {
            Err(PeerError::Disconnected)
        }
        async fn request_receipts(&self, _: &[Bytes32]) -> Result<Vec<Vec<Receipt>>, PeerError> {
            Err(PeerError::Disconnected)
        }
        async fn request_header_by_hash(&self, _: Bytes32) -> Result<Option<Header>, PeerError> {
            Err(PeerError::Disconnected)
        }
        async fn request_header_by_number(&self, _: u64) -> Result<Option<Header>, PeerError> {
            Err(PeerError::Disconnected)
        }
        fn head(&self) -> Bytes32 {
            Bytes32::ZERO
        }
        fn total_difficulty(&self) -> U256 {
            U256::ZERO
        }
    }

    fn set_with(ids: &[&str]) -> PeerSet {
        let mut set = PeerSet::new(2);
        for id in ids {
            set.insert(id.to_string(), Arc::new(NullPeer));
        }
        set
    }

    #[test]
    fn test_select_prefers_least_failed_then_least_loaded() {
        let mut set = set_with(&["a", "b"]);
        set.peers.get_mut("a").unwrap().failed = 1;

        let (id, _) = set.select().unwrap();
        assert_eq!(id, "b");

        // b now has one pending request; still fewer failures than a
        let (id, _) = set.select().unwrap();
        assert_eq!(id, "b");

        // b is full, a is the only candidate left
        let (id, _) = set.select().unwrap();
        assert_eq!(id, "a");
    }

    #[test]
    fn test_slots_are_claimed_and_released() {
        let mut set = set_with(&["a"]);
        assert!(set.select().is_some());
        assert!(set.select().is_some());
        assert!(set.select().is_none());

        set.ack("a", false);
        assert!(set.select().is_some());

        set.release("a");
        assert!(set.select().is_some());
    }

    #[test]
    fn test_failures_deactivate_peer() {
        let mut set = set_with(&["a"]);
        for _ in 0..MAX_PEER_FAILURES {
            assert!(set.select().is_some());
            set.ack("a", true);
        }
        assert!(!set.get("a").unwrap().active);
        assert!(set.select().is_none());
    }

    #[tokio::test]
    async fn test_ack_wakes_a_parked_waiter() {
        let mut set = set_with(&["a"]);
        let rx = set.park();
        set.ack("a", false);
        rx.await.unwrap();
    }
}
