use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use blockchain::StoreError;
use containers::{Block, Header, Status};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::chain::HeaderChain;
use crate::config::{SyncConfig, ETH63};
use crate::error::{PeerError, SyncError};
use crate::peer::EthPeer;
use crate::peer_manager::PeerSet;
use crate::queue::{CompletedBatch, Job, JobKind, JobReply, Queue};

/// The sync engine.
///
/// Drives `num_workers` tasks against the connected peers to pull header
/// ranges, bodies, and receipts, reorders replies into chain order, and
/// feeds the store. Runs until [`stop`](Syncer::stop); new peers can keep
/// raising the target forever.
///
/// Two locks, never held across an RPC: the peers lock (membership, slot
/// counts, waiter list) and the delivery lock (job queue, reassembly buffer,
/// store writes).
pub struct Syncer<C> {
    config: SyncConfig,
    chain: Arc<C>,
    peers: Mutex<PeerSet>,
    delivery: Mutex<Queue>,
    shutdown: AtomicBool,
    workers: Mutex<Vec<JoinHandle<()>>>,
    fault: Mutex<Option<SyncError>>,
}

impl<C: HeaderChain + 'static> Syncer<C> {
    /// Build an engine over an initialized store.
    pub fn new(chain: Arc<C>, config: SyncConfig) -> Result<Self, SyncError> {
        let head = chain.header().ok_or(StoreError::GenesisMissing)?;
        info!(number = head.number, hash = %head.hash(), "syncer starting from local head");

        Ok(Self {
            peers: Mutex::new(PeerSet::new(config.max_requests_per_peer)),
            delivery: Mutex::new(Queue::new(&head)),
            config,
            chain,
            shutdown: AtomicBool::new(false),
            workers: Mutex::new(Vec::new()),
            fault: Mutex::new(None),
        })
    }

    /// Spawn the worker tasks.
    pub fn start(self: &Arc<Self>) {
        let mut workers = self.workers.lock();
        for wid in 0..self.config.num_workers {
            let engine = Arc::clone(self);
            workers.push(tokio::spawn(engine.worker(wid)));
        }
    }

    /// Signal shutdown, wake every parked worker, and wait for them to drain.
    pub async fn stop(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.peers.lock().wake_all();

        let handles: Vec<JoinHandle<()>> = self.workers.lock().drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
        info!("syncer stopped");
    }

    /// The error that brought the engine down, if any.
    pub fn fault(&self) -> Option<SyncError> {
        self.fault.lock().clone()
    }

    /// Local ETH/63 status for the handshake.
    pub fn status(&self) -> Result<Status, SyncError> {
        let head = self.chain.header().ok_or(StoreError::GenesisMissing)?;
        let genesis = self.chain.genesis().ok_or(StoreError::GenesisMissing)?;
        Ok(Status {
            protocol_version: ETH63,
            network_id: self.config.network_id,
            total_difficulty: self.chain.head_total_difficulty().unwrap_or_default(),
            current_block: head.hash(),
            genesis_block: genesis.hash(),
        })
    }

    /// Register a connected peer.
    ///
    /// Runs the optional DAO challenge, verifies the advertised tip, and
    /// raises the download target when the peer's chain is heavier than the
    /// local one.
    pub async fn add_peer(
        &self,
        id: impl Into<String>,
        conn: Arc<dyn EthPeer>,
    ) -> Result<(), SyncError> {
        let id = id.into();

        if let Some(dao) = &self.config.dao_challenge {
            match conn.request_header_by_number(dao.number).await? {
                Some(header) if header.hash() != dao.hash => {
                    return Err(PeerError::Protocol(
                        "DAO challenge header mismatch".to_string(),
                    )
                    .into());
                }
                // a peer below the challenge height gets the benefit of
                // the doubt
                _ => debug!(peer = %id, "DAO challenge passed"),
            }
        }

        let advertised = conn.head();
        let tip = conn
            .request_header_by_hash(advertised)
            .await?
            .ok_or_else(|| {
                PeerError::Protocol("peer did not return its advertised head".to_string())
            })?;
        if tip.hash() != advertised {
            return Err(
                PeerError::Protocol("advertised head does not match header".to_string()).into(),
            );
        }

        {
            let mut peers = self.peers.lock();
            peers.insert(id.clone(), conn.clone());
            peers.wake(1);
        }

        let local_td = self.chain.head_total_difficulty().unwrap_or_default();
        let remote_td = conn.total_difficulty();
        if remote_td > local_td {
            let raised = self.delivery.lock().update_target(tip.number);
            if raised {
                info!(peer = %id, height = tip.number, td = %remote_td, "sync target raised");
                self.peers.lock().wake(self.config.num_workers);
            }
        } else {
            debug!(peer = %id, td = %remote_td, "peer is not ahead of the local chain");
        }
        Ok(())
    }

    /// Mark a peer inactive and put its in-flight jobs back on the queue.
    ///
    /// The record stays around so its failure history survives; an inactive
    /// peer is simply never selected again.
    pub fn remove_peer(&self, id: &str) {
        {
            let mut peers = self.peers.lock();
            if !peers.contains(id) {
                return;
            }
            peers.deactivate(id);
        }
        let requeued = self.delivery.lock().requeue_peer(id);
        if requeued > 0 {
            self.peers.lock().wake(requeued);
        }
        info!(peer = id, requeued, "peer removed");
    }

    /// Binary-search the highest block shared with the peer's chain.
    ///
    /// Returns `None` when the chains diverge from the very first probe.
    pub async fn find_common_ancestor(
        &self,
        conn: &dyn EthPeer,
    ) -> Result<Option<Header>, SyncError> {
        let local_head = self.chain.header().ok_or(StoreError::GenesisMissing)?;
        let tip = conn
            .request_header_by_hash(conn.head())
            .await?
            .ok_or_else(|| {
                PeerError::Protocol("peer did not return its advertised head".to_string())
            })?;

        let mut min = 0u64;
        let mut max = local_head.number.min(tip.number);
        let mut found = None;

        while min <= max {
            let probe = min + (max - min) / 2;
            let headers = conn.request_headers(probe, 1).await?;
            match headers.len() {
                0 => {
                    // the peer does not serve this height; search lower
                    if probe == 0 {
                        break;
                    }
                    max = probe - 1;
                }
                1 => {
                    let header = &headers[0];
                    if header.number != probe {
                        return Err(PeerError::Protocol(format!(
                            "asked for header {probe}, got {}",
                            header.number
                        ))
                        .into());
                    }
                    let local = self.chain.get_by_number(probe).ok_or_else(|| {
                        PeerError::Protocol(format!("no canonical header at {probe}"))
                    })?;
                    if local.hash() == header.hash() {
                        found = Some(header.clone());
                        min = probe + 1;
                    } else {
                        if probe == 0 {
                            return Ok(None);
                        }
                        max = probe - 1;
                    }
                }
                n => {
                    return Err(PeerError::Protocol(format!(
                        "expected at most one header, got {n}"
                    ))
                    .into());
                }
            }
        }
        Ok(found)
    }

    async fn worker(self: Arc<Self>, wid: usize) {
        debug!(worker = wid, "worker task starting");
        loop {
            if self.stopping() {
                break;
            }
            let Some((peer_id, conn)) = self.acquire_peer().await else {
                break;
            };

            let job = self.delivery.lock().dequeue(&peer_id);
            let Some(job) = job else {
                // no work for the slot; give it back quietly and park
                self.peers.lock().release(&peer_id);
                if !self.park_for_work().await {
                    break;
                }
                continue;
            };

            debug!(worker = wid, job = job.id, peer = %peer_id, kind = ?job.kind, "job dispatched");
            let result = self.execute(conn.as_ref(), &job).await;
            self.peers.lock().ack(&peer_id, result.is_err());
            self.handle_delivery(&peer_id, job, result);
        }
        debug!(worker = wid, "worker task stopped");
    }

    async fn execute(&self, conn: &dyn EthPeer, job: &Job) -> Result<JobReply, PeerError> {
        match &job.kind {
            JobKind::Headers { start, count, .. } => conn
                .request_headers(*start, *count)
                .await
                .map(JobReply::Headers),
            JobKind::Bodies { hashes, .. } => {
                conn.request_bodies(hashes).await.map(JobReply::Bodies)
            }
            JobKind::Receipts { hashes, .. } => {
                conn.request_receipts(hashes).await.map(JobReply::Receipts)
            }
        }
    }

    // Serialize the reply into the reassembly buffer and push any completed
    // prefix into the store.
    fn handle_delivery(&self, peer_id: &str, job: Job, result: Result<JobReply, PeerError>) {
        let job_id = job.id;

        let reply = match result {
            Err(err) => {
                warn!(peer = %peer_id, job = job_id, %err, "request failed, requeueing job");
                self.delivery.lock().fail(job_id);
                self.peers.lock().wake(1);
                return;
            }
            Ok(reply) => reply,
        };

        let mut delivery = self.delivery.lock();
        let minted = match delivery.deliver(job_id, reply) {
            Err(err) => {
                // the peer answered garbage; requeue the work elsewhere and
                // cut the peer loose
                warn!(peer = %peer_id, job = job_id, %err, "malformed batch, dropping peer");
                delivery.fail(job_id);
                drop(delivery);
                let mut peers = self.peers.lock();
                peers.deactivate(peer_id);
                peers.wake(1);
                return;
            }
            Ok(minted) => minted,
        };

        let (completed, reminted) = delivery.drain_completed();
        for batch in &completed {
            if let Err(err) = self.commit_batch(batch) {
                drop(delivery);
                self.fail_fatal(err);
                return;
            }
        }
        drop(delivery);

        if minted + reminted > 0 {
            self.peers.lock().wake(minted + reminted);
        }
    }

    // Store writes happen under the delivery lock, so batches land strictly
    // in block-number order.
    fn commit_batch(&self, batch: &CompletedBatch) -> Result<(), StoreError> {
        self.chain.write_headers(&batch.headers)?;

        let mut blocks = Vec::new();
        let mut receipts = Vec::new();
        for header in &batch.headers {
            let hash = header.hash();
            let body = batch.bodies.get(&hash);
            let receipt_list = batch.receipts.get(&hash);
            if body.is_some() || receipt_list.is_some() {
                blocks.push(Block::new(header.clone(), body.cloned().unwrap_or_default()));
                receipts.push(receipt_list.cloned().unwrap_or_default());
            }
        }
        if !blocks.is_empty() {
            self.chain.commit_chain(&blocks, &receipts)?;
        }

        let last = &batch.headers[batch.headers.len() - 1];
        debug!(to = last.number, "batch committed");
        Ok(())
    }

    // A store failure during reassembly means an invariant broke upstream;
    // bring the engine down and keep the error for the supervisor.
    fn fail_fatal(&self, err: StoreError) {
        error!(%err, "store rejected a validated batch, stopping engine");
        *self.fault.lock() = Some(SyncError::Store(err));
        self.shutdown.store(true, Ordering::SeqCst);
        self.peers.lock().wake_all();
    }

    // Claim a request slot on the best available peer, parking while there
    // is none. Returns `None` on shutdown.
    async fn acquire_peer(&self) -> Option<(String, Arc<dyn EthPeer>)> {
        loop {
            if self.stopping() {
                return None;
            }
            let waiter = {
                let mut peers = self.peers.lock();
                match peers.select() {
                    Some(picked) => return Some(picked),
                    // registering under the peers lock closes the race with
                    // wake-ups, which take the same lock
                    None => peers.park(),
                }
            };
            let _ = waiter.await;
        }
    }

    // Park until new work may exist. Returns `false` on shutdown.
    async fn park_for_work(&self) -> bool {
        let waiter = { self.peers.lock().park() };
        // jobs live under the other lock; re-check after registering so a
        // wake-up between the dequeue miss and the park is not lost
        if self.delivery.lock().has_work() {
            return !self.stopping();
        }
        let _ = waiter.await;
        !self.stopping()
    }

    fn stopping(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}
