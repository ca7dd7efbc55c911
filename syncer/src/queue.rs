use std::collections::{BTreeMap, HashMap};

use containers::{Body, Bytes32, Header, Receipt};
use tracing::debug;

use crate::config::HEADERS_BATCH_SIZE;
use crate::error::SyncError;

/// The payload of a download job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobKind {
    Headers {
        start: u64,
        count: u64,
        skip: u64,
        reverse: bool,
    },
    Bodies {
        /// Start number of the batch the bodies belong to.
        batch: u64,
        hashes: Vec<Bytes32>,
    },
    Receipts {
        batch: u64,
        hashes: Vec<Bytes32>,
    },
}

/// A unit of work for one peer, identified by a monotone id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub id: u64,
    pub kind: JobKind,
}

/// A peer's answer to a job.
#[derive(Debug, Clone)]
pub enum JobReply {
    Headers(Vec<Header>),
    Bodies(Vec<Body>),
    Receipts(Vec<Vec<Receipt>>),
}

/// A contiguous batch ready to be written to the store.
#[derive(Debug)]
pub struct CompletedBatch {
    pub headers: Vec<Header>,
    pub bodies: HashMap<Bytes32, Body>,
    pub receipts: HashMap<Bytes32, Vec<Receipt>>,
}

#[derive(Debug, Default)]
struct Batch {
    count: u64,
    headers: Vec<Header>,
    delivered: bool,
    bodies: HashMap<Bytes32, Body>,
    receipts: HashMap<Bytes32, Vec<Receipt>>,
    /// Follow-up jobs not yet delivered.
    outstanding: usize,
}

impl Batch {
    fn complete(&self) -> bool {
        self.delivered && self.outstanding == 0
    }
}

/// Job queue and reassembly buffer.
///
/// Header jobs are minted lazily in fixed-size ranges while the front lies
/// at or below the target; delivered batches park in a sparse map keyed by
/// start number until the prefix adjacent to the committed head is complete.
/// Everything here runs under the engine's delivery lock.
#[derive(Debug)]
pub struct Queue {
    next_id: u64,
    /// Next block number to mint a headers job for.
    front: u64,
    /// Highest block number any peer has advertised.
    target: u64,
    /// Hash of the last header handed to the store.
    commit_head: Bytes32,
    /// Start number of the next batch to commit.
    next_commit: u64,
    /// Jobs awaiting dispatch, oldest id first.
    pending: BTreeMap<u64, Job>,
    /// Dispatched jobs by id, with the serving peer.
    in_flight: HashMap<u64, (String, Job)>,
    batches: BTreeMap<u64, Batch>,
}

impl Queue {
    /// Start scheduling right above the given chain head.
    pub fn new(head: &Header) -> Self {
        Self {
            next_id: 0,
            front: head.number + 1,
            target: head.number,
            commit_head: head.hash(),
            next_commit: head.number + 1,
            pending: BTreeMap::new(),
            in_flight: HashMap::new(),
            batches: BTreeMap::new(),
        }
    }

    /// Raise the download target. Returns whether it moved.
    pub fn update_target(&mut self, number: u64) -> bool {
        if number > self.target {
            self.target = number;
            true
        } else {
            false
        }
    }

    pub fn target(&self) -> u64 {
        self.target
    }

    /// Whether a dequeue would currently hand out a job.
    pub fn has_work(&self) -> bool {
        !self.pending.is_empty() || self.front <= self.target
    }

    /// Hand out the oldest pending job, minting a fresh headers range when
    /// the pending set is empty and the target has not been reached.
    pub fn dequeue(&mut self, peer: &str) -> Option<Job> {
        let oldest = self.pending.keys().next().copied();
        if let Some(id) = oldest {
            let job = self.pending.remove(&id)?;
            self.in_flight.insert(id, (peer.to_string(), job.clone()));
            return Some(job);
        }

        if self.front > self.target {
            return None;
        }
        let start = self.front;
        let count = HEADERS_BATCH_SIZE.min(self.target - start + 1);
        self.front += count;
        self.batches.insert(
            start,
            Batch {
                count,
                ..Default::default()
            },
        );
        let job = Job {
            id: self.take_id(),
            kind: JobKind::Headers {
                start,
                count,
                skip: 0,
                reverse: false,
            },
        };
        self.in_flight.insert(job.id, (peer.to_string(), job.clone()));
        debug!(job = job.id, start, count, "headers job minted");
        Some(job)
    }

    /// Put a dispatched job back on the pending queue, keeping its id so it
    /// stays ahead of younger work.
    pub fn fail(&mut self, id: u64) {
        if let Some((_, job)) = self.in_flight.remove(&id) {
            self.pending.insert(id, job);
        }
    }

    /// Requeue everything in flight on the given peer. Returns the number of
    /// jobs moved.
    pub fn requeue_peer(&mut self, peer: &str) -> usize {
        let ids: Vec<u64> = self
            .in_flight
            .iter()
            .filter(|(_, (assigned, _))| assigned == peer)
            .map(|(id, _)| *id)
            .collect();
        for id in &ids {
            self.fail(*id);
        }
        ids.len()
    }

    /// Accept a peer's reply for the given job.
    ///
    /// On success the result lands in its batch slot and the number of newly
    /// minted follow-up jobs is returned. Validation failures leave the job
    /// in flight so the caller can [`fail`](Queue::fail) it for re-dispatch.
    /// Replies for jobs no longer in flight (requeued or committed in the
    /// meantime) are dropped.
    pub fn deliver(&mut self, id: u64, reply: JobReply) -> Result<usize, SyncError> {
        let kind = match self.in_flight.get(&id) {
            Some((_, job)) => job.kind.clone(),
            None => {
                debug!(job = id, "dropping reply for job no longer in flight");
                return Ok(0);
            }
        };

        let minted = match (kind, reply) {
            (
                JobKind::Headers {
                    start,
                    count,
                    skip,
                    reverse,
                },
                JobReply::Headers(headers),
            ) => {
                validate_headers(start, count, skip, reverse, &headers)?;
                self.accept_headers(start, headers)
            }
            (JobKind::Bodies { batch, hashes }, JobReply::Bodies(bodies)) => {
                if bodies.len() != hashes.len() {
                    return Err(SyncError::BatchMalformed(format!(
                        "asked for {} bodies, got {}",
                        hashes.len(),
                        bodies.len()
                    )));
                }
                if let Some(slot) = self.batches.get_mut(&batch) {
                    slot.bodies.extend(hashes.into_iter().zip(bodies));
                    slot.outstanding = slot.outstanding.saturating_sub(1);
                }
                0
            }
            (JobKind::Receipts { batch, hashes }, JobReply::Receipts(receipts)) => {
                if receipts.len() != hashes.len() {
                    return Err(SyncError::BatchMalformed(format!(
                        "asked for {} receipt lists, got {}",
                        hashes.len(),
                        receipts.len()
                    )));
                }
                if let Some(slot) = self.batches.get_mut(&batch) {
                    slot.receipts.extend(hashes.into_iter().zip(receipts));
                    slot.outstanding = slot.outstanding.saturating_sub(1);
                }
                0
            }
            (kind, _) => {
                return Err(SyncError::BatchMalformed(format!(
                    "reply does not match job {kind:?}"
                )))
            }
        };

        self.in_flight.remove(&id);
        Ok(minted)
    }

    // Fill the headers slot and mint body/receipt follow-ups for headers
    // that announce them.
    fn accept_headers(&mut self, start: u64, headers: Vec<Header>) -> usize {
        let body_hashes: Vec<Bytes32> = headers
            .iter()
            .filter(|h| h.has_body())
            .map(Header::hash)
            .collect();
        let receipt_hashes: Vec<Bytes32> = headers
            .iter()
            .filter(|h| h.has_receipts())
            .map(Header::hash)
            .collect();

        let mut minted = 0;
        if !body_hashes.is_empty() {
            let job = Job {
                id: self.take_id(),
                kind: JobKind::Bodies {
                    batch: start,
                    hashes: body_hashes,
                },
            };
            self.pending.insert(job.id, job);
            minted += 1;
        }
        if !receipt_hashes.is_empty() {
            let job = Job {
                id: self.take_id(),
                kind: JobKind::Receipts {
                    batch: start,
                    hashes: receipt_hashes,
                },
            };
            self.pending.insert(job.id, job);
            minted += 1;
        }

        if let Some(slot) = self.batches.get_mut(&start) {
            slot.headers = headers;
            slot.delivered = true;
            slot.outstanding += minted;
        }
        minted
    }

    /// Extract the contiguous prefix of completed batches adjacent to the
    /// committed head.
    ///
    /// A batch that does not link onto the running head hash came from a
    /// different chain than its predecessor; it is thrown away and a fresh
    /// headers job is minted for the range. The second value counts jobs
    /// minted that way.
    pub fn drain_completed(&mut self) -> (Vec<CompletedBatch>, usize) {
        let mut drained = Vec::new();
        let mut reminted = 0;

        loop {
            let ready = self
                .batches
                .get(&self.next_commit)
                .is_some_and(Batch::complete);
            if !ready {
                break;
            }
            let start = self.next_commit;
            let Some(batch) = self.batches.remove(&start) else {
                break;
            };

            if batch.headers[0].parent_hash != self.commit_head {
                debug!(start, "batch does not link onto the head, refetching");
                let job = Job {
                    id: self.take_id(),
                    kind: JobKind::Headers {
                        start,
                        count: batch.count,
                        skip: 0,
                        reverse: false,
                    },
                };
                self.pending.insert(job.id, job);
                self.batches.insert(start, Batch {
                    count: batch.count,
                    ..Default::default()
                });
                reminted += 1;
                break;
            }

            self.commit_head = batch.headers[batch.headers.len() - 1].hash();
            self.next_commit = start + batch.count;
            drained.push(CompletedBatch {
                headers: batch.headers,
                bodies: batch.bodies,
                receipts: batch.receipts,
            });
        }

        (drained, reminted)
    }

    fn take_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

/// Check a headers reply against its request before it may enter the
/// reassembly buffer.
fn validate_headers(
    start: u64,
    count: u64,
    skip: u64,
    reverse: bool,
    headers: &[Header],
) -> Result<(), SyncError> {
    if headers.is_empty() {
        return Err(SyncError::BatchMalformed("empty response".to_string()));
    }
    if headers.len() as u64 != count {
        return Err(SyncError::BatchMalformed(format!(
            "asked for {count} headers, got {}",
            headers.len()
        )));
    }
    if headers[0].number != start {
        return Err(SyncError::BatchMalformed(format!(
            "first header is {}, requested {start}",
            headers[0].number
        )));
    }

    let stride = skip + 1;
    for pair in headers.windows(2) {
        if pair[1].number != pair[0].number + stride {
            return Err(SyncError::BatchMalformed(format!(
                "numbers jump from {} to {}",
                pair[0].number, pair[1].number
            )));
        }
        if skip == 0 && !reverse && pair[1].parent_hash != pair[0].hash() {
            return Err(SyncError::BatchMalformed(format!(
                "header {} does not link onto its predecessor",
                pair[1].number
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;
    use containers::EMPTY_ROOT;

    fn chain(len: usize) -> Vec<Header> {
        let mut headers = vec![Header {
            difficulty: U256::from(1u64),
            transactions_root: EMPTY_ROOT,
            receipts_root: EMPTY_ROOT,
            ..Default::default()
        }];
        for number in 1..len as u64 {
            let parent = headers[headers.len() - 1].hash();
            headers.push(Header {
                parent_hash: parent,
                number,
                difficulty: U256::from(1u64),
                transactions_root: EMPTY_ROOT,
                receipts_root: EMPTY_ROOT,
                ..Default::default()
            });
        }
        headers
    }

    fn queue_over(chain: &[Header], target: u64) -> Queue {
        let mut queue = Queue::new(&chain[0]);
        queue.update_target(target);
        queue
    }

    #[test]
    fn test_mints_fixed_size_ranges() {
        let chain = chain(251);
        let mut queue = queue_over(&chain, 250);

        let job = queue.dequeue("a").unwrap();
        assert_eq!(
            job.kind,
            JobKind::Headers {
                start: 1,
                count: 100,
                skip: 0,
                reverse: false
            }
        );
        let job = queue.dequeue("a").unwrap();
        assert!(matches!(job.kind, JobKind::Headers { start: 101, count: 100, .. }));
        let job = queue.dequeue("a").unwrap();
        assert!(matches!(job.kind, JobKind::Headers { start: 201, count: 50, .. }));
        assert!(queue.dequeue("a").is_none());
    }

    #[test]
    fn test_out_of_order_delivery_commits_in_order() {
        let chain = chain(201);
        let mut queue = queue_over(&chain, 200);

        let first = queue.dequeue("a").unwrap();
        let second = queue.dequeue("b").unwrap();

        // the younger range lands first; nothing can be committed yet
        queue
            .deliver(second.id, JobReply::Headers(chain[101..=200].to_vec()))
            .unwrap();
        let (drained, _) = queue.drain_completed();
        assert!(drained.is_empty());

        queue
            .deliver(first.id, JobReply::Headers(chain[1..=100].to_vec()))
            .unwrap();
        let (drained, _) = queue.drain_completed();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].headers[0].number, 1);
        assert_eq!(drained[1].headers[99].number, 200);
    }

    #[test]
    fn test_failed_job_is_handed_out_again_first() {
        let chain = chain(101);
        let mut queue = queue_over(&chain, 100);

        let job = queue.dequeue("a").unwrap();
        queue.fail(job.id);

        let again = queue.dequeue("b").unwrap();
        assert_eq!(again.id, job.id);
        assert_eq!(again.kind, job.kind);
    }

    #[test]
    fn test_requeue_peer_moves_only_its_jobs() {
        let chain = chain(201);
        let mut queue = queue_over(&chain, 200);

        let a_job = queue.dequeue("a").unwrap();
        let _b_job = queue.dequeue("b").unwrap();

        assert_eq!(queue.requeue_peer("a"), 1);
        let again = queue.dequeue("c").unwrap();
        assert_eq!(again.id, a_job.id);
    }

    #[test]
    fn test_late_reply_is_dropped() {
        let chain = chain(101);
        let mut queue = queue_over(&chain, 100);

        let job = queue.dequeue("a").unwrap();
        queue.fail(job.id);

        // the reply arrives after the job was requeued
        let minted = queue
            .deliver(job.id, JobReply::Headers(chain[1..=100].to_vec()))
            .unwrap();
        assert_eq!(minted, 0);
        let (drained, _) = queue.drain_completed();
        assert!(drained.is_empty());
    }

    #[test]
    fn test_flagged_headers_mint_followups() {
        let mut chain = chain(101);
        // headers 5 and 6 announce bodies and receipts
        for number in [5usize, 6] {
            chain[number].transactions_root = Bytes32::from([0xAA; 32]);
            chain[number].receipts_root = Bytes32::from([0xBB; 32]);
            // re-link the descendants after the edit
            for i in number + 1..chain.len() {
                chain[i].parent_hash = chain[i - 1].hash();
            }
        }

        let mut queue = queue_over(&chain, 100);
        let job = queue.dequeue("a").unwrap();
        let minted = queue
            .deliver(job.id, JobReply::Headers(chain[1..=100].to_vec()))
            .unwrap();
        assert_eq!(minted, 2);

        // headers alone do not complete the batch
        let (drained, _) = queue.drain_completed();
        assert!(drained.is_empty());

        let bodies_job = queue.dequeue("a").unwrap();
        let JobKind::Bodies { hashes, .. } = bodies_job.kind.clone() else {
            panic!("expected a bodies job");
        };
        assert_eq!(hashes, vec![chain[5].hash(), chain[6].hash()]);
        queue
            .deliver(
                bodies_job.id,
                JobReply::Bodies(vec![Body::default(), Body::default()]),
            )
            .unwrap();

        let receipts_job = queue.dequeue("a").unwrap();
        queue
            .deliver(receipts_job.id, JobReply::Receipts(vec![vec![], vec![]]))
            .unwrap();

        let (drained, _) = queue.drain_completed();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].bodies.len(), 2);
        assert_eq!(drained[0].receipts.len(), 2);
    }

    #[test]
    fn test_unlinked_batch_is_refetched() {
        let good = chain(101);
        let mut bad = chain(101);
        bad[0].extra = b"other genesis".to_vec();
        for i in 1..bad.len() {
            bad[i].parent_hash = bad[i - 1].hash();
        }

        let mut queue = queue_over(&good, 100);
        let job = queue.dequeue("a").unwrap();
        // internally consistent, but grown from a different genesis
        queue
            .deliver(job.id, JobReply::Headers(bad[1..=100].to_vec()))
            .unwrap();

        let (drained, reminted) = queue.drain_completed();
        assert!(drained.is_empty());
        assert_eq!(reminted, 1);

        // the reminted job covers the same range
        let again = queue.dequeue("b").unwrap();
        assert!(matches!(again.kind, JobKind::Headers { start: 1, count: 100, .. }));
    }

    #[test]
    fn test_validation_rejections() {
        let chain = chain(102);
        let mut queue = queue_over(&chain, 100);
        let job = queue.dequeue("a").unwrap();

        for (reply, name) in [
            (Vec::new(), "empty"),
            (chain[1..=50].to_vec(), "short"),
            (chain[2..=101].to_vec(), "wrong start"),
        ] {
            let err = queue
                .deliver(job.id, JobReply::Headers(reply))
                .unwrap_err();
            assert!(matches!(err, SyncError::BatchMalformed(_)), "{name}");
        }

        // a rejected reply leaves the job in flight for an explicit fail
        queue.fail(job.id);
        assert_eq!(queue.dequeue("b").unwrap().id, job.id);
    }
}
