use std::collections::HashMap;

use alloy_primitives::U256;
use containers::{Block, Body, Bytes32, Header, Receipt};
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::db::{body_key, canonical_key, header_key, receipts_key, td_key, KeyValue};
use crate::StoreError;

/// Append-only header store with fork tracking.
///
/// All observed headers are kept forever; the canonical head is the header
/// with the largest total difficulty, ties going to the earliest seen. The
/// fork set holds one tip per live non-canonical branch.
pub struct Blockchain<D> {
    db: D,
    state: RwLock<ChainState>,
}

#[derive(Debug, Clone, Default)]
struct ChainState {
    head: Option<Bytes32>,
    genesis: Option<Bytes32>,
    forks: Vec<Bytes32>,
}

impl<D: KeyValue> Blockchain<D> {
    pub fn new(db: D) -> Self {
        Self {
            db,
            state: RwLock::new(ChainState::default()),
        }
    }

    /// Initialize the chain with its first header.
    pub fn write_genesis(&self, genesis: &Header) -> Result<(), StoreError> {
        let mut state = self.state.write();
        if state.genesis.is_some() {
            return Err(StoreError::AlreadyInitialized);
        }

        let hash = genesis.hash();
        self.db.put(header_key(&hash), genesis.encode());
        self.db
            .put(td_key(&hash), rlp::encode_big_int(&genesis.difficulty));
        self.db
            .put(canonical_key(genesis.number), hash.as_bytes().to_vec());

        state.genesis = Some(hash);
        state.head = Some(hash);

        info!(number = genesis.number, %hash, "genesis written");
        Ok(())
    }

    /// Append one header.
    pub fn write_header(&self, header: &Header) -> Result<(), StoreError> {
        self.write_headers(std::slice::from_ref(header))
    }

    /// Append a batch of headers atomically.
    ///
    /// Writes are staged; if any header fails its preconditions the store is
    /// left exactly as it was.
    pub fn write_headers(&self, headers: &[Header]) -> Result<(), StoreError> {
        let mut state = self.state.write();
        let mut staged = state.clone();
        let mut overlay = Overlay::new(&self.db);

        for header in headers {
            apply_header(&mut overlay, &mut staged, header)?;
        }

        overlay.flush();
        *state = staged;
        Ok(())
    }

    /// The canonical head, if any header has been written.
    pub fn header(&self) -> Option<Header> {
        let head = self.state.read().head?;
        self.get_by_hash(&head)
    }

    pub fn genesis(&self) -> Option<Header> {
        let genesis = self.state.read().genesis?;
        self.get_by_hash(&genesis)
    }

    pub fn get_by_hash(&self, hash: &Bytes32) -> Option<Header> {
        let raw = self.db.get(&header_key(hash))?;
        Header::decode(&raw).ok()
    }

    /// The canonical header at the given height, if the canonical chain
    /// reaches it.
    pub fn get_by_number(&self, number: u64) -> Option<Header> {
        let raw = self.db.get(&canonical_key(number))?;
        let hash: [u8; 32] = raw.as_slice().try_into().ok()?;
        self.get_by_hash(&Bytes32::from(hash))
    }

    /// Cumulative difficulty from genesis up to the given header.
    pub fn total_difficulty(&self, hash: &Bytes32) -> Option<U256> {
        let raw = self.db.get(&td_key(hash))?;
        rlp::Decoder::new(&raw).take_big_int().ok()
    }

    /// Total difficulty of the canonical head.
    pub fn head_total_difficulty(&self) -> Option<U256> {
        let head = self.state.read().head?;
        self.total_difficulty(&head)
    }

    /// Tips of all live non-canonical branches.
    pub fn forks(&self) -> Vec<Bytes32> {
        self.state.read().forks.clone()
    }

    /// The body attached to a header, if one was ever committed.
    ///
    /// `None` means "not fetched yet"; a committed empty body decodes to a
    /// body with zero transactions.
    pub fn get_body(&self, hash: &Bytes32) -> Option<Body> {
        let raw = self.db.get(&body_key(hash))?;
        Body::decode(&raw).ok()
    }

    pub fn get_receipts(&self, hash: &Bytes32) -> Option<Vec<Receipt>> {
        let raw = self.db.get(&receipts_key(hash))?;
        Receipt::decode_list(&raw).ok()
    }

    /// Attach bodies and receipts to headers already in the store.
    pub fn commit_chain(
        &self,
        blocks: &[Block],
        receipts: &[Vec<Receipt>],
    ) -> Result<(), StoreError> {
        if blocks.len() != receipts.len() {
            return Err(StoreError::BatchMismatch {
                blocks: blocks.len(),
                receipts: receipts.len(),
            });
        }

        for (block, block_receipts) in blocks.iter().zip(receipts) {
            let hash = block.hash();
            if self.db.get(&header_key(&hash)).is_none() {
                return Err(StoreError::UnknownHeader(hash));
            }
            if block.body.transactions.len() != block_receipts.len() {
                return Err(StoreError::ReceiptMismatch {
                    block: hash,
                    transactions: block.body.transactions.len(),
                    receipts: block_receipts.len(),
                });
            }
        }

        for (block, block_receipts) in blocks.iter().zip(receipts) {
            let hash = block.hash();
            self.db.put(body_key(&hash), block.body.encode());
            self.db
                .put(receipts_key(&hash), Receipt::encode_list(block_receipts));
        }
        Ok(())
    }
}

fn apply_header<D: KeyValue>(
    overlay: &mut Overlay<'_, D>,
    state: &mut ChainState,
    header: &Header,
) -> Result<(), StoreError> {
    let head = state.head.ok_or(StoreError::GenesisMissing)?;

    let hash = header.hash();
    if overlay.read_header(&hash).is_some() {
        return Err(StoreError::Duplicate(hash));
    }
    let parent = overlay
        .read_header(&header.parent_hash)
        .ok_or(StoreError::ParentMissing(header.parent_hash))?;
    if header.number != parent.number + 1 {
        return Err(StoreError::InvalidNumber {
            parent: parent.number,
            header: header.number,
        });
    }

    let parent_td = overlay
        .read_td(&header.parent_hash)
        .ok_or(StoreError::MissingRecord(header.parent_hash))?;
    let td = parent_td + header.difficulty;

    overlay.put(header_key(&hash), header.encode());
    overlay.put(td_key(&hash), rlp::encode_big_int(&td));

    let head_td = overlay
        .read_td(&head)
        .ok_or(StoreError::MissingRecord(head))?;

    if td > head_td {
        adopt_head(overlay, state, hash, header)?;
    } else {
        // the new header stays on a side branch; a child of a fork tip
        // takes over that tip, anything else opens a new branch
        if let Some(slot) = state.forks.iter().position(|f| *f == header.parent_hash) {
            state.forks[slot] = hash;
        } else {
            state.forks.push(hash);
        }
        debug!(number = header.number, %hash, td = %td, "fork header written");
    }
    Ok(())
}

// Switch the canonical head to `new`, rewriting the canonical-number index
// between the common ancestor and the two tips and rebalancing the fork set.
fn adopt_head<D: KeyValue>(
    overlay: &mut Overlay<'_, D>,
    state: &mut ChainState,
    new_hash: Bytes32,
    new_header: &Header,
) -> Result<(), StoreError> {
    let old_hash = state.head.ok_or(StoreError::GenesisMissing)?;
    let old_header = overlay
        .read_header(&old_hash)
        .ok_or(StoreError::MissingRecord(old_hash))?;

    let (ancestor_hash, ancestor_number) =
        common_ancestor(overlay, new_hash, new_header, old_hash, &old_header)?;

    // the displaced chain may have reached higher than the new one
    for number in ancestor_number + 1..=old_header.number {
        overlay.delete(canonical_key(number));
    }

    let mut cursor_hash = new_hash;
    let mut cursor = new_header.clone();
    while cursor_hash != ancestor_hash {
        overlay.put(canonical_key(cursor.number), cursor_hash.as_bytes().to_vec());
        cursor_hash = cursor.parent_hash;
        cursor = overlay
            .read_header(&cursor_hash)
            .ok_or(StoreError::MissingRecord(cursor_hash))?;
    }

    // tips swallowed by the new canonical chain are no longer forks
    let mut forks = Vec::with_capacity(state.forks.len());
    for tip in &state.forks {
        if !is_ancestor(overlay, tip, &new_hash)? {
            forks.push(*tip);
        }
    }

    // the displaced head becomes a fork tip unless the new chain or an
    // existing tip already covers it
    if old_hash != ancestor_hash {
        let mut dominated = false;
        for tip in &forks {
            if is_ancestor(overlay, &old_hash, tip)? {
                dominated = true;
                break;
            }
        }
        if !dominated {
            forks.push(old_hash);
        }
    }

    state.forks = forks;
    state.head = Some(new_hash);

    if ancestor_hash == old_hash {
        debug!(number = new_header.number, hash = %new_hash, "head extended");
    } else {
        info!(
            old = %old_hash,
            new = %new_hash,
            ancestor = ancestor_number,
            "chain reorged"
        );
    }
    Ok(())
}

// Lockstep walk towards the common ancestor of two headers.
fn common_ancestor<D: KeyValue>(
    overlay: &Overlay<'_, D>,
    mut a_hash: Bytes32,
    a: &Header,
    mut b_hash: Bytes32,
    b: &Header,
) -> Result<(Bytes32, u64), StoreError> {
    let mut a = a.clone();
    let mut b = b.clone();
    while a_hash != b_hash {
        if a.number > b.number {
            a_hash = a.parent_hash;
            a = overlay
                .read_header(&a_hash)
                .ok_or(StoreError::MissingRecord(a_hash))?;
        } else {
            b_hash = b.parent_hash;
            b = overlay
                .read_header(&b_hash)
                .ok_or(StoreError::MissingRecord(b_hash))?;
        }
    }
    Ok((a_hash, a.number))
}

fn is_ancestor<D: KeyValue>(
    overlay: &Overlay<'_, D>,
    ancestor: &Bytes32,
    descendant: &Bytes32,
) -> Result<bool, StoreError> {
    let target = overlay
        .read_header(ancestor)
        .ok_or(StoreError::MissingRecord(*ancestor))?;
    let mut cursor_hash = *descendant;
    let mut cursor = overlay
        .read_header(&cursor_hash)
        .ok_or(StoreError::MissingRecord(cursor_hash))?;
    while cursor.number > target.number {
        cursor_hash = cursor.parent_hash;
        cursor = overlay
            .read_header(&cursor_hash)
            .ok_or(StoreError::MissingRecord(cursor_hash))?;
    }
    Ok(cursor_hash == *ancestor)
}

// Staged writes over the backend; nothing lands until `flush`.
struct Overlay<'a, D> {
    db: &'a D,
    writes: HashMap<Vec<u8>, Option<Vec<u8>>>,
}

impl<'a, D: KeyValue> Overlay<'a, D> {
    fn new(db: &'a D) -> Self {
        Self {
            db,
            writes: HashMap::new(),
        }
    }

    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        match self.writes.get(key) {
            Some(staged) => staged.clone(),
            None => self.db.get(key),
        }
    }

    fn put(&mut self, key: Vec<u8>, value: Vec<u8>) {
        self.writes.insert(key, Some(value));
    }

    fn delete(&mut self, key: Vec<u8>) {
        self.writes.insert(key, None);
    }

    fn read_header(&self, hash: &Bytes32) -> Option<Header> {
        let raw = self.get(&header_key(hash))?;
        Header::decode(&raw).ok()
    }

    fn read_td(&self, hash: &Bytes32) -> Option<U256> {
        let raw = self.get(&td_key(hash))?;
        rlp::Decoder::new(&raw).take_big_int().ok()
    }

    fn flush(self) {
        for (key, value) in self.writes {
            match value {
                Some(value) => self.db.put(key, value),
                None => self.db.delete(&key),
            }
        }
    }
}
