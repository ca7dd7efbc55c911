use alloy_primitives::U256;
use blockchain::{Blockchain, KeyValue, StoreError};
use containers::{Block, Header, Receipt};

/// The header store as the sync engine sees it.
///
/// The engine only ever appends validated batches and reads the canonical
/// chain back; everything else the store can do stays behind this seam, and
/// tests drive the engine against lightweight mocks.
pub trait HeaderChain: Send + Sync {
    fn header(&self) -> Option<Header>;
    fn genesis(&self) -> Option<Header>;
    fn head_total_difficulty(&self) -> Option<U256>;
    fn get_by_number(&self, number: u64) -> Option<Header>;
    fn write_headers(&self, headers: &[Header]) -> Result<(), StoreError>;
    fn commit_chain(&self, blocks: &[Block], receipts: &[Vec<Receipt>]) -> Result<(), StoreError>;
}

impl<D: KeyValue> HeaderChain for Blockchain<D> {
    fn header(&self) -> Option<Header> {
        Blockchain::header(self)
    }

    fn genesis(&self) -> Option<Header> {
        Blockchain::genesis(self)
    }

    fn head_total_difficulty(&self) -> Option<U256> {
        Blockchain::head_total_difficulty(self)
    }

    fn get_by_number(&self, number: u64) -> Option<Header> {
        Blockchain::get_by_number(self, number)
    }

    fn write_headers(&self, headers: &[Header]) -> Result<(), StoreError> {
        Blockchain::write_headers(self, headers)
    }

    fn commit_chain(&self, blocks: &[Block], receipts: &[Vec<Receipt>]) -> Result<(), StoreError> {
        Blockchain::commit_chain(self, blocks, receipts)
    }
}
