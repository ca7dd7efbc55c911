pub mod db;
pub mod store;

pub use db::{KeyValue, MemoryDb};
pub use store::Blockchain;

use containers::Bytes32;

/// Errors returned by the header store.
///
/// Every precondition is checked before any mutation; a failed write leaves
/// both the canonical state and the fork set untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// `write_genesis` on a store that already holds headers.
    #[error("chain already initialized")]
    AlreadyInitialized,

    /// A header write before any genesis exists.
    #[error("genesis not written yet")]
    GenesisMissing,

    /// The header references a parent the store has never seen.
    #[error("parent {0} not found")]
    ParentMissing(Bytes32),

    /// The header is already present.
    #[error("header {0} already imported")]
    Duplicate(Bytes32),

    /// The header's number does not follow its parent's.
    #[error("header number {header} does not follow parent number {parent}")]
    InvalidNumber { parent: u64, header: u64 },

    /// Body or receipt data committed for a header the store does not hold.
    #[error("unknown header {0}")]
    UnknownHeader(Bytes32),

    /// A receipt list whose length differs from the transaction count.
    #[error("{receipts} receipts for {block} with {transactions} transactions")]
    ReceiptMismatch {
        block: Bytes32,
        transactions: usize,
        receipts: usize,
    },

    /// Blocks and receipt lists of different lengths handed to `commit_chain`.
    #[error("{blocks} blocks but {receipts} receipt lists")]
    BatchMismatch { blocks: usize, receipts: usize },

    /// A record the store itself wrote earlier cannot be read back.
    #[error("corrupt store: missing record for {0}")]
    MissingRecord(Bytes32),
}
