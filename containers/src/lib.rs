pub mod block;
pub mod header;
pub mod status;
pub mod types;

pub use block::{Block, Body, Receipt, Transaction};
pub use header::{Header, EMPTY_ROOT};
pub use status::Status;
pub use types::Bytes32;

// Re-export the codec so dependents can name its error type.
pub use rlp;
