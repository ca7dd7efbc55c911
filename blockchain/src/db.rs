use std::collections::HashMap;

use containers::Bytes32;
use parking_lot::RwLock;

/// Opaque key-value backend the store persists into.
///
/// Records are written through [`crate::store::Blockchain`] only; the backend
/// itself never interprets keys or values.
pub trait KeyValue: Send + Sync {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;
    fn put(&self, key: Vec<u8>, value: Vec<u8>);
    fn delete(&self, key: &[u8]);
}

/// In-memory backend.
#[derive(Debug, Default)]
pub struct MemoryDb {
    records: RwLock<HashMap<Vec<u8>, Vec<u8>>>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValue for MemoryDb {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.records.read().get(key).cloned()
    }

    fn put(&self, key: Vec<u8>, value: Vec<u8>) {
        self.records.write().insert(key, value);
    }

    fn delete(&self, key: &[u8]) {
        self.records.write().remove(key);
    }
}

// Record families, one byte of prefix each.
const HEADER_PREFIX: u8 = b'h';
const TD_PREFIX: u8 = b't';
const BODY_PREFIX: u8 = b'b';
const RECEIPTS_PREFIX: u8 = b'r';
const CANONICAL_PREFIX: u8 = b'n';

pub(crate) fn header_key(hash: &Bytes32) -> Vec<u8> {
    hash_key(HEADER_PREFIX, hash)
}

pub(crate) fn td_key(hash: &Bytes32) -> Vec<u8> {
    hash_key(TD_PREFIX, hash)
}

pub(crate) fn body_key(hash: &Bytes32) -> Vec<u8> {
    hash_key(BODY_PREFIX, hash)
}

pub(crate) fn receipts_key(hash: &Bytes32) -> Vec<u8> {
    hash_key(RECEIPTS_PREFIX, hash)
}

pub(crate) fn canonical_key(number: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(9);
    key.push(CANONICAL_PREFIX);
    key.extend_from_slice(&number.to_be_bytes());
    key
}

fn hash_key(prefix: u8, hash: &Bytes32) -> Vec<u8> {
    let mut key = Vec::with_capacity(33);
    key.push(prefix);
    key.extend_from_slice(hash.as_bytes());
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_db_round_trip() {
        let db = MemoryDb::new();
        assert_eq!(db.get(b"missing"), None);

        db.put(b"key".to_vec(), b"value".to_vec());
        assert_eq!(db.get(b"key"), Some(b"value".to_vec()));

        db.delete(b"key");
        assert_eq!(db.get(b"key"), None);
    }
}
