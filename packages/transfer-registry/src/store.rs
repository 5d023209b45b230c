//! Record storage keyed by transfer hash
//!
//! Behaves like a Solidity `mapping(bytes32 => Record)`: reading a key that
//! was never written yields the zero record, and writing the zero record
//! is the same as deleting the key.

use std::collections::HashMap;

use crate::types::Bytes32;

#[derive(Debug, Clone)]
pub struct RecordStore<R> {
    records: HashMap<Bytes32, R>,
}

impl<R> Default for RecordStore<R> {
    fn default() -> Self {
        Self {
            records: HashMap::new(),
        }
    }
}

impl<R> RecordStore<R>
where
    R: Copy + Default + PartialEq,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// The stored record, or the zero record if absent
    pub fn get(&self, hash: &Bytes32) -> R {
        self.records.get(hash).copied().unwrap_or_default()
    }

    /// Whether a non-zero record is stored under `hash`
    pub fn contains(&self, hash: &Bytes32) -> bool {
        self.records.contains_key(hash)
    }

    pub fn put(&mut self, hash: Bytes32, record: R) {
        if record == R::default() {
            self.records.remove(&hash);
        } else {
            self.records.insert(hash, record);
        }
    }

    /// Reset `hash` to the zero record, returning what was stored
    pub fn clear(&mut self, hash: &Bytes32) -> R {
        self.records.remove(hash).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Bytes32, &R)> {
        self.records.iter()
    }
}
