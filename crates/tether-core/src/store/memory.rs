//! In-memory peer store.

use super::{PeerRecord, PeerStore};
use crate::error::{Result, TetherError};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

/// Peer store held in a concurrent map. Contents are lost on drop.
#[derive(Debug, Default)]
pub struct MemoryPeerStore {
    records: DashMap<String, PeerRecord>,
}

impl MemoryPeerStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl PeerStore for MemoryPeerStore {
    fn get(&self, id: &str) -> Option<PeerRecord> {
        self.records.get(id).map(|r| r.value().clone())
    }

    fn all(&self) -> Vec<PeerRecord> {
        let mut records: Vec<PeerRecord> =
            self.records.iter().map(|r| r.value().clone()).collect();
        records.sort_by(|a, b| a.id.cmp(&b.id));
        records
    }

    fn insert(&self, record: PeerRecord) -> Result<()> {
        match self.records.entry(record.id.clone()) {
            Entry::Occupied(_) => Err(TetherError::PeerExists(record.id)),
            Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(())
            }
        }
    }

    fn update(&self, record: PeerRecord) -> Result<()> {
        match self.records.entry(record.id.clone()) {
            Entry::Occupied(mut slot) => {
                slot.insert(record);
                Ok(())
            }
            Entry::Vacant(_) => Err(TetherError::PeerNotFound(record.id)),
        }
    }

    fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.records.remove(id).is_some())
    }
}
