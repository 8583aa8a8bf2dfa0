//! JSON-file peer store.
//!
//! The whole table is rewritten on every mutation: records are written to a
//! sibling `.tmp` file which is then renamed over the store, so a crash never
//! leaves a truncated file behind.

use super::{PeerRecord, PeerStore};
use crate::error::{Result, TetherError};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Peer store persisted as a JSON array.
#[derive(Debug)]
pub struct FilePeerStore {
    path: PathBuf,
    records: Mutex<BTreeMap<String, PeerRecord>>,
}

impl FilePeerStore {
    /// Open the store at `path`, loading existing records. A missing file is
    /// an empty store.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let records = if path.exists() {
            let text = std::fs::read_to_string(&path)?;
            let list: Vec<PeerRecord> = if text.trim().is_empty() {
                Vec::new()
            } else {
                serde_json::from_str(&text)?
            };
            list.into_iter().map(|r| (r.id.clone(), r)).collect()
        } else {
            BTreeMap::new()
        };

        tracing::debug!(path = %path.display(), count = records.len(), "opened peer store");
        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    /// Location on disk.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, PeerRecord>>> {
        self.records
            .lock()
            .map_err(|_| TetherError::invalid_state("peer store lock poisoned"))
    }

    fn persist(&self, records: &BTreeMap<String, PeerRecord>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let list: Vec<&PeerRecord> = records.values().collect();
        let bytes = serde_json::to_vec_pretty(&list)?;

        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    /// Write `next` to disk, then make it the live table. The live table is
    /// left untouched if the write fails.
    fn commit(
        &self,
        records: &mut std::sync::MutexGuard<'_, BTreeMap<String, PeerRecord>>,
        next: BTreeMap<String, PeerRecord>,
    ) -> Result<()> {
        self.persist(&next)?;
        **records = next;
        Ok(())
    }
}

impl PeerStore for FilePeerStore {
    fn get(&self, id: &str) -> Option<PeerRecord> {
        self.lock().ok()?.get(id).cloned()
    }

    fn all(&self) -> Vec<PeerRecord> {
        self.lock()
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default()
    }

    fn insert(&self, record: PeerRecord) -> Result<()> {
        let mut records = self.lock()?;
        if records.contains_key(&record.id) {
            return Err(TetherError::PeerExists(record.id));
        }
        let mut next = records.clone();
        next.insert(record.id.clone(), record);
        self.commit(&mut records, next)
    }

    fn update(&self, record: PeerRecord) -> Result<()> {
        let mut records = self.lock()?;
        if !records.contains_key(&record.id) {
            return Err(TetherError::PeerNotFound(record.id));
        }
        let mut next = records.clone();
        next.insert(record.id.clone(), record);
        self.commit(&mut records, next)
    }

    fn delete(&self, id: &str) -> Result<bool> {
        let mut records = self.lock()?;
        if !records.contains_key(id) {
            return Ok(false);
        }
        let mut next = records.clone();
        next.remove(id);
        self.commit(&mut records, next)?;
        Ok(true)
    }

    fn delete_many(&self, ids: &[String]) -> Result<usize> {
        let mut records = self.lock()?;
        let mut next = records.clone();
        let removed = ids.iter().filter(|id| next.remove(*id).is_some()).count();
        if removed > 0 {
            self.commit(&mut records, next)?;
        }
        Ok(removed)
    }
}
