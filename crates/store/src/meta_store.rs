//! Durable key/value store used for DDL metadata.
//!
//! The canonical state of every job and region work unit lives here; the
//! coordinator's in-memory maps are derived views rebuilt from a full scan
//! on leader takeover.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::RwLock;

use odl_common::{OdlError, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Ordered binary key/value store contract.
///
/// Implementations must be safe for concurrent use; every mutation is
/// atomic per call. Write visibility is immediate (callers re-read after
/// appending through the consensus seam).
pub trait MetaStore: Send + Sync {
    /// Insert or overwrite one key.
    fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<()>;
    /// Read one key.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;
    /// Delete one key. Deleting a missing key is not an error.
    fn delete(&self, key: &[u8]) -> Result<()>;
    /// Delete every key in `[begin, end)`.
    fn remove_range(&self, begin: &[u8], end: &[u8]) -> Result<()>;
    /// Read all entries whose key starts with `prefix`, in key order.
    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;
}

/// In-memory [`MetaStore`] with optional JSON snapshot persistence.
#[derive(Debug, Default)]
pub struct MemMetaStore {
    inner: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

#[derive(Serialize, Deserialize)]
struct SnapshotFile {
    entries: Vec<(Vec<u8>, Vec<u8>)>,
}

impl MemMetaStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a store from a JSON snapshot written by [`MemMetaStore::save_to_json`].
    pub fn load_from_json(path: &str) -> Result<Self> {
        let s = fs::read_to_string(path)?;
        let snapshot: SnapshotFile = serde_json::from_str(&s)
            .map_err(|e| OdlError::Persistence(format!("meta snapshot decode failed: {e}")))?;
        info!(
            path = %path,
            entries = snapshot.entries.len(),
            operator = "MetaStoreLoad",
            "loaded meta snapshot"
        );
        Ok(Self {
            inner: RwLock::new(snapshot.entries.into_iter().collect()),
        })
    }

    /// Write the full store as a JSON snapshot, atomically.
    pub fn save_to_json(&self, path: &str) -> Result<()> {
        if let Some(parent) = Path::new(path).parent() {
            fs::create_dir_all(parent)?;
        }
        let entries = self
            .inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect::<Vec<_>>();
        let payload = serde_json::to_string(&SnapshotFile { entries })
            .map_err(|e| OdlError::Persistence(format!("meta snapshot encode failed: {e}")))?;
        write_atomically(path, payload.as_bytes())
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MetaStore for MemMetaStore {
    fn put(&self, key: Vec<u8>, value: Vec<u8>) -> Result<()> {
        self.inner
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, value);
        Ok(())
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self
            .inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned())
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.inner
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
        Ok(())
    }

    fn remove_range(&self, begin: &[u8], end: &[u8]) -> Result<()> {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let doomed = inner
            .range(begin.to_vec()..end.to_vec())
            .map(|(k, _)| k.clone())
            .collect::<Vec<_>>();
        for key in doomed {
            inner.remove(&key);
        }
        Ok(())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        Ok(inner
            .range(prefix.to_vec()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

fn write_atomically(path: &str, payload: &[u8]) -> Result<()> {
    let tmp = format!("{path}.tmp");
    fs::write(&tmp, payload)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
