//! The state store seam.
//!
//! The distributed key-value store is an external collaborator. This module
//! describes the narrow interface the control plane needs from it, a typed
//! record layer over that interface, and an in-memory implementation that can
//! be snapshotted to disk.

use anyhow::Context;
use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Serialize};
use std::{collections::BTreeMap, path::Path};

/// The root under which all state records are kept.
pub const STATE_BASE: &str = "/netmaster/state/";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("failed to decode {key}: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode {key}: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("state store: {0:#}")]
    Backend(anyhow::Error),
}

/// A hierarchical key-value store.
///
/// No versioning is assumed: callers read, modify and write back, relying on
/// there being a single active writer.
pub trait StateStore: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    fn write(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError>;

    /// Returns every key/value pair whose key starts with `prefix`.
    fn read_all(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StoreError>;

    /// Removes `key`. Clearing an absent key is not an error.
    fn clear(&self, key: &str) -> Result<(), StoreError>;
}

/// A typed value kept in the state store under `PREFIX` + id.
pub trait Record: Serialize + DeserializeOwned {
    const PREFIX: &'static str;

    fn id(&self) -> String;

    fn key(id: &str) -> String {
        format!("{}{}", Self::PREFIX, id)
    }
}

/// JSON-encoded record access for any [`StateStore`].
pub trait RecordStore {
    fn read_record<R: Record>(&self, id: &str) -> Result<Option<R>, StoreError>;

    fn write_record<R: Record>(&self, record: &R) -> Result<(), StoreError>;

    fn read_all_records<R: Record>(&self) -> Result<Vec<R>, StoreError>;

    fn clear_record<R: Record>(&self, id: &str) -> Result<(), StoreError>;
}

impl<S: StateStore + ?Sized> RecordStore for S {
    fn read_record<R: Record>(&self, id: &str) -> Result<Option<R>, StoreError> {
        let key = R::key(id);
        match self.read(&key)? {
            None => Ok(None),
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|source| StoreError::Decode { key, source }),
        }
    }

    fn write_record<R: Record>(&self, record: &R) -> Result<(), StoreError> {
        let key = R::key(&record.id());
        let bytes = serde_json::to_vec(record).map_err(|source| StoreError::Encode {
            key: key.clone(),
            source,
        })?;
        self.write(&key, bytes)
    }

    fn read_all_records<R: Record>(&self) -> Result<Vec<R>, StoreError> {
        self.read_all(R::PREFIX)?
            .into_iter()
            .map(|(key, bytes)| {
                serde_json::from_slice(&bytes).map_err(|source| StoreError::Decode { key, source })
            })
            .collect()
    }

    fn clear_record<R: Record>(&self, id: &str) -> Result<(), StoreError> {
        self.clear(&R::key(id))
    }
}

/// An in-memory [`StateStore`].
#[derive(Debug, Default)]
pub struct MemStore {
    entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

// === impl MemStore ===

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a store from a JSON snapshot written by [`MemStore::save_snapshot`].
    pub fn load_snapshot(path: &Path) -> anyhow::Result<Self> {
        let file = std::fs::File::open(path)
            .with_context(|| format!("opening snapshot {}", path.display()))?;
        let values: BTreeMap<String, serde_json::Value> =
            serde_json::from_reader(std::io::BufReader::new(file))
                .with_context(|| format!("parsing snapshot {}", path.display()))?;
        let entries = values
            .into_iter()
            .map(|(k, v)| Ok((k, serde_json::to_vec(&v)?)))
            .collect::<anyhow::Result<_>>()?;
        Ok(Self {
            entries: RwLock::new(entries),
        })
    }

    /// Writes every entry to `path` as a single JSON object.
    pub fn save_snapshot(&self, path: &Path) -> anyhow::Result<()> {
        let values = self
            .entries
            .read()
            .iter()
            .map(|(k, v)| {
                let value = serde_json::from_slice::<serde_json::Value>(v)
                    .with_context(|| format!("decoding {k}"))?;
                Ok((k.clone(), value))
            })
            .collect::<anyhow::Result<BTreeMap<_, _>>>()?;

        let tmp = path.with_extension("tmp");
        let bytes = serde_json::to_vec_pretty(&values)?;
        std::fs::write(&tmp, bytes).with_context(|| format!("writing {}", tmp.display()))?;
        std::fs::rename(&tmp, path).with_context(|| format!("renaming to {}", path.display()))?;
        tracing::debug!(path = %path.display(), entries = values.len(), "Saved state snapshot");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl StateStore for MemStore {
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn write(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
        self.entries.write().insert(key.to_string(), value);
        Ok(())
    }

    fn read_all(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>, StoreError> {
        Ok(self
            .entries
            .read()
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn clear(&self, key: &str) -> Result<(), StoreError> {
        self.entries.write().remove(key);
        Ok(())
    }
}
