//! Key/value storage adapters
//!
//! The client persists a reduced subset of its state through the
//! [`Storage`] trait. [`NoopStorage`] is used where nothing can be
//! persisted, [`MemoryStorage`] keeps values for the life of the process
//! and [`FileStorage`] keeps them in a JSON document on disk.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::chains::Chain;
use crate::types::ChainRef;

/// Key holding the persisted client state
pub const STORE_KEY: &str = "store";
/// Key holding the name of the last used connector
pub const LAST_USED_CONNECTOR_KEY: &str = "wallet";
/// Version of the persisted state layout
pub const STORE_VERSION: u32 = 1;

/// Storage error type
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Key/value persistence
pub trait Storage: Send + Sync {
    fn get_item(&self, key: &str) -> Option<String>;

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError>;

    fn remove_item(&self, key: &str) -> Result<(), StorageError>;

    /// Whether values outlive the process (false for the no-op adapter)
    fn is_persistent(&self) -> bool {
        true
    }

    fn get_item_or(&self, key: &str, fallback: &str) -> String {
        self.get_item(key).unwrap_or_else(|| fallback.to_string())
    }
}

/// Storage for environments without a backing store
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStorage;

impl Storage for NoopStorage {
    fn get_item(&self, _key: &str) -> Option<String> {
        None
    }

    fn set_item(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
        Ok(())
    }

    fn remove_item(&self, _key: &str) -> Result<(), StorageError> {
        Ok(())
    }

    fn is_persistent(&self) -> bool {
        false
    }
}

/// In-process storage
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: Mutex<BTreeMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

impl Storage for MemoryStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        self.items.lock().get(key).cloned()
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.items.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.items.lock().remove(key);
        Ok(())
    }
}

/// Storage backed by a JSON object file
///
/// Every write rewrites the whole document. Values are kept in memory
/// after the first load.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    items: Mutex<BTreeMap<String, String>>,
}

impl FileStorage {
    /// Open (or lazily create) the storage file at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let items = match std::fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => BTreeMap::new(),
            Ok(raw) => serde_json::from_str(&raw)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        debug!("Opened storage at {:?} with {} keys", path, items.len());

        Ok(Self {
            path,
            items: Mutex::new(items),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, items: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let raw = serde_json::to_string_pretty(items)?;
        std::fs::write(&self.path, raw)?;
        Ok(())
    }
}

impl Storage for FileStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        self.items.lock().get(key).cloned()
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut items = self.items.lock();
        items.insert(key.to_string(), value.to_string());
        self.flush(&items)
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        let mut items = self.items.lock();
        if items.remove(key).is_some() {
            self.flush(&items)?;
        }
        Ok(())
    }
}

/// Persisted connection data: account and chain only
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedData {
    #[serde(default)]
    pub account: Option<String>,
    #[serde(default)]
    pub chain: Option<ChainRef>,
}

/// Persisted subset of the client state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<PersistedData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chains: Option<Vec<Chain>>,
}

/// Document stored under [`STORE_KEY`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedRecord {
    pub state: PersistedState,
    pub version: u32,
}

impl PersistedRecord {
    pub fn new(state: PersistedState) -> Self {
        Self {
            state,
            version: STORE_VERSION,
        }
    }

    /// Load the record from storage.
    ///
    /// Missing, unreadable or version-mismatched records yield `None`.
    pub fn load(storage: &dyn Storage) -> Option<Self> {
        let raw = storage.get_item(STORE_KEY)?;
        match serde_json::from_str::<PersistedRecord>(&raw) {
            Ok(record) if record.version == STORE_VERSION => Some(record),
            Ok(record) => {
                warn!(
                    "Ignoring persisted state with version {} (expected {})",
                    record.version, STORE_VERSION
                );
                None
            }
            Err(e) => {
                warn!("Ignoring unreadable persisted state: {}", e);
                None
            }
        }
    }

    pub fn save(&self, storage: &dyn Storage) -> Result<(), StorageError> {
        let raw = serde_json::to_string(self)?;
        storage.set_item(STORE_KEY, &raw)
    }

    /// Account of the persisted session, if any
    pub fn account(&self) -> Option<&str> {
        self.state.data.as_ref()?.account.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ChainId;

    #[test]
    fn test_noop_storage() {
        let storage = NoopStorage;
        storage.set_item("k", "v").unwrap();
        assert_eq!(storage.get_item("k"), None);
        assert_eq!(storage.get_item_or("k", "fallback"), "fallback");
        assert!(!storage.is_persistent());
    }

    #[test]
    fn test_memory_storage() {
        let storage = MemoryStorage::new();
        storage.set_item("wallet", "MetaMask").unwrap();
        assert_eq!(storage.get_item("wallet").as_deref(), Some("MetaMask"));

        storage.remove_item("wallet").unwrap();
        assert!(storage.is_empty());
    }

    #[test]
    fn test_file_storage_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        let storage = FileStorage::open(&path).unwrap();
        storage.set_item(LAST_USED_CONNECTOR_KEY, "Phantom").unwrap();
        drop(storage);

        let reopened = FileStorage::open(&path).unwrap();
        assert_eq!(
            reopened.get_item(LAST_USED_CONNECTOR_KEY).as_deref(),
            Some("Phantom")
        );
    }

    #[test]
    fn test_record_layout() {
        let record = PersistedRecord::new(PersistedState {
            data: Some(PersistedData {
                account: Some("0x1".to_string()),
                chain: Some(ChainRef::new(ChainId::Numeric(1))),
            }),
            chains: None,
        });
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["version"], 1);
        assert_eq!(json["state"]["data"]["account"], "0x1");
        assert_eq!(json["state"]["data"]["chain"]["id"], 1);
        assert!(json["state"].get("chains").is_none());
    }

    #[test]
    fn test_record_version_mismatch_is_ignored() {
        let storage = MemoryStorage::new();
        storage
            .set_item(
                STORE_KEY,
                r#"{"state":{"data":{"account":"0x1"}},"version":0}"#,
            )
            .unwrap();
        assert!(PersistedRecord::load(&storage).is_none());

        storage
            .set_item(
                STORE_KEY,
                r#"{"state":{"data":{"account":"0x1"}},"version":1}"#,
            )
            .unwrap();
        let record = PersistedRecord::load(&storage).unwrap();
        assert_eq!(record.account(), Some("0x1"));
    }
}
