//! Durable-state boundary.
//!
//! A [`WorldDocument`] is what gets written for one world. Properties are kept
//! as loose JSON so that obsolete or unknown keys survive a read and are simply
//! ignored when a record is rebuilt.

use std::collections::BTreeMap;

use multiworld_common::{WorldType, WorldUid};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::spawn::SpawnException;

/// Errors from a [`WorldStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("integrity check failed for {file}: expected {expected}, got {actual}")]
    IntegrityMismatch {
        file: String,
        expected: String,
        actual: String,
    },
    #[error("schema version mismatch: file has v{file_version}, expected v{expected_version}")]
    SchemaMismatch {
        file_version: u32,
        expected_version: u32,
    },
    #[error("invalid world name for storage: '{0}'")]
    InvalidName(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Persisted form of one world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorldDocument {
    pub name: String,
    pub uid: WorldUid,
    #[serde(default)]
    pub world_type: WorldType,
    #[serde(default)]
    pub properties: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub spawn_exceptions: Vec<SpawnException>,
    #[serde(default)]
    pub blacklist: Vec<String>,
}

/// Where world records are saved.
pub trait WorldStore: Send + Sync + 'static {
    fn save(&self, document: &WorldDocument) -> Result<(), StoreError>;

    /// Every saved world, in name order.
    fn load_all(&self) -> Result<Vec<WorldDocument>, StoreError>;

    /// Forget a world. Forgetting an absent world is not an error.
    fn remove(&self, name: &str) -> Result<(), StoreError>;
}

/// Store that keeps documents in memory only.
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: Mutex<BTreeMap<String, WorldDocument>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<WorldDocument> {
        self.documents.lock().get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.documents.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.lock().is_empty()
    }
}

impl WorldStore for MemoryStore {
    fn save(&self, document: &WorldDocument) -> Result<(), StoreError> {
        self.documents
            .lock()
            .insert(document.name.clone(), document.clone());
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<WorldDocument>, StoreError> {
        Ok(self.documents.lock().values().cloned().collect())
    }

    fn remove(&self, name: &str) -> Result<(), StoreError> {
        self.documents.lock().remove(name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document(name: &str) -> WorldDocument {
        WorldDocument {
            name: name.into(),
            uid: WorldUid::new(),
            world_type: WorldType::Flat,
            properties: BTreeMap::from([("pvp".to_string(), serde_json::Value::from(false))]),
            spawn_exceptions: Vec::new(),
            blacklist: vec!["nether".into()],
        }
    }

    #[test]
    fn memory_store_save_load_remove() {
        let store = MemoryStore::new();
        store.save(&document("b")).unwrap();
        store.save(&document("a")).unwrap();
        let names: Vec<_> = store.load_all().unwrap().into_iter().map(|d| d.name).collect();
        assert_eq!(names, vec!["a", "b"]);

        store.remove("a").unwrap();
        store.remove("a").unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn document_tolerates_missing_sections() {
        let json = format!(r#"{{"name":"w","uid":"{}"}}"#, uuid_text());
        let doc: WorldDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(doc.world_type, WorldType::Normal);
        assert!(doc.properties.is_empty());
        assert!(doc.blacklist.is_empty());
    }

    fn uuid_text() -> String {
        WorldUid::new().to_string()
    }
}
