//! File-backed world store.
//!
//! Layout inside the store directory:
//! ```text
//! store.meta.json          - schema version
//! worlds/
//!   <name>.json            - one document per world
//! integrity/
//!   manifest.json          - sha256 of every world file
//! ```
//!
//! A save records the new hash in the manifest as staged, renames the new
//! document into place, then commits the staged hash. Either hash is
//! accepted on read, so a crash at any step leaves a readable store.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use multiworld_kernel::{StoreError, WorldDocument, WorldStore};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Current schema version of world documents.
pub const SCHEMA_VERSION: u32 = 1;

const META_FILE: &str = "store.meta.json";
const WORLDS_DIR: &str = "worlds";
const MANIFEST_FILE: &str = "manifest.json";
const INTEGRITY_DIR: &str = "integrity";

/// Metadata stored in store.meta.json.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreMeta {
    pub schema_version: u32,
}

/// Hashes known for one world file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityEntry {
    /// Last committed contents; `None` until the first save completes.
    pub sha256: Option<String>,
    /// Contents of a save that has not been committed yet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub staged: Option<String>,
}

impl IntegrityEntry {
    fn accepts(&self, actual: &str) -> bool {
        self.sha256.as_deref() == Some(actual) || self.staged.as_deref() == Some(actual)
    }
}

/// File name to the hashes of its contents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IntegrityManifest {
    pub entries: BTreeMap<String, IntegrityEntry>,
}

/// World store keeping one pretty-printed JSON file per world.
///
/// Files are written to a temporary name and renamed into place, so a crash
/// leaves either the old or the new document. A file whose hash disagrees
/// with the manifest is refused on read.
#[derive(Debug)]
pub struct JsonWorldStore {
    root: PathBuf,
    /// Also serializes writers so the manifest matches the files on disk.
    manifest: Mutex<IntegrityManifest>,
}

impl JsonWorldStore {
    /// Open or create a store at the given path. A store written with a
    /// different schema version is refused.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = path.as_ref().to_path_buf();
        std::fs::create_dir_all(root.join(WORLDS_DIR))?;
        std::fs::create_dir_all(root.join(INTEGRITY_DIR))?;

        let meta_path = root.join(META_FILE);
        let manifest_path = root.join(INTEGRITY_DIR).join(MANIFEST_FILE);
        let manifest = if meta_path.exists() {
            let meta: StoreMeta = serde_json::from_slice(&std::fs::read(&meta_path)?)?;
            if meta.schema_version != SCHEMA_VERSION {
                return Err(StoreError::SchemaMismatch {
                    file_version: meta.schema_version,
                    expected_version: SCHEMA_VERSION,
                });
            }
            if manifest_path.exists() {
                serde_json::from_slice(&std::fs::read(&manifest_path)?)?
            } else {
                IntegrityManifest::default()
            }
        } else {
            let meta = StoreMeta {
                schema_version: SCHEMA_VERSION,
            };
            write_atomic(&meta_path, &serde_json::to_vec_pretty(&meta)?)?;
            let manifest = IntegrityManifest::default();
            write_atomic(&manifest_path, &serde_json::to_vec_pretty(&manifest)?)?;
            manifest
        };

        tracing::debug!(root = %root.display(), worlds = manifest.entries.len(), "world store opened");
        Ok(Self {
            root,
            manifest: Mutex::new(manifest),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the document for `name`.
    pub fn world_path(&self, name: &str) -> Result<PathBuf, StoreError> {
        Ok(self.root.join(WORLDS_DIR).join(file_name(name)?))
    }

    /// Check every manifest entry against the file on disk. Returns how many
    /// files were checked.
    pub fn verify_integrity(&self) -> Result<usize, StoreError> {
        let manifest = self.manifest.lock();
        let mut checked = 0;
        for (file, entry) in &manifest.entries {
            let data = match std::fs::read(self.root.join(WORLDS_DIR).join(file)) {
                Ok(data) => data,
                // First save interrupted before the file landed.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound && entry.sha256.is_none() => continue,
                Err(e) => return Err(e.into()),
            };
            check_hash(file, entry, &data)?;
            checked += 1;
        }
        Ok(checked)
    }

    fn save_manifest(&self, manifest: &IntegrityManifest) -> Result<(), StoreError> {
        let path = self.root.join(INTEGRITY_DIR).join(MANIFEST_FILE);
        write_atomic(&path, &serde_json::to_vec_pretty(manifest)?)
    }

    /// Record `hash` as the staged contents of `file`, on disk first.
    fn stage(&self, manifest: &mut IntegrityManifest, file: &str, hash: String) -> Result<(), StoreError> {
        let mut staged = manifest.clone();
        staged.entries.entry(file.to_string()).or_default().staged = Some(hash);
        self.save_manifest(&staged)?;
        *manifest = staged;
        Ok(())
    }

    /// Promote the staged hash of `file` to committed.
    fn commit(&self, manifest: &mut IntegrityManifest, file: &str) -> Result<(), StoreError> {
        let mut committed = manifest.clone();
        if let Some(entry) = committed.entries.get_mut(file) {
            if let Some(hash) = entry.staged.take() {
                entry.sha256 = Some(hash);
            }
        }
        self.save_manifest(&committed)?;
        *manifest = committed;
        Ok(())
    }
}

impl WorldStore for JsonWorldStore {
    fn save(&self, document: &WorldDocument) -> Result<(), StoreError> {
        let file = file_name(&document.name)?;
        let data = serde_json::to_vec_pretty(document)?;
        let mut manifest = self.manifest.lock();
        self.stage(&mut manifest, &file, sha256_hex(&data))?;
        write_atomic(&self.root.join(WORLDS_DIR).join(&file), &data)?;
        self.commit(&mut manifest, &file)?;
        tracing::debug!(world = %document.name, bytes = data.len(), "world document written");
        Ok(())
    }

    fn load_all(&self) -> Result<Vec<WorldDocument>, StoreError> {
        let manifest = self.manifest.lock();
        let mut files = Vec::new();
        for entry in std::fs::read_dir(self.root.join(WORLDS_DIR))? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(".json") && !name.starts_with('.') {
                files.push((name, entry.path()));
            }
        }
        files.sort();

        let mut documents = Vec::with_capacity(files.len());
        for (file, path) in files {
            let data = std::fs::read(&path)?;
            match manifest.entries.get(&file) {
                Some(entry) => check_hash(&file, entry, &data)?,
                None => tracing::warn!(%file, "world file missing from integrity manifest"),
            }
            documents.push(serde_json::from_slice(&data)?);
        }
        Ok(documents)
    }

    fn remove(&self, name: &str) -> Result<(), StoreError> {
        let file = file_name(name)?;
        let mut manifest = self.manifest.lock();
        match std::fs::remove_file(self.root.join(WORLDS_DIR).join(&file)) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        if manifest.entries.remove(&file).is_some() {
            self.save_manifest(&manifest)?;
        }
        Ok(())
    }
}

/// World names must map to a single plain file inside `worlds/`.
fn file_name(name: &str) -> Result<String, StoreError> {
    let plain = !name.is_empty()
        && !name.starts_with('.')
        && !name.contains(['/', '\\', '\0'])
        && name != "..";
    if plain {
        Ok(format!("{name}.json"))
    } else {
        Err(StoreError::InvalidName(name.to_string()))
    }
}

fn write_atomic(path: &Path, data: &[u8]) -> Result<(), StoreError> {
    let file = path
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{file}.tmp"));
    std::fs::write(&tmp, data)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

fn check_hash(file: &str, entry: &IntegrityEntry, data: &[u8]) -> Result<(), StoreError> {
    let actual = sha256_hex(data);
    if !entry.accepts(&actual) {
        let expected = entry.sha256.as_ref().or(entry.staged.as_ref()).cloned().unwrap_or_default();
        return Err(StoreError::IntegrityMismatch {
            file: file.to_string(),
            expected,
            actual,
        });
    }
    Ok(())
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use multiworld_common::{Environment, WorldType, WorldUid};
    use multiworld_kernel::testing::{FakeEngine, FakeSessions};
    use multiworld_kernel::{ManagerConfig, SpawnBehavior, SpawnException, WorldManager};
    use std::sync::Arc;

    fn document(name: &str) -> WorldDocument {
        WorldDocument {
            name: name.into(),
            uid: WorldUid::new(),
            world_type: WorldType::Normal,
            properties: BTreeMap::from([("hidden".to_string(), serde_json::Value::from(true))]),
            spawn_exceptions: vec![SpawnException::new("bat", SpawnBehavior::Deny)],
            blacklist: Vec::new(),
        }
    }

    #[test]
    fn open_creates_layout() {
        let tmp = tempfile::tempdir().unwrap();
        let store = JsonWorldStore::open(tmp.path().join("worlds_data")).unwrap();
        assert!(store.root().join(WORLDS_DIR).is_dir());
        assert!(store.root().join(META_FILE).is_file());
        assert!(store.root().join(INTEGRITY_DIR).join(MANIFEST_FILE).is_file());
        assert!(store.load_all().unwrap().is_empty());
    }

    #[test]
    fn save_load_remove() {
        let tmp = tempfile::tempdir().unwrap();
        let store = JsonWorldStore::open(tmp.path()).unwrap();
        let sky = document("skyworld");
        store.save(&sky).unwrap();
        store.save(&document("arena")).unwrap();

        let reopened = JsonWorldStore::open(tmp.path()).unwrap();
        let docs = reopened.load_all().unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].name, "arena");
        assert_eq!(docs[1], sky);
        assert_eq!(reopened.verify_integrity().unwrap(), 2);

        reopened.remove("arena").unwrap();
        reopened.remove("arena").unwrap();
        assert_eq!(reopened.load_all().unwrap().len(), 1);
        assert!(!reopened.world_path("arena").unwrap().exists());
    }

    #[test]
    fn overwrite_leaves_no_temp_files() {
        let tmp = tempfile::tempdir().unwrap();
        let store = JsonWorldStore::open(tmp.path()).unwrap();
        let mut doc = document("w");
        store.save(&doc).unwrap();
        doc.blacklist.push("nether".into());
        store.save(&doc).unwrap();

        let names: Vec<_> = std::fs::read_dir(tmp.path().join(WORLDS_DIR))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["w.json"]);
        assert_eq!(store.load_all().unwrap()[0].blacklist, vec!["nether"]);
    }

    #[test]
    fn integrity_fail_closed_on_corruption() {
        let tmp = tempfile::tempdir().unwrap();
        let store = JsonWorldStore::open(tmp.path()).unwrap();
        store.save(&document("w")).unwrap();

        let path = store.world_path("w").unwrap();
        let mut data = std::fs::read(&path).unwrap();
        data.extend_from_slice(b"\n");
        std::fs::write(&path, &data).unwrap();

        let reopened = JsonWorldStore::open(tmp.path()).unwrap();
        assert!(matches!(
            reopened.verify_integrity(),
            Err(StoreError::IntegrityMismatch { .. })
        ));
        assert!(matches!(
            reopened.load_all(),
            Err(StoreError::IntegrityMismatch { .. })
        ));
    }

    #[test]
    fn interrupted_save_keeps_store_readable() {
        let tmp = tempfile::tempdir().unwrap();
        let store = JsonWorldStore::open(tmp.path()).unwrap();
        store.save(&document("arena")).unwrap();
        let sky = document("skyworld");
        store.save(&sky).unwrap();

        // Crash after staging, before the new document is renamed in.
        let mut changed = sky.clone();
        changed.blacklist.push("arena".into());
        let data = serde_json::to_vec_pretty(&changed).unwrap();
        {
            let mut manifest = store.manifest.lock();
            store.stage(&mut manifest, "skyworld.json", sha256_hex(&data)).unwrap();
        }
        let reopened = JsonWorldStore::open(tmp.path()).unwrap();
        let docs = reopened.load_all().unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[1], sky);
        assert_eq!(reopened.verify_integrity().unwrap(), 2);

        // Crash after the rename, before the commit.
        write_atomic(&reopened.world_path("skyworld").unwrap(), &data).unwrap();
        let reopened = JsonWorldStore::open(tmp.path()).unwrap();
        let docs = reopened.load_all().unwrap();
        assert_eq!(docs[0].name, "arena");
        assert_eq!(docs[1], changed);

        // The next save commits cleanly.
        reopened.save(&changed).unwrap();
        let manifest = reopened.manifest.lock();
        assert!(manifest.entries.values().all(|e| e.staged.is_none()));
    }

    #[test]
    fn interrupted_first_save_is_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        let store = JsonWorldStore::open(tmp.path()).unwrap();
        {
            let mut manifest = store.manifest.lock();
            store.stage(&mut manifest, "ghost.json", "00".into()).unwrap();
        }
        let reopened = JsonWorldStore::open(tmp.path()).unwrap();
        assert!(reopened.load_all().unwrap().is_empty());
        assert_eq!(reopened.verify_integrity().unwrap(), 0);
    }

    #[test]
    fn schema_mismatch_fail_closed() {
        let tmp = tempfile::tempdir().unwrap();
        JsonWorldStore::open(tmp.path()).unwrap();
        let meta = StoreMeta { schema_version: 999 };
        std::fs::write(tmp.path().join(META_FILE), serde_json::to_vec(&meta).unwrap()).unwrap();

        match JsonWorldStore::open(tmp.path()) {
            Err(StoreError::SchemaMismatch {
                file_version,
                expected_version,
            }) => {
                assert_eq!(file_version, 999);
                assert_eq!(expected_version, SCHEMA_VERSION);
            }
            other => panic!("expected schema mismatch, got {other:?}"),
        }
    }

    #[test]
    fn unsafe_names_are_refused() {
        let tmp = tempfile::tempdir().unwrap();
        let store = JsonWorldStore::open(tmp.path()).unwrap();
        for bad in ["", "..", "../escape", "a/b", ".hidden"] {
            assert!(matches!(
                store.save(&document(bad)),
                Err(StoreError::InvalidName(_))
            ));
        }
    }

    #[test]
    fn manager_state_survives_restart() {
        let tmp = tempfile::tempdir().unwrap();
        let boot = || {
            let engine = Arc::new(FakeEngine::new());
            engine.add_world_on_disk("skyworld");
            let sessions = Arc::new(FakeSessions::new(engine.clone()));
            let store = Arc::new(JsonWorldStore::open(tmp.path()).unwrap());
            WorldManager::new(engine, sessions, store, ManagerConfig::default())
        };

        let manager = boot();
        let world = manager
            .import_world("skyworld", Environment::Normal, WorldType::Normal, None)
            .unwrap();
        world.set_alias(Some("Sky")).unwrap();
        assert!(world.set_scaling(4.0));
        world.blacklist_world("arena");
        world.save().unwrap();
        let uid = world.uid();
        drop(manager);

        let manager = boot();
        assert_eq!(manager.restore_from_store().unwrap(), 1);
        let world = manager.get_world("skyworld").unwrap();
        assert_eq!(world.uid(), uid);
        assert_eq!(world.alias(), "Sky");
        assert_eq!(world.scaling(), 4.0);
        assert!(world.is_blacklisted("arena"));
        assert!(!world.is_loaded());
        manager.load_world("skyworld").unwrap();
    }
}
