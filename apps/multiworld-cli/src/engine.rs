//! Engine backed by plain directories: a world is `<worlds_dir>/<name>/`
//! with a `level.json` describing it. There is no simulation and no players.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use multiworld_common::{Environment, PlayerHandle, WorldType, WorldUid};
use multiworld_kernel::{
    EngineError, EngineWorld, PlayerSessions, PropertyValue, WorldEngine, WorldSpec,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

const LEVEL_FILE: &str = "level.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct LevelFile {
    uid: WorldUid,
    seed: i64,
    environment: Environment,
    #[serde(default)]
    world_type: WorldType,
    #[serde(default)]
    generator: Option<String>,
}

#[derive(Debug)]
pub struct DirectoryEngine {
    root: PathBuf,
    loaded: Mutex<BTreeSet<String>>,
}

impl DirectoryEngine {
    pub fn new(root: impl Into<PathBuf>) -> std::io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self {
            root,
            loaded: Mutex::new(BTreeSet::new()),
        })
    }

    fn world_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn read_level(&self, dir: &Path) -> Result<LevelFile, EngineError> {
        let data = std::fs::read(dir.join(LEVEL_FILE))?;
        serde_json::from_slice(&data).map_err(|e| EngineError::Corrupt(e.to_string()))
    }

    fn write_level(&self, dir: &Path, level: &LevelFile) -> Result<(), EngineError> {
        let data = serde_json::to_vec_pretty(level).map_err(|e| EngineError::Corrupt(e.to_string()))?;
        std::fs::write(dir.join(LEVEL_FILE), data)?;
        Ok(())
    }

    fn fresh_level(spec: &WorldSpec) -> LevelFile {
        let uid = WorldUid::new();
        LevelFile {
            uid,
            seed: spec.seed.unwrap_or_else(|| uid.0.as_u64_pair().0 as i64),
            environment: spec.environment,
            world_type: spec.world_type,
            generator: spec.generator.clone(),
        }
    }
}

impl WorldEngine for DirectoryEngine {
    fn import_existing(&self, spec: &WorldSpec) -> Result<EngineWorld, EngineError> {
        let dir = self.world_dir(&spec.name);
        if !dir.is_dir() {
            return Err(EngineError::MissingFiles(dir.display().to_string()));
        }
        let level = if dir.join(LEVEL_FILE).exists() {
            self.read_level(&dir)?
        } else {
            // A bare directory is adopted as a new world.
            let level = Self::fresh_level(spec);
            self.write_level(&dir, &level)?;
            level
        };
        self.loaded.lock().insert(spec.name.clone());
        Ok(EngineWorld {
            uid: level.uid,
            seed: level.seed,
        })
    }

    fn create(&self, spec: &WorldSpec) -> Result<EngineWorld, EngineError> {
        let dir = self.world_dir(&spec.name);
        if dir.exists() {
            return Err(EngineError::Rejected(format!("{} already exists", dir.display())));
        }
        std::fs::create_dir_all(&dir)?;
        let level = Self::fresh_level(spec);
        self.write_level(&dir, &level)?;
        self.loaded.lock().insert(spec.name.clone());
        Ok(EngineWorld {
            uid: level.uid,
            seed: level.seed,
        })
    }

    fn load_physical(&self, spec: &WorldSpec) -> Result<(), EngineError> {
        let dir = self.world_dir(&spec.name);
        if !dir.join(LEVEL_FILE).exists() {
            return Err(EngineError::MissingFiles(dir.display().to_string()));
        }
        let mut level = self.read_level(&dir)?;
        level.environment = spec.environment;
        level.generator = spec.generator.clone();
        if let Some(seed) = spec.seed {
            level.seed = seed;
        }
        self.write_level(&dir, &level)?;
        self.loaded.lock().insert(spec.name.clone());
        Ok(())
    }

    fn unload_physical(&self, name: &str) -> Result<(), EngineError> {
        self.loaded.lock().remove(name);
        Ok(())
    }

    fn list_players_in(&self, _name: &str) -> Vec<PlayerHandle> {
        Vec::new()
    }

    fn apply_property(&self, name: &str, key: &str, value: &PropertyValue) -> Result<(), EngineError> {
        tracing::debug!(world = name, key, %value, "property applied");
        Ok(())
    }

    fn delete_files(&self, name: &str) -> Result<(), EngineError> {
        if self.loaded.lock().contains(name) {
            return Err(EngineError::Rejected(format!("{name} is loaded")));
        }
        let dir = self.world_dir(name);
        if !dir.is_dir() {
            return Err(EngineError::MissingFiles(dir.display().to_string()));
        }
        std::fs::remove_dir_all(dir)?;
        Ok(())
    }
}

/// Session layer for the console: nobody is ever connected.
#[derive(Debug, Default)]
pub struct ConsoleSessions;

impl PlayerSessions for ConsoleSessions {
    fn evacuate(
        &self,
        world: &str,
        destination: Option<&str>,
        players: &[PlayerHandle],
    ) -> Result<(), EngineError> {
        tracing::info!(world, ?destination, count = players.len(), "evacuation requested");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_import_keeps_identity() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = DirectoryEngine::new(tmp.path()).unwrap();
        let mut spec = WorldSpec::new("w", Environment::End, WorldType::Flat);
        spec.seed = Some(5);
        let created = engine.create(&spec).unwrap();
        assert_eq!(created.seed, 5);
        assert!(matches!(engine.create(&spec), Err(EngineError::Rejected(_))));

        let again = DirectoryEngine::new(tmp.path()).unwrap();
        let imported = again.import_existing(&spec).unwrap();
        assert_eq!(imported, created);
    }

    #[test]
    fn import_missing_directory_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = DirectoryEngine::new(tmp.path()).unwrap();
        let spec = WorldSpec::new("ghost", Environment::Normal, WorldType::Normal);
        assert!(matches!(engine.import_existing(&spec), Err(EngineError::MissingFiles(_))));
    }

    #[test]
    fn bare_directory_is_adopted() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join("old")).unwrap();
        let engine = DirectoryEngine::new(tmp.path()).unwrap();
        let spec = WorldSpec::new("old", Environment::Nether, WorldType::Normal);
        engine.import_existing(&spec).unwrap();
        assert!(tmp.path().join("old").join(LEVEL_FILE).is_file());
    }

    #[test]
    fn load_writes_next_load_settings() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = DirectoryEngine::new(tmp.path()).unwrap();
        let spec = WorldSpec::new("w", Environment::Normal, WorldType::Normal);
        engine.create(&spec).unwrap();
        engine.unload_physical("w").unwrap();

        let mut next = spec.clone();
        next.environment = Environment::Nether;
        next.seed = Some(11);
        engine.load_physical(&next).unwrap();
        let level = engine.read_level(&tmp.path().join("w")).unwrap();
        assert_eq!(level.environment, Environment::Nether);
        assert_eq!(level.seed, 11);
    }

    #[test]
    fn delete_requires_unloaded() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = DirectoryEngine::new(tmp.path()).unwrap();
        let spec = WorldSpec::new("w", Environment::Normal, WorldType::Normal);
        engine.create(&spec).unwrap();
        assert!(engine.delete_files("w").is_err());
        engine.unload_physical("w").unwrap();
        engine.delete_files("w").unwrap();
        assert!(!tmp.path().join("w").exists());
    }
}
