//! World registry and lifecycle.
//!
//! Lifecycle operations on one world are serialized by a per-world lock that
//! is held across the engine call; operations on different worlds run in
//! parallel. The lock is always taken before a record's own state lock.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use multiworld_common::{Environment, LoadState, PlayerHandle, WorldType};
use parking_lot::{Mutex, RwLock};

use crate::config::ManagerConfig;
use crate::engine::{EngineError, EngineOp, PlayerSessions, WorldEngine, WorldSpec, call_bounded};
use crate::error::WorldError;
use crate::record::WorldRecord;
use crate::store::WorldStore;

/// Collaborators shared by the manager and every record.
pub(crate) struct Services {
    pub(crate) engine: Arc<dyn WorldEngine>,
    pub(crate) sessions: Arc<dyn PlayerSessions>,
    pub(crate) store: Arc<dyn WorldStore>,
    pub(crate) engine_timeout: Option<Duration>,
}

/// Registered worlds by exact name.
#[derive(Default)]
pub(crate) struct Directory {
    worlds: RwLock<BTreeMap<String, Arc<WorldRecord>>>,
}

impl Directory {
    pub(crate) fn get(&self, name: &str) -> Option<Arc<WorldRecord>> {
        self.worlds.read().get(name).cloned()
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.worlds.read().contains_key(name)
    }

    fn insert(&self, record: Arc<WorldRecord>) {
        self.worlds.write().insert(record.name().to_string(), record);
    }

    fn remove(&self, name: &str) -> Option<Arc<WorldRecord>> {
        self.worlds.write().remove(name)
    }

    /// Snapshot in registration order.
    fn list(&self) -> Vec<Arc<WorldRecord>> {
        let mut worlds: Vec<_> = self.worlds.read().values().cloned().collect();
        worlds.sort_by_key(|w| w.registered());
        worlds
    }
}

/// Longest accepted world name.
pub const MAX_WORLD_NAME_LEN: usize = 64;

/// World names double as directory and file names.
pub fn validate_world_name(name: &str) -> Result<(), WorldError> {
    let reason = if name.is_empty() {
        "must not be empty"
    } else if name.len() > MAX_WORLD_NAME_LEN {
        "is too long"
    } else if name.starts_with('.') {
        "must not start with a dot"
    } else if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        "may only contain letters, digits, '_', '-' and '.'"
    } else {
        return Ok(());
    };
    Err(WorldError::validation(name, "name", name, reason))
}

/// Owns every registered world and drives their lifecycle against the engine.
pub struct WorldManager {
    services: Arc<Services>,
    directory: Arc<Directory>,
    locks: DashMap<String, Arc<Mutex<()>>>,
    next_seq: AtomicU64,
    config: ManagerConfig,
}

impl std::fmt::Debug for WorldManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorldManager")
            .field("worlds", &self.directory.worlds.read().len())
            .field("config", &self.config)
            .finish()
    }
}

impl WorldManager {
    pub fn new(
        engine: Arc<dyn WorldEngine>,
        sessions: Arc<dyn PlayerSessions>,
        store: Arc<dyn WorldStore>,
        config: ManagerConfig,
    ) -> Self {
        Self {
            services: Arc::new(Services {
                engine,
                sessions,
                store,
                engine_timeout: config.engine_timeout(),
            }),
            directory: Arc::new(Directory::default()),
            locks: DashMap::new(),
            next_seq: AtomicU64::new(0),
            config,
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Run `op` while holding the lifecycle lock for `name`.
    ///
    /// The lock entry is dropped again once `name` is no longer registered,
    /// so failed imports and removed worlds leave nothing behind.
    fn exclusive<T>(&self, name: &str, op: impl FnOnce() -> Result<T, WorldError>) -> Result<T, WorldError> {
        loop {
            let lock = Arc::clone(self.locks.entry(name.to_string()).or_default().value());
            let _guard = lock.lock();
            let current = self
                .locks
                .get(name)
                .is_some_and(|entry| Arc::ptr_eq(entry.value(), &lock));
            if !current {
                // Reaped while we waited; take the fresh entry.
                continue;
            }
            let result = op();
            if !self.directory.contains(name) {
                self.locks
                    .remove_if(name, |_, entry| Arc::ptr_eq(entry, &lock));
            }
            return result;
        }
    }

    fn call<T, F>(&self, world: &str, operation: EngineOp, call: F) -> Result<Result<T, EngineError>, WorldError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, EngineError> + Send + 'static,
    {
        call_bounded(self.services.engine_timeout, world, operation, call)
    }

    /// Bind a world that already exists on disk. The new record is loaded
    /// and dirty; nothing is written to the store.
    pub fn import_world(
        &self,
        name: &str,
        environment: Environment,
        world_type: WorldType,
        generator: Option<&str>,
    ) -> Result<Arc<WorldRecord>, WorldError> {
        let mut spec = WorldSpec::new(name, environment, world_type);
        spec.generator = generator.map(str::to_string);
        self.register(spec, EngineOp::Import)
    }

    /// Generate a brand-new world and register it like an import.
    pub fn create_world(
        &self,
        name: &str,
        environment: Environment,
        world_type: WorldType,
        seed: Option<i64>,
        generator: Option<&str>,
    ) -> Result<Arc<WorldRecord>, WorldError> {
        let mut spec = WorldSpec::new(name, environment, world_type);
        spec.seed = seed;
        spec.generator = generator.map(str::to_string);
        self.register(spec, EngineOp::Create)
    }

    fn register(&self, spec: WorldSpec, operation: EngineOp) -> Result<Arc<WorldRecord>, WorldError> {
        let _span = tracing::info_span!("register_world", world = %spec.name, %operation).entered();
        validate_world_name(&spec.name)?;
        let name = spec.name.clone();
        self.exclusive(&name, || {
            if self.directory.contains(&name) {
                return Err(WorldError::WorldAlreadyExists { world: name.clone() });
            }

            let engine = Arc::clone(&self.services.engine);
            let request = spec.clone();
            let bound = self.call(&name, operation, move || match operation {
                EngineOp::Create => engine.create(&request),
                _ => engine.import_existing(&request),
            })?;
            let bound = bound.map_err(|source| match operation {
                EngineOp::Import => WorldError::Import {
                    world: name.clone(),
                    source,
                },
                _ => WorldError::EngineOperation {
                    world: name.clone(),
                    operation,
                    source,
                },
            })?;

            let record = Arc::new(WorldRecord::bound(
                &spec,
                bound,
                self.next_seq.fetch_add(1, Ordering::Relaxed),
                Arc::clone(&self.services),
                Arc::downgrade(&self.directory),
            ));
            self.directory.insert(Arc::clone(&record));
            tracing::info!(uid = %record.uid(), seed = bound.seed, "world registered");
            Ok(record)
        })
    }

    pub fn load_world(&self, name: &str) -> Result<(), WorldError> {
        let _span = tracing::info_span!("load_world", world = %name).entered();
        self.exclusive(name, || {
            let record = self.get_world(name)?;
            if record.is_loaded() {
                return Err(WorldError::WorldAlreadyLoaded { world: name.to_string() });
            }
            let engine = Arc::clone(&self.services.engine);
            let spec = record.world_spec();
            let request = spec.clone();
            self.call(name, EngineOp::Load, move || engine.load_physical(&request))?
                .map_err(|source| WorldError::EngineOperation {
                    world: name.to_string(),
                    operation: EngineOp::Load,
                    source,
                })?;
            let applied = record.finish_load(&spec);
            tracing::info!(?applied, "world loaded");
            Ok(())
        })
    }

    /// Evacuate any players, then unload. Fails without unloading if a
    /// player is still inside after evacuation.
    pub fn unload_world(&self, name: &str) -> Result<(), WorldError> {
        let _span = tracing::info_span!("unload_world", world = %name).entered();
        self.exclusive(name, || {
            let record = self.get_world(name)?;
            if !record.is_loaded() {
                return Err(WorldError::WorldAlreadyUnloaded { world: name.to_string() });
            }

            let players = self.list_players(name)?;
            if !players.is_empty() {
                let destination = self.evacuation_target(&record);
                tracing::info!(count = players.len(), ?destination, "evacuating players");
                let sessions = Arc::clone(&self.services.sessions);
                let world = name.to_string();
                let target = destination.clone();
                self.call(name, EngineOp::Evacuate, move || {
                    sessions.evacuate(&world, target.as_deref(), &players)
                })?
                .map_err(|source| WorldError::Evacuation {
                    world: name.to_string(),
                    reason: source.to_string(),
                })?;

                let remaining = self.list_players(name)?;
                if !remaining.is_empty() {
                    return Err(WorldError::Evacuation {
                        world: name.to_string(),
                        reason: format!("{} player(s) still present", remaining.len()),
                    });
                }
            }

            let engine = Arc::clone(&self.services.engine);
            let world = name.to_string();
            self.call(name, EngineOp::Unload, move || engine.unload_physical(&world))?
                .map_err(|source| WorldError::EngineOperation {
                    world: name.to_string(),
                    operation: EngineOp::Unload,
                    source,
                })?;
            record.set_load_state(LoadState::Unloaded);
            tracing::info!("world unloaded");
            Ok(())
        })
    }

    /// First loaded world among the respawn world and the configured default,
    /// skipping the world being emptied.
    fn evacuation_target(&self, record: &WorldRecord) -> Option<String> {
        let respawn = record.respawn_to_world();
        [Some(respawn), self.config.default_world.clone()]
            .into_iter()
            .flatten()
            .filter(|candidate| !candidate.is_empty() && candidate != record.name())
            .find(|candidate| self.directory.get(candidate).is_some_and(|w| w.is_loaded()))
    }

    fn list_players(&self, name: &str) -> Result<Vec<PlayerHandle>, WorldError> {
        let engine = Arc::clone(&self.services.engine);
        let world = name.to_string();
        self.call(name, EngineOp::ListPlayers, move || Ok(engine.list_players_in(&world)))?
            .map_err(|source| WorldError::EngineOperation {
                world: name.to_string(),
                operation: EngineOp::ListPlayers,
                source,
            })
    }

    /// Forget an unloaded world and its saved record. World files stay on
    /// disk. A store failure leaves the world registered.
    pub fn remove_world(&self, name: &str) -> Result<(), WorldError> {
        let _span = tracing::info_span!("remove_world", world = %name).entered();
        self.exclusive(name, || {
            let record = self.get_world(name)?;
            if record.is_loaded() {
                return Err(WorldError::WorldStillLoaded { world: name.to_string() });
            }
            self.services
                .store
                .remove(name)
                .map_err(|source| WorldError::Persistence {
                    world: name.to_string(),
                    source,
                })?;
            self.directory.remove(name);
            tracing::info!("world removed");
            Ok(())
        })
    }

    /// Delete a world's files through the engine. Refused while the world is
    /// registered and loaded; the registration itself is left alone.
    pub fn delete_world_files(&self, name: &str) -> Result<(), WorldError> {
        let _span = tracing::info_span!("delete_world_files", world = %name).entered();
        validate_world_name(name)?;
        self.exclusive(name, || {
            if self.directory.get(name).is_some_and(|w| w.is_loaded()) {
                return Err(WorldError::WorldStillLoaded { world: name.to_string() });
            }
            let engine = Arc::clone(&self.services.engine);
            let world = name.to_string();
            self.call(name, EngineOp::DeleteFiles, move || engine.delete_files(&world))?
                .map_err(|source| WorldError::EngineOperation {
                    world: name.to_string(),
                    operation: EngineOp::DeleteFiles,
                    source,
                })?;
            tracing::info!("world files deleted");
            Ok(())
        })
    }

    /// Exact-name lookup.
    pub fn get_world(&self, name: &str) -> Result<Arc<WorldRecord>, WorldError> {
        self.directory.get(name).ok_or_else(|| WorldError::unknown(name))
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.directory.contains(name)
    }

    /// Every registered world in registration order, loaded or not.
    pub fn list_worlds(&self) -> Vec<Arc<WorldRecord>> {
        self.directory.list()
    }

    pub fn players_in(&self, name: &str) -> Result<Vec<PlayerHandle>, WorldError> {
        let record = self.get_world(name)?;
        if !record.is_loaded() {
            return Ok(Vec::new());
        }
        self.list_players(name)
    }

    /// Where players dying in `name` respawn: its respawn world when set,
    /// otherwise the world itself.
    pub fn resolve_respawn_world(&self, name: &str) -> Result<Arc<WorldRecord>, WorldError> {
        let record = self.get_world(name)?;
        let target = record.respawn_to_world();
        if target.is_empty() {
            return Ok(record);
        }
        self.get_world(&target)
    }

    /// Whether `from` lets players travel to `to`. Both must be registered.
    pub fn can_travel(&self, from: &str, to: &str) -> Result<bool, WorldError> {
        let origin = self.get_world(from)?;
        self.get_world(to)?;
        Ok(!origin.is_blacklisted(to))
    }

    /// Register every world in the store as unloaded. Worlds that are
    /// already registered or have unusable names are skipped.
    pub fn restore_from_store(&self) -> Result<usize, WorldError> {
        let _span = tracing::info_span!("restore_from_store").entered();
        let documents = self
            .services
            .store
            .load_all()
            .map_err(|source| WorldError::Persistence {
                world: "*".to_string(),
                source,
            })?;

        let mut restored = 0;
        for document in documents {
            let name = document.name.clone();
            if let Err(e) = validate_world_name(&name) {
                tracing::warn!(world = %name, "skipping stored world: {e}");
                continue;
            }
            let outcome = self.exclusive(&name, || {
                if self.directory.contains(&name) {
                    return Ok(false);
                }
                let record = WorldRecord::from_document(
                    document,
                    self.next_seq.fetch_add(1, Ordering::Relaxed),
                    Arc::clone(&self.services),
                    Arc::downgrade(&self.directory),
                );
                self.directory.insert(Arc::new(record));
                Ok(true)
            })?;
            if outcome {
                restored += 1;
            } else {
                tracing::warn!(world = %name, "stored world already registered; skipped");
            }
        }
        tracing::info!(restored, "worlds restored");
        Ok(restored)
    }

    /// Load every unloaded world that has `autoLoad` set. Failures are
    /// reported per world and do not stop the others.
    pub fn auto_load(&self) -> Vec<(String, Result<(), WorldError>)> {
        self.list_worlds()
            .into_iter()
            .filter(|w| !w.is_loaded() && w.auto_load())
            .map(|w| {
                let result = self.load_world(w.name());
                if let Err(e) = &result {
                    tracing::warn!(world = %w.name(), "auto-load failed: {e}");
                }
                (w.name().to_string(), result)
            })
            .collect()
    }

    /// Save every dirty world. Stops at the first store failure.
    pub fn save_all(&self) -> Result<usize, WorldError> {
        let mut saved = 0;
        for world in self.list_worlds() {
            if world.is_dirty() {
                world.save()?;
                saved += 1;
            }
        }
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::property::PropertyValue;
    use crate::testing::Harness;
    use multiworld_common::GameMode;

    fn import(h: &Harness, name: &str) -> Arc<WorldRecord> {
        h.engine.add_world_on_disk(name);
        h.manager
            .import_world(name, Environment::Normal, WorldType::Normal, None)
            .unwrap()
    }

    #[test]
    fn import_registers_loaded_and_dirty() {
        let h = Harness::new();
        let w = import(&h, "skyworld");
        assert!(w.is_loaded());
        assert!(w.is_dirty());
        assert!(h.store.is_empty());
        assert_eq!(w.uid(), h.engine.uid_of("skyworld").unwrap());
        assert!(h.manager.is_registered("skyworld"));
    }

    #[test]
    fn import_missing_files_registers_nothing() {
        let h = Harness::new();
        let err = h
            .manager
            .import_world("ghost", Environment::Normal, WorldType::Normal, None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Import);
        assert!(h.manager.get_world("ghost").is_err());
        assert!(h.manager.locks.is_empty());
    }

    #[test]
    fn duplicate_import_is_rejected() {
        let h = Harness::new();
        import(&h, "skyworld");
        let err = h
            .manager
            .import_world("skyworld", Environment::Nether, WorldType::Flat, None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WorldAlreadyExists);
        assert_eq!(h.engine.import_count(), 1);
    }

    #[test]
    fn names_are_validated() {
        let h = Harness::new();
        for bad in ["", "../etc", "a/b", ".hidden", "sky world"] {
            let err = h
                .manager
                .import_world(bad, Environment::Normal, WorldType::Normal, None)
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation, "{bad:?}");
        }
        assert_eq!(h.engine.import_count(), 0);
    }

    #[test]
    fn names_are_exact_match() {
        let h = Harness::new();
        import(&h, "skyworld");
        assert_eq!(h.manager.get_world("SkyWorld").unwrap_err().kind(), ErrorKind::UnknownWorld);
    }

    #[test]
    fn create_uses_requested_seed() {
        let h = Harness::new();
        let w = h
            .manager
            .create_world("fresh", Environment::End, WorldType::Flat, Some(42), Some("void"))
            .unwrap();
        assert_eq!(w.seed(), 42);
        assert_eq!(w.environment(), Environment::End);
        assert_eq!(w.generator().as_deref(), Some("void"));
        assert_eq!(w.world_type(), WorldType::Flat);
    }

    #[test]
    fn create_over_existing_files_fails() {
        let h = Harness::new();
        h.engine.add_world_on_disk("taken");
        let err = h
            .manager
            .create_world("taken", Environment::Normal, WorldType::Normal, None, None)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EngineOperation);
        assert!(!h.manager.is_registered("taken"));
    }

    #[test]
    fn state_machine_preconditions() {
        let h = Harness::new();
        import(&h, "w");
        assert_eq!(h.manager.load_world("w").unwrap_err().kind(), ErrorKind::WorldAlreadyLoaded);
        assert_eq!(h.manager.remove_world("w").unwrap_err().kind(), ErrorKind::WorldStillLoaded);
        h.manager.unload_world("w").unwrap();
        assert_eq!(h.manager.unload_world("w").unwrap_err().kind(), ErrorKind::WorldAlreadyUnloaded);
        h.manager.load_world("w").unwrap();
        assert!(h.manager.get_world("w").unwrap().is_loaded());
        assert_eq!(h.manager.load_world("nope").unwrap_err().kind(), ErrorKind::UnknownWorld);
    }

    #[test]
    fn failed_load_stays_unloaded() {
        let h = Harness::new();
        import(&h, "w");
        h.manager.unload_world("w").unwrap();
        h.engine.fail_next_load();
        let err = h.manager.load_world("w").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EngineOperation);
        assert!(!h.manager.get_world("w").unwrap().is_loaded());
    }

    #[test]
    fn next_load_changes_reach_the_engine_on_load() {
        let h = Harness::new();
        let w = import(&h, "w");
        w.set_environment(Environment::Nether).unwrap();
        w.set_seed(99).unwrap();
        h.manager.unload_world("w").unwrap();
        h.manager.load_world("w").unwrap();
        let spec = h.engine.last_load_spec().unwrap();
        assert_eq!(spec.environment, Environment::Nether);
        assert_eq!(spec.seed, Some(99));
        assert!(w.pending_keys().is_empty());
    }

    #[test]
    fn next_load_write_during_load_stays_pending() {
        let h = Harness::new();
        let w = import(&h, "w");
        h.manager.unload_world("w").unwrap();
        h.engine.set_load_delay(std::time::Duration::from_millis(300));
        std::thread::scope(|s| {
            let loader = s.spawn(|| h.manager.load_world("w"));
            std::thread::sleep(std::time::Duration::from_millis(100));
            w.set_seed(4242).unwrap();
            loader.join().unwrap().unwrap();
        });
        assert_ne!(h.engine.last_load_spec().unwrap().seed, Some(4242));
        assert_eq!(w.seed(), 4242);
        assert_eq!(w.pending_keys(), vec!["seed"]);
    }

    #[test]
    fn load_cycle_keeps_every_property() {
        let h = Harness::new();
        let w = import(&h, "w");
        assert!(w.set_game_mode(GameMode::Adventure));
        w.set_player_limit(12).unwrap();
        w.set_hidden(true).unwrap();
        w.blacklist_world("elsewhere");
        let before = w.snapshot();

        h.manager.unload_world("w").unwrap();
        h.manager.load_world("w").unwrap();
        h.manager.unload_world("w").unwrap();
        h.manager.load_world("w").unwrap();
        assert_eq!(w.snapshot().properties, before.properties);
        assert_eq!(w.snapshot(), before);
    }

    #[test]
    fn unload_evacuates_to_respawn_world() {
        let h = Harness::new();
        let w = import(&h, "w");
        import(&h, "hub");
        assert!(w.set_respawn_to_world("hub"));
        h.engine.add_player("w", "alice");
        h.engine.add_player("w", "bob");

        h.manager.unload_world("w").unwrap();
        let moves = h.sessions.evacuations();
        assert_eq!(moves.len(), 1);
        assert_eq!(moves[0].0, "w");
        assert_eq!(moves[0].1.as_deref(), Some("hub"));
        assert_eq!(moves[0].2, 2);
        assert_eq!(h.engine.players_in("hub").len(), 2);
    }

    #[test]
    fn stuck_player_aborts_unload() {
        let h = Harness::new();
        import(&h, "w");
        h.engine.add_player("w", "alice");
        h.sessions.refuse_to_move("alice");

        let err = h.manager.unload_world("w").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Evacuation);
        assert!(h.manager.get_world("w").unwrap().is_loaded());
        assert_eq!(h.engine.unload_count(), 0);
    }

    #[test]
    fn remove_forgets_world_and_saved_record() {
        let h = Harness::new();
        let w = import(&h, "w");
        w.save().unwrap();
        h.manager.unload_world("w").unwrap();
        h.manager.remove_world("w").unwrap();
        assert!(h.manager.get_world("w").is_err());
        assert!(h.store.get("w").is_none());
        assert!(h.engine.has_files("w"));
        assert!(h.manager.locks.is_empty());
    }

    #[test]
    fn remove_with_broken_store_keeps_world() {
        let h = Harness::with_failing_store();
        import(&h, "w");
        h.manager.unload_world("w").unwrap();
        let err = h.manager.remove_world("w").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Persistence);
        assert!(h.manager.is_registered("w"));
    }

    #[test]
    fn delete_files_refused_while_loaded() {
        let h = Harness::new();
        import(&h, "w");
        let err = h.manager.delete_world_files("w").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::WorldStillLoaded);
        h.manager.unload_world("w").unwrap();
        h.manager.delete_world_files("w").unwrap();
        assert!(!h.engine.has_files("w"));
    }

    #[test]
    fn list_follows_registration_order() {
        let h = Harness::new();
        for name in ["zeta", "alpha", "mid"] {
            import(&h, name);
        }
        let names: Vec<_> = h
            .manager
            .list_worlds()
            .iter()
            .map(|w| w.name().to_string())
            .collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn respawn_and_travel() {
        let h = Harness::new();
        let w = import(&h, "w");
        import(&h, "hub");
        assert_eq!(h.manager.resolve_respawn_world("w").unwrap().name(), "w");
        assert!(w.set_respawn_to_world("hub"));
        assert_eq!(h.manager.resolve_respawn_world("w").unwrap().name(), "hub");

        assert!(h.manager.can_travel("w", "hub").unwrap());
        w.blacklist_world("hub");
        assert!(!h.manager.can_travel("w", "hub").unwrap());
        assert!(h.manager.can_travel("hub", "w").unwrap());
        assert!(h.manager.can_travel("w", "gone").is_err());
    }

    #[test]
    fn dangling_respawn_world_is_unknown() {
        let h = Harness::new();
        let w = import(&h, "w");
        import(&h, "hub");
        assert!(w.set_respawn_to_world("hub"));
        h.manager.unload_world("hub").unwrap();
        h.manager.remove_world("hub").unwrap();
        let err = h.manager.resolve_respawn_world("w").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownWorld);
    }

    #[test]
    fn restore_then_auto_load() {
        let h = Harness::new();
        let a = import(&h, "a");
        let b = import(&h, "b");
        b.set_auto_load(false).unwrap();
        assert_eq!(h.manager.save_all().unwrap(), 2);
        assert!(!a.is_dirty());

        let next = Harness::sharing(Arc::clone(&h.store));
        next.engine.add_world_on_disk("a");
        next.engine.add_world_on_disk("b");
        assert_eq!(next.manager.restore_from_store().unwrap(), 2);
        assert_eq!(next.manager.restore_from_store().unwrap(), 0);
        let loaded = next.manager.auto_load();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].0, "a");
        assert!(loaded[0].1.is_ok());
        assert!(!next.manager.get_world("b").unwrap().is_loaded());
    }

    #[test]
    fn engine_timeout_is_reported() {
        let mut config = ManagerConfig::default();
        config.engine_timeout_ms = 150;
        let h = Harness::with_config(config);
        import(&h, "w");
        h.manager.unload_world("w").unwrap();
        h.engine.set_load_delay(Duration::from_secs(1));
        let err = h.manager.load_world("w").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EngineTimeout);
        assert!(!h.manager.get_world("w").unwrap().is_loaded());
    }

    #[test]
    fn concurrent_imports_of_one_name_register_once() {
        let h = Harness::new();
        h.engine.add_world_on_disk("w");
        let successes = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    s.spawn(|| {
                        h.manager
                            .import_world("w", Environment::Normal, WorldType::Normal, None)
                            .is_ok()
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|t| t.join().unwrap())
                .filter(|ok| *ok)
                .count()
        });
        assert_eq!(successes, 1);
        assert_eq!(h.engine.import_count(), 1);
    }

    #[test]
    fn concurrent_load_and_unload_agree_with_final_state() {
        for _ in 0..20 {
            let h = Harness::new();
            import(&h, "w");
            h.manager.unload_world("w").unwrap();
            h.engine.set_load_delay(Duration::from_millis(2));

            let (loaded, unloaded) = std::thread::scope(|s| {
                let load = s.spawn(|| h.manager.load_world("w"));
                let unload = s.spawn(|| h.manager.unload_world("w"));
                (load.join().unwrap(), unload.join().unwrap())
            });
            let state = h.manager.get_world("w").unwrap().load_state();
            assert!(loaded.is_ok() || unloaded.is_ok());
            match (&loaded, &unloaded) {
                (Ok(()), Ok(())) => assert_eq!(state, LoadState::Unloaded),
                (Ok(()), Err(_)) => assert_eq!(state, LoadState::Loaded),
                (Err(_), _) => assert_eq!(state, LoadState::Unloaded),
            }
        }
    }

    #[test]
    fn different_worlds_do_not_block_each_other() {
        let mut config = ManagerConfig::default();
        config.engine_timeout_ms = 0;
        let h = Harness::with_config(config);
        import(&h, "slow");
        import(&h, "fast");
        h.manager.unload_world("slow").unwrap();
        h.manager.unload_world("fast").unwrap();
        h.engine.set_load_delay_for("slow", Duration::from_millis(300));

        std::thread::scope(|s| {
            let slow = s.spawn(|| h.manager.load_world("slow"));
            std::thread::sleep(Duration::from_millis(50));
            let started = std::time::Instant::now();
            h.manager.load_world("fast").unwrap();
            assert!(started.elapsed() < Duration::from_millis(250));
            slow.join().unwrap().unwrap();
        });
    }

    #[test]
    fn concurrent_property_writes_during_lifecycle() {
        let h = Harness::new();
        let w = import(&h, "w");
        std::thread::scope(|s| {
            s.spawn(|| {
                for _ in 0..10 {
                    h.manager.unload_world("w").unwrap();
                    h.manager.load_world("w").unwrap();
                }
            });
            s.spawn(|| {
                for i in 0..200 {
                    w.set_player_limit(i).unwrap();
                }
            });
        });
        assert_eq!(w.player_limit(), 199);
        assert!(w.is_loaded());
    }

    #[test]
    fn skyworld_end_to_end() {
        let h = Harness::new();
        h.engine.add_world_on_disk("skyworld");
        let w = h
            .manager
            .import_world("skyworld", Environment::Normal, WorldType::Normal, None)
            .unwrap();

        assert!(w.set_difficulty(multiworld_common::Difficulty::Hard));
        w.set_property_from_str("pvp", "false").unwrap();
        assert!(!w.set_scaling(-5.0));
        assert!(w.set_game_mode(GameMode::Creative));
        assert_eq!(
            h.engine.applied().last().map(|(_, k, v)| (k.clone(), v.clone())),
            Some(("gameMode".to_string(), PropertyValue::Enum("creative".into())))
        );
        w.save().unwrap();

        h.manager.unload_world("skyworld").unwrap();
        h.manager.remove_world("skyworld").unwrap();
        assert!(h.store.get("skyworld").is_none());

        h.manager
            .import_world("skyworld", Environment::Normal, WorldType::Normal, None)
            .unwrap();
        let again = h.manager.get_world("skyworld").unwrap();
        assert_eq!(again.difficulty(), multiworld_common::Difficulty::Easy);
        assert!(again.is_pvp_enabled());
        assert_eq!(again.scaling(), 1.0);
    }
}
