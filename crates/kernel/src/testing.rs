//! In-memory doubles for the engine, session layer and store.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use multiworld_common::{PlayerHandle, WorldUid};
use parking_lot::Mutex;

use crate::config::ManagerConfig;
use crate::engine::{EngineError, EngineWorld, PlayerSessions, WorldEngine, WorldSpec};
use crate::manager::WorldManager;
use crate::property::PropertyValue;
use crate::store::{MemoryStore, StoreError, WorldDocument, WorldStore};

#[derive(Debug, Default)]
struct EngineState {
    on_disk: BTreeMap<String, WorldUid>,
    loaded: BTreeSet<String>,
    players: BTreeMap<String, Vec<PlayerHandle>>,
    rejected_keys: BTreeSet<String>,
    applied: Vec<(String, String, PropertyValue)>,
    fail_next_load: bool,
    load_delay: Option<Duration>,
    load_delays: BTreeMap<String, Duration>,
    apply_delay: Option<Duration>,
    last_load: Option<WorldSpec>,
    imports: usize,
    loads: usize,
    unloads: usize,
}

/// Engine that keeps "world files" and players in memory.
#[derive(Debug, Default)]
pub struct FakeEngine {
    state: Mutex<EngineState>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretend a world directory exists so it can be imported.
    pub fn add_world_on_disk(&self, name: &str) -> WorldUid {
        *self
            .state
            .lock()
            .on_disk
            .entry(name.to_string())
            .or_insert_with(WorldUid::new)
    }

    pub fn has_files(&self, name: &str) -> bool {
        self.state.lock().on_disk.contains_key(name)
    }

    pub fn uid_of(&self, name: &str) -> Option<WorldUid> {
        self.state.lock().on_disk.get(name).copied()
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.state.lock().loaded.contains(name)
    }

    pub fn add_player(&self, world: &str, player: &str) -> PlayerHandle {
        let handle = PlayerHandle::new(player);
        self.state
            .lock()
            .players
            .entry(world.to_string())
            .or_default()
            .push(handle.clone());
        handle
    }

    pub fn players_in(&self, world: &str) -> Vec<PlayerHandle> {
        self.state.lock().players.get(world).cloned().unwrap_or_default()
    }

    /// Move `player` out of `from`; `None` disconnects them.
    pub fn move_player(&self, from: &str, to: Option<&str>, player: &PlayerHandle) {
        let mut state = self.state.lock();
        if let Some(list) = state.players.get_mut(from) {
            list.retain(|p| p != player);
        }
        if let Some(to) = to {
            state.players.entry(to.to_string()).or_default().push(player.clone());
        }
    }

    /// Make `apply_property` refuse every write to `key`.
    pub fn reject_property(&self, key: &str) {
        self.state.lock().rejected_keys.insert(key.to_string());
    }

    /// Every accepted `(world, key, value)` push, oldest first.
    pub fn applied(&self) -> Vec<(String, String, PropertyValue)> {
        self.state.lock().applied.clone()
    }

    pub fn fail_next_load(&self) {
        self.state.lock().fail_next_load = true;
    }

    pub fn set_load_delay(&self, delay: Duration) {
        self.state.lock().load_delay = Some(delay);
    }

    pub fn set_load_delay_for(&self, world: &str, delay: Duration) {
        self.state.lock().load_delays.insert(world.to_string(), delay);
    }

    /// Make every `apply_property` sleep first.
    pub fn set_apply_delay(&self, delay: Duration) {
        self.state.lock().apply_delay = Some(delay);
    }

    pub fn last_load_spec(&self) -> Option<WorldSpec> {
        self.state.lock().last_load.clone()
    }

    pub fn import_count(&self) -> usize {
        self.state.lock().imports
    }

    pub fn load_count(&self) -> usize {
        self.state.lock().loads
    }

    pub fn unload_count(&self) -> usize {
        self.state.lock().unloads
    }
}

fn fake_seed(name: &str) -> i64 {
    name.bytes().fold(17i64, |acc, b| acc.wrapping_mul(31).wrapping_add(i64::from(b)))
}

impl WorldEngine for FakeEngine {
    fn import_existing(&self, spec: &WorldSpec) -> Result<EngineWorld, EngineError> {
        let mut state = self.state.lock();
        state.imports += 1;
        let uid = *state
            .on_disk
            .get(&spec.name)
            .ok_or_else(|| EngineError::MissingFiles(spec.name.clone()))?;
        state.loaded.insert(spec.name.clone());
        Ok(EngineWorld {
            uid,
            seed: spec.seed.unwrap_or_else(|| fake_seed(&spec.name)),
        })
    }

    fn create(&self, spec: &WorldSpec) -> Result<EngineWorld, EngineError> {
        let mut state = self.state.lock();
        if state.on_disk.contains_key(&spec.name) {
            return Err(EngineError::Rejected(format!("'{}' already has files", spec.name)));
        }
        let uid = WorldUid::new();
        state.on_disk.insert(spec.name.clone(), uid);
        state.loaded.insert(spec.name.clone());
        Ok(EngineWorld {
            uid,
            seed: spec.seed.unwrap_or_else(|| fake_seed(&spec.name)),
        })
    }

    fn load_physical(&self, spec: &WorldSpec) -> Result<(), EngineError> {
        let delay = {
            let state = self.state.lock();
            state.load_delays.get(&spec.name).copied().or(state.load_delay)
        };
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        let mut state = self.state.lock();
        if std::mem::take(&mut state.fail_next_load) {
            return Err(EngineError::Corrupt(format!("level data of '{}'", spec.name)));
        }
        if !state.on_disk.contains_key(&spec.name) {
            return Err(EngineError::MissingFiles(spec.name.clone()));
        }
        state.loaded.insert(spec.name.clone());
        state.last_load = Some(spec.clone());
        state.loads += 1;
        Ok(())
    }

    fn unload_physical(&self, name: &str) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        state.loaded.remove(name);
        state.unloads += 1;
        Ok(())
    }

    fn list_players_in(&self, name: &str) -> Vec<PlayerHandle> {
        self.players_in(name)
    }

    fn apply_property(&self, name: &str, key: &str, value: &PropertyValue) -> Result<(), EngineError> {
        let delay = self.state.lock().apply_delay;
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        let mut state = self.state.lock();
        if state.rejected_keys.contains(key) {
            return Err(EngineError::Rejected(format!("{key} is locked")));
        }
        state
            .applied
            .push((name.to_string(), key.to_string(), value.clone()));
        Ok(())
    }

    fn delete_files(&self, name: &str) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        if state.loaded.contains(name) {
            return Err(EngineError::Rejected(format!("'{name}' is in use")));
        }
        state
            .on_disk
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| EngineError::MissingFiles(name.to_string()))
    }
}

/// Session layer that moves players inside a [`FakeEngine`].
#[derive(Debug)]
pub struct FakeSessions {
    engine: Arc<FakeEngine>,
    refused: Mutex<BTreeSet<String>>,
    evacuations: Mutex<Vec<(String, Option<String>, usize)>>,
}

impl FakeSessions {
    pub fn new(engine: Arc<FakeEngine>) -> Self {
        Self {
            engine,
            refused: Mutex::new(BTreeSet::new()),
            evacuations: Mutex::new(Vec::new()),
        }
    }

    /// The named player silently stays put when evacuated.
    pub fn refuse_to_move(&self, player: &str) {
        self.refused.lock().insert(player.to_string());
    }

    /// `(world, destination, player count)` per evacuate call.
    pub fn evacuations(&self) -> Vec<(String, Option<String>, usize)> {
        self.evacuations.lock().clone()
    }
}

impl PlayerSessions for FakeSessions {
    fn evacuate(
        &self,
        world: &str,
        destination: Option<&str>,
        players: &[PlayerHandle],
    ) -> Result<(), EngineError> {
        self.evacuations.lock().push((
            world.to_string(),
            destination.map(str::to_string),
            players.len(),
        ));
        let refused = self.refused.lock().clone();
        for player in players.iter().filter(|p| !refused.contains(&p.name)) {
            self.engine.move_player(world, destination, player);
        }
        Ok(())
    }
}

/// Store whose every operation fails.
#[derive(Debug, Default)]
pub struct FailingStore;

impl WorldStore for FailingStore {
    fn save(&self, _document: &WorldDocument) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("store is offline".into()))
    }

    fn load_all(&self) -> Result<Vec<WorldDocument>, StoreError> {
        Err(StoreError::Unavailable("store is offline".into()))
    }

    fn remove(&self, _name: &str) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("store is offline".into()))
    }
}

/// A manager wired to fresh doubles.
pub struct Harness {
    pub engine: Arc<FakeEngine>,
    pub sessions: Arc<FakeSessions>,
    /// Backing store, unless built with [`Harness::with_failing_store`].
    pub store: Arc<MemoryStore>,
    pub manager: WorldManager,
}

impl Harness {
    pub fn new() -> Self {
        Self::sharing(Arc::new(MemoryStore::new()))
    }

    /// Fresh engine and manager over an existing store, like a restart.
    pub fn sharing(store: Arc<MemoryStore>) -> Self {
        Self::assemble(store.clone(), store, ManagerConfig::default())
    }

    pub fn with_config(config: ManagerConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        Self::assemble(store.clone(), store, config)
    }

    pub fn with_failing_store() -> Self {
        Self::assemble(
            Arc::new(FailingStore),
            Arc::new(MemoryStore::new()),
            ManagerConfig::default(),
        )
    }

    fn assemble(backing: Arc<dyn WorldStore>, store: Arc<MemoryStore>, config: ManagerConfig) -> Self {
        let engine = Arc::new(FakeEngine::new());
        let sessions = Arc::new(FakeSessions::new(Arc::clone(&engine)));
        let manager = WorldManager::new(engine.clone(), sessions.clone(), backing, config);
        Self {
            engine,
            sessions,
            store,
            manager,
        }
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}
