use std::collections::BTreeSet;
use std::sync::{Arc, Weak};

use multiworld_common::{
    Difficulty, Environment, FacingCoordinates, GameMode, LoadState, PortalType, WorldType,
    WorldUid,
};
use parking_lot::Mutex;

use crate::engine::{EngineOp, EngineWorld, WorldSpec, call_bounded};
use crate::error::{NotFoundKind, WorldError};
use crate::manager::{Directory, Services};
use crate::property::{EffectiveOn, PropertyBag, PropertyRegistry, PropertyValue};
use crate::spawn::{SpawnException, SpawnExceptionTable};
use crate::store::WorldDocument;
use crate::time;

/// One managed world.
///
/// Identity (name, uid, world type) never changes. Everything else lives
/// behind a single lock, so each property write is applied entirely or not at
/// all. Property writes are serialized by a second lock that is held across
/// the engine push; the state lock never is. Only the manager moves a record
/// between load states.
pub struct WorldRecord {
    name: String,
    uid: WorldUid,
    world_type: WorldType,
    registered: u64,
    services: Arc<Services>,
    /// Used to resolve world names; never keeps other worlds alive.
    directory: Weak<Directory>,
    state: Mutex<RecordState>,
    /// Serializes property writes and the replay at load time.
    write_lock: Mutex<()>,
    /// Serializes `save` so an older snapshot never lands after a newer one.
    save_lock: Mutex<()>,
}

#[derive(Debug)]
struct RecordState {
    load_state: LoadState,
    properties: PropertyBag,
    spawn_exceptions: SpawnExceptionTable,
    blacklist: Vec<String>,
    /// Next-load keys written while loaded.
    pending: BTreeSet<&'static str>,
    /// Immediate keys the engine has not seen yet; replayed on load.
    unapplied: BTreeSet<&'static str>,
    dirty: bool,
    revision: u64,
}

impl RecordState {
    fn touch(&mut self) {
        self.dirty = true;
        self.revision += 1;
    }
}

impl std::fmt::Debug for WorldRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("WorldRecord")
            .field("name", &self.name)
            .field("uid", &self.uid)
            .field("world_type", &self.world_type)
            .field("load_state", &state.load_state)
            .field("dirty", &state.dirty)
            .finish()
    }
}

impl WorldRecord {
    /// A freshly imported or created world, already loaded by the engine.
    pub(crate) fn bound(
        spec: &WorldSpec,
        bound: EngineWorld,
        registered: u64,
        services: Arc<Services>,
        directory: Weak<Directory>,
    ) -> Self {
        let mut properties = PropertyRegistry::global().defaults();
        let registry = PropertyRegistry::global();
        let generator = spec.generator.clone().unwrap_or_default();
        for (key, value) in [
            ("environment", PropertyValue::from(spec.environment)),
            ("seed", PropertyValue::Long(bound.seed)),
            ("generator", PropertyValue::Text(generator)),
        ] {
            if let Some(index) = registry.index_of(key) {
                properties.replace(index, value);
            }
        }
        Self {
            name: spec.name.clone(),
            uid: bound.uid,
            world_type: spec.world_type,
            registered,
            services,
            directory,
            state: Mutex::new(RecordState {
                load_state: LoadState::Loaded,
                properties,
                spawn_exceptions: SpawnExceptionTable::new(),
                blacklist: Vec::new(),
                pending: BTreeSet::new(),
                unapplied: BTreeSet::new(),
                dirty: true,
                revision: 0,
            }),
            write_lock: Mutex::new(()),
            save_lock: Mutex::new(()),
        }
    }

    /// Rebuild an unloaded record from its persisted form. Unknown keys and
    /// values that no longer fit the schema are skipped.
    pub(crate) fn from_document(
        document: WorldDocument,
        registered: u64,
        services: Arc<Services>,
        directory: Weak<Directory>,
    ) -> Self {
        let registry = PropertyRegistry::global();
        let mut properties = registry.defaults();
        for (key, raw) in &document.properties {
            let Some(def) = registry.describe(key) else {
                tracing::warn!(world = %document.name, %key, "ignoring unknown property");
                continue;
            };
            match def.kind.from_json(raw) {
                Some(value) => match registry.set(&document.name, &mut properties, key, value) {
                    Ok(_) => {}
                    Err(e) => tracing::warn!(world = %document.name, %key, "ignoring stored value: {e}"),
                },
                None => tracing::warn!(
                    world = %document.name,
                    %key,
                    expected = def.kind.name(),
                    "ignoring stored value of the wrong kind"
                ),
            }
        }

        // The engine's copy of these is unknown until the first load.
        let defaults = registry.defaults();
        let unapplied = registry
            .defs()
            .iter()
            .enumerate()
            .filter(|(i, def)| {
                def.effective_on == EffectiveOn::Immediate && properties.get(*i) != defaults.get(*i)
            })
            .map(|(_, def)| def.key)
            .collect();

        let mut blacklist: Vec<String> = Vec::with_capacity(document.blacklist.len());
        for entry in document.blacklist {
            if !blacklist.contains(&entry) {
                blacklist.push(entry);
            }
        }

        Self {
            name: document.name,
            uid: document.uid,
            world_type: document.world_type,
            registered,
            services,
            directory,
            state: Mutex::new(RecordState {
                load_state: LoadState::Unloaded,
                properties,
                spawn_exceptions: document.spawn_exceptions.into_iter().collect(),
                blacklist,
                pending: BTreeSet::new(),
                unapplied,
                dirty: false,
                revision: 0,
            }),
            write_lock: Mutex::new(()),
            save_lock: Mutex::new(()),
        }
    }

    // --- Identity and lifecycle ---

    /// The world's name. It cannot change; see [`WorldRecord::alias`] for
    /// the display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn uid(&self) -> WorldUid {
        self.uid
    }

    pub fn world_type(&self) -> WorldType {
        self.world_type
    }

    pub(crate) fn registered(&self) -> u64 {
        self.registered
    }

    pub fn load_state(&self) -> LoadState {
        self.state.lock().load_state
    }

    pub fn is_loaded(&self) -> bool {
        self.load_state() == LoadState::Loaded
    }

    /// Whether in-memory state differs from what was last saved.
    pub fn is_dirty(&self) -> bool {
        self.state.lock().dirty
    }

    /// Next-load properties changed while loaded, waiting for the next load.
    pub fn pending_keys(&self) -> Vec<&'static str> {
        self.state.lock().pending.iter().copied().collect()
    }

    pub(crate) fn set_load_state(&self, load_state: LoadState) {
        self.state.lock().load_state = load_state;
    }

    /// Immediate keys written while the world was not loaded.
    pub fn unapplied_keys(&self) -> Vec<&'static str> {
        self.state.lock().unapplied.iter().copied().collect()
    }

    /// Called once the engine has loaded the world from `loaded`.
    ///
    /// Replays immediate settings the engine has not seen, then marks the
    /// record loaded. Returns every key handed to the engine by this load.
    /// A replay the engine refuses stays queued for the next load. Next-load
    /// keys that changed after `loaded` was taken stay pending.
    pub(crate) fn finish_load(&self, loaded: &WorldSpec) -> Vec<&'static str> {
        let _writing = self.write_lock.lock();
        let replay: Vec<(&'static str, PropertyValue)> = {
            let mut state = self.state.lock();
            let keys = std::mem::take(&mut state.unapplied);
            keys.into_iter()
                .filter_map(|key| Self::value_of(&state, key).map(|value| (key, value.clone())))
                .collect()
        };

        let mut applied = Vec::with_capacity(replay.len());
        let mut refused = Vec::new();
        for (key, value) in &replay {
            let key = *key;
            match self.push_to_engine(key, value) {
                Ok(()) => applied.push(key),
                Err(e) => {
                    tracing::warn!(world = %self.name, key, "setting not applied on load: {e}");
                    refused.push(key);
                }
            }
        }

        let mut state = self.state.lock();
        state.unapplied.extend(refused);
        state.load_state = LoadState::Loaded;
        let picked_up = std::mem::take(&mut state.pending);
        for (key, value) in Self::spec_values(loaded) {
            if Self::value_of(&state, key).is_some_and(|current| current != &value) {
                state.pending.insert(key);
            }
        }
        applied.extend(picked_up.into_iter().filter(|key| !state.pending.contains(key)));
        applied
    }

    fn value_of<'a>(state: &'a RecordState, key: &str) -> Option<&'a PropertyValue> {
        PropertyRegistry::global()
            .index_of(key)
            .map(|index| state.properties.get(index))
    }

    /// Next-load values as the engine received them.
    fn spec_values(spec: &WorldSpec) -> Vec<(&'static str, PropertyValue)> {
        let mut values = vec![
            ("environment", PropertyValue::from(spec.environment)),
            ("generator", PropertyValue::Text(spec.generator.clone().unwrap_or_default())),
        ];
        if let Some(seed) = spec.seed {
            values.push(("seed", PropertyValue::Long(seed)));
        }
        values
    }

    /// Current settings for an engine load.
    pub(crate) fn world_spec(&self) -> WorldSpec {
        let generator = self.generator();
        WorldSpec {
            name: self.name.clone(),
            environment: self.environment(),
            world_type: self.world_type,
            seed: Some(self.seed()),
            generator,
        }
    }

    // --- Generic property access ---

    /// Every settable property name, for help output.
    pub fn all_property_names(&self) -> String {
        PropertyRegistry::global().all_property_names()
    }

    pub fn property(&self, key: &str) -> Result<PropertyValue, WorldError> {
        let state = self.state.lock();
        PropertyRegistry::global()
            .get(&self.name, &state.properties, key)
            .cloned()
    }

    /// Typed write.
    ///
    /// On a loaded world, immediate properties are pushed to the engine
    /// first and an engine refusal leaves the stored value untouched;
    /// next-load properties are stored and marked pending. Immediate writes
    /// to a world that is not loaded reach the engine on its next load.
    pub fn set_property(&self, key: &str, value: PropertyValue) -> Result<(), WorldError> {
        let registry = PropertyRegistry::global();
        let index = registry.check(&self.name, key, &value)?;
        let def = registry.def_at(index);
        if def.key == "respawnWorld" {
            self.check_world_reference(def.key, &value)?;
        }

        let _writing = self.write_lock.lock();
        let was_loaded = {
            let state = self.state.lock();
            if state.properties.get(index) == &value {
                return Ok(());
            }
            state.load_state == LoadState::Loaded
        };
        let pushed = was_loaded && def.effective_on == EffectiveOn::Immediate;
        if pushed {
            self.push_to_engine(def.key, &value)?;
        }

        let mut state = self.state.lock();
        let loaded = state.load_state == LoadState::Loaded;
        match def.effective_on {
            EffectiveOn::Immediate if pushed && loaded => {
                state.unapplied.remove(def.key);
            }
            EffectiveOn::Immediate => {
                state.unapplied.insert(def.key);
            }
            EffectiveOn::NextLoad if loaded => {
                state.pending.insert(def.key);
            }
            EffectiveOn::NextLoad => {}
        }
        tracing::debug!(world = %self.name, key = def.key, %value, "property set");
        state.properties.replace(index, value);
        state.touch();
        Ok(())
    }

    /// Parse operator text for `key`, then write it like [`set_property`].
    ///
    /// [`set_property`]: WorldRecord::set_property
    pub fn set_property_from_str(&self, key: &str, text: &str) -> Result<(), WorldError> {
        let value = PropertyRegistry::global().parse(&self.name, key, text)?;
        self.set_property(key, value)
    }

    fn check_world_reference(&self, key: &str, value: &PropertyValue) -> Result<(), WorldError> {
        let target = value.as_str().unwrap_or_default();
        if target.is_empty() {
            return Ok(());
        }
        let known = self
            .directory
            .upgrade()
            .is_some_and(|directory| directory.contains(target));
        if known {
            Ok(())
        } else {
            Err(WorldError::validation(&self.name, key, target, "no such world"))
        }
    }

    fn push_to_engine(&self, key: &'static str, value: &PropertyValue) -> Result<(), WorldError> {
        let engine = Arc::clone(&self.services.engine);
        let world = self.name.clone();
        let sent = value.clone();
        let outcome = call_bounded(
            self.services.engine_timeout,
            &self.name,
            EngineOp::ApplyProperty,
            move || engine.apply_property(&world, key, &sent),
        )?;
        outcome.map_err(|source| WorldError::EngineRejected {
            world: self.name.clone(),
            key: key.to_string(),
            value: value.to_string(),
            source,
        })
    }

    fn read(&self, key: &str) -> Option<PropertyValue> {
        let value = self.property(key).ok();
        debug_assert!(value.is_some(), "accessor key {key} missing from the schema");
        value
    }

    fn read_bool(&self, key: &str) -> bool {
        self.read(key).and_then(|v| v.as_bool()).unwrap_or_default()
    }

    fn read_int(&self, key: &str) -> i32 {
        self.read(key).and_then(|v| v.as_int()).unwrap_or_default()
    }

    fn read_long(&self, key: &str) -> i64 {
        self.read(key).and_then(|v| v.as_long()).unwrap_or_default()
    }

    fn read_double(&self, key: &str) -> f64 {
        self.read(key).and_then(|v| v.as_double()).unwrap_or_default()
    }

    fn read_text(&self, key: &str) -> String {
        self.read(key)
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default()
    }

    fn read_enum<T: std::str::FromStr + Default>(&self, key: &str) -> T {
        self.read(key)
            .and_then(|v| v.as_str().and_then(|s| s.parse().ok()))
            .unwrap_or_default()
    }

    /// Write that reports failure as `false`, for the boolean-style setters.
    fn try_set(&self, key: &str, value: PropertyValue) -> bool {
        match self.set_property(key, value) {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(world = %self.name, %key, "rejected: {e}");
                false
            }
        }
    }

    // --- Typed accessors ---

    pub fn environment(&self) -> Environment {
        self.read_enum("environment")
    }

    /// Takes effect the next time the world loads.
    pub fn set_environment(&self, environment: Environment) -> Result<(), WorldError> {
        self.set_property("environment", environment.into())
    }

    pub fn difficulty(&self) -> Difficulty {
        self.read_enum("difficulty")
    }

    pub fn set_difficulty(&self, difficulty: Difficulty) -> bool {
        self.try_set("difficulty", difficulty.into())
    }

    pub fn seed(&self) -> i64 {
        self.read_long("seed")
    }

    pub fn set_seed(&self, seed: i64) -> Result<(), WorldError> {
        self.set_property("seed", PropertyValue::Long(seed))
    }

    pub fn generator(&self) -> Option<String> {
        Some(self.read_text("generator")).filter(|g| !g.is_empty())
    }

    pub fn set_generator(&self, generator: Option<&str>) -> Result<(), WorldError> {
        self.set_property("generator", generator.unwrap_or_default().into())
    }

    /// Display name, falling back to the world name.
    pub fn alias(&self) -> String {
        let alias = self.read_text("alias");
        if alias.is_empty() { self.name.clone() } else { alias }
    }

    /// `None` or an empty alias reverts to the world name.
    pub fn set_alias(&self, alias: Option<&str>) -> Result<(), WorldError> {
        self.set_property("alias", alias.unwrap_or_default().trim().into())
    }

    pub fn is_pvp_enabled(&self) -> bool {
        self.read_bool("pvp")
    }

    pub fn set_pvp_mode(&self, pvp: bool) -> Result<(), WorldError> {
        self.set_property("pvp", pvp.into())
    }

    /// Hidden worlds stay out of listings regardless of access rights.
    pub fn is_hidden(&self) -> bool {
        self.read_bool("hidden")
    }

    pub fn set_hidden(&self, hidden: bool) -> Result<(), WorldError> {
        self.set_property("hidden", hidden.into())
    }

    pub fn prefix_chat(&self) -> bool {
        self.read_bool("prefixChat")
    }

    pub fn set_prefix_chat(&self, prefix: bool) -> Result<(), WorldError> {
        self.set_property("prefixChat", prefix.into())
    }

    pub fn is_weather_enabled(&self) -> bool {
        self.read_bool("allowWeather")
    }

    pub fn set_enable_weather(&self, enabled: bool) -> Result<(), WorldError> {
        self.set_property("allowWeather", enabled.into())
    }

    pub fn is_keeping_spawn_in_memory(&self) -> bool {
        self.read_bool("keepSpawnInMemory")
    }

    pub fn set_keep_spawn_in_memory(&self, keep: bool) -> Result<(), WorldError> {
        self.set_property("keepSpawnInMemory", keep.into())
    }

    pub fn spawn_location(&self) -> FacingCoordinates {
        self.read("spawnLocation").and_then(|v| v.as_location()).unwrap_or_default()
    }

    pub fn set_spawn_location(&self, location: FacingCoordinates) -> Result<(), WorldError> {
        self.set_property("spawnLocation", location.into())
    }

    pub fn hunger(&self) -> bool {
        self.read_bool("hunger")
    }

    pub fn set_hunger(&self, hunger: bool) -> Result<(), WorldError> {
        self.set_property("hunger", hunger.into())
    }

    pub fn game_mode(&self) -> GameMode {
        self.read_enum("gameMode")
    }

    pub fn set_game_mode(&self, mode: GameMode) -> bool {
        self.try_set("gameMode", mode.into())
    }

    /// Entry fee, in units of [`WorldRecord::currency`].
    pub fn price(&self) -> f64 {
        self.read_double("price")
    }

    pub fn set_price(&self, price: f64) -> Result<(), WorldError> {
        self.set_property("price", price.into())
    }

    /// `-1` for the economy currency, otherwise an item id.
    pub fn currency(&self) -> i32 {
        self.read_int("currency")
    }

    pub fn set_currency(&self, currency: i32) -> Result<(), WorldError> {
        self.set_property("currency", currency.into())
    }

    /// Name of the world players respawn in; empty when unset.
    pub fn respawn_to_world(&self) -> String {
        self.read_text("respawnWorld")
    }

    /// Fails for names that are not registered. An empty name clears it.
    pub fn set_respawn_to_world(&self, world: &str) -> bool {
        self.try_set("respawnWorld", world.trim().into())
    }

    pub fn scaling(&self) -> f64 {
        self.read_double("scale")
    }

    /// Rejects zero, negative and non-finite values.
    pub fn set_scaling(&self, scaling: f64) -> bool {
        self.try_set("scale", scaling.into())
    }

    pub fn auto_heal(&self) -> bool {
        self.read_bool("autoHeal")
    }

    pub fn set_auto_heal(&self, heal: bool) -> Result<(), WorldError> {
        self.set_property("autoHeal", heal.into())
    }

    pub fn adjust_spawn(&self) -> bool {
        self.read_bool("adjustSpawn")
    }

    pub fn set_adjust_spawn(&self, adjust: bool) -> Result<(), WorldError> {
        self.set_property("adjustSpawn", adjust.into())
    }

    pub fn auto_load(&self) -> bool {
        self.read_bool("autoLoad")
    }

    pub fn set_auto_load(&self, auto_load: bool) -> Result<(), WorldError> {
        self.set_property("autoLoad", auto_load.into())
    }

    pub fn bed_respawn(&self) -> bool {
        self.read_bool("bedRespawn")
    }

    pub fn set_bed_respawn(&self, bed_respawn: bool) -> Result<(), WorldError> {
        self.set_property("bedRespawn", bed_respawn.into())
    }

    /// `-1` or less means no limit.
    pub fn player_limit(&self) -> i32 {
        self.read_int("playerLimit")
    }

    pub fn set_player_limit(&self, limit: i32) -> Result<(), WorldError> {
        self.set_property("playerLimit", limit.into())
    }

    /// Time of day as `H:MMam` / `H:MMpm`.
    pub fn time(&self) -> String {
        time::format_time(self.time_ticks())
    }

    pub fn time_ticks(&self) -> i64 {
        self.read_long("time")
    }

    /// Accepts the formats of [`time::parse_time`]; `false` when unparsable.
    pub fn set_time(&self, time_of_day: &str) -> bool {
        match time::parse_time(time_of_day) {
            Some(ticks) => self.try_set("time", PropertyValue::Long(ticks)),
            None => {
                tracing::debug!(world = %self.name, input = time_of_day, "unparsable time");
                false
            }
        }
    }

    pub fn allowed_portals(&self) -> PortalType {
        self.read_enum("portalForm")
    }

    pub fn allow_portal_making(&self, portals: PortalType) -> Result<(), WorldError> {
        self.set_property("portalForm", portals.into())
    }

    pub fn ticks_per_animal_spawn(&self) -> i64 {
        self.read_long("ticksPerAnimalSpawn")
    }

    pub fn set_ticks_per_animal_spawn(&self, ticks: i64) -> Result<(), WorldError> {
        self.set_property("ticksPerAnimalSpawn", ticks.into())
    }

    pub fn ticks_per_monster_spawn(&self) -> i64 {
        self.read_long("ticksPerMonsterSpawn")
    }

    pub fn set_ticks_per_monster_spawn(&self, ticks: i64) -> Result<(), WorldError> {
        self.set_property("ticksPerMonsterSpawn", ticks.into())
    }

    pub fn animal_spawn_limit(&self) -> i32 {
        self.read_int("animalSpawnLimit")
    }

    pub fn set_animal_spawn_limit(&self, limit: i32) -> Result<(), WorldError> {
        self.set_property("animalSpawnLimit", limit.into())
    }

    pub fn monster_spawn_limit(&self) -> i32 {
        self.read_int("monsterSpawnLimit")
    }

    pub fn set_monster_spawn_limit(&self, limit: i32) -> Result<(), WorldError> {
        self.set_property("monsterSpawnLimit", limit.into())
    }

    pub fn ambient_spawn_limit(&self) -> i32 {
        self.read_int("ambientSpawnLimit")
    }

    pub fn set_ambient_spawn_limit(&self, limit: i32) -> Result<(), WorldError> {
        self.set_property("ambientSpawnLimit", limit.into())
    }

    pub fn water_animal_spawn_limit(&self) -> i32 {
        self.read_int("waterAnimalSpawnLimit")
    }

    pub fn set_water_animal_spawn_limit(&self, limit: i32) -> Result<(), WorldError> {
        self.set_property("waterAnimalSpawnLimit", limit.into())
    }

    pub fn is_preventing_spawns_list(&self) -> bool {
        self.read_bool("preventSpawnsList")
    }

    pub fn set_preventing_spawns_list(&self, prevent: bool) -> Result<(), WorldError> {
        self.set_property("preventSpawnsList", prevent.into())
    }

    // --- Spawn exceptions ---

    /// Snapshot of the spawn-exception table, ordered by creature type.
    pub fn spawn_exceptions(&self) -> Vec<SpawnException> {
        self.state.lock().spawn_exceptions.list()
    }

    pub fn spawn_exception(&self, creature_type: &str) -> Option<SpawnException> {
        self.state.lock().spawn_exceptions.get(creature_type).cloned()
    }

    /// Insert or replace the rule for the exception's creature type.
    pub fn add_or_update_spawn_exception(&self, exception: SpawnException) -> Result<(), WorldError> {
        if exception.creature_type().is_empty() {
            return Err(WorldError::validation(
                &self.name,
                "creatureType",
                "",
                "creature type must not be empty",
            ));
        }
        let mut state = self.state.lock();
        let replaced = state.spawn_exceptions.upsert(exception);
        state.touch();
        tracing::debug!(world = %self.name, replaced = replaced.is_some(), "spawn exception stored");
        Ok(())
    }

    pub fn remove_spawn_exception(&self, creature_type: &str) -> Result<SpawnException, WorldError> {
        let mut state = self.state.lock();
        let removed = state
            .spawn_exceptions
            .remove(creature_type)
            .ok_or_else(|| WorldError::NotFound {
                world: self.name.clone(),
                kind: NotFoundKind::CreatureType,
                name: creature_type.to_string(),
            })?;
        state.touch();
        Ok(removed)
    }

    // --- Blacklist ---

    /// Worlds that cannot be reached from this one.
    pub fn world_blacklist(&self) -> Vec<String> {
        self.state.lock().blacklist.clone()
    }

    pub fn is_blacklisted(&self, world: &str) -> bool {
        self.state.lock().blacklist.iter().any(|w| w == world)
    }

    /// Returns `false` if the world was already listed.
    pub fn blacklist_world(&self, world: &str) -> bool {
        let mut state = self.state.lock();
        if state.blacklist.iter().any(|w| w == world) {
            return false;
        }
        state.blacklist.push(world.to_string());
        state.touch();
        true
    }

    /// Returns `false` if the world was not listed.
    pub fn unblacklist_world(&self, world: &str) -> bool {
        let mut state = self.state.lock();
        let before = state.blacklist.len();
        state.blacklist.retain(|w| w != world);
        if state.blacklist.len() == before {
            return false;
        }
        state.touch();
        true
    }

    // --- Persistence ---

    /// Persisted form of the current state.
    pub fn snapshot(&self) -> WorldDocument {
        let state = self.state.lock();
        self.document(&state)
    }

    fn document(&self, state: &RecordState) -> WorldDocument {
        WorldDocument {
            name: self.name.clone(),
            uid: self.uid,
            world_type: self.world_type,
            properties: state
                .properties
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_json()))
                .collect(),
            spawn_exceptions: state.spawn_exceptions.list(),
            blacklist: state.blacklist.clone(),
        }
    }

    /// Write the record to the store and clear the dirty flag.
    ///
    /// A store failure is returned and the record stays dirty. Writes that
    /// land while the save is in flight keep the record dirty as well.
    pub fn save(&self) -> Result<(), WorldError> {
        let _saving = self.save_lock.lock();
        let (document, revision) = {
            let state = self.state.lock();
            (self.document(&state), state.revision)
        };
        self.services
            .store
            .save(&document)
            .map_err(|source| WorldError::Persistence {
                world: self.name.clone(),
                source,
            })?;
        let mut state = self.state.lock();
        if state.revision == revision {
            state.dirty = false;
        }
        tracing::info!(world = %self.name, "world saved");
        Ok(())
    }
}
