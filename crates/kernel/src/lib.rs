//! Multiworld kernel: the world registry, per-world lifecycle and typed
//! world properties.
//!
//! The host engine, player sessions and durable storage are reached only
//! through the [`WorldEngine`], [`PlayerSessions`] and [`WorldStore`] traits.
//!
//! # Invariants
//! - At most one record per world name; lookups are exact-match.
//! - A world is loaded iff the last engine load succeeded and no unload has
//!   succeeded since.
//! - Lifecycle operations on one world are serialized; different worlds do
//!   not block each other.
//! - Property writes are typed, validated and all-or-nothing. Text is only
//!   turned into values by [`PropertyRegistry::parse`].
//! - Immediate properties written while a world is not loaded are replayed
//!   to the engine when it next loads. Engine calls never hold the lock
//!   that readers take.
//! - Nothing is written to the store unless [`WorldRecord::save`] or
//!   [`WorldManager::save_all`] is called.

mod config;
mod engine;
mod error;
mod manager;
mod property;
mod record;
mod spawn;
mod store;
pub mod time;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::{ConfigError, ManagerConfig};
pub use engine::{EngineError, EngineOp, EngineWorld, PlayerSessions, WorldEngine, WorldSpec};
pub use error::{ErrorKind, NotFoundKind, WorldError};
pub use manager::{MAX_WORLD_NAME_LEN, WorldManager, validate_world_name};
pub use property::{
    EffectiveOn, PropertyBag, PropertyDef, PropertyKind, PropertyRegistry, PropertyValue,
    parse_bool,
};
pub use record::WorldRecord;
pub use spawn::{SpawnBehavior, SpawnException, SpawnExceptionTable, canonical_creature_type};
pub use store::{MemoryStore, StoreError, WorldDocument, WorldStore};
