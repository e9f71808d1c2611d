//! Boundary to the host game engine and the player-session layer.
//!
//! The manager never assumes how these are implemented. Every call is treated
//! as blocking and possibly slow, so [`call_bounded`] runs it on a helper
//! thread and gives up after the configured timeout.

use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;
use multiworld_common::{Environment, PlayerHandle, WorldType, WorldUid};

use crate::error::WorldError;
use crate::property::PropertyValue;

/// Failure reported by the engine or the session layer.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("world files for '{0}' are missing")]
    MissingFiles(String),
    #[error("world data is corrupt: {0}")]
    Corrupt(String),
    #[error("engine rejected the request: {0}")]
    Rejected(String),
    #[error("engine IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("engine call ended without a reply")]
    NoReply,
}

/// Physical operations the manager asks the engine to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineOp {
    Import,
    Create,
    Load,
    Unload,
    ListPlayers,
    Evacuate,
    ApplyProperty,
    DeleteFiles,
}

impl std::fmt::Display for EngineOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Import => "import",
            Self::Create => "create",
            Self::Load => "load",
            Self::Unload => "unload",
            Self::ListPlayers => "list players in",
            Self::Evacuate => "evacuate",
            Self::ApplyProperty => "apply a property to",
            Self::DeleteFiles => "delete files of",
        })
    }
}

/// Settings the engine needs to bind, generate or load a world.
#[derive(Debug, Clone, PartialEq)]
pub struct WorldSpec {
    pub name: String,
    pub environment: Environment,
    pub world_type: WorldType,
    /// `None` lets the engine pick a seed.
    pub seed: Option<i64>,
    pub generator: Option<String>,
}

impl WorldSpec {
    pub fn new(name: impl Into<String>, environment: Environment, world_type: WorldType) -> Self {
        Self {
            name: name.into(),
            environment,
            world_type,
            seed: None,
            generator: None,
        }
    }
}

/// What the engine reports back after binding or generating a world.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineWorld {
    pub uid: WorldUid,
    pub seed: i64,
}

/// The host game-server runtime.
pub trait WorldEngine: Send + Sync + 'static {
    /// Bind a world that already exists on disk.
    fn import_existing(&self, spec: &WorldSpec) -> Result<EngineWorld, EngineError>;

    /// Generate a brand-new world.
    fn create(&self, spec: &WorldSpec) -> Result<EngineWorld, EngineError>;

    /// Bring a registered world into memory. `spec` carries the current
    /// values of every next-load property.
    fn load_physical(&self, spec: &WorldSpec) -> Result<(), EngineError>;

    fn unload_physical(&self, name: &str) -> Result<(), EngineError>;

    fn list_players_in(&self, name: &str) -> Vec<PlayerHandle>;

    /// Push an immediately-effective property change to a loaded world.
    fn apply_property(
        &self,
        _name: &str,
        _key: &str,
        _value: &PropertyValue,
    ) -> Result<(), EngineError> {
        Ok(())
    }

    /// Delete the world's data from disk.
    fn delete_files(&self, name: &str) -> Result<(), EngineError>;
}

/// Moves players between worlds.
pub trait PlayerSessions: Send + Sync + 'static {
    /// Send every listed player out of `world`, to `destination` when the
    /// manager knows a loaded world to use.
    fn evacuate(
        &self,
        world: &str,
        destination: Option<&str>,
        players: &[PlayerHandle],
    ) -> Result<(), EngineError>;
}

/// Run `call` and wait at most `timeout` for it. `None` runs it inline.
///
/// The outer error is the timeout (or a lost reply); the inner result is the
/// engine's own answer. A call that outlives its caller keeps running and its
/// late result is logged and dropped.
pub(crate) fn call_bounded<T, F>(
    timeout: Option<Duration>,
    world: &str,
    operation: EngineOp,
    call: F,
) -> Result<Result<T, EngineError>, WorldError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, EngineError> + Send + 'static,
{
    let Some(timeout) = timeout else {
        return Ok(call());
    };

    let (tx, rx) = crossbeam_channel::bounded(1);
    let late_world = world.to_string();
    let spawned = std::thread::Builder::new()
        .name(format!("engine-{late_world}"))
        .spawn(move || {
            let outcome = call();
            if tx.send(outcome).is_err() {
                tracing::warn!(
                    world = %late_world,
                    %operation,
                    "engine call completed after its caller gave up"
                );
            }
        });
    if let Err(e) = spawned {
        return Ok(Err(EngineError::Io(e)));
    }

    match rx.recv_timeout(timeout) {
        Ok(outcome) => Ok(outcome),
        Err(RecvTimeoutError::Timeout) => Err(WorldError::EngineTimeout {
            world: world.to_string(),
            operation,
            timeout,
        }),
        Err(RecvTimeoutError::Disconnected) => Ok(Err(EngineError::NoReply)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_call_without_timeout() {
        let out = call_bounded(None, "w", EngineOp::Load, || Ok::<_, EngineError>(7)).unwrap();
        assert_eq!(out.unwrap(), 7);
    }

    #[test]
    fn bounded_call_returns_engine_answer() {
        let out = call_bounded(Some(Duration::from_secs(5)), "w", EngineOp::Load, || {
            Err::<(), _>(EngineError::Rejected("nope".into()))
        })
        .unwrap();
        assert!(matches!(out, Err(EngineError::Rejected(_))));
    }

    #[test]
    fn slow_call_times_out() {
        let result = call_bounded(Some(Duration::from_millis(20)), "w", EngineOp::Unload, || {
            std::thread::sleep(Duration::from_millis(500));
            Ok::<_, EngineError>(())
        });
        match result {
            Err(WorldError::EngineTimeout { operation, .. }) => {
                assert_eq!(operation, EngineOp::Unload)
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[test]
    fn panicking_call_reports_no_reply() {
        let out = call_bounded(Some(Duration::from_secs(5)), "w", EngineOp::Load, || {
            if true {
                panic!("engine crashed");
            }
            Ok::<(), EngineError>(())
        })
        .unwrap();
        assert!(matches!(out, Err(EngineError::NoReply)));
    }
}
