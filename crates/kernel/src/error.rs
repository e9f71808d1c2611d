use std::time::Duration;

use crate::engine::{EngineError, EngineOp};
use crate::store::StoreError;

/// What a [`WorldError::NotFound`] failed to find.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotFoundKind {
    Property,
    CreatureType,
}

impl std::fmt::Display for NotFoundKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Property => f.write_str("property"),
            Self::CreatureType => f.write_str("spawn exception"),
        }
    }
}

/// Stable tag for each [`WorldError`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    UnknownWorld,
    WorldAlreadyExists,
    WorldAlreadyLoaded,
    WorldAlreadyUnloaded,
    WorldStillLoaded,
    Import,
    EngineOperation,
    EngineTimeout,
    EngineRejected,
    Evacuation,
    Validation,
    TypeMismatch,
    NotFound,
    Persistence,
}

/// Every recoverable failure raised by the world manager, world records and
/// the property registry.
///
/// Variants carry the world name plus whatever context the caller needs to
/// render a localized message; the `Display` output is for logs only.
#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    #[error("world '{world}' is not registered")]
    UnknownWorld { world: String },

    #[error("world '{world}' already exists")]
    WorldAlreadyExists { world: String },

    #[error("world '{world}' is already loaded")]
    WorldAlreadyLoaded { world: String },

    #[error("world '{world}' is already unloaded")]
    WorldAlreadyUnloaded { world: String },

    #[error("world '{world}' is still loaded")]
    WorldStillLoaded { world: String },

    #[error("failed to import world '{world}': {source}")]
    Import {
        world: String,
        #[source]
        source: EngineError,
    },

    #[error("engine failed to {operation} world '{world}': {source}")]
    EngineOperation {
        world: String,
        operation: EngineOp,
        #[source]
        source: EngineError,
    },

    #[error("engine did not {operation} world '{world}' within {timeout:?}")]
    EngineTimeout {
        world: String,
        operation: EngineOp,
        timeout: Duration,
    },

    #[error("engine rejected {key}={value} for world '{world}': {source}")]
    EngineRejected {
        world: String,
        key: String,
        value: String,
        #[source]
        source: EngineError,
    },

    #[error("could not evacuate players from world '{world}': {reason}")]
    Evacuation { world: String, reason: String },

    #[error("invalid value '{value}' for {key} on world '{world}': {reason}")]
    Validation {
        world: String,
        key: String,
        value: String,
        reason: String,
    },

    #[error("{key} on world '{world}' expects {expected}, got {found}")]
    TypeMismatch {
        world: String,
        key: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("{kind} '{name}' not found on world '{world}'")]
    NotFound {
        world: String,
        kind: NotFoundKind,
        name: String,
    },

    #[error("persistence failed for world '{world}': {source}")]
    Persistence {
        world: String,
        #[source]
        source: StoreError,
    },
}

impl WorldError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnknownWorld { .. } => ErrorKind::UnknownWorld,
            Self::WorldAlreadyExists { .. } => ErrorKind::WorldAlreadyExists,
            Self::WorldAlreadyLoaded { .. } => ErrorKind::WorldAlreadyLoaded,
            Self::WorldAlreadyUnloaded { .. } => ErrorKind::WorldAlreadyUnloaded,
            Self::WorldStillLoaded { .. } => ErrorKind::WorldStillLoaded,
            Self::Import { .. } => ErrorKind::Import,
            Self::EngineOperation { .. } => ErrorKind::EngineOperation,
            Self::EngineTimeout { .. } => ErrorKind::EngineTimeout,
            Self::EngineRejected { .. } => ErrorKind::EngineRejected,
            Self::Evacuation { .. } => ErrorKind::Evacuation,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Persistence { .. } => ErrorKind::Persistence,
        }
    }

    /// Localization key for the player-facing message.
    pub fn message_key(&self) -> &'static str {
        match self.kind() {
            ErrorKind::UnknownWorld => "error.unknown_world",
            ErrorKind::WorldAlreadyExists => "error.world_already_exists",
            ErrorKind::WorldAlreadyLoaded => "error.world_already_loaded",
            ErrorKind::WorldAlreadyUnloaded => "error.world_already_unloaded",
            ErrorKind::WorldStillLoaded => "error.world_still_loaded",
            ErrorKind::Import => "error.import_failed",
            ErrorKind::EngineOperation => "error.engine_failed",
            ErrorKind::EngineTimeout => "error.engine_timeout",
            ErrorKind::EngineRejected => "error.engine_rejected",
            ErrorKind::Evacuation => "error.evacuation_failed",
            ErrorKind::Validation => "error.invalid_value",
            ErrorKind::TypeMismatch => "error.type_mismatch",
            ErrorKind::NotFound => "error.not_found",
            ErrorKind::Persistence => "error.persistence_failed",
        }
    }

    /// Name of the world the failure concerns.
    pub fn world(&self) -> &str {
        match self {
            Self::UnknownWorld { world }
            | Self::WorldAlreadyExists { world }
            | Self::WorldAlreadyLoaded { world }
            | Self::WorldAlreadyUnloaded { world }
            | Self::WorldStillLoaded { world }
            | Self::Import { world, .. }
            | Self::EngineOperation { world, .. }
            | Self::EngineTimeout { world, .. }
            | Self::EngineRejected { world, .. }
            | Self::Evacuation { world, .. }
            | Self::Validation { world, .. }
            | Self::TypeMismatch { world, .. }
            | Self::NotFound { world, .. }
            | Self::Persistence { world, .. } => world,
        }
    }

    /// Precondition violations of the lifecycle state machine.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::UnknownWorld
                | ErrorKind::WorldAlreadyExists
                | ErrorKind::WorldAlreadyLoaded
                | ErrorKind::WorldAlreadyUnloaded
                | ErrorKind::WorldStillLoaded
        )
    }

    pub(crate) fn unknown(world: &str) -> Self {
        Self::UnknownWorld {
            world: world.to_string(),
        }
    }

    pub(crate) fn validation(world: &str, key: &str, value: impl ToString, reason: &str) -> Self {
        Self::Validation {
            world: world.to_string(),
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}
