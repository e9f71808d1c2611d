//! Shared types for the multiworld crates.

mod types;
mod world;

pub use types::{FacingCoordinates, PlayerHandle, WorldUid};
pub use world::{Difficulty, Environment, GameMode, LoadState, ParseError, PortalType, WorldType};
