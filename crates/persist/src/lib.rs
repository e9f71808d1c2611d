//! Persistence: JSON world documents with a schema version and a sha256
//! integrity manifest.
//!
//! # Invariants
//! - A store written with another schema version is never opened.
//! - A world file whose hash disagrees with the manifest is never read.
//! - Writes replace files atomically, and the manifest always accepts the
//!   file on disk, even after a crash mid-save.

pub mod store;

pub use store::{IntegrityEntry, IntegrityManifest, JsonWorldStore, SCHEMA_VERSION, StoreMeta};
