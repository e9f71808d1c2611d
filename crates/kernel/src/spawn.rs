//! Per-world, per-creature-type spawn overrides.
//!
//! Whether the table acts as a blacklist or a whitelist is decided by the
//! world's `preventSpawnsList` property, which the spawn simulation reads.
//! The table itself does not interpret rules.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// What a spawn exception does for its creature type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpawnBehavior {
    #[default]
    Deny,
    Allow,
}

/// A spawn override for one creature type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnException {
    creature_type: String,
    #[serde(default)]
    pub behavior: SpawnBehavior,
    /// Cap on concurrently spawned creatures of this type. `None` means no cap.
    #[serde(default)]
    pub limit: Option<u32>,
}

impl SpawnException {
    pub fn new(creature_type: &str, behavior: SpawnBehavior) -> Self {
        Self {
            creature_type: canonical_creature_type(creature_type),
            behavior,
            limit: None,
        }
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn creature_type(&self) -> &str {
        &self.creature_type
    }
}

/// Normalize a creature type: lowercase, trimmed, no `minecraft:` namespace,
/// spaces and dashes turned into underscores.
pub fn canonical_creature_type(raw: &str) -> String {
    let lower = raw.trim().to_ascii_lowercase();
    let bare = lower.strip_prefix("minecraft:").unwrap_or(&lower);
    bare.chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect()
}

/// Spawn exceptions keyed by canonical creature type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpawnExceptionTable {
    entries: BTreeMap<String, SpawnException>,
}

impl SpawnExceptionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite. Returns the rule that was replaced.
    pub fn upsert(&mut self, mut exception: SpawnException) -> Option<SpawnException> {
        exception.creature_type = canonical_creature_type(&exception.creature_type);
        self.entries
            .insert(exception.creature_type.clone(), exception)
    }

    /// Remove the rule for `creature_type`, if any.
    pub fn remove(&mut self, creature_type: &str) -> Option<SpawnException> {
        self.entries.remove(&canonical_creature_type(creature_type))
    }

    pub fn get(&self, creature_type: &str) -> Option<&SpawnException> {
        self.entries.get(&canonical_creature_type(creature_type))
    }

    pub fn contains(&self, creature_type: &str) -> bool {
        self.get(creature_type).is_some()
    }

    /// Snapshot ordered by creature type. Later mutations do not show up in it.
    pub fn list(&self) -> Vec<SpawnException> {
        self.entries.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<SpawnException> for SpawnExceptionTable {
    fn from_iter<I: IntoIterator<Item = SpawnException>>(iter: I) -> Self {
        let mut table = Self::new();
        for exception in iter {
            table.upsert(exception);
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_forms() {
        assert_eq!(canonical_creature_type(" Zombie "), "zombie");
        assert_eq!(canonical_creature_type("minecraft:cave_spider"), "cave_spider");
        assert_eq!(canonical_creature_type("Cave Spider"), "cave_spider");
        assert_eq!(canonical_creature_type("ender-dragon"), "ender_dragon");
    }

    #[test]
    fn upsert_overwrites_same_type() {
        let mut table = SpawnExceptionTable::new();
        assert!(table.upsert(SpawnException::new("zombie", SpawnBehavior::Deny)).is_none());
        let previous = table
            .upsert(SpawnException::new("ZOMBIE", SpawnBehavior::Allow).with_limit(5))
            .unwrap();
        assert_eq!(previous.behavior, SpawnBehavior::Deny);
        assert_eq!(table.len(), 1);
        let current = table.get("zombie").unwrap();
        assert_eq!(current.behavior, SpawnBehavior::Allow);
        assert_eq!(current.limit, Some(5));
    }

    #[test]
    fn remove_absent_is_none() {
        let mut table = SpawnExceptionTable::new();
        table.upsert(SpawnException::new("creeper", SpawnBehavior::Deny));
        assert!(table.remove("skeleton").is_none());
        assert_eq!(table.len(), 1);
        assert!(table.remove("Creeper").is_some());
        assert!(table.is_empty());
    }

    #[test]
    fn list_is_a_sorted_snapshot() {
        let mut table: SpawnExceptionTable = ["zombie", "bat", "pig"]
            .into_iter()
            .map(|c| SpawnException::new(c, SpawnBehavior::Deny))
            .collect();
        let snapshot = table.list();
        table.remove("bat");
        let names: Vec<_> = snapshot.iter().map(|e| e.creature_type()).collect();
        assert_eq!(names, vec!["bat", "pig", "zombie"]);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn deserialized_entries_are_recanonicalized() {
        let raw: SpawnException =
            serde_json::from_str(r#"{"creature_type":"Minecraft:Wither Skeleton"}"#).unwrap();
        let table: SpawnExceptionTable = std::iter::once(raw).collect();
        assert!(table.contains("wither_skeleton"));
        assert_eq!(table.list()[0].behavior, SpawnBehavior::Deny);
    }
}
