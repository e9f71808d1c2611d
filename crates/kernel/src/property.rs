//! Schema-driven world properties.
//!
//! The [`PropertyRegistry`] is built once per process and lists every
//! settable world attribute with its kind, default, validator and when a new
//! value takes effect. A [`PropertyBag`] holds one world's values, aligned
//! with the registry's order.
//!
//! # Invariants
//! - Each key maps to exactly one [`PropertyKind`].
//! - Typed writes of the wrong kind, or values failing the validator, are
//!   rejected and never coerced.
//! - Only [`PropertyRegistry::parse`] turns text into values.

use std::collections::HashMap;
use std::sync::LazyLock;

use multiworld_common::{Difficulty, Environment, FacingCoordinates, GameMode, PortalType};
use serde_json::Value;

use crate::error::WorldError;
use crate::time;

/// A typed property value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Bool(bool),
    Int(i32),
    Long(i64),
    Double(f64),
    Text(String),
    /// Canonical lowercase variant name.
    Enum(String),
    Location(FacingCoordinates),
}

impl PropertyValue {
    /// Name of the value's kind, as used in type-mismatch errors.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Long(_) => "long",
            Self::Double(_) => "double",
            Self::Text(_) => "string",
            Self::Enum(_) => "enum",
            Self::Location(_) => "location",
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            Self::Long(l) => Some(*l),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            Self::Double(d) => Some(*d),
            _ => None,
        }
    }

    /// Text for `Text` and `Enum` values.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) | Self::Enum(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_location(&self) -> Option<FacingCoordinates> {
        match self {
            Self::Location(c) => Some(*c),
            _ => None,
        }
    }

    /// Encode for a persisted world document.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Bool(b) => Value::from(*b),
            Self::Int(i) => Value::from(*i),
            Self::Long(l) => Value::from(*l),
            Self::Double(d) => Value::from(*d),
            Self::Text(s) | Self::Enum(s) => Value::from(s.as_str()),
            Self::Location(c) => serde_json::to_value(c).unwrap_or(Value::Null),
        }
    }
}

impl std::fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Long(l) => write!(f, "{l}"),
            Self::Double(d) => write!(f, "{d}"),
            Self::Text(s) | Self::Enum(s) => f.write_str(s),
            Self::Location(c) => write!(f, "{c}"),
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for PropertyValue {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        Self::Long(v)
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<FacingCoordinates> for PropertyValue {
    fn from(v: FacingCoordinates) -> Self {
        Self::Location(v)
    }
}

macro_rules! enum_values {
    ($($ty:ty),+) => {
        $(
            impl From<$ty> for PropertyValue {
                fn from(v: $ty) -> Self {
                    Self::Enum(v.as_str().to_string())
                }
            }
        )+
    };
}

enum_values!(Difficulty, GameMode, PortalType, Environment);

/// The declared type of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    Bool,
    Int,
    Long,
    Double,
    Text,
    /// Enumeration with the given canonical variant names.
    Enum(&'static [&'static str]),
    Location,
}

impl PropertyKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Long => "long",
            Self::Double => "double",
            Self::Text => "string",
            Self::Enum(_) => "enum",
            Self::Location => "location",
        }
    }

    fn accepts(&self, value: &PropertyValue) -> bool {
        matches!(
            (self, value),
            (Self::Bool, PropertyValue::Bool(_))
                | (Self::Int, PropertyValue::Int(_))
                | (Self::Long, PropertyValue::Long(_))
                | (Self::Double, PropertyValue::Double(_))
                | (Self::Text, PropertyValue::Text(_))
                | (Self::Enum(_), PropertyValue::Enum(_))
                | (Self::Location, PropertyValue::Location(_))
        )
    }

    /// Decode a persisted value. `None` when the JSON does not fit the kind.
    pub fn from_json(&self, value: &Value) -> Option<PropertyValue> {
        match self {
            Self::Bool => value.as_bool().map(PropertyValue::Bool),
            Self::Int => value
                .as_i64()
                .and_then(|i| i32::try_from(i).ok())
                .map(PropertyValue::Int),
            Self::Long => value.as_i64().map(PropertyValue::Long),
            Self::Double => value.as_f64().map(PropertyValue::Double),
            Self::Text => value.as_str().map(|s| PropertyValue::Text(s.to_string())),
            Self::Enum(names) => value
                .as_str()
                .map(str::to_ascii_lowercase)
                .filter(|s| names.contains(&s.as_str()))
                .map(PropertyValue::Enum),
            Self::Location => serde_json::from_value(value.clone())
                .ok()
                .map(PropertyValue::Location),
        }
    }
}

/// When a new value reaches the running world.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectiveOn {
    Immediate,
    /// Stored right away, applied the next time the world loads.
    NextLoad,
}

type Validator = fn(&PropertyValue) -> Result<(), &'static str>;

/// One schema entry.
#[derive(Debug, Clone)]
pub struct PropertyDef {
    pub key: &'static str,
    pub kind: PropertyKind,
    pub default: PropertyValue,
    pub effective_on: EffectiveOn,
    pub description: &'static str,
    validator: Validator,
}

impl PropertyDef {
    fn new(key: &'static str, default: impl Into<PropertyValue>, kind: PropertyKind) -> Self {
        Self {
            key,
            kind,
            default: default.into(),
            effective_on: EffectiveOn::Immediate,
            description: "",
            validator: |_| Ok(()),
        }
    }

    fn next_load(mut self) -> Self {
        self.effective_on = EffectiveOn::NextLoad;
        self
    }

    fn validate_with(mut self, validator: Validator) -> Self {
        self.validator = validator;
        self
    }

    fn about(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    /// Kind check, enum membership, then the entry's own validator.
    fn check(&self, value: &PropertyValue) -> Result<(), &'static str> {
        if let (PropertyKind::Enum(names), PropertyValue::Enum(v)) = (self.kind, value) {
            if !names.contains(&v.as_str()) {
                return Err("not a known variant");
            }
        }
        (self.validator)(value)
    }
}

/// A world's property values, aligned with [`PropertyRegistry`] order.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyBag {
    values: Vec<PropertyValue>,
}

impl PropertyBag {
    pub(crate) fn get(&self, index: usize) -> &PropertyValue {
        &self.values[index]
    }

    pub(crate) fn replace(&mut self, index: usize, value: PropertyValue) -> PropertyValue {
        std::mem::replace(&mut self.values[index], value)
    }

    /// `(key, value)` pairs in registry order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &PropertyValue)> {
        PropertyRegistry::global()
            .defs
            .iter()
            .zip(&self.values)
            .map(|(def, value)| (def.key, value))
    }
}

/// Process-wide property schema.
#[derive(Debug)]
pub struct PropertyRegistry {
    defs: Vec<PropertyDef>,
    /// Lowercased key to slot.
    index: HashMap<String, usize>,
}

static REGISTRY: LazyLock<PropertyRegistry> = LazyLock::new(PropertyRegistry::standard);

fn positive(v: &PropertyValue) -> Result<(), &'static str> {
    match v.as_double() {
        Some(d) if d.is_finite() && d > 0.0 => Ok(()),
        _ => Err("must be a number greater than zero"),
    }
}

fn finite(v: &PropertyValue) -> Result<(), &'static str> {
    match v.as_double() {
        Some(d) if d.is_finite() => Ok(()),
        _ => Err("must be a finite number"),
    }
}

fn at_least_minus_one(v: &PropertyValue) -> Result<(), &'static str> {
    match v.as_int() {
        Some(i) if i >= -1 => Ok(()),
        _ => Err("must be -1 or greater"),
    }
}

fn non_negative_ticks(v: &PropertyValue) -> Result<(), &'static str> {
    match v.as_long() {
        Some(t) if t >= 0 => Ok(()),
        _ => Err("must not be negative"),
    }
}

fn time_of_day(v: &PropertyValue) -> Result<(), &'static str> {
    match v.as_long() {
        Some(t) if (0..time::TICKS_PER_DAY).contains(&t) => Ok(()),
        _ => Err("must be between 0 and 23999"),
    }
}

fn finite_location(v: &PropertyValue) -> Result<(), &'static str> {
    match v.as_location() {
        Some(c) if c.is_finite() => Ok(()),
        _ => Err("coordinates must be finite"),
    }
}

impl PropertyRegistry {
    /// The shared schema.
    pub fn global() -> &'static PropertyRegistry {
        &REGISTRY
    }

    fn standard() -> Self {
        use PropertyKind::*;
        let defs = vec![
            PropertyDef::new("alias", "", Text).about("Display name; empty means the world name"),
            PropertyDef::new("environment", Environment::Normal, Enum(Environment::NAMES))
                .next_load()
                .about("Dimension simulated by the world"),
            PropertyDef::new("seed", 0i64, Long)
                .next_load()
                .about("Terrain seed"),
            PropertyDef::new("generator", "", Text)
                .next_load()
                .about("Custom generator id; empty means the default"),
            PropertyDef::new("difficulty", Difficulty::Easy, Enum(Difficulty::NAMES)),
            PropertyDef::new("gameMode", GameMode::Survival, Enum(GameMode::NAMES)),
            PropertyDef::new("pvp", true, Bool),
            PropertyDef::new("hidden", false, Bool)
                .about("Hide from world listings regardless of access"),
            PropertyDef::new("prefixChat", true, Bool)
                .about("Prefix chat with the world alias"),
            PropertyDef::new("allowWeather", true, Bool),
            PropertyDef::new("keepSpawnInMemory", true, Bool),
            PropertyDef::new("spawnLocation", FacingCoordinates::default(), Location)
                .validate_with(finite_location),
            PropertyDef::new("hunger", true, Bool),
            PropertyDef::new("price", 0.0, Double)
                .validate_with(finite)
                .about("Entry fee"),
            PropertyDef::new("currency", -1i32, Int)
                .validate_with(at_least_minus_one)
                .about("-1 for the economy currency, otherwise an item id"),
            PropertyDef::new("respawnWorld", "", Text)
                .about("World players respawn in after dying here"),
            PropertyDef::new("scale", 1.0, Double)
                .validate_with(positive)
                .about("Coordinate scaling relative to other worlds"),
            PropertyDef::new("autoHeal", true, Bool),
            PropertyDef::new("adjustSpawn", true, Bool),
            PropertyDef::new("autoLoad", true, Bool).about("Load when the server starts"),
            PropertyDef::new("bedRespawn", true, Bool),
            PropertyDef::new("playerLimit", -1i32, Int).about("-1 or less means no limit"),
            PropertyDef::new("time", 0i64, Long)
                .validate_with(time_of_day)
                .about("Time of day in ticks; 0 is 6:00am"),
            PropertyDef::new("portalForm", PortalType::All, Enum(PortalType::NAMES))
                .about("Portal kinds players may build"),
            PropertyDef::new("ticksPerAnimalSpawn", 400i64, Long)
                .validate_with(non_negative_ticks),
            PropertyDef::new("ticksPerMonsterSpawn", 1i64, Long)
                .validate_with(non_negative_ticks),
            PropertyDef::new("animalSpawnLimit", -1i32, Int).validate_with(at_least_minus_one),
            PropertyDef::new("monsterSpawnLimit", -1i32, Int).validate_with(at_least_minus_one),
            PropertyDef::new("ambientSpawnLimit", -1i32, Int).validate_with(at_least_minus_one),
            PropertyDef::new("waterAnimalSpawnLimit", -1i32, Int)
                .validate_with(at_least_minus_one),
            PropertyDef::new("preventSpawnsList", false, Bool)
                .about("Treat spawn exceptions as a blacklist instead of a whitelist"),
        ];
        let index = defs
            .iter()
            .enumerate()
            .map(|(i, d)| (d.key.to_ascii_lowercase(), i))
            .collect();
        Self { defs, index }
    }

    /// Every key, in schema order.
    pub fn property_names(&self) -> Vec<&'static str> {
        self.defs.iter().map(|d| d.key).collect()
    }

    /// Keys joined for help output.
    pub fn all_property_names(&self) -> String {
        self.property_names().join(", ")
    }

    pub fn describe(&self, key: &str) -> Option<&PropertyDef> {
        self.index_of(key).map(|i| &self.defs[i])
    }

    pub fn defs(&self) -> &[PropertyDef] {
        &self.defs
    }

    /// Keys match case-insensitively.
    pub(crate) fn index_of(&self, key: &str) -> Option<usize> {
        self.index.get(key.to_ascii_lowercase().as_str()).copied()
    }

    pub(crate) fn def_at(&self, index: usize) -> &PropertyDef {
        &self.defs[index]
    }

    /// A bag holding every default.
    pub fn defaults(&self) -> PropertyBag {
        PropertyBag {
            values: self.defs.iter().map(|d| d.default.clone()).collect(),
        }
    }

    /// Typed read.
    pub fn get<'a>(
        &self,
        world: &str,
        bag: &'a PropertyBag,
        key: &str,
    ) -> Result<&'a PropertyValue, WorldError> {
        let index = self.lookup(world, key)?;
        Ok(bag.get(index))
    }

    /// Validate a typed write and return the slot it goes to.
    pub fn check(
        &self,
        world: &str,
        key: &str,
        value: &PropertyValue,
    ) -> Result<usize, WorldError> {
        let index = self.lookup(world, key)?;
        let def = &self.defs[index];
        if !def.kind.accepts(value) {
            return Err(WorldError::TypeMismatch {
                world: world.to_string(),
                key: key.to_string(),
                expected: def.kind.name(),
                found: value.kind_name(),
            });
        }
        def.check(value)
            .map_err(|reason| WorldError::validation(world, key, value, reason))?;
        Ok(index)
    }

    /// Typed write into `bag`. Returns the previous value.
    pub fn set(
        &self,
        world: &str,
        bag: &mut PropertyBag,
        key: &str,
        value: PropertyValue,
    ) -> Result<PropertyValue, WorldError> {
        let index = self.check(world, key, &value)?;
        Ok(bag.replace(index, value))
    }

    /// Turn operator text into a value of the key's kind.
    ///
    /// Booleans accept `true/1/on/yes` and `false/0/off/no`; enums are
    /// case-insensitive (difficulty also takes `0..=3`); `time` takes any
    /// format understood by [`time::parse_time`]; locations take
    /// `x,y,z[:pitch:yaw]`. The result is not validated yet.
    pub fn parse(&self, world: &str, key: &str, text: &str) -> Result<PropertyValue, WorldError> {
        let index = self.lookup(world, key)?;
        let def = &self.defs[index];
        let trimmed = text.trim();
        let bad = |reason: &str| WorldError::validation(world, key, text, reason);
        let value = match def.kind {
            PropertyKind::Bool => PropertyValue::Bool(parse_bool(trimmed).ok_or_else(|| bad("not a boolean"))?),
            PropertyKind::Int => PropertyValue::Int(trimmed.parse().map_err(|_| bad("not an integer"))?),
            PropertyKind::Long if def.key == "time" => {
                PropertyValue::Long(time::parse_time(trimmed).ok_or_else(|| bad("not a time of day"))?)
            }
            PropertyKind::Long => PropertyValue::Long(trimmed.parse().map_err(|_| bad("not an integer"))?),
            PropertyKind::Double => PropertyValue::Double(trimmed.parse().map_err(|_| bad("not a number"))?),
            PropertyKind::Text => PropertyValue::Text(trimmed.to_string()),
            PropertyKind::Enum(_) if def.key == "difficulty" => trimmed
                .parse::<Difficulty>()
                .map(PropertyValue::from)
                .map_err(|e| bad(&e.to_string()))?,
            PropertyKind::Enum(names) => {
                let lower = trimmed.to_ascii_lowercase();
                if !names.contains(&lower.as_str()) {
                    return Err(bad(&format!("expected one of: {}", names.join(", "))));
                }
                PropertyValue::Enum(lower)
            }
            PropertyKind::Location => trimmed
                .parse::<FacingCoordinates>()
                .map(PropertyValue::Location)
                .map_err(|e| bad(&e.to_string()))?,
        };
        Ok(value)
    }

    fn lookup(&self, world: &str, key: &str) -> Result<usize, WorldError> {
        self.index_of(key).ok_or_else(|| WorldError::NotFound {
            world: world.to_string(),
            kind: crate::error::NotFoundKind::Property,
            name: key.to_string(),
        })
    }
}

/// Lenient boolean parsing for operator input.
pub fn parse_bool(text: &str) -> Option<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "on" | "yes" => Some(true),
        "false" | "0" | "off" | "no" => Some(false),
        _ => None,
    }
}
