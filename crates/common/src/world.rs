//! Enumerations describing a world's shape and rules.
//!
//! Every enum has a canonical lowercase name used in property bags and on
//! disk. Parsing is case-insensitive.

use serde::{Deserialize, Serialize};

/// Errors from parsing world enums and coordinates out of text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("unknown {kind} '{input}' (expected one of: {expected})")]
    UnknownVariant {
        kind: &'static str,
        input: String,
        expected: String,
    },
    #[error("invalid {kind} '{input}'")]
    InvalidValue { kind: &'static str, input: String },
}

macro_rules! named_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $kind:literal $(, levels = $levels:literal)? {
            $( $(#[$vmeta:meta])* $variant:ident => $text:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "lowercase")]
        pub enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Canonical names, in declaration order.
            pub const NAMES: &'static [&'static str] = &[$($text),+];

            /// Canonical lowercase name.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }

            fn from_name(s: &str) -> Option<Self> {
                let lower = s.trim().to_ascii_lowercase();
                match lower.as_str() {
                    $($text => Some($name::$variant),)+
                    _ => None,
                }
            }

            fn unknown(s: &str) -> ParseError {
                ParseError::UnknownVariant {
                    kind: $kind,
                    input: s.to_string(),
                    expected: Self::NAMES.join(", "),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = ParseError;

            /// With `levels = true`, the variant's position is accepted too.
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let by_level = false $(|| $levels)?;
                if by_level {
                    if let Ok(level) = s.trim().parse::<usize>() {
                        return Self::ALL.get(level).copied().ok_or_else(|| Self::unknown(s));
                    }
                }
                Self::from_name(s).ok_or_else(|| Self::unknown(s))
            }
        }
    };
}

named_enum! {
    /// Whether a world's simulation is active.
    LoadState, "load state" {
        #[default]
        Unloaded => "unloaded",
        Loaded => "loaded",
    }
}

named_enum! {
    /// Terrain shape chosen at creation. This is not the generator.
    WorldType, "world type" {
        #[default]
        Normal => "normal",
        Flat => "flat",
        /// Terrain produced by the legacy 1.1 generator.
        Versioned => "versioned",
    }
}

named_enum! {
    /// Dimension the world simulates.
    Environment, "environment" {
        #[default]
        Normal => "normal",
        Nether => "nether",
        End => "end",
    }
}

named_enum! {
    /// Parses from a name or a numeric level `0..=3`.
    Difficulty, "difficulty", levels = true {
        Peaceful => "peaceful",
        #[default]
        Easy => "easy",
        Normal => "normal",
        Hard => "hard",
    }
}

named_enum! {
    GameMode, "game mode" {
        #[default]
        Survival => "survival",
        Creative => "creative",
        Adventure => "adventure",
        Spectator => "spectator",
    }
}

named_enum! {
    /// Which portal kinds players may construct in a world.
    PortalType, "portal type" {
        #[default]
        All => "all",
        None => "none",
        Nether => "nether",
        End => "end",
    }
}
