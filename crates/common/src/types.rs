use glam::DVec3;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Engine-assigned identity of a world. Never changes after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorldUid(pub Uuid);

impl WorldUid {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WorldUid {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WorldUid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Handle to a connected player, as reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayerHandle {
    pub id: Uuid,
    pub name: String,
}

impl PlayerHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
        }
    }
}

/// A position plus facing direction, used for world spawn points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FacingCoordinates {
    pub position: DVec3,
    pub pitch: f32,
    pub yaw: f32,
}

impl FacingCoordinates {
    pub fn new(x: f64, y: f64, z: f64, pitch: f32, yaw: f32) -> Self {
        Self {
            position: DVec3::new(x, y, z),
            pitch,
            yaw,
        }
    }

    /// All components are finite numbers.
    pub fn is_finite(&self) -> bool {
        self.position.is_finite() && self.pitch.is_finite() && self.yaw.is_finite()
    }
}

impl Default for FacingCoordinates {
    fn default() -> Self {
        Self::new(0.0, 64.0, 0.0, 0.0, 0.0)
    }
}

impl std::fmt::Display for FacingCoordinates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:.2},{:.2},{:.2}:{:.1}:{:.1}",
            self.position.x, self.position.y, self.position.z, self.pitch, self.yaw
        )
    }
}

impl std::str::FromStr for FacingCoordinates {
    type Err = crate::ParseError;

    /// Parses `x,y,z` or `x,y,z:pitch:yaw`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || crate::ParseError::InvalidValue {
            kind: "location",
            input: s.to_string(),
        };
        let mut parts = s.trim().split(':');
        let coords = parts.next().ok_or_else(invalid)?;
        let xyz: Vec<f64> = coords
            .split(',')
            .map(|c| c.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .map_err(|_| invalid())?;
        if xyz.len() != 3 {
            return Err(invalid());
        }
        let pitch = match parts.next() {
            Some(p) => p.trim().parse::<f32>().map_err(|_| invalid())?,
            None => 0.0,
        };
        let yaw = match parts.next() {
            Some(y) => y.trim().parse::<f32>().map_err(|_| invalid())?,
            None => 0.0,
        };
        if parts.next().is_some() {
            return Err(invalid());
        }
        Ok(Self::new(xyz[0], xyz[1], xyz[2], pitch, yaw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn world_uid_uniqueness() {
        let a = WorldUid::new();
        let b = WorldUid::new();
        assert_ne!(a, b);
    }

    #[test]
    fn default_spawn_is_above_origin() {
        let c = FacingCoordinates::default();
        assert_eq!(c.position, DVec3::new(0.0, 64.0, 0.0));
        assert!(c.is_finite());
    }

    #[test]
    fn parse_coordinates_with_and_without_facing() {
        let plain: FacingCoordinates = "10, 70.5, -3".parse().unwrap();
        assert_eq!(plain.position, DVec3::new(10.0, 70.5, -3.0));
        assert_eq!(plain.yaw, 0.0);

        let facing: FacingCoordinates = "1,2,3:15:90".parse().unwrap();
        assert_eq!(facing.pitch, 15.0);
        assert_eq!(facing.yaw, 90.0);
    }

    #[test]
    fn parse_coordinates_rejects_garbage() {
        assert!("1,2".parse::<FacingCoordinates>().is_err());
        assert!("a,b,c".parse::<FacingCoordinates>().is_err());
        assert!("1,2,3:4:5:6".parse::<FacingCoordinates>().is_err());
    }

    #[test]
    fn non_finite_coordinates_detected() {
        let c = FacingCoordinates::new(f64::NAN, 0.0, 0.0, 0.0, 0.0);
        assert!(!c.is_finite());
    }
}
