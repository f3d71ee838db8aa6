//! The directions provider: legs and turn-by-turn instructions.
//!
//! Treated as a black box returning immutable data.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use uuid::Uuid;

use crate::model::{Coordinates, Leg, Stop};

#[derive(Debug, thiserror::Error)]
pub enum DirectionsError {
    #[error("no directions to stop {0}")]
    NoRoute(Uuid),

    #[error("directions provider unavailable: {0}")]
    Unavailable(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub trait DirectionsProvider {
    /// Directions from `origin` (or the provider's idea of the driver's
    /// position, when unknown) to `stop`.
    fn directions(
        &mut self,
        origin: Option<Coordinates>,
        stop: &Stop,
    ) -> Result<Leg, DirectionsError>;
}

/// Pre-computed legs keyed by stop id.
#[derive(Debug, Clone, Default)]
pub struct StaticDirections {
    legs: HashMap<Uuid, Leg>,
}

impl StaticDirections {
    pub fn new(legs: HashMap<Uuid, Leg>) -> Self {
        Self { legs }
    }

    /// Load legs from a JSON object mapping stop id to leg.
    pub fn from_file(path: &Path) -> Result<Self, DirectionsError> {
        let json = fs::read_to_string(path)?;
        Ok(Self::new(serde_json::from_str(&json)?))
    }
}

impl DirectionsProvider for StaticDirections {
    fn directions(
        &mut self,
        _origin: Option<Coordinates>,
        stop: &Stop,
    ) -> Result<Leg, DirectionsError> {
        self.legs
            .get(&stop.id)
            .cloned()
            .ok_or(DirectionsError::NoRoute(stop.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    use crate::model::Maneuver;
    use crate::testing::{instruction, sample_route};

    #[test]
    fn serves_known_legs_only() {
        let route = sample_route(2);
        let leg = Leg {
            polyline: vec![],
            instructions: vec![instruction("Arrive", Maneuver::Arrive, 0.0, 0.0)],
        };
        let mut directions =
            StaticDirections::new(HashMap::from([(route.stops[0].id, leg.clone())]));

        assert_eq!(directions.directions(None, &route.stops[0]).unwrap(), leg);
        assert!(matches!(
            directions.directions(None, &route.stops[1]),
            Err(DirectionsError::NoRoute(_))
        ));
    }

    #[test]
    fn loads_legs_from_file() {
        let route = sample_route(1);
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("legs.json");
        let legs = HashMap::from([(route.stops[0].id, Leg::default())]);
        fs::write(&path, serde_json::to_string(&legs).unwrap()).unwrap();

        let mut directions = StaticDirections::from_file(&path).unwrap();
        assert!(directions.directions(None, &route.stops[0]).is_ok());
    }
}
