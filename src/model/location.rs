//! Position samples from the geolocation provider.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};

use super::Coordinates;

/// A single fix from the position source.
///
/// `accuracy_m` is the provider's reported horizontal accuracy radius;
/// larger means worse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    pub lat: f64,
    pub lng: f64,
    pub timestamp: Timestamp,
    pub accuracy_m: f64,
}

impl LocationSample {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates {
            lat: self.lat,
            lng: self.lng,
        }
    }
}
