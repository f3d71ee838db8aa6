//! Turn-by-turn data as received from the directions provider.
//!
//! These values are immutable once received; the navigation engine only
//! derives a cursor over them.

use serde::{Deserialize, Serialize};

use super::Coordinates;

/// A single turn-by-turn instruction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationInstruction {
    /// Human-readable instruction text.
    pub text: String,
    /// Length of this step in meters.
    pub distance_m: f64,
    /// Expected travel time for this step in seconds.
    pub duration_s: f64,
    pub maneuver: Maneuver,
    /// Where the maneuver happens.
    pub coordinates: Coordinates,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Maneuver {
    Depart,
    Straight,
    SlightLeft,
    Left,
    SharpLeft,
    SlightRight,
    Right,
    SharpRight,
    UTurn,
    Roundabout,
    Arrive,
}

/// One leg of a route: from the driver's position to a single stop.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Leg {
    #[serde(default)]
    pub polyline: Vec<Coordinates>,
    pub instructions: Vec<NavigationInstruction>,
}
