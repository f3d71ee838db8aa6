//! Routes and stops: the assigned work for a shift.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A WGS84 coordinate pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

/// An ordered sequence of stops assigned to one driver for one shift.
///
/// The order is produced upstream; this crate only tracks progress through it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub id: Uuid,
    pub name: String,
    pub stops: Vec<Stop>,
    pub status: RouteStatus,
    /// Total planned distance in meters.
    pub total_distance_m: f64,
    /// Total planned time in seconds.
    pub estimated_time_s: u64,
    /// Opaque score from the upstream optimizer.
    #[serde(default)]
    pub optimization_score: Option<f64>,
}

/// Where a route stands in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteStatus {
    Pending,
    Active,
    Completed,
    Cancelled,
}

/// One delivery within a route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stop {
    pub id: Uuid,
    pub tracking_number: String,
    pub destination: Destination,
    #[serde(default)]
    pub items: Vec<Item>,
    pub status: StopStatus,
    #[serde(default)]
    pub requires_signature: bool,
    /// Amount to collect on delivery, if any.
    #[serde(default)]
    pub cash_on_delivery: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Destination {
    pub address: String,
    pub coordinates: Coordinates,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub description: String,
    pub quantity: u32,
}

/// Where a stop stands in its lifecycle.
///
/// `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum StopStatus {
    Pending,
    EnRoute,
    Arrived,
    Completed,
    Failed {
        /// Why the delivery did not happen.
        reason: String,
    },
}

impl StopStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed { .. })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::EnRoute => "en_route",
            Self::Arrived => "arrived",
            Self::Completed => "completed",
            Self::Failed { .. } => "failed",
        }
    }
}

impl RouteStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

impl Route {
    pub fn stop(&self, id: Uuid) -> Option<&Stop> {
        self.stops.iter().find(|s| s.id == id)
    }
}
