//! Driver identity and connectivity.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The driver working a shift.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Driver {
    pub id: Uuid,
    pub name: String,
    pub vehicle_type: VehicleType,
    pub license_plate: String,
    pub online_status: OnlineStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleType {
    Bicycle,
    Motorcycle,
    Car,
    Van,
    Truck,
}

/// Whether the driver accepts new assignments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnlineStatus {
    #[default]
    Offline,
    Online,
}

impl OnlineStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Offline => "offline",
            Self::Online => "online",
        }
    }
}

impl VehicleType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bicycle => "bicycle",
            Self::Motorcycle => "motorcycle",
            Self::Car => "car",
            Self::Van => "van",
            Self::Truck => "truck",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "bicycle" => Some(Self::Bicycle),
            "motorcycle" => Some(Self::Motorcycle),
            "car" => Some(Self::Car),
            "van" => Some(Self::Van),
            "truck" => Some(Self::Truck),
            _ => None,
        }
    }
}
