//! Core data model for the dispatch session.
//!
//! Plain serde types shared by every component: drivers, routes and their
//! stops, navigation instructions, location samples, and delivery proof.

mod driver;
mod location;
mod navigation;
mod proof;
mod route;

pub use driver::{Driver, OnlineStatus, VehicleType};
pub use location::LocationSample;
pub use navigation::{Leg, Maneuver, NavigationInstruction};
pub use proof::{DeliveryProof, ProofField};
pub use route::{Coordinates, Destination, Item, Route, RouteStatus, Stop, StopStatus};
