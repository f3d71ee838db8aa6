//! Analytics events emitted to the external collaborator.
//!
//! The session only emits; batching, persistence, and transport are the
//! sink's business.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventName {
    RouteStarted,
    DeliveryCompleted,
    DeliveryFailed,
    NavigationRecalculated,
}

impl EventName {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RouteStarted => "route_started",
            Self::DeliveryCompleted => "delivery_completed",
            Self::DeliveryFailed => "delivery_failed",
            Self::NavigationRecalculated => "navigation_recalculated",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    pub name: EventName,
    pub route_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_id: Option<Uuid>,
    pub at: Timestamp,
}

impl AnalyticsEvent {
    pub fn now(name: EventName, route_id: Uuid, stop_id: Option<Uuid>) -> Self {
        Self {
            name,
            route_id,
            stop_id,
            at: Timestamp::now(),
        }
    }
}

pub trait AnalyticsSink {
    fn emit(&mut self, event: AnalyticsEvent);
}

/// Writes events to the log.
#[derive(Debug, Default)]
pub struct TracingSink;

impl AnalyticsSink for TracingSink {
    fn emit(&mut self, event: AnalyticsEvent) {
        info!(
            event = event.name.as_str(),
            route = %event.route_id,
            stop = ?event.stop_id,
            at = %event.at,
            "analytics"
        );
    }
}
