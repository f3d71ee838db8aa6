//! Output formatting for CLI display.

use std::fmt::Write;

use courier::geo::{format_distance, format_duration};
use courier::model::{Driver, Route, Stop, StopStatus};

pub(super) fn format_driver(driver: &Driver) -> String {
    format!(
        "{}  {} ({} {})  [{}]",
        driver.id,
        driver.name,
        driver.vehicle_type.as_str(),
        driver.license_plate,
        driver.online_status.as_str()
    )
}

/// A route header followed by one line per stop. `current` marks the stop
/// the driver is heading to.
pub(super) fn format_route(route: &Route, current: Option<usize>) -> String {
    #[allow(clippy::cast_precision_loss)]
    let eta = format_duration(route.estimated_time_s as f64);
    let mut out = format!(
        "{}  [{}]  {} stops, {}, {eta}\n",
        route.name,
        route.status.as_str(),
        route.stops.len(),
        format_distance(route.total_distance_m),
    );
    for (i, stop) in route.stops.iter().enumerate() {
        let marker = if current == Some(i) { '▸' } else { ' ' };
        let _ = writeln!(out, "{marker} {}", format_stop(i + 1, stop));
    }
    out
}

pub(super) fn format_stop(position: usize, stop: &Stop) -> String {
    let mut line = format!(
        "{position:>2}. {}  {:<24}  {}",
        stop.tracking_number,
        format_status(&stop.status),
        stop.destination.address
    );
    if stop.requires_signature {
        line.push_str("  [signature]");
    }
    if let Some(cash) = stop.cash_on_delivery {
        let _ = write!(line, "  [cash {cash:.2}]");
    }
    line
}

pub(super) fn format_status(status: &StopStatus) -> String {
    match status {
        StopStatus::Failed { reason } => format!("failed ({reason})"),
        other => other.as_str().to_string(),
    }
}
