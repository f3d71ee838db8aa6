//! Headless route replay: drive a session from a recorded GPS trace.
//!
//! The trace stands in for the platform position source and a local backend
//! acknowledges every request, so a whole route can be rehearsed offline.

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::mpsc::Sender;

use tracing::debug;
use uuid::Uuid;

use courier::analytics::TracingSink;
use courier::backend::{self, CompletionRequest, DispatchBackend, StopAck};
use courier::config::Config;
use courier::directions::StaticDirections;
use courier::geo::format_distance;
use courier::location::{PositionError, PositionEvent, PositionSource, TrackerStatus, WatchId};
use courier::modal::NoScrollLock;
use courier::model::{
    DeliveryProof, Driver, LocationSample, OnlineStatus, Route, Stop, StopStatus, VehicleType,
};
use courier::navigation::NavigationInstructionEngine;
use courier::session::{Collaborators, DriverSessionStore, SessionSnapshot};

use super::format::format_status;

/// Test-side handle that pushes trace samples to whoever is watching.
#[derive(Clone, Default)]
struct ReplayFeed {
    sink: Rc<RefCell<Option<Sender<PositionEvent>>>>,
}

impl ReplayFeed {
    fn push(&self, sample: &LocationSample) {
        if let Some(sink) = self.sink.borrow().as_ref() {
            let _ = sink.send(PositionEvent::Sample(sample.clone()));
        }
    }
}

impl PositionSource for ReplayFeed {
    fn watch(&mut self, sink: Sender<PositionEvent>) -> Result<WatchId, PositionError> {
        *self.sink.borrow_mut() = Some(sink);
        Ok(WatchId(1))
    }

    fn clear_watch(&mut self, _id: WatchId) {
        self.sink.borrow_mut().take();
    }
}

/// Hands out the replayed route and acknowledges everything.
struct LocalBackend {
    routes: Vec<Route>,
}

impl DispatchBackend for LocalBackend {
    fn fetch_assigned_routes(&mut self, _driver_id: Uuid) -> backend::Result<Vec<Route>> {
        Ok(self.routes.clone())
    }

    fn confirm_stop(&mut self, request: &CompletionRequest) -> backend::Result<StopAck> {
        Ok(StopAck {
            stop_id: request.stop_id,
            new_status: request.outcome,
        })
    }

    fn set_online(&mut self, driver_id: Uuid, status: OnlineStatus) -> backend::Result<()> {
        debug!(driver = %driver_id, status = status.as_str(), "status reported");
        Ok(())
    }
}

/// Proof that satisfies whatever the stop requires.
fn proof_for(stop: &Stop) -> DeliveryProof {
    DeliveryProof {
        signature: stop.requires_signature.then(|| b"replay".to_vec()),
        cash_collected: stop.cash_on_delivery,
        ..Default::default()
    }
}

pub(super) fn replay(
    config: &Config,
    route: Route,
    trace: &[LocationSample],
    directions: StaticDirections,
) -> Result<SessionSnapshot, String> {
    let driver = Driver {
        id: Uuid::new_v4(),
        name: "Replay".into(),
        vehicle_type: VehicleType::Car,
        license_plate: "REPLAY".into(),
        online_status: OnlineStatus::Offline,
    };
    let mut store = DriverSessionStore::new(
        driver,
        config.clone(),
        Collaborators {
            backend: Box::new(LocalBackend {
                routes: vec![route],
            }),
            directions: Box::new(directions),
            analytics: Box::new(TracingSink),
            scroll_lock: Box::new(NoScrollLock),
        },
    );
    let fail = |e: courier::session::SessionError| e.to_string();

    store.go_online().map_err(fail)?;
    store
        .sync_assigned_route()
        .map_err(fail)?
        .ok_or("route is not pending")?;
    store.start_route().map_err(fail)?;

    let feed = ReplayFeed::default();
    if store.start_navigation(Box::new(feed.clone())).map_err(fail)? != TrackerStatus::Watching {
        return Err("position source refused the watch".into());
    }

    let mut shown: Option<String> = None;
    for sample in trace {
        feed.push(sample);
        store.pump_location(sample.timestamp);

        if let Some(display) = store
            .navigation()
            .and_then(NavigationInstructionEngine::display)
            && shown.as_deref() != Some(display.text.as_str())
        {
            println!(
                "  {}  ({} left, {}%)",
                display.text, display.remaining_distance, display.progress_percent
            );
            shown = Some(display.text);
        }

        let arrived = store
            .route()
            .and_then(|r| r.current_stop())
            .filter(|s| s.status == StopStatus::Arrived)
            .map(|s| (s.id, s.tracking_number.clone(), proof_for(s)));
        if let Some((stop_id, tracking, proof)) = arrived {
            store.request_completion(stop_id).map_err(fail)?;
            let receipt = store.confirm_completion(proof).map_err(fail)?;
            println!("{tracking}: {}", format_status(&receipt.status));
            if let Some(cash) = receipt.cash.filter(|c| c.flagged) {
                println!("{tracking}: cash flagged ({:+.2})", cash.discrepancy);
            }
            shown = None;
        }

        if !store.has_active_route() {
            break;
        }
    }
    store.stop_navigation();

    let Some(progress) = store.route() else {
        return Err("route disappeared during replay".into());
    };
    let remaining = progress
        .current_stop()
        .and_then(|stop| {
            trace
                .last()
                .map(|s| courier::geo::distance_m(s.coordinates(), stop.destination.coordinates))
        })
        .map(format_distance);
    println!(
        "{}: {} completed, {} failed, {} stops",
        progress.status().as_str(),
        progress.completed_count(),
        progress.failed_count(),
        progress.route().stops.len()
    );
    if let Some(remaining) = remaining {
        println!("next stop {remaining} from the end of the trace");
    }
    Ok(store.snapshot())
}
