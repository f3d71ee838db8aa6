//! Test doubles and fixtures shared by unit tests.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::mpsc::Sender;

use jiff::Timestamp;
use uuid::Uuid;

use crate::analytics::{AnalyticsEvent, AnalyticsSink};
use crate::backend::{
    self, BackendError, CompletionOutcome, CompletionRequest, DispatchBackend, StopAck,
};
use crate::config::Config;
use crate::directions::StaticDirections;
use crate::location::{PositionError, PositionEvent, PositionSource, WatchId};
use crate::modal::ScrollLock;
use crate::model::{
    Coordinates, Destination, Driver, Item, Leg, LocationSample, Maneuver,
    NavigationInstruction, OnlineStatus, Route, RouteStatus, Stop, StopStatus, VehicleType,
};
use crate::session::{Collaborators, DriverSessionStore};

// ── Fixtures ──

pub fn sample_at(lat: f64, lng: f64, millis: i64, accuracy_m: f64) -> LocationSample {
    LocationSample {
        lat,
        lng,
        timestamp: Timestamp::from_millisecond(millis).unwrap(),
        accuracy_m,
    }
}

/// An instruction 111 m and 10 s long, ending at (`lat`, `lng`).
pub fn instruction(text: &str, maneuver: Maneuver, lat: f64, lng: f64) -> NavigationInstruction {
    NavigationInstruction {
        text: text.to_string(),
        distance_m: 111.0,
        duration_s: 10.0,
        maneuver,
        coordinates: Coordinates { lat, lng },
    }
}

/// A pending route with `stops` pending stops, 0.01° of longitude apart along the equator.
pub fn sample_route(stops: usize) -> Route {
    Route {
        id: Uuid::new_v4(),
        name: "Downtown morning".into(),
        stops: (1..=stops)
            .map(|i| Stop {
                id: Uuid::new_v4(),
                tracking_number: format!("TRK-{i:04}"),
                destination: Destination {
                    address: format!("{i} Main St"),
                    coordinates: Coordinates {
                        lat: 0.0,
                        lng: 0.01 * i as f64,
                    },
                    notes: None,
                },
                items: vec![Item {
                    description: "Parcel".into(),
                    quantity: 1,
                }],
                status: StopStatus::Pending,
                requires_signature: false,
                cash_on_delivery: None,
            })
            .collect(),
        status: RouteStatus::Pending,
        total_distance_m: 1_113.0 * stops as f64,
        estimated_time_s: 120 * stops as u64,
        optimization_score: None,
    }
}

pub fn sample_driver(online_status: OnlineStatus) -> Driver {
    Driver {
        id: Uuid::new_v4(),
        name: "Ada".into(),
        vehicle_type: VehicleType::Van,
        license_plate: "CR-204".into(),
        online_status,
    }
}

// ── Position source ──

#[derive(Default)]
struct PositionState {
    deny: bool,
    next_id: u64,
    sinks: Vec<(WatchId, Sender<PositionEvent>)>,
    attempts: usize,
    cleared: usize,
}

/// A position source driven by the test through [`FakePositionSource::emit`].
#[derive(Clone, Default)]
pub struct FakePositionSource {
    state: Rc<RefCell<PositionState>>,
}

impl FakePositionSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn denying() -> Self {
        let source = Self::default();
        source.state.borrow_mut().deny = true;
        source
    }

    pub fn emit(&self, event: PositionEvent) {
        for (_, sink) in &self.state.borrow().sinks {
            let _ = sink.send(event.clone());
        }
    }

    pub fn active_watches(&self) -> usize {
        self.state.borrow().sinks.len()
    }

    pub fn cleared(&self) -> usize {
        self.state.borrow().cleared
    }

    pub fn watch_attempts(&self) -> usize {
        self.state.borrow().attempts
    }
}

impl PositionSource for FakePositionSource {
    fn watch(&mut self, sink: Sender<PositionEvent>) -> Result<WatchId, PositionError> {
        let mut state = self.state.borrow_mut();
        state.attempts += 1;
        if state.deny {
            return Err(PositionError::PermissionDenied);
        }
        state.next_id += 1;
        let id = WatchId(state.next_id);
        state.sinks.push((id, sink));
        Ok(id)
    }

    fn clear_watch(&mut self, id: WatchId) {
        let mut state = self.state.borrow_mut();
        state.sinks.retain(|(w, _)| *w != id);
        state.cleared += 1;
    }
}

// ── Scroll lock ──

/// Records every lock (`true`) and unlock (`false`).
#[derive(Clone, Default)]
pub struct RecordingScrollLock {
    history: Rc<RefCell<Vec<bool>>>,
}

impl RecordingScrollLock {
    pub fn history(&self) -> Vec<bool> {
        self.history.borrow().clone()
    }

    pub fn is_locked(&self) -> bool {
        self.history.borrow().last() == Some(&true)
    }
}

impl ScrollLock for RecordingScrollLock {
    fn lock(&mut self) {
        self.history.borrow_mut().push(true);
    }

    fn unlock(&mut self) {
        self.history.borrow_mut().push(false);
    }
}

// ── Analytics ──

#[derive(Clone, Default)]
pub struct RecordingSink {
    events: Rc<RefCell<Vec<AnalyticsEvent>>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<AnalyticsEvent> {
        self.events.borrow().clone()
    }
}

impl AnalyticsSink for RecordingSink {
    fn emit(&mut self, event: AnalyticsEvent) {
        self.events.borrow_mut().push(event);
    }
}

// ── Backend ──

#[derive(Default)]
struct BackendState {
    routes: HashMap<Uuid, Vec<Route>>,
    failures: usize,
    ack_as: Option<CompletionOutcome>,
    confirmed: Vec<CompletionRequest>,
    status: Vec<OnlineStatus>,
}

/// Acknowledges everything unless told to fail the next calls.
#[derive(Clone, Default)]
pub struct FakeBackend {
    state: Rc<RefCell<BackendState>>,
}

impl FakeBackend {
    pub fn assign(&self, driver: Uuid, route: Route) {
        self.state
            .borrow_mut()
            .routes
            .entry(driver)
            .or_default()
            .push(route);
    }

    /// Make the next `n` calls fail as if the network were down.
    pub fn fail_next(&self, n: usize) {
        self.state.borrow_mut().failures = n;
    }

    /// Acknowledge every later completion with `outcome`, whatever was requested.
    pub fn ack_as(&self, outcome: CompletionOutcome) {
        self.state.borrow_mut().ack_as = Some(outcome);
    }

    pub fn confirmed(&self) -> Vec<CompletionRequest> {
        self.state.borrow().confirmed.clone()
    }

    pub fn status_updates(&self) -> Vec<OnlineStatus> {
        self.state.borrow().status.clone()
    }

    fn check(&self) -> backend::Result<()> {
        let mut state = self.state.borrow_mut();
        if state.failures > 0 {
            state.failures -= 1;
            return Err(BackendError::Unavailable("network down".into()));
        }
        Ok(())
    }
}

impl DispatchBackend for FakeBackend {
    fn fetch_assigned_routes(&mut self, driver_id: Uuid) -> backend::Result<Vec<Route>> {
        self.check()?;
        Ok(self
            .state
            .borrow()
            .routes
            .get(&driver_id)
            .cloned()
            .unwrap_or_default())
    }

    fn confirm_stop(&mut self, request: &CompletionRequest) -> backend::Result<StopAck> {
        self.check()?;
        let mut state = self.state.borrow_mut();
        state.confirmed.push(request.clone());
        Ok(StopAck {
            stop_id: request.stop_id,
            new_status: state.ack_as.unwrap_or(request.outcome),
        })
    }

    fn set_online(&mut self, _driver_id: Uuid, status: OnlineStatus) -> backend::Result<()> {
        self.check()?;
        self.state.borrow_mut().status.push(status);
        Ok(())
    }
}

// ── Session ──

pub struct Harness {
    pub store: DriverSessionStore,
    pub backend: FakeBackend,
    pub sink: RecordingSink,
    pub lock: RecordingScrollLock,
    pub route: Route,
}

impl Harness {
    pub fn current_id(&self) -> Uuid {
        self.store.route().unwrap().current_stop().unwrap().id
    }

    pub fn current_status(&self) -> StopStatus {
        self.store.route().unwrap().current_stop().unwrap().status.clone()
    }
}

/// An online driver with `stops` stops waiting to be assigned. Each leg
/// departs 0.005° west of its stop and arrives on it.
pub fn harness(stops: usize) -> Harness {
    let route = sample_route(stops);
    let legs = route
        .stops
        .iter()
        .map(|s| {
            let c = s.destination.coordinates;
            let leg = Leg {
                polyline: vec![],
                instructions: vec![
                    instruction("Depart", Maneuver::Depart, c.lat, c.lng - 0.005),
                    instruction("Arrive", Maneuver::Arrive, c.lat, c.lng),
                ],
            };
            (s.id, leg)
        })
        .collect::<HashMap<_, _>>();
    let backend = FakeBackend::default();
    let sink = RecordingSink::default();
    let lock = RecordingScrollLock::default();
    let store = DriverSessionStore::new(
        sample_driver(OnlineStatus::Online),
        Config::default(),
        Collaborators {
            backend: Box::new(backend.clone()),
            directions: Box::new(StaticDirections::new(legs)),
            analytics: Box::new(sink.clone()),
            scroll_lock: Box::new(lock.clone()),
        },
    );
    Harness {
        store,
        backend,
        sink,
        lock,
        route,
    }
}

/// [`harness`] with its route assigned and started.
pub fn started(stops: usize) -> Harness {
    let mut h = harness(stops);
    h.store.assign_route(h.route.clone()).unwrap();
    h.store.start_route().unwrap();
    h
}
