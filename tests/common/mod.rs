#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::mpsc::Sender;

use jiff::Timestamp;
use uuid::Uuid;

use courier::analytics::{AnalyticsEvent, AnalyticsSink};
use courier::backend::{self, BackendError, CompletionRequest, DispatchBackend, StopAck};
use courier::config::Config;
use courier::directions::StaticDirections;
use courier::location::{PositionError, PositionEvent, PositionSource, WatchId};
use courier::modal::ScrollLock;
use courier::model::{
    Coordinates, Destination, Driver, LocationSample, OnlineStatus, Route, RouteStatus, Stop,
    StopStatus, VehicleType,
};
use courier::session::{Collaborators, DriverSessionStore};

pub fn sample(lat: f64, lng: f64, millis: i64, accuracy_m: f64) -> LocationSample {
    LocationSample {
        lat,
        lng,
        timestamp: Timestamp::from_millisecond(millis).unwrap(),
        accuracy_m,
    }
}

pub fn route(stops: usize) -> Route {
    Route {
        id: Uuid::new_v4(),
        name: "Harbour loop".into(),
        stops: (1..=stops)
            .map(|i| Stop {
                id: Uuid::new_v4(),
                tracking_number: format!("HB-{i:03}"),
                destination: Destination {
                    address: format!("{i} Quay Rd"),
                    coordinates: Coordinates {
                        lat: 0.0,
                        lng: 0.01 * i as f64,
                    },
                    notes: None,
                },
                items: vec![],
                status: StopStatus::Pending,
                requires_signature: false,
                cash_on_delivery: None,
            })
            .collect(),
        status: RouteStatus::Pending,
        total_distance_m: 0.0,
        estimated_time_s: 0,
        optimization_score: None,
    }
}

pub fn driver() -> Driver {
    Driver {
        id: Uuid::new_v4(),
        name: "Sam".into(),
        vehicle_type: VehicleType::Motorcycle,
        license_plate: "MC-77".into(),
        online_status: OnlineStatus::Online,
    }
}

/// Acknowledges every call, or fails the next `n` when asked.
#[derive(Clone, Default)]
pub struct Backend {
    failures: Rc<RefCell<usize>>,
    pub confirmed: Rc<RefCell<Vec<CompletionRequest>>>,
}

impl Backend {
    pub fn fail_next(&self, n: usize) {
        *self.failures.borrow_mut() = n;
    }

    fn check(&self) -> backend::Result<()> {
        let mut failures = self.failures.borrow_mut();
        if *failures > 0 {
            *failures -= 1;
            return Err(BackendError::Unavailable("offline".into()));
        }
        Ok(())
    }
}

impl DispatchBackend for Backend {
    fn fetch_assigned_routes(&mut self, _driver_id: Uuid) -> backend::Result<Vec<Route>> {
        self.check()?;
        Ok(vec![])
    }

    fn confirm_stop(&mut self, request: &CompletionRequest) -> backend::Result<StopAck> {
        self.check()?;
        self.confirmed.borrow_mut().push(request.clone());
        Ok(StopAck {
            stop_id: request.stop_id,
            new_status: request.outcome,
        })
    }

    fn set_online(&mut self, _driver_id: Uuid, _status: OnlineStatus) -> backend::Result<()> {
        self.check()
    }
}

#[derive(Clone, Default)]
pub struct Sink {
    pub events: Rc<RefCell<Vec<AnalyticsEvent>>>,
}

impl AnalyticsSink for Sink {
    fn emit(&mut self, event: AnalyticsEvent) {
        self.events.borrow_mut().push(event);
    }
}

/// Records lock (`true`) and unlock (`false`) calls.
#[derive(Clone, Default)]
pub struct Scroll {
    pub history: Rc<RefCell<Vec<bool>>>,
}

impl Scroll {
    pub fn is_locked(&self) -> bool {
        self.history.borrow().last() == Some(&true)
    }
}

impl ScrollLock for Scroll {
    fn lock(&mut self) {
        self.history.borrow_mut().push(true);
    }

    fn unlock(&mut self) {
        self.history.borrow_mut().push(false);
    }
}

/// A position source whose samples the test pushes by hand.
#[derive(Clone, Default)]
pub struct Gps {
    sinks: Rc<RefCell<HashMap<u64, Sender<PositionEvent>>>>,
    next: Rc<RefCell<u64>>,
    deny: bool,
}

impl Gps {
    pub fn denying() -> Self {
        Self {
            deny: true,
            ..Self::default()
        }
    }

    pub fn push(&self, event: PositionEvent) {
        for sink in self.sinks.borrow().values() {
            let _ = sink.send(event.clone());
        }
    }

    pub fn active_watches(&self) -> usize {
        self.sinks.borrow().len()
    }
}

impl PositionSource for Gps {
    fn watch(&mut self, sink: Sender<PositionEvent>) -> Result<WatchId, PositionError> {
        if self.deny {
            return Err(PositionError::PermissionDenied);
        }
        let mut next = self.next.borrow_mut();
        *next += 1;
        self.sinks.borrow_mut().insert(*next, sink);
        Ok(WatchId(*next))
    }

    fn clear_watch(&mut self, id: WatchId) {
        self.sinks.borrow_mut().remove(&id.0);
    }
}

pub struct Session {
    pub store: DriverSessionStore,
    pub backend: Backend,
    pub sink: Sink,
    pub scroll: Scroll,
}

pub fn session(directions: StaticDirections) -> Session {
    let backend = Backend::default();
    let sink = Sink::default();
    let scroll = Scroll::default();
    let store = DriverSessionStore::new(
        driver(),
        Config::default(),
        Collaborators {
            backend: Box::new(backend.clone()),
            directions: Box::new(directions),
            analytics: Box::new(sink.clone()),
            scroll_lock: Box::new(scroll.clone()),
        },
    );
    Session {
        store,
        backend,
        sink,
        scroll,
    }
}
