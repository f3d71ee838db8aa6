//! Live navigation and the floating quick actions.
//!
//! Positions reach the session either by draining the position source
//! ([`DriverSessionStore::pump_location`]) or by hand
//! ([`DriverSessionStore::record_location`]). Either way the newest sample
//! drives the instruction engine and arrival detection.

use jiff::Timestamp;
use tracing::{debug, info, warn};

use crate::actions::{ActionContext, FloatingActionController, QuickAction, QuickActionKind};
use crate::analytics::EventName;
use crate::geo;
use crate::location::{LocationTracker, PositionSource, TrackerStatus};
use crate::model::{Coordinates, LocationSample, StopStatus};
use crate::navigation::NavigationInstructionEngine;
use crate::progress::RouteProgressTracker;

use super::{DriverSessionStore, Result, SessionChange, SessionError};

impl DriverSessionStore {
    /// Begin navigating the current stop's leg with positions from `source`.
    ///
    /// A denied permission is reported in the returned status; navigation
    /// still runs, fed only by [`Self::record_location`].
    pub fn start_navigation(&mut self, source: Box<dyn PositionSource>) -> Result<TrackerStatus> {
        self.ensure_live()?;
        if !self.has_active_route() {
            return Err(SessionError::InvalidTransition(
                "no active route to navigate".into(),
            ));
        }
        self.stop_navigation();
        let mut tracker = LocationTracker::new(source, self.config.location.clone());
        let status = tracker.start();
        self.tracker = Some(tracker);
        self.load_leg();
        Ok(status)
    }

    /// Release the location watch and drop navigation state. Idempotent.
    pub fn stop_navigation(&mut self) {
        if let Some(mut tracker) = self.tracker.take() {
            tracker.stop();
        }
        if self.navigation.take().is_some() {
            debug!("navigation stopped");
        }
        self.actions.collapse();
    }

    /// Drain the position source and let navigation react to the newest sample.
    ///
    /// Returns `true` if the current instruction advanced.
    pub fn pump_location(&mut self, now: Timestamp) -> bool {
        let Some(tracker) = self.tracker.as_mut() else {
            return false;
        };
        if tracker.pump() == 0 {
            return false;
        }
        self.process_location(now)
    }

    /// Feed one sample by hand, e.g. a manual refresh when permission is denied.
    pub fn record_location(&mut self, sample: LocationSample, now: Timestamp) -> bool {
        let Some(tracker) = self.tracker.as_mut() else {
            return false;
        };
        if !tracker.record(sample) {
            return false;
        }
        self.process_location(now)
    }

    fn process_location(&mut self, now: Timestamp) -> bool {
        if self.halted {
            return false;
        }
        let Some(tracker) = self.tracker.as_ref() else {
            return false;
        };
        let Some(sample) = tracker.last_sample().cloned() else {
            return false;
        };
        let confident = !tracker.is_stale(now) && tracker.is_accurate();

        let update = self.navigation.as_mut().map(|engine| {
            (
                engine.update(&sample, confident),
                engine.current_index(),
                engine.progress_percent(),
            )
        });
        let advanced = matches!(update, Some((true, _, _)));
        if let Some((true, current_index, progress_percent)) = update {
            self.notify(SessionChange::Navigation {
                current_index,
                progress_percent,
            });
        }

        let radius = self.config.navigation.arrival_radius_m;
        let arrived = confident
            && self
                .route
                .as_ref()
                .and_then(RouteProgressTracker::current_stop)
                .is_some_and(|stop| {
                    stop.status == StopStatus::EnRoute
                        && geo::distance_m(sample.coordinates(), stop.destination.coordinates)
                            <= radius
                });
        if arrived && let Err(e) = self.mark_arrived() {
            debug!(error = %e, "arrival not recorded");
        }

        advanced
    }

    /// Fetch directions for the current stop and restart the instruction engine.
    pub(super) fn load_leg(&mut self) {
        let origin = self.last_position();
        let Some(stop) = self
            .route
            .as_ref()
            .and_then(RouteProgressTracker::current_stop)
        else {
            self.navigation = None;
            return;
        };
        let instructions = match self.directions.directions(origin, stop) {
            Ok(leg) => leg.instructions,
            Err(e) => {
                warn!(stop = %stop.id, error = %e, "no directions for leg");
                Vec::new()
            }
        };
        let engine = NavigationInstructionEngine::new(instructions, self.config.navigation.clone());
        let change = SessionChange::Navigation {
            current_index: engine.current_index(),
            progress_percent: engine.progress_percent(),
        };
        self.navigation = Some(engine);
        self.notify(change);
    }

    fn last_position(&self) -> Option<Coordinates> {
        self.tracker
            .as_ref()
            .and_then(LocationTracker::last_sample)
            .map(LocationSample::coordinates)
    }

    // ── Quick actions ──

    pub fn action_context(&self) -> ActionContext {
        ActionContext {
            is_navigating: self.is_navigating(),
            has_active_route: self.has_active_route(),
            obscured: self.modals.obscures_chrome(),
        }
    }

    pub fn quick_actions(&self) -> [QuickAction; 2] {
        FloatingActionController::actions(self.action_context())
    }

    pub fn quick_actions_visible(&self) -> bool {
        FloatingActionController::is_visible(self.action_context())
    }

    pub fn toggle_quick_actions(&mut self) -> bool {
        self.actions.toggle_expanded()
    }

    pub fn quick_actions_expanded(&self) -> bool {
        self.actions.is_expanded()
    }

    /// Refetch directions for the current leg and restart its instructions.
    ///
    /// Returns `Ok(false)` when recalculation is not currently enabled.
    pub fn recalculate_route(&mut self) -> Result<bool> {
        self.ensure_live()?;
        let ctx = self.action_context();
        let origin = self.last_position();
        let (Some(route), Some(engine)) = (self.route.as_ref(), self.navigation.as_mut()) else {
            return Ok(false);
        };
        let Some(stop) = route.current_stop() else {
            return Ok(false);
        };
        let (route_id, stop_id) = (route.route().id, stop.id);

        let done = FloatingActionController::recalculate_route(
            ctx,
            self.directions.as_mut(),
            origin,
            stop,
            engine,
        )?;
        if done {
            info!(route = %route_id, stop = %stop_id, "route recalculated");
            self.emit(EventName::NavigationRecalculated, route_id, Some(stop_id));
            self.notify(SessionChange::Navigation {
                current_index: 0,
                progress_percent: 0,
            });
        }
        Ok(done)
    }

    /// Stop navigating immediately. The route stays active.
    ///
    /// Refused while the button is disabled: without an active route, or
    /// under a fullscreen modal.
    pub fn emergency_stop(&mut self) -> Result<()> {
        if !FloatingActionController::is_enabled(
            QuickActionKind::EmergencyStop,
            self.action_context(),
        ) {
            return Err(SessionError::InvalidTransition(
                "emergency stop is not available".into(),
            ));
        }
        warn!(driver = %self.driver.id, "emergency stop");
        self.stop_navigation();
        self.close_modal();
        Ok(())
    }
}
