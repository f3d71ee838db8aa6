//! Route progress: the active stop cursor and per-stop status.
//!
//! A route moves `pending → active → completed`, with `cancelled` reachable
//! from `pending` or `active`. While active, the cursor points at the first
//! stop that is not terminal, and that stop is the only one `en_route` or
//! `arrived`.

use tracing::{debug, info};
use uuid::Uuid;

use crate::model::{Route, RouteStatus, Stop, StopStatus};
use crate::session::{Result, SessionError};

#[derive(Debug, Clone)]
pub struct RouteProgressTracker {
    route: Route,
    current_stop_index: usize,
}

impl RouteProgressTracker {
    pub fn new(route: Route) -> Self {
        let current_stop_index = first_open(&route.stops, 0);
        Self {
            route,
            current_stop_index,
        }
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    pub fn status(&self) -> RouteStatus {
        self.route.status
    }

    pub fn is_active(&self) -> bool {
        self.route.status == RouteStatus::Active
    }

    pub fn current_stop_index(&self) -> usize {
        self.current_stop_index
    }

    pub fn current_stop(&self) -> Option<&Stop> {
        self.route.stops.get(self.current_stop_index)
    }

    pub fn stop(&self, id: Uuid) -> Option<&Stop> {
        self.route.stop(id)
    }

    pub fn completed_count(&self) -> usize {
        self.count(|s| matches!(s, StopStatus::Completed))
    }

    pub fn failed_count(&self) -> usize {
        self.count(|s| matches!(s, StopStatus::Failed { .. }))
    }

    /// `pending → active`. The first open stop becomes `en_route`.
    pub fn start_route(&mut self) -> Result<()> {
        if self.route.status != RouteStatus::Pending {
            return Err(SessionError::InvalidTransition(format!(
                "cannot start a {} route",
                self.route.status.as_str()
            )));
        }
        if self.route.stops.is_empty() {
            return Err(SessionError::NoStops(self.route.id));
        }

        self.route.status = RouteStatus::Active;
        self.current_stop_index = first_open(&self.route.stops, 0);
        info!(route = %self.route.id, stops = self.route.stops.len(), "route started");
        self.depart_or_finish();
        Ok(())
    }

    /// `en_route → arrived` for the current stop.
    pub fn mark_arrived(&mut self) -> Result<()> {
        self.require_active()?;
        let index = self.current_stop_index;
        let stop = self
            .route
            .stops
            .get_mut(index)
            .ok_or_else(|| SessionError::InvalidTransition("no current stop".into()))?;
        if stop.status != StopStatus::EnRoute {
            return Err(SessionError::InvalidTransition(format!(
                "cannot arrive at a {} stop",
                stop.status.as_str()
            )));
        }
        stop.status = StopStatus::Arrived;
        debug!(stop = %stop.id, "arrived at stop");
        Ok(())
    }

    /// Move past the current stop once it is terminal.
    ///
    /// Completes the route when no open stop remains; the cursor then equals
    /// the stop count.
    pub fn advance_to_next_stop(&mut self) -> Result<()> {
        self.require_active()?;
        if let Some(stop) = self.current_stop()
            && !stop.status.is_terminal()
        {
            return Err(SessionError::StopNotTerminal(stop.id));
        }

        self.current_stop_index = first_open(&self.route.stops, self.current_stop_index + 1);
        self.depart_or_finish();
        Ok(())
    }

    /// Mark a stop failed without collecting proof. `reason` is mandatory.
    pub fn skip_stop(&mut self, stop_id: Uuid, reason: &str) -> Result<()> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(SessionError::MissingReason);
        }
        self.require_active()?;

        let index = self.index_of(stop_id)?;
        let stop = &mut self.route.stops[index];
        if stop.status.is_terminal() {
            return Err(SessionError::InvalidTransition(format!(
                "stop {stop_id} is already {}",
                stop.status.as_str()
            )));
        }
        stop.status = StopStatus::Failed {
            reason: reason.to_string(),
        };
        info!(stop = %stop_id, %reason, "stop skipped");

        if index == self.current_stop_index {
            self.advance_to_next_stop()?;
        }
        Ok(())
    }

    /// `pending|active → cancelled`. The stop being driven to goes back to `pending`.
    pub fn cancel_route(&mut self) -> Result<()> {
        if !matches!(self.route.status, RouteStatus::Pending | RouteStatus::Active) {
            return Err(SessionError::InvalidTransition(format!(
                "cannot cancel a {} route",
                self.route.status.as_str()
            )));
        }
        for stop in &mut self.route.stops {
            if matches!(stop.status, StopStatus::EnRoute | StopStatus::Arrived) {
                stop.status = StopStatus::Pending;
            }
        }
        self.route.status = RouteStatus::Cancelled;
        info!(route = %self.route.id, "route cancelled");
        Ok(())
    }

    /// Set the current stop's terminal status. Only the completion workflow
    /// calls this, and always follows it with [`Self::advance_to_next_stop`].
    pub(crate) fn settle_current(&mut self, stop_id: Uuid, status: StopStatus) -> Result<()> {
        self.require_active()?;
        let index = self.current_stop_index;
        let stop = self
            .route
            .stops
            .get_mut(index)
            .filter(|s| s.id == stop_id)
            .ok_or_else(|| {
                SessionError::InvalidTransition(format!("stop {stop_id} is not the current stop"))
            })?;
        debug!(stop = %stop_id, status = status.as_str(), "stop settled");
        stop.status = status;
        Ok(())
    }

    /// Put the current stop back to a non-terminal status after an abandoned completion.
    pub(crate) fn restore_current(&mut self, stop_id: Uuid, status: StopStatus) {
        if let Some(stop) = self.route.stops.get_mut(self.current_stop_index)
            && stop.id == stop_id
            && !status.is_terminal()
        {
            stop.status = status;
        }
    }

    /// Rebuild from a persisted snapshot, trusting the stored cursor only if it
    /// agrees with the stop statuses.
    pub(crate) fn resume(route: Route, current_stop_index: usize) -> Self {
        let mut tracker = Self::new(route);
        if current_stop_index != tracker.current_stop_index {
            debug!(
                stored = current_stop_index,
                derived = tracker.current_stop_index,
                "stored stop cursor disagrees with statuses; using derived"
            );
        }
        tracker
    }

    fn depart_or_finish(&mut self) {
        let index = self.current_stop_index;
        if index < self.route.stops.len() {
            let stop = &mut self.route.stops[index];
            stop.status = StopStatus::EnRoute;
            debug!(stop = %stop.id, index, "en route to stop");
        } else {
            self.route.status = RouteStatus::Completed;
            info!(
                route = %self.route.id,
                completed = self.completed_count(),
                failed = self.failed_count(),
                "route completed"
            );
        }
    }

    fn require_active(&self) -> Result<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(SessionError::InvalidTransition(format!(
                "route is {}, not active",
                self.route.status.as_str()
            )))
        }
    }

    fn index_of(&self, stop_id: Uuid) -> Result<usize> {
        self.route
            .stops
            .iter()
            .position(|s| s.id == stop_id)
            .ok_or(SessionError::StopNotFound(stop_id))
    }

    fn count(&self, pred: impl Fn(&StopStatus) -> bool) -> usize {
        self.route.stops.iter().filter(|s| pred(&s.status)).count()
    }
}

/// Index of the first non-terminal stop at or after `from`, or the stop count.
fn first_open(stops: &[Stop], from: usize) -> usize {
    stops
        .iter()
        .enumerate()
        .skip(from)
        .find(|(_, s)| !s.status.is_terminal())
        .map_or(stops.len(), |(i, _)| i)
}
