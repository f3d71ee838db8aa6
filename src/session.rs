//! The driver session: the single writable aggregate.
//!
//! [`DriverSessionStore`] owns the driver, the assigned route's progress, the
//! open completion workflow, the modal manager, and the live navigation
//! state. Its public methods are the only way to change any of them. Every
//! mutation is applied in full before subscribers are notified, synchronously
//! and in order.
//!
//! External collaborators (backend, directions, analytics, page scroll) are
//! injected through [`Collaborators`].
//!
//! ```text
//! session.rs          # state, route lifecycle, completion, modals, identity
//! session/
//!   connectivity.rs   # online/offline toggling
//!   navigation.rs     # location feed, instructions, quick actions
//! ```

mod connectivity;
mod navigation;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::actions::FloatingActionController;
use crate::analytics::{AnalyticsEvent, AnalyticsSink, EventName};
use crate::backend::{BackendError, CompletionRequest, DispatchBackend};
use crate::completion::{CashReconciliation, DeliveryCompletionWorkflow};
use crate::config::Config;
use crate::directions::{DirectionsError, DirectionsProvider};
use crate::location::LocationTracker;
use crate::modal::{Dismissal, Layer, ModalId, ModalStackManager, ScrollLock};
use crate::model::{
    DeliveryProof, Driver, OnlineStatus, ProofField, Route, RouteStatus, StopStatus,
};
use crate::navigation::NavigationInstructionEngine;
use crate::progress::RouteProgressTracker;

/// Errors returned by session operations.
///
/// Precondition violations are ordinary values for the caller to present;
/// none of them leave state partially changed.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("driver already has an active route: {0}")]
    AlreadyHasActiveRoute(Uuid),

    #[error("route {0} has no stops")]
    NoStops(Uuid),

    #[error("missing proof: {0}")]
    MissingProof(ProofField),

    #[error("a reason is required")]
    MissingReason,

    #[error("cash amount must be a non-negative number")]
    InvalidCashAmount,

    #[error("driver is offline and not accepting assignments")]
    DriverOffline,

    #[error("session invalidated; re-authentication required")]
    SessionInvalidated,

    #[error("re-authenticated as {got}, but the session belongs to {expected}")]
    DriverMismatch { expected: Uuid, got: Uuid },

    #[error("no route assigned")]
    NoRoute,

    #[error("stop not found: {0}")]
    StopNotFound(Uuid),

    #[error("stop {0} has not reached a terminal status")]
    StopNotTerminal(Uuid),

    #[error("no delivery completion in progress")]
    NoCompletionInProgress,

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Directions(#[from] DirectionsError),
}

pub type Result<T> = core::result::Result<T, SessionError>;

/// The session's external collaborators.
pub struct Collaborators {
    pub backend: Box<dyn DispatchBackend>,
    pub directions: Box<dyn DirectionsProvider>,
    pub analytics: Box<dyn AnalyticsSink>,
    pub scroll_lock: Box<dyn ScrollLock>,
}

/// What changed, as seen by subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionChange {
    DriverStatus(OnlineStatus),
    RouteAssigned(Uuid),
    RouteStatus(RouteStatus),
    StopStatus { stop_id: Uuid, status: StopStatus },
    CurrentStop(usize),
    Modal(Option<ModalId>),
    Navigation { current_index: usize, progress_percent: u8 },
    Halted,
    Resumed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfflineOutcome {
    WentOffline,
    /// A route is active; the confirmation modal is open.
    ConfirmationRequired,
}

/// Result of an acknowledged completion or failure.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionReceipt {
    pub stop_id: Uuid,
    pub status: StopStatus,
    pub cash: Option<CashReconciliation>,
    pub route_completed: bool,
}

/// What survives a lost session until it can be re-synced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub driver: Driver,
    pub route: Option<Route>,
    pub current_stop_index: usize,
    pub saved_at: Timestamp,
}

type Listener = Box<dyn FnMut(&SessionChange)>;

pub struct DriverSessionStore {
    driver: Driver,
    config: Config,
    route: Option<RouteProgressTracker>,
    completion: Option<DeliveryCompletionWorkflow>,
    modals: ModalStackManager,
    actions: FloatingActionController,
    tracker: Option<LocationTracker>,
    navigation: Option<NavigationInstructionEngine>,
    backend: Box<dyn DispatchBackend>,
    directions: Box<dyn DirectionsProvider>,
    analytics: Box<dyn AnalyticsSink>,
    listeners: Vec<(SubscriptionId, Listener)>,
    next_subscription: u64,
    halted: bool,
}

impl DriverSessionStore {
    pub fn new(driver: Driver, config: Config, collaborators: Collaborators) -> Self {
        Self {
            driver,
            config,
            route: None,
            completion: None,
            modals: ModalStackManager::new(collaborators.scroll_lock),
            actions: FloatingActionController::new(),
            tracker: None,
            navigation: None,
            backend: collaborators.backend,
            directions: collaborators.directions,
            analytics: collaborators.analytics,
            listeners: Vec::new(),
            next_subscription: 0,
            halted: false,
        }
    }

    /// Rebuild a session from a locally preserved snapshot.
    pub fn restore(snapshot: SessionSnapshot, config: Config, collaborators: Collaborators) -> Self {
        let mut store = Self::new(snapshot.driver, config, collaborators);
        store.route = snapshot
            .route
            .map(|r| RouteProgressTracker::resume(r, snapshot.current_stop_index));
        store
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            driver: self.driver.clone(),
            route: self.route.as_ref().map(|r| r.route().clone()),
            current_stop_index: self
                .route
                .as_ref()
                .map_or(0, RouteProgressTracker::current_stop_index),
            saved_at: Timestamp::now(),
        }
    }

    // ── Reads ──

    pub fn driver(&self) -> &Driver {
        &self.driver
    }

    pub fn route(&self) -> Option<&RouteProgressTracker> {
        self.route.as_ref()
    }

    pub fn has_active_route(&self) -> bool {
        self.route.as_ref().is_some_and(RouteProgressTracker::is_active)
    }

    pub fn completion(&self) -> Option<&DeliveryCompletionWorkflow> {
        self.completion.as_ref()
    }

    pub fn modals(&self) -> &ModalStackManager {
        &self.modals
    }

    pub fn active_modal(&self) -> Option<ModalId> {
        self.modals.active()
    }

    /// Screen layers to draw, bottom to top.
    pub fn layers(&self) -> Vec<Layer> {
        self.modals.layers()
    }

    pub fn tracker(&self) -> Option<&LocationTracker> {
        self.tracker.as_ref()
    }

    pub fn navigation(&self) -> Option<&NavigationInstructionEngine> {
        self.navigation.as_ref()
    }

    pub fn is_navigating(&self) -> bool {
        self.tracker.is_some()
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    // ── Subscriptions ──

    pub fn subscribe(&mut self, listener: impl FnMut(&SessionChange) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(i, _)| *i != id);
        self.listeners.len() != before
    }

    fn notify(&mut self, change: SessionChange) {
        for (_, listener) in &mut self.listeners {
            listener(&change);
        }
    }

    // ── Route lifecycle ──

    pub fn assign_route(&mut self, route: Route) -> Result<()> {
        self.ensure_live()?;
        self.ensure_accepting()?;
        if route.status != RouteStatus::Pending {
            return Err(SessionError::InvalidTransition(format!(
                "cannot assign a {} route",
                route.status.as_str()
            )));
        }
        let id = route.id;
        self.route = Some(RouteProgressTracker::new(route));
        info!(route = %id, "route assigned");
        self.notify(SessionChange::RouteAssigned(id));
        Ok(())
    }

    /// Fetch assignments from the backend and take the first pending route.
    pub fn sync_assigned_route(&mut self) -> Result<Option<Uuid>> {
        self.ensure_live()?;
        self.ensure_accepting()?;
        let routes = self.backend.fetch_assigned_routes(self.driver.id)?;
        let Some(route) = routes.into_iter().find(|r| r.status == RouteStatus::Pending) else {
            debug!("no pending route assigned");
            return Ok(None);
        };
        let id = route.id;
        self.assign_route(route)?;
        Ok(Some(id))
    }

    pub fn start_route(&mut self) -> Result<()> {
        self.ensure_live()?;
        let route = self.route.as_mut().ok_or(SessionError::NoRoute)?;
        route.start_route()?;
        let route_id = route.route().id;
        let first = route.current_stop().map(|s| (s.id, s.status.clone()));
        let index = route.current_stop_index();

        self.emit(EventName::RouteStarted, route_id, None);
        self.notify(SessionChange::RouteStatus(RouteStatus::Active));
        self.notify(SessionChange::CurrentStop(index));
        if let Some((stop_id, status)) = first {
            self.notify(SessionChange::StopStatus { stop_id, status });
        }
        Ok(())
    }

    pub fn mark_arrived(&mut self) -> Result<()> {
        self.ensure_live()?;
        let route = self.route.as_mut().ok_or(SessionError::NoRoute)?;
        route.mark_arrived()?;
        if let Some(stop) = route.current_stop() {
            let change = SessionChange::StopStatus {
                stop_id: stop.id,
                status: stop.status.clone(),
            };
            self.notify(change);
        }
        Ok(())
    }

    /// Fail a stop without collecting proof.
    pub fn skip_stop(&mut self, stop_id: Uuid, reason: &str) -> Result<()> {
        self.ensure_live()?;
        if reason.trim().is_empty() {
            return Err(SessionError::MissingReason);
        }
        if self
            .completion
            .as_ref()
            .is_some_and(|wf| wf.stop_id() == stop_id)
        {
            self.cancel_completion()?;
        }

        let route = self.route.as_mut().ok_or(SessionError::NoRoute)?;
        let before = route.current_stop_index();
        route.skip_stop(stop_id, reason)?;
        let route_id = route.route().id;

        self.emit(EventName::DeliveryFailed, route_id, Some(stop_id));
        self.after_stop_settled(stop_id, before);
        Ok(())
    }

    pub fn cancel_route(&mut self) -> Result<()> {
        self.ensure_live()?;
        if self.completion.is_some() {
            self.cancel_completion()?;
        }
        let route = self.route.as_mut().ok_or(SessionError::NoRoute)?;
        route.cancel_route()?;
        self.stop_navigation();
        self.notify(SessionChange::RouteStatus(RouteStatus::Cancelled));
        Ok(())
    }

    // ── Delivery completion ──

    /// Open the completion workflow and its modal for the current stop.
    pub fn request_completion(&mut self, stop_id: Uuid) -> Result<()> {
        self.ensure_live()?;
        if self
            .completion
            .as_ref()
            .is_some_and(|wf| wf.stop_id() == stop_id)
        {
            self.open_modal_inner(ModalId::DeliveryCompletion);
            return Ok(());
        }

        let route = self.route.as_ref().ok_or(SessionError::NoRoute)?;
        let stop = route.stop(stop_id).ok_or(SessionError::StopNotFound(stop_id))?;
        if !route.is_active() || route.current_stop().map(|s| s.id) != Some(stop_id) {
            return Err(SessionError::InvalidTransition(format!(
                "stop {stop_id} is not the current stop of an active route"
            )));
        }
        let workflow = DeliveryCompletionWorkflow::begin(stop, self.config.completion.clone())?;
        self.completion = Some(workflow);
        self.open_modal_inner(ModalId::DeliveryCompletion);
        Ok(())
    }

    /// Submit proof for the open completion.
    ///
    /// Missing proof leaves the workflow collecting. A backend failure does the
    /// same, keeping the request for [`Self::retry_completion`]; the stop only
    /// settles once the backend acknowledges.
    pub fn confirm_completion(&mut self, proof: DeliveryProof) -> Result<CompletionReceipt> {
        self.ensure_live()?;
        let workflow = self
            .completion
            .as_mut()
            .ok_or(SessionError::NoCompletionInProgress)?;
        let request = workflow.validate(proof)?;
        self.submit(&request)
    }

    /// Report the open completion as a failed delivery.
    pub fn fail_delivery(&mut self, reason: &str) -> Result<CompletionReceipt> {
        self.ensure_live()?;
        let workflow = self
            .completion
            .as_mut()
            .ok_or(SessionError::NoCompletionInProgress)?;
        let request = workflow.fail(reason)?;
        self.submit(&request)
    }

    /// Resend the last unacknowledged completion.
    pub fn retry_completion(&mut self) -> Result<CompletionReceipt> {
        self.ensure_live()?;
        let workflow = self
            .completion
            .as_mut()
            .ok_or(SessionError::NoCompletionInProgress)?;
        let request = workflow.retry_request()?;
        self.submit(&request)
    }

    /// Abandon the open completion. The stop keeps its pre-request status.
    pub fn cancel_completion(&mut self) -> Result<()> {
        self.ensure_live()?;
        if self.completion.is_none() {
            return Err(SessionError::NoCompletionInProgress);
        }
        if self.modals.is_open(ModalId::DeliveryCompletion) {
            self.close_modal();
        } else {
            self.abandon_completion();
        }
        Ok(())
    }

    /// Send `request` and settle the stop only on a matching acknowledgement.
    fn submit(&mut self, request: &CompletionRequest) -> Result<CompletionReceipt> {
        let acknowledged = self
            .backend
            .confirm_stop(request)
            .and_then(|ack| ack.verify(request));
        if let Err(e) = acknowledged {
            warn!(stop = %request.stop_id, error = %e, "completion not acknowledged");
            if let Some(workflow) = self.completion.as_mut() {
                workflow.reject();
            }
            return Err(e.into());
        }

        let workflow = self
            .completion
            .as_mut()
            .ok_or(SessionError::NoCompletionInProgress)?;
        let status = workflow.settle()?;
        let cash = workflow.reconciliation();
        let stop_id = workflow.stop_id();

        let route = self.route.as_mut().ok_or(SessionError::NoRoute)?;
        let before = route.current_stop_index();
        route.settle_current(stop_id, status.clone())?;
        route.advance_to_next_stop()?;
        let route_id = route.route().id;
        let route_completed = route.status() == RouteStatus::Completed;
        self.completion = None;

        let event = match status {
            StopStatus::Completed => EventName::DeliveryCompleted,
            _ => EventName::DeliveryFailed,
        };
        self.emit(event, route_id, Some(stop_id));
        self.close_modal();
        self.after_stop_settled(stop_id, before);

        Ok(CompletionReceipt {
            stop_id,
            status,
            cash,
            route_completed,
        })
    }

    fn abandon_completion(&mut self) {
        let Some(workflow) = self.completion.take() else {
            return;
        };
        if let Some(route) = self.route.as_mut() {
            route.restore_current(workflow.stop_id(), workflow.prior_status().clone());
        }
        debug!(stop = %workflow.stop_id(), "completion abandoned");
    }

    /// Publish a stop settling and follow the cursor to the next stop.
    fn after_stop_settled(&mut self, stop_id: Uuid, index_before: usize) {
        let Some(route) = self.route.as_ref() else {
            return;
        };
        let settled = route.stop(stop_id).map(|s| s.status.clone());
        let index = route.current_stop_index();
        let next = route.current_stop().map(|s| (s.id, s.status.clone()));
        let completed = route.status() == RouteStatus::Completed;

        if let Some(status) = settled {
            self.notify(SessionChange::StopStatus { stop_id, status });
        }
        if index != index_before {
            self.notify(SessionChange::CurrentStop(index));
            if let Some((next_id, status)) = next {
                self.notify(SessionChange::StopStatus {
                    stop_id: next_id,
                    status,
                });
            }
        }

        if completed {
            self.stop_navigation();
            self.close_modal();
            self.notify(SessionChange::RouteStatus(RouteStatus::Completed));
        } else if index != index_before && self.is_navigating() {
            self.load_leg();
        }
    }

    // ── Modals ──

    /// Show a modal. The completion modal only opens through [`Self::request_completion`].
    pub fn open_modal(&mut self, id: ModalId) -> Result<()> {
        self.ensure_live()?;
        if id == ModalId::DeliveryCompletion && self.completion.is_none() {
            return Err(SessionError::NoCompletionInProgress);
        }
        self.open_modal_inner(id);
        Ok(())
    }

    /// The single close path for every modal.
    ///
    /// While halted the modal still closes, but an open completion is kept
    /// for after re-authentication.
    pub fn close_modal(&mut self) -> Option<ModalId> {
        let closed = self.modals.close();
        self.modal_closed(closed)
    }

    /// Close button, backdrop tap and back/Escape all land here.
    pub fn dismiss_modal(&mut self, trigger: Dismissal) -> Option<ModalId> {
        let closed = self.modals.dismiss(trigger);
        self.modal_closed(closed)
    }

    fn modal_closed(&mut self, closed: Option<ModalId>) -> Option<ModalId> {
        if let Some(modal) = closed {
            self.after_modal_closed(modal);
            self.notify(SessionChange::Modal(None));
        }
        closed
    }

    fn open_modal_inner(&mut self, id: ModalId) {
        if self.modals.is_open(id) {
            return;
        }
        if let Some(previous) = self.modals.open(id) {
            self.after_modal_closed(previous);
        }
        self.notify(SessionChange::Modal(Some(id)));
    }

    fn after_modal_closed(&mut self, modal: ModalId) {
        if modal == ModalId::DeliveryCompletion && !self.halted {
            self.abandon_completion();
        }
    }

    // ── Identity ──

    /// The driver's identity is no longer valid. Every mutation is refused
    /// until [`Self::reauthenticate`]; route and stop data are kept.
    pub fn invalidate_session(&mut self) {
        if self.halted {
            return;
        }
        warn!(driver = %self.driver.id, "session invalidated; halting");
        self.halted = true;
        self.stop_navigation();
        self.notify(SessionChange::Halted);
    }

    pub fn reauthenticate(&mut self, driver: Driver) -> Result<()> {
        if driver.id != self.driver.id {
            return Err(SessionError::DriverMismatch {
                expected: self.driver.id,
                got: driver.id,
            });
        }
        let online_status = self.driver.online_status;
        self.driver = Driver {
            online_status,
            ..driver
        };
        if self.halted {
            self.halted = false;
            info!(driver = %self.driver.id, "session resumed");
            self.notify(SessionChange::Resumed);
        }
        Ok(())
    }

    fn ensure_live(&self) -> Result<()> {
        if self.halted {
            Err(SessionError::SessionInvalidated)
        } else {
            Ok(())
        }
    }

    /// New work is accepted only online and with no route in progress.
    fn ensure_accepting(&self) -> Result<()> {
        if self.driver.online_status == OnlineStatus::Offline {
            return Err(SessionError::DriverOffline);
        }
        if let Some(current) = &self.route
            && current.is_active()
        {
            return Err(SessionError::AlreadyHasActiveRoute(current.route().id));
        }
        Ok(())
    }

    fn emit(&mut self, name: EventName, route_id: Uuid, stop_id: Option<Uuid>) {
        self.analytics
            .emit(AnalyticsEvent::now(name, route_id, stop_id));
    }
}
