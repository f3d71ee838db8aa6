//! Online/offline toggling.
//!
//! Going offline only stops new assignments. With a route in progress it is
//! confirmed through a modal first, and the route is never cancelled.

use tracing::info;

use crate::modal::ModalId;
use crate::model::OnlineStatus;

use super::{DriverSessionStore, OfflineOutcome, Result, SessionChange, SessionError};

impl DriverSessionStore {
    pub fn go_online(&mut self) -> Result<()> {
        self.ensure_live()?;
        if self.driver.online_status == OnlineStatus::Online {
            return Ok(());
        }
        self.set_online_status(OnlineStatus::Online)
    }

    /// Go offline, or ask for confirmation first when a route is active.
    pub fn go_offline(&mut self) -> Result<OfflineOutcome> {
        self.ensure_live()?;
        if self.driver.online_status == OnlineStatus::Offline {
            return Ok(OfflineOutcome::WentOffline);
        }
        if self.has_active_route() {
            self.open_modal_inner(ModalId::ConfirmGoOffline);
            return Ok(OfflineOutcome::ConfirmationRequired);
        }
        self.set_online_status(OnlineStatus::Offline)?;
        Ok(OfflineOutcome::WentOffline)
    }

    /// Confirm a pending go-offline request.
    pub fn confirm_go_offline(&mut self) -> Result<()> {
        self.ensure_live()?;
        if !self.modals.is_open(ModalId::ConfirmGoOffline) {
            return Err(SessionError::InvalidTransition(
                "no go-offline confirmation pending".into(),
            ));
        }
        self.set_online_status(OnlineStatus::Offline)?;
        self.close_modal();
        Ok(())
    }

    /// Report `status` to the backend, then apply it locally.
    fn set_online_status(&mut self, status: OnlineStatus) -> Result<()> {
        self.backend.set_online(self.driver.id, status)?;
        self.driver.online_status = status;
        info!(driver = %self.driver.id, status = status.as_str(), "driver status changed");
        self.notify(SessionChange::DriverStatus(status));
        Ok(())
    }
}
