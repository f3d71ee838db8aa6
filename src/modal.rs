//! Modal exclusivity: at most one overlay on screen.
//!
//! Opening a modal while another is open replaces it. Every dismissal
//! (close button, backdrop tap, back/Escape) goes through [`ModalStackManager::close`].
//! The page scroll is locked for as long as any modal is open, including
//! across a replacement.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModalId {
    NavigationInstructions,
    RouteInfo,
    AdvancedControls,
    DeliveryCompletion,
    ConfirmGoOffline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModalSize {
    Sheet,
    Fullscreen,
}

impl ModalId {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NavigationInstructions => "navigation-instructions",
            Self::RouteInfo => "route-info",
            Self::AdvancedControls => "advanced-controls",
            Self::DeliveryCompletion => "delivery-completion",
            Self::ConfirmGoOffline => "confirm-go-offline",
        }
    }

    pub fn size(self) -> ModalSize {
        match self {
            Self::NavigationInstructions | Self::DeliveryCompletion | Self::RouteInfo => {
                ModalSize::Fullscreen
            }
            Self::AdvancedControls | Self::ConfirmGoOffline => ModalSize::Sheet,
        }
    }
}

impl fmt::Display for ModalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModalId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "navigation-instructions" => Ok(Self::NavigationInstructions),
            "route-info" => Ok(Self::RouteInfo),
            "advanced-controls" => Ok(Self::AdvancedControls),
            "delivery-completion" => Ok(Self::DeliveryCompletion),
            "confirm-go-offline" => Ok(Self::ConfirmGoOffline),
            other => Err(format!("unknown modal: {other}")),
        }
    }
}

/// How the driver asked to dismiss a modal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dismissal {
    CloseButton,
    Backdrop,
    Escape,
}

/// Stacking order of screen layers, lowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Layer {
    Map,
    Chrome,
    FloatingActions,
    Modal,
}

/// The host's page scroll.
pub trait ScrollLock {
    fn lock(&mut self);
    fn unlock(&mut self);
}

/// For hosts without a scrollable page.
#[derive(Debug, Default)]
pub struct NoScrollLock;

impl ScrollLock for NoScrollLock {
    fn lock(&mut self) {}
    fn unlock(&mut self) {}
}

pub struct ModalStackManager {
    active: Option<ModalId>,
    scroll: Box<dyn ScrollLock>,
    locked: bool,
}

impl ModalStackManager {
    pub fn new(scroll: Box<dyn ScrollLock>) -> Self {
        Self {
            active: None,
            scroll,
            locked: false,
        }
    }

    /// Show `id`, replacing any open modal. Returns the modal it replaced.
    pub fn open(&mut self, id: ModalId) -> Option<ModalId> {
        if self.active == Some(id) {
            return None;
        }
        let replaced = self.active.replace(id);
        if !self.locked {
            self.scroll.lock();
            self.locked = true;
        }
        match replaced {
            Some(previous) => debug!(%previous, modal = %id, "modal replaced"),
            None => debug!(modal = %id, "modal opened"),
        }
        replaced
    }

    /// Hide the open modal, if any, and release the scroll lock. Idempotent.
    pub fn close(&mut self) -> Option<ModalId> {
        let closed = self.active.take();
        if self.locked {
            self.scroll.unlock();
            self.locked = false;
        }
        if let Some(modal) = closed {
            debug!(%modal, "modal closed");
        }
        closed
    }

    /// Every dismissal gesture lands here.
    pub fn dismiss(&mut self, trigger: Dismissal) -> Option<ModalId> {
        debug!(?trigger, "modal dismissal requested");
        self.close()
    }

    pub fn active(&self) -> Option<ModalId> {
        self.active
    }

    pub fn is_open(&self, id: ModalId) -> bool {
        self.active == Some(id)
    }

    pub fn is_scroll_locked(&self) -> bool {
        self.locked
    }

    /// True while a fullscreen modal covers the app chrome.
    pub fn obscures_chrome(&self) -> bool {
        self.active
            .is_some_and(|m| m.size() == ModalSize::Fullscreen)
    }

    /// Layers to draw, bottom to top. The open modal is always last, and the
    /// floating actions are left out while a fullscreen modal covers them.
    pub fn layers(&self) -> Vec<Layer> {
        let mut layers = vec![Layer::Map, Layer::Chrome];
        if !self.obscures_chrome() {
            layers.push(Layer::FloatingActions);
        }
        if self.active.is_some() {
            layers.push(Layer::Modal);
        }
        layers
    }
}

impl Drop for ModalStackManager {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::testing::RecordingScrollLock;

    fn manager() -> (RecordingScrollLock, ModalStackManager) {
        let lock = RecordingScrollLock::default();
        let manager = ModalStackManager::new(Box::new(lock.clone()));
        (lock, manager)
    }

    #[test]
    fn opening_second_modal_replaces_first_and_keeps_scroll_locked() {
        let (lock, mut modals) = manager();

        assert_eq!(modals.open(ModalId::NavigationInstructions), None);
        assert_eq!(
            modals.open(ModalId::RouteInfo),
            Some(ModalId::NavigationInstructions)
        );

        assert_eq!(modals.active(), Some(ModalId::RouteInfo));
        assert!(modals.is_scroll_locked());
        assert_eq!(lock.history(), vec![true]);
    }

    #[test]
    fn close_is_idempotent() {
        let (lock, mut modals) = manager();
        modals.open(ModalId::RouteInfo);

        assert_eq!(modals.close(), Some(ModalId::RouteInfo));
        assert_eq!(modals.close(), None);
        assert!(!modals.is_scroll_locked());
        assert_eq!(lock.history(), vec![true, false]);
    }

    #[test]
    fn every_dismissal_closes() {
        for trigger in [Dismissal::CloseButton, Dismissal::Backdrop, Dismissal::Escape] {
            let (_lock, mut modals) = manager();
            modals.open(ModalId::AdvancedControls);
            assert_eq!(modals.dismiss(trigger), Some(ModalId::AdvancedControls));
            assert_eq!(modals.active(), None);
        }
    }

    #[test]
    fn reopening_same_modal_is_noop() {
        let (lock, mut modals) = manager();
        modals.open(ModalId::RouteInfo);
        assert_eq!(modals.open(ModalId::RouteInfo), None);
        assert_eq!(lock.history(), vec![true]);
    }

    #[test]
    fn drop_releases_scroll() {
        let lock = RecordingScrollLock::default();
        {
            let mut modals = ModalStackManager::new(Box::new(lock.clone()));
            modals.open(ModalId::RouteInfo);
        }
        assert!(!lock.is_locked());
    }

    #[test]
    fn fullscreen_modals_obscure_chrome() {
        let (_lock, mut modals) = manager();
        assert!(!modals.obscures_chrome());

        modals.open(ModalId::AdvancedControls);
        assert!(!modals.obscures_chrome());

        modals.open(ModalId::NavigationInstructions);
        assert!(modals.obscures_chrome());
    }

    #[test]
    fn open_modal_is_the_top_layer() {
        let (_lock, mut modals) = manager();
        assert_eq!(
            modals.layers(),
            [Layer::Map, Layer::Chrome, Layer::FloatingActions]
        );

        modals.open(ModalId::AdvancedControls);
        assert_eq!(modals.layers().last(), Some(&Layer::Modal));
        assert!(modals.layers().contains(&Layer::FloatingActions));
        assert!(modals.layers().is_sorted());

        modals.open(ModalId::RouteInfo);
        assert_eq!(modals.layers(), [Layer::Map, Layer::Chrome, Layer::Modal]);
    }

    #[test]
    fn ids_round_trip_through_strings() {
        assert_eq!(
            "navigation-instructions".parse::<ModalId>().unwrap(),
            ModalId::NavigationInstructions
        );
        assert!("sidebar".parse::<ModalId>().is_err());
    }
}
