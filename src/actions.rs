//! Floating quick actions over the map.
//!
//! Which actions are enabled is derived from session state on every read.
//! Both actions are always present so the button layout stays put; an
//! action whose precondition does not hold is disabled rather than hidden.

use crate::directions::{DirectionsError, DirectionsProvider};
use crate::model::{Coordinates, Stop};
use crate::navigation::NavigationInstructionEngine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuickActionKind {
    RecalculateRoute,
    EmergencyStop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuickAction {
    pub kind: QuickActionKind,
    pub enabled: bool,
}

/// The state the actions derive from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActionContext {
    pub is_navigating: bool,
    pub has_active_route: bool,
    /// A fullscreen modal is covering the buttons.
    pub obscured: bool,
}

#[derive(Debug, Clone, Default)]
pub struct FloatingActionController {
    is_expanded: bool,
}

impl FloatingActionController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_expanded(&self) -> bool {
        self.is_expanded
    }

    pub fn toggle_expanded(&mut self) -> bool {
        self.is_expanded = !self.is_expanded;
        self.is_expanded
    }

    pub fn collapse(&mut self) {
        self.is_expanded = false;
    }

    /// Buttons are hidden under a fullscreen modal.
    pub fn is_visible(ctx: ActionContext) -> bool {
        !ctx.obscured
    }

    pub fn is_enabled(kind: QuickActionKind, ctx: ActionContext) -> bool {
        if ctx.obscured {
            return false;
        }
        match kind {
            QuickActionKind::RecalculateRoute => ctx.is_navigating,
            QuickActionKind::EmergencyStop => ctx.has_active_route,
        }
    }

    pub fn actions(ctx: ActionContext) -> [QuickAction; 2] {
        [
            QuickActionKind::RecalculateRoute,
            QuickActionKind::EmergencyStop,
        ]
        .map(|kind| QuickAction {
            kind,
            enabled: Self::is_enabled(kind, ctx),
        })
    }

    /// Fetch fresh directions to `stop` and restart `engine` from the first
    /// instruction. Returns `Ok(false)` without fetching when disabled.
    ///
    /// Route progress is never touched here.
    pub fn recalculate_route(
        ctx: ActionContext,
        directions: &mut dyn DirectionsProvider,
        origin: Option<Coordinates>,
        stop: &Stop,
        engine: &mut NavigationInstructionEngine,
    ) -> Result<bool, DirectionsError> {
        if !Self::is_enabled(QuickActionKind::RecalculateRoute, ctx) {
            return Ok(false);
        }
        let leg = directions.directions(origin, stop)?;
        engine.replace_instructions(leg.instructions);
        // An empty leg still resets cleanly; see `reset_to_instruction`.
        engine
            .reset_to_instruction(0)
            .map_err(|e| DirectionsError::Unavailable(e.to_string()))?;
        Ok(true)
    }
}
