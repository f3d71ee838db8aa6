//! Turn-by-turn progression over one leg's instructions.
//!
//! The engine owns a cursor into an immutable instruction list and moves it
//! forward as location samples come in. The cursor only moves backwards via
//! [`NavigationInstructionEngine::reset_to_instruction`].

use tracing::debug;

use crate::config::NavigationConfig;
use crate::geo;
use crate::model::{LocationSample, Maneuver, NavigationInstruction};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NavigationError {
    #[error("instruction index {index} out of range ({len} instructions)")]
    OutOfRange { index: usize, len: usize },
}

/// What the navigation panel shows.
#[derive(Debug, Clone, PartialEq)]
pub struct NavigationDisplay {
    pub text: String,
    pub maneuver: Maneuver,
    pub remaining_distance: String,
    pub remaining_duration: String,
    pub progress_percent: u8,
}

#[derive(Debug, Clone)]
pub struct NavigationInstructionEngine {
    instructions: Vec<NavigationInstruction>,
    current_index: usize,
    /// Distance to the current instruction at the previous sample.
    last_distance_m: Option<f64>,
    /// Whether the final instruction's point has been reached.
    reached_final: bool,
    config: NavigationConfig,
}

impl NavigationInstructionEngine {
    pub fn new(instructions: Vec<NavigationInstruction>, config: NavigationConfig) -> Self {
        Self {
            instructions,
            current_index: 0,
            last_distance_m: None,
            reached_final: false,
            config,
        }
    }

    /// Feed the latest sample. Returns `true` if the current instruction advanced.
    ///
    /// The cursor moves to the next instruction only when the sample lies
    /// within the advance radius of the next instruction's point *and* the
    /// distance to the current instruction's point has grown by more than the
    /// hysteresis since the previous sample. Samples the caller does not
    /// trust (`confident == false`) still update the distance baseline but
    /// never advance.
    pub fn update(&mut self, sample: &LocationSample, confident: bool) -> bool {
        let Some(current) = self.instructions.get(self.current_index) else {
            return false;
        };
        let here = sample.coordinates();
        let to_current = geo::distance_m(here, current.coordinates);

        let Some(next) = self.instructions.get(self.current_index + 1) else {
            if confident && to_current <= self.config.advance_radius_m {
                self.reached_final = true;
            }
            self.last_distance_m = Some(to_current);
            return false;
        };

        let to_next = geo::distance_m(here, next.coordinates);
        let receding = self
            .last_distance_m
            .is_some_and(|previous| to_current > previous + self.config.hysteresis_m);

        if confident && receding && to_next <= self.config.advance_radius_m {
            self.current_index += 1;
            self.last_distance_m = Some(to_next);
            if self.current_index + 1 == self.instructions.len() {
                self.reached_final = true;
            }
            debug!(index = self.current_index, "advanced to next instruction");
            return true;
        }

        self.last_distance_m = Some(to_current);
        false
    }

    /// Move the cursor to `index`, e.g. after a route recalculation.
    pub fn reset_to_instruction(&mut self, index: usize) -> Result<(), NavigationError> {
        let len = self.instructions.len();
        if index >= len && !(index == 0 && len == 0) {
            return Err(NavigationError::OutOfRange { index, len });
        }
        self.current_index = index;
        self.last_distance_m = None;
        self.reached_final = false;
        Ok(())
    }

    /// Swap in a fresh instruction list and return to the first instruction.
    pub fn replace_instructions(&mut self, instructions: Vec<NavigationInstruction>) {
        self.instructions = instructions;
        self.current_index = 0;
        self.last_distance_m = None;
        self.reached_final = false;
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn instructions(&self) -> &[NavigationInstruction] {
        &self.instructions
    }

    pub fn current_instruction(&self) -> Option<&NavigationInstruction> {
        self.instructions.get(self.current_index)
    }

    pub fn next_instruction(&self) -> Option<&NavigationInstruction> {
        self.instructions.get(self.current_index + 1)
    }

    /// Share of the leg's instructions passed, `0..=100`.
    ///
    /// With a single instruction this is 100 once its point is reached, else 0.
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn progress_percent(&self) -> u8 {
        match self.instructions.len() {
            0 => 0,
            1 => {
                if self.reached_final {
                    100
                } else {
                    0
                }
            }
            n => {
                let ratio = self.current_index as f64 / (n - 1) as f64;
                (ratio * 100.0).round().clamp(0.0, 100.0) as u8
            }
        }
    }

    /// Meters left from the current instruction to the end of the leg.
    pub fn remaining_distance_m(&self) -> f64 {
        self.instructions
            .iter()
            .skip(self.current_index)
            .map(|i| i.distance_m)
            .sum()
    }

    /// Seconds left from the current instruction to the end of the leg.
    pub fn remaining_duration_s(&self) -> f64 {
        self.instructions
            .iter()
            .skip(self.current_index)
            .map(|i| i.duration_s)
            .sum()
    }

    pub fn display(&self) -> Option<NavigationDisplay> {
        let current = self.current_instruction()?;
        Some(NavigationDisplay {
            text: current.text.clone(),
            maneuver: current.maneuver,
            remaining_distance: geo::format_distance(self.remaining_distance_m()),
            remaining_duration: geo::format_duration(self.remaining_duration_s()),
            progress_percent: self.progress_percent(),
        })
    }
}
