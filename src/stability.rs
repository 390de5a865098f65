//! Clean-air stability state machine.
//!
//! Debounces the clean-air predicate over wall-clock time: a calibration
//! trigger fires only once the predicate has held continuously for the
//! stability duration, and any violation restarts the requirement.

use crate::clock::Millis;
use tracing::info;

/// Lowest eCO2 reading (ppm) considered clean air.
pub const ECO2_MIN: u16 = 400;
/// Highest eCO2 reading (ppm) considered clean air.
pub const ECO2_MAX: u16 = 500;
/// Highest TVOC reading (ppb) considered clean air.
pub const TVOC_MAX: u16 = 100;
/// How long clean air must persist before calibration is trusted (10 min).
pub const STABLE_TIME_MS: Millis = 600_000;

/// Debounce state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StabilityState {
    /// Predicate false, or window just consumed by a trigger
    #[default]
    Unstable,
    /// Predicate true since `since`, waiting for the stable duration
    Watching { since: Millis },
}

/// Emitted when clean air has been sustained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationTrigger {
    CleanAirStable,
}

/// Thresholds of the clean-air predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanAirThresholds {
    pub eco2_min: u16,
    pub eco2_max: u16,
    pub tvoc_max: u16,
}

impl CleanAirThresholds {
    pub const DEFAULT: Self = Self {
        eco2_min: ECO2_MIN,
        eco2_max: ECO2_MAX,
        tvoc_max: TVOC_MAX,
    };

    /// `eco2 ∈ [eco2_min, eco2_max] ∧ tvoc ≤ tvoc_max`
    pub fn is_clean(&self, eco2: u16, tvoc: u16) -> bool {
        (self.eco2_min..=self.eco2_max).contains(&eco2) && tvoc <= self.tvoc_max
    }
}

impl Default for CleanAirThresholds {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Edge-triggered debouncer for the clean-air predicate.
#[derive(Debug, Clone)]
pub struct StabilityController {
    state: StabilityState,
    thresholds: CleanAirThresholds,
    stable_time: Millis,
}

impl StabilityController {
    pub fn new() -> Self {
        Self::with_settings(CleanAirThresholds::DEFAULT, STABLE_TIME_MS)
    }

    pub fn with_settings(thresholds: CleanAirThresholds, stable_time: Millis) -> Self {
        Self {
            state: StabilityState::Unstable,
            thresholds,
            stable_time,
        }
    }

    pub fn thresholds(&self) -> CleanAirThresholds {
        self.thresholds
    }

    /// True while a clean-air window is open.
    pub fn is_watching(&self) -> bool {
        matches!(self.state, StabilityState::Watching { .. })
    }

    /// Drop any open window.
    pub fn reset(&mut self) {
        self.state = StabilityState::Unstable;
    }

    /// Whole seconds left before the open window triggers; 0 when idle.
    pub fn remaining_secs(&self, now: Millis) -> u64 {
        match self.state {
            StabilityState::Unstable => 0,
            StabilityState::Watching { since } => {
                let elapsed = now.saturating_sub(since);
                self.stable_time.saturating_sub(elapsed) / 1000
            }
        }
    }

    /// Feed one evaluation of the predicate.
    ///
    /// Returns `Some(CleanAirStable)` exactly once per qualifying stretch, at
    /// the first evaluation where `now - since >= stable_time`.
    pub fn evaluate(&mut self, eco2: u16, tvoc: u16, now: Millis) -> Option<CalibrationTrigger> {
        let clean = self.thresholds.is_clean(eco2, tvoc);

        match self.state {
            StabilityState::Unstable => {
                if clean {
                    info!(eco2, tvoc, "Clean air condition detected, monitoring stability");
                    self.state = StabilityState::Watching { since: now };
                }
                None
            }

            StabilityState::Watching { since } => {
                if !clean {
                    info!(eco2, tvoc, "Clean air condition lost");
                    self.state = StabilityState::Unstable;
                    None
                } else if now.saturating_sub(since) >= self.stable_time {
                    info!(
                        held_ms = now.saturating_sub(since),
                        "Clean air condition stable for required time"
                    );
                    self.state = StabilityState::Unstable;
                    Some(CalibrationTrigger::CleanAirStable)
                } else {
                    None
                }
            }
        }
    }
}

impl Default for StabilityController {
    fn default() -> Self {
        Self::new()
    }
}
