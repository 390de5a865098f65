//! Synthetic two-channel signal for running without a sensor.

use crate::sensor::Reading;
use std::f64::consts::PI;

/// Phase advance per generated sample.
const PHASE_STEP: f64 = 0.05;

/// TVOC oscillates as `TVOC_MID + TVOC_AMPLITUDE * sin(phase)`.
pub const TVOC_MID: i32 = 500;
pub const TVOC_AMPLITUDE: f64 = 300.0;

/// eCO2 oscillates as `ECO2_MID + ECO2_AMPLITUDE * cos(phase * ECO2_RATIO)`.
pub const ECO2_MID: i32 = 1200;
pub const ECO2_AMPLITUDE: f64 = 400.0;
const ECO2_RATIO: f64 = 0.7;

/// Common period of both oscillators: 20π is a whole number of cycles of
/// `sin(phase)` (10) and of `cos(0.7 * phase)` (7).
const PHASE_WRAP: f64 = 20.0 * PI;

/// Slowly evolving demo data generator.
#[derive(Debug, Clone, Default)]
pub struct DemoSynthesizer {
    phase: f64,
}

impl DemoSynthesizer {
    pub fn new() -> Self {
        Self { phase: 0.0 }
    }

    /// Advance the shared phase and produce the next reading.
    pub fn next_reading(&mut self) -> Reading {
        self.phase += PHASE_STEP;
        if self.phase >= PHASE_WRAP {
            self.phase -= PHASE_WRAP;
        }

        let tvoc = TVOC_MID + (TVOC_AMPLITUDE * self.phase.sin()) as i32;
        let eco2 = ECO2_MID + (ECO2_AMPLITUDE * (self.phase * ECO2_RATIO).cos()) as i32;

        Reading::new(tvoc as u16, eco2 as u16)
    }
}
