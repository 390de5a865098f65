//! Baseline calibration controller.
//!
//! Decides when the sensor's IAQ baseline is written to the store. Three
//! independent occasions all funnel into the same read-baseline-then-store
//! operation:
//! - clean air held for the stability duration (checked every
//!   [`AUTO_CHECK_INTERVAL_MS`]),
//! - a periodic safety-net every [`BASELINE_AUTO_SAVE_INTERVAL_MS`],
//! - an explicit operator request via [`CalibrationController::save_now`].

use crate::clock::{Interval, Millis};
use crate::error::{CalibrationError, SensorError};
use crate::sensor::{Baseline, GasSensor, Reading};
use crate::stability::StabilityController;
use crate::store::KeyValueStore;
use tracing::{info, warn};

/// Store namespace holding the baseline words.
pub const NAMESPACE: &str = "sgp30";
pub const KEY_ECO2_BASE: &str = "eco2_base";
pub const KEY_TVOC_BASE: &str = "tvoc_base";

/// Cadence of clean-air predicate evaluation (10 s).
pub const AUTO_CHECK_INTERVAL_MS: Millis = 10_000;
/// Unconditional save cadence while a sensor is attached (12 h).
pub const BASELINE_AUTO_SAVE_INTERVAL_MS: Millis = 12 * 60 * 60 * 1000;

/// Why a baseline save happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveReason {
    CleanAirStable,
    Periodic,
    Manual,
}

impl SaveReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaveReason::CleanAirStable => "clean_air_stable",
            SaveReason::Periodic => "periodic",
            SaveReason::Manual => "manual",
        }
    }
}

/// Outcome of an operator-requested save.
#[derive(Debug)]
pub struct ManualSave {
    /// Whether the latest reading satisfied the clean-air predicate.
    pub clean_air: bool,
    pub result: Result<Baseline, CalibrationError>,
}

/// Read the device baseline and persist it.
pub fn save_baseline<S, K>(sensor: &mut S, store: &mut K) -> Result<Baseline, CalibrationError>
where
    S: GasSensor + ?Sized,
    K: KeyValueStore + ?Sized,
{
    let baseline = sensor
        .baseline()
        .map_err(CalibrationError::BaselineReadFailure)?;

    store.open_namespace(NAMESPACE)?;
    let written = store
        .put_u16(KEY_ECO2_BASE, baseline.eco2)
        .and_then(|_| store.put_u16(KEY_TVOC_BASE, baseline.tvoc));
    let closed = store.close_namespace();
    written?;
    closed?;

    Ok(baseline)
}

/// Restore the stored baseline into the device.
///
/// A zero in either stored word means nothing valid was saved; the device
/// keeps its own default baseline in that case.
pub fn load_baseline<S, K>(sensor: &mut S, store: &mut K) -> Result<Baseline, CalibrationError>
where
    S: GasSensor + ?Sized,
    K: KeyValueStore + ?Sized,
{
    store.open_namespace(NAMESPACE)?;
    let eco2 = store.get_u16(KEY_ECO2_BASE, 0);
    let tvoc = store.get_u16(KEY_TVOC_BASE, 0);
    store.close_namespace()?;

    let baseline = Baseline::new(eco2?, tvoc?);
    if !baseline.is_valid() {
        return Err(CalibrationError::BaselineInvalid {
            eco2_base: baseline.eco2,
            tvoc_base: baseline.tvoc,
        });
    }

    sensor
        .set_baseline(baseline)
        .map_err(CalibrationError::BaselineRejected)?;
    Ok(baseline)
}

/// Owns the timers and stability window that gate baseline persistence.
#[derive(Debug, Clone)]
pub struct CalibrationController {
    stability: StabilityController,
    auto_check: Interval,
    auto_save: Interval,
    latest: Option<Reading>,
}

impl CalibrationController {
    /// Create a controller whose timers start counting at `now`.
    pub fn new(now: Millis) -> Self {
        Self::with_stability(StabilityController::new(), now)
    }

    pub fn with_stability(stability: StabilityController, now: Millis) -> Self {
        Self {
            stability,
            auto_check: Interval::starting_at(now, AUTO_CHECK_INTERVAL_MS),
            auto_save: Interval::starting_at(now, BASELINE_AUTO_SAVE_INTERVAL_MS),
            latest: None,
        }
    }

    /// Record the reading produced by this tick.
    pub fn observe(&mut self, reading: Reading) {
        self.latest = Some(reading);
    }

    /// Forget the last reading after a failed measurement.
    ///
    /// Until the next successful [`observe`](Self::observe) the clean-air
    /// predicate is treated as unknown, which closes any open window at the
    /// next check.
    pub fn discard_reading(&mut self) {
        self.latest = None;
    }

    /// Whether the most recent reading satisfies the clean-air predicate.
    pub fn is_clean_air(&self) -> bool {
        self.latest
            .map(|r| self.stability.thresholds().is_clean(r.eco2, r.tvoc))
            .unwrap_or(false)
    }

    /// Whether a clean-air window is currently open.
    pub fn is_clean_air_detected(&self) -> bool {
        self.stability.is_watching()
    }

    /// Seconds until the open window would trigger a save.
    pub fn remaining_secs(&self, now: Millis) -> u64 {
        self.stability.remaining_secs(now)
    }

    /// Which automatic saves fall due at `now`.
    ///
    /// Event-driven and periodic saves are tracked independently; both may
    /// be due in the same call.
    pub fn due(&mut self, now: Millis) -> Vec<SaveReason> {
        let mut due = Vec::new();

        if self.auto_check.poll(now) {
            match self.latest {
                Some(reading) => {
                    if self
                        .stability
                        .evaluate(reading.eco2, reading.tvoc, now)
                        .is_some()
                    {
                        due.push(SaveReason::CleanAirStable);
                    }
                }
                None if self.stability.is_watching() => {
                    info!("No current reading, clean-air window dropped");
                    self.stability.reset();
                }
                None => {}
            }
        }

        if self.auto_save.poll(now) {
            due.push(SaveReason::Periodic);
        }

        due
    }

    /// Persist the current device baseline, logging the outcome.
    pub fn save<S, K>(
        &mut self,
        sensor: &mut S,
        store: &mut K,
        reason: SaveReason,
    ) -> Result<Baseline, CalibrationError>
    where
        S: GasSensor + ?Sized,
        K: KeyValueStore + ?Sized,
    {
        match save_baseline(sensor, store) {
            Ok(baseline) => {
                info!(
                    reason = reason.as_str(),
                    eco2_base = baseline.eco2,
                    tvoc_base = baseline.tvoc,
                    "Baseline saved"
                );
                Ok(baseline)
            }
            Err(e) => {
                warn!(reason = reason.as_str(), "Baseline save failed: {}", e);
                Err(e)
            }
        }
    }

    /// Run every save that is due at `now`.
    pub fn run_due<S, K>(
        &mut self,
        sensor: &mut S,
        store: &mut K,
        now: Millis,
    ) -> Vec<(SaveReason, Result<Baseline, CalibrationError>)>
    where
        S: GasSensor + ?Sized,
        K: KeyValueStore + ?Sized,
    {
        let due = self.due(now);
        let mut results = Vec::with_capacity(due.len());
        for reason in due {
            let result = self.save(sensor, store, reason);
            results.push((reason, result));
        }
        results
    }

    /// Operator override: save immediately, bypassing the stability window
    /// and both timers. The clean-air flag lets the caller warn when the
    /// baseline was captured in dirty air.
    pub fn save_now<S, K>(&mut self, sensor: &mut S, store: &mut K) -> ManualSave
    where
        S: GasSensor + ?Sized,
        K: KeyValueStore + ?Sized,
    {
        let clean_air = self.is_clean_air();
        if !clean_air {
            warn!("Manual baseline save requested outside clean air");
        }
        ManualSave {
            clean_air,
            result: self.save(sensor, store, SaveReason::Manual),
        }
    }

    /// Restore the stored baseline at start-up.
    pub fn load<S, K>(&self, sensor: &mut S, store: &mut K) -> Result<Baseline, CalibrationError>
    where
        S: GasSensor + ?Sized,
        K: KeyValueStore + ?Sized,
    {
        match load_baseline(sensor, store) {
            Ok(baseline) => {
                info!(
                    eco2_base = baseline.eco2,
                    tvoc_base = baseline.tvoc,
                    "Baseline loaded"
                );
                Ok(baseline)
            }
            Err(e @ CalibrationError::BaselineInvalid { .. }) => {
                info!("No valid baseline saved, using sensor defaults");
                Err(e)
            }
            Err(e) => {
                warn!("Failed to load baseline: {}", e);
                Err(e)
            }
        }
    }

    /// Re-initialize the sensor's IAQ algorithm and drop the stability window.
    pub fn reset<S>(&mut self, sensor: &mut S) -> Result<(), SensorError>
    where
        S: GasSensor + ?Sized,
    {
        sensor.reinitialize()?;
        self.stability.reset();
        info!("Baseline reset");
        Ok(())
    }
}
