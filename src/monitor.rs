//! Per-tick orchestration.
//!
//! One [`Monitor::tick`] takes a fresh reading (from the sensor, or the demo
//! synthesizer when no sensor is attached), feeds that same snapshot to the
//! graphs, the status panel and the calibration controller, then runs any
//! baseline save that fell due. Operator commands are applied between ticks
//! through [`Monitor::handle_command`].

use crate::calibration::{CalibrationController, ManualSave};
use crate::clock::{Interval, Millis};
use crate::demo::DemoSynthesizer;
use crate::display::Display;
use crate::error::{CalibrationError, SensorError};
use crate::graph::Visualizer;
use crate::ipc_server::{IpcCommand, StatusResponse};
use crate::sensor::{Baseline, GasSensor, Reading};
use crate::store::KeyValueStore;
use crate::ui::{StatusPanel, StatusView, MSG_SAVE_FAILED};
use embedded_graphics::pixelcolor::{Rgb565, RgbColor};
use std::fmt::Debug;
use tracing::{debug, info, warn};

/// Sensor sampling period; the SGP30 IAQ algorithm expects 1 Hz.
pub const SAMPLE_INTERVAL_MS: Millis = 1000;
/// One warm-up countdown step.
pub const COUNTDOWN_STEP_MS: Millis = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    WarmingUp { remaining: u32 },
    Running,
}

pub struct Monitor<S, K, D> {
    sensor: Option<S>,
    store: K,
    display: D,
    demo: DemoSynthesizer,
    calibration: CalibrationController,
    visualizer: Visualizer,
    panel: StatusPanel,
    sample: Interval,
    countdown: Interval,
    phase: Phase,
    /// `None` until the first sample, and again after a failed one.
    reading: Option<Reading>,
}

/// Drawing errors never stop the loop; the next refresh retries.
fn log_draw<T, E: Debug>(what: &str, result: Result<T, E>) {
    if let Err(e) = result {
        warn!("Failed to draw {}: {:?}", what, e);
    }
}

impl<S, K, D> Monitor<S, K, D>
where
    S: GasSensor,
    K: KeyValueStore,
    D: Display,
    D::Error: Debug,
{
    /// `sensor` is `None` when no hardware was found; the monitor then runs
    /// on demo data and every calibration path is disabled.
    pub fn new(
        sensor: Option<S>,
        store: K,
        display: D,
        visualizer: Visualizer,
        warmup_secs: u32,
        now: Millis,
    ) -> Self {
        Self {
            sensor,
            store,
            display,
            demo: DemoSynthesizer::new(),
            calibration: CalibrationController::new(now),
            visualizer,
            panel: StatusPanel::new(now),
            sample: Interval::starting_at(now, SAMPLE_INTERVAL_MS),
            countdown: Interval::starting_at(now, COUNTDOWN_STEP_MS),
            phase: Phase::WarmingUp {
                remaining: warmup_secs,
            },
            reading: None,
        }
    }

    /// Draw the start-up screen and restore the saved baseline.
    ///
    /// Without a sensor the "not found" notice is left on screen; the caller
    /// holds it briefly and then calls [`Monitor::dismiss_sensor_error`].
    pub fn start(&mut self) -> Option<Baseline> {
        log_draw("title", self.panel.draw_title(&mut self.display));

        match self.sensor.as_mut() {
            Some(sensor) => {
                let loaded = self.calibration.load(sensor, &mut self.store).ok();
                log_draw("button guide", self.panel.show_button_guide(&mut self.display));
                loaded
            }
            None => {
                warn!("Gas sensor not found, running in demo mode");
                log_draw("sensor error", self.panel.show_sensor_error(&mut self.display));
                None
            }
        }
    }

    pub fn dismiss_sensor_error(&mut self) {
        log_draw("sensor error", self.panel.dismiss_sensor_error(&mut self.display));
        log_draw("button guide", self.panel.show_button_guide(&mut self.display));
    }

    pub fn is_demo(&self) -> bool {
        self.sensor.is_none()
    }

    pub fn is_warming_up(&self) -> bool {
        matches!(self.phase, Phase::WarmingUp { .. })
    }

    /// Run one polling iteration at `now`.
    pub fn tick(&mut self, now: Millis) {
        if let Phase::WarmingUp { remaining } = self.phase {
            if remaining > 0 {
                if self.countdown.poll(now) {
                    self.phase = Phase::WarmingUp {
                        remaining: remaining - 1,
                    };
                    log_draw(
                        "countdown",
                        self.panel.update_countdown(&mut self.display, remaining - 1),
                    );
                }
                return;
            }
            self.finish_warmup();
        }

        if self.sample.poll(now) {
            match self.next_reading() {
                Ok(reading) => {
                    debug!(tvoc = reading.tvoc, eco2 = reading.eco2, "Sample");
                    self.reading = Some(reading);
                    if self.sensor.is_some() {
                        self.calibration.observe(reading);
                    }
                }
                Err(e) => {
                    warn!("Measurement failed: {}", e);
                    self.reading = None;
                    self.calibration.discard_reading();
                    return;
                }
            }
        }

        if let Some(reading) = self.reading {
            log_draw("graphs", self.visualizer.update(&mut self.display, reading, now));

            let view = self.status_view(reading, now);
            log_draw("status", self.panel.update_values(&mut self.display, &view, now));
        }

        if let Some(sensor) = self.sensor.as_mut() {
            let saves = self.calibration.run_due(sensor, &mut self.store, now);
            if !saves.is_empty() {
                let failed = saves.iter().filter(|(_, r)| r.is_err()).count();
                debug!(ran = saves.len(), failed, "Automatic baseline saves");
            }
        }
    }

    fn finish_warmup(&mut self) {
        log_draw("warm-up screen", self.panel.clear_init_area(&mut self.display));
        log_draw("graph frames", self.visualizer.draw_frames(&mut self.display));
        log_draw("button guide", self.panel.show_button_guide(&mut self.display));
        self.phase = Phase::Running;
        info!("Warm-up complete, monitoring started");
    }

    fn next_reading(&mut self) -> Result<Reading, SensorError> {
        match self.sensor.as_mut() {
            Some(sensor) => sensor.measure(),
            None => Ok(self.demo.next_reading()),
        }
    }

    fn status_view(&self, reading: Reading, now: Millis) -> StatusView {
        StatusView {
            reading,
            sensor_connected: self.sensor.is_some(),
            clean_air_detected: self.calibration.is_clean_air_detected(),
            remaining_secs: self.calibration.remaining_secs(now),
        }
    }

    /// Snapshot for status queries.
    pub fn status(&self, now: Millis) -> StatusResponse {
        let connected = self.sensor.is_some();
        StatusResponse {
            tvoc: self.reading.map(|r| r.tvoc),
            eco2: self.reading.map(|r| r.eco2),
            sensor_connected: connected,
            demo: !connected,
            clean_air: connected && self.calibration.is_clean_air(),
            clean_air_detected: self.calibration.is_clean_air_detected(),
            remaining_secs: self.calibration.remaining_secs(now),
            warming_up: self.is_warming_up(),
        }
    }

    /// Restart the sensor's IAQ algorithm and drop any clean-air window.
    pub fn reset_baseline(&mut self, now: Millis) -> Result<(), CalibrationError> {
        let sensor = self
            .sensor
            .as_mut()
            .ok_or(CalibrationError::SensorNotConnected)?;
        self.calibration
            .reset(sensor)
            .map_err(CalibrationError::ResetFailed)?;
        log_draw("status", self.panel.show_baseline_reset(&mut self.display, now));
        Ok(())
    }

    /// Operator-requested save; skips the stability requirement.
    pub fn save_baseline_now(&mut self, now: Millis) -> Result<ManualSave, CalibrationError> {
        let sensor = self
            .sensor
            .as_mut()
            .ok_or(CalibrationError::SensorNotConnected)?;
        let outcome = self.calibration.save_now(sensor, &mut self.store);
        let drawn = if outcome.result.is_ok() {
            self.panel
                .show_baseline_saved(&mut self.display, outcome.clean_air, now)
        } else {
            self.panel
                .show_message(&mut self.display, MSG_SAVE_FAILED, Rgb565::RED, now)
        };
        log_draw("status", drawn);
        Ok(outcome)
    }

    /// Current device baseline, also shown on the status line.
    pub fn baseline(&mut self, now: Millis) -> Result<Baseline, CalibrationError> {
        let sensor = self
            .sensor
            .as_mut()
            .ok_or(CalibrationError::SensorNotConnected)?;
        let baseline = sensor
            .baseline()
            .map_err(CalibrationError::BaselineReadFailure)?;
        log_draw(
            "status",
            self.panel
                .show_baseline_values(&mut self.display, baseline, now),
        );
        Ok(baseline)
    }

    /// Apply one operator command and build its JSON reply.
    pub fn handle_command(&mut self, command: IpcCommand, now: Millis) -> serde_json::Value {
        match command {
            IpcCommand::ResetBaseline => match self.reset_baseline(now) {
                Ok(()) => {
                    serde_json::json!({ "success": true, "message": "Baseline reset" })
                }
                Err(e) => failure(&e),
            },

            IpcCommand::SaveBaseline => match self.save_baseline_now(now) {
                Ok(ManualSave {
                    clean_air,
                    result: Ok(baseline),
                }) => serde_json::json!({
                    "success": true,
                    "clean_air": clean_air,
                    "eco2_base": baseline.eco2,
                    "tvoc_base": baseline.tvoc,
                }),
                Ok(ManualSave {
                    clean_air,
                    result: Err(e),
                }) => serde_json::json!({
                    "success": false,
                    "clean_air": clean_air,
                    "error": e.to_string(),
                }),
                Err(e) => failure(&e),
            },

            IpcCommand::GetBaseline => match self.baseline(now) {
                Ok(baseline) => serde_json::json!({
                    "success": true,
                    "eco2_base": baseline.eco2,
                    "tvoc_base": baseline.tvoc,
                }),
                Err(e) => failure(&e),
            },

            IpcCommand::GetStatus => serde_json::to_value(self.status(now)).unwrap_or_else(|e| {
                serde_json::json!({
                    "error": format!("Failed to serialize status: {}", e)
                })
            }),
        }
    }
}

fn failure(error: &CalibrationError) -> serde_json::Value {
    serde_json::json!({ "success": false, "error": error.to_string() })
}
