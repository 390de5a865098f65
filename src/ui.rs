//! Status panel: header readings, DEMO tag, warm-up countdown, one-line
//! status messages and the button guide.

use crate::clock::{Interval, Millis};
use crate::display::{Display, SCREEN_WIDTH};
use crate::sensor::{Baseline, Reading};
use embedded_graphics::{pixelcolor::Rgb565, prelude::*, primitives::Rectangle};

/// Minimum time between header refreshes.
pub const UI_UPDATE_INTERVAL_MS: Millis = 1000;
/// How long a status message stays on screen.
pub const MESSAGE_HOLD_MS: Millis = 5000;

pub const MSG_BASELINE_RESET: &str = "Baseline Reset - New calibration needed";
pub const MSG_SAVED_CLEAN: &str = "Baseline Saved in Good Condition";
pub const MSG_SAVED_DIRTY: &str = "Warning: Not Clean Air but Baseline Saved";
pub const MSG_SAVE_FAILED: &str = "Baseline Save Failed";
pub const MSG_SENSOR_NOT_FOUND: &str = "Sensor not found";
pub const MSG_DEMO_MODE: &str = "Running in DEMO mode";
pub const BUTTON_GUIDE: &str = "A: Reset  B: Save Baseline  C: Show Baseline";

const HEADER: Point = Point::new(5, 5);
const STATUS: Point = Point::new(5, 25);
const DEMO_TAG: Point = Point::new(240, 25);
const COUNTDOWN: Point = Point::new(20, 120);

/// What the header and status line reflect on each refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusView {
    pub reading: Reading,
    pub sensor_connected: bool,
    pub clean_air_detected: bool,
    pub remaining_secs: u64,
}

/// Formats `TVOC:<n>ppb eCO2:<n>ppm`.
pub fn header_line(reading: Reading) -> String {
    format!("TVOC:{}ppb eCO2:{}ppm", reading.tvoc, reading.eco2)
}

/// Formats the baseline words for the status line.
pub fn baseline_line(baseline: Baseline) -> String {
    format!("Baseline:eCO2={} TVOC={}", baseline.eco2, baseline.tvoc)
}

/// Full-width band starting at row `y`.
fn band(y: i32, height: u32) -> Rectangle {
    Rectangle::new(Point::new(0, y), Size::new(SCREEN_WIDTH, height))
}

#[derive(Debug, Clone)]
pub struct StatusPanel {
    refresh: Interval,
    message_until: Option<Millis>,
}

impl StatusPanel {
    /// A panel whose refresh rate limit starts counting at `now`.
    pub fn new(now: Millis) -> Self {
        Self {
            refresh: Interval::starting_at(now, UI_UPDATE_INTERVAL_MS),
            message_until: None,
        }
    }

    /// Start-up screen shown before the countdown.
    pub fn draw_title<D: Display>(&self, display: &mut D) -> Result<(), D::Error> {
        display.draw_text(Point::new(80, 0), "AIR MONITOR", Rgb565::WHITE)?;
        display.draw_text(Point::new(30, 80), "Initialization...", Rgb565::WHITE)
    }

    pub fn update_countdown<D: Display>(&self, display: &mut D, count: u32) -> Result<(), D::Error> {
        display.clear_area(Rectangle::new(COUNTDOWN, Size::new(60, 30)))?;
        display.draw_number(COUNTDOWN, i64::from(count), Rgb565::WHITE)
    }

    /// Wipe everything below the header once warm-up ends.
    pub fn clear_init_area<D: Display>(&self, display: &mut D) -> Result<(), D::Error> {
        display.clear_area(band(40, 200))
    }

    pub fn show_sensor_error<D: Display>(&self, display: &mut D) -> Result<(), D::Error> {
        display.clear_area(band(40, 60))?;
        display.draw_text(Point::new(30, 50), MSG_SENSOR_NOT_FOUND, Rgb565::RED)?;
        display.draw_text(Point::new(30, 80), MSG_DEMO_MODE, Rgb565::RED)
    }

    pub fn dismiss_sensor_error<D: Display>(&self, display: &mut D) -> Result<(), D::Error> {
        display.clear_area(band(40, 100))
    }

    pub fn show_button_guide<D: Display>(&self, display: &mut D) -> Result<(), D::Error> {
        display.draw_text(Point::new(10, 220), BUTTON_GUIDE, Rgb565::WHITE)
    }

    /// Whether a status message is still being held at `now`.
    pub fn message_active(&self, now: Millis) -> bool {
        self.message_until.is_some_and(|until| now < until)
    }

    fn clear_status_area<D: Display>(&self, display: &mut D) -> Result<(), D::Error> {
        display.clear_area(Rectangle::new(
            STATUS,
            Size::new(SCREEN_WIDTH - STATUS.x as u32, 15),
        ))
    }

    /// Put `text` on the status line for [`MESSAGE_HOLD_MS`].
    pub fn show_message<D: Display>(
        &mut self,
        display: &mut D,
        text: &str,
        color: Rgb565,
        now: Millis,
    ) -> Result<(), D::Error> {
        self.message_until = Some(now + MESSAGE_HOLD_MS);
        self.clear_status_area(display)?;
        display.draw_text(STATUS, text, color)
    }

    pub fn show_baseline_reset<D: Display>(&mut self, display: &mut D, now: Millis) -> Result<(), D::Error> {
        self.show_message(display, MSG_BASELINE_RESET, Rgb565::RED, now)
    }

    pub fn show_baseline_saved<D: Display>(
        &mut self,
        display: &mut D,
        clean_air: bool,
        now: Millis,
    ) -> Result<(), D::Error> {
        if clean_air {
            self.show_message(display, MSG_SAVED_CLEAN, Rgb565::GREEN, now)
        } else {
            self.show_message(display, MSG_SAVED_DIRTY, Rgb565::YELLOW, now)
        }
    }

    pub fn show_baseline_values<D: Display>(
        &mut self,
        display: &mut D,
        baseline: Baseline,
        now: Millis,
    ) -> Result<(), D::Error> {
        self.show_message(display, &baseline_line(baseline), Rgb565::YELLOW, now)
    }

    /// Refresh the header and status line, at most once per
    /// [`UI_UPDATE_INTERVAL_MS`]. Returns whether anything was redrawn.
    pub fn update_values<D: Display>(
        &mut self,
        display: &mut D,
        view: &StatusView,
        now: Millis,
    ) -> Result<bool, D::Error> {
        if !self.refresh.poll(now) {
            return Ok(false);
        }

        display.clear_area(Rectangle::new(Point::zero(), Size::new(SCREEN_WIDTH - 1, 25)))?;
        display.draw_text(HEADER, &header_line(view.reading), Rgb565::WHITE)?;

        if !self.message_active(now) {
            self.message_until = None;
            self.clear_status_area(display)?;
            if view.sensor_connected && view.clean_air_detected {
                let line = format!("Clean air detected: {} s", view.remaining_secs);
                display.draw_text(STATUS, &line, Rgb565::GREEN)?;
            }
        }

        if !view.sensor_connected {
            display.draw_text(DEMO_TAG, "DEMO", Rgb565::YELLOW)?;
        }

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::FrameBuffer;

    fn view(sensor_connected: bool) -> StatusView {
        StatusView {
            reading: Reading::new(120, 830),
            sensor_connected,
            clean_air_detected: false,
            remaining_secs: 0,
        }
    }

    #[test]
    fn test_header_format() {
        assert_eq!(header_line(Reading::new(12, 415)), "TVOC:12ppb eCO2:415ppm");
        assert_eq!(
            baseline_line(Baseline::new(0x8A2B, 0x9163)),
            "Baseline:eCO2=35371 TVOC=37219"
        );
    }

    #[test]
    fn test_update_is_rate_limited_from_creation() {
        let mut fb = FrameBuffer::default();
        let mut panel = StatusPanel::new(3_000);

        assert!(!panel.update_values(&mut fb, &view(true), 3_500).unwrap());
        assert!(panel.update_values(&mut fb, &view(true), 4_000).unwrap());
        assert_eq!(fb.text_at(5, 5), Some("TVOC:120ppb eCO2:830ppm"));
        assert!(!panel.update_values(&mut fb, &view(true), 4_999).unwrap());
    }

    #[test]
    fn test_demo_tag_only_without_sensor() {
        let mut fb = FrameBuffer::default();
        let mut panel = StatusPanel::new(0);

        panel.update_values(&mut fb, &view(false), 1000).unwrap();
        assert_eq!(fb.text_at(240, 25), Some("DEMO"));

        let mut fb = FrameBuffer::default();
        let mut panel = StatusPanel::new(0);
        panel.update_values(&mut fb, &view(true), 1000).unwrap();
        assert_eq!(fb.text_at(240, 25), None);
    }

    #[test]
    fn test_message_expires_without_blocking() {
        let mut fb = FrameBuffer::default();
        let mut panel = StatusPanel::new(0);

        panel.show_baseline_saved(&mut fb, false, 1000).unwrap();
        assert_eq!(fb.text_at(5, 25), Some(MSG_SAVED_DIRTY));
        assert!(panel.message_active(1000));

        panel.update_values(&mut fb, &view(true), 2000).unwrap();
        assert_eq!(fb.text_at(5, 25), Some(MSG_SAVED_DIRTY));

        panel.update_values(&mut fb, &view(true), 1000 + MESSAGE_HOLD_MS).unwrap();
        assert_eq!(fb.text_at(5, 25), None);
        assert!(!panel.message_active(1000 + MESSAGE_HOLD_MS));
    }

    #[test]
    fn test_clean_air_progress_line() {
        let mut fb = FrameBuffer::default();
        let mut panel = StatusPanel::new(0);
        let v = StatusView {
            clean_air_detected: true,
            remaining_secs: 420,
            ..view(true)
        };

        panel.update_values(&mut fb, &v, 1000).unwrap();
        assert_eq!(fb.text_at(5, 25), Some("Clean air detected: 420 s"));

        panel.update_values(&mut fb, &view(true), 2000).unwrap();
        assert_eq!(fb.text_at(5, 25), None);
    }

    #[test]
    fn test_sensor_error_screen() {
        let mut fb = FrameBuffer::default();
        let panel = StatusPanel::new(0);

        panel.draw_title(&mut fb).unwrap();
        panel.show_sensor_error(&mut fb).unwrap();
        assert!(fb.shows(MSG_SENSOR_NOT_FOUND));
        assert_eq!(fb.text_at(30, 80), Some(MSG_DEMO_MODE));

        panel.dismiss_sensor_error(&mut fb).unwrap();
        assert!(!fb.shows(MSG_SENSOR_NOT_FOUND));
        assert_eq!(fb.text_at(80, 0), Some("AIR MONITOR"));
    }

    #[test]
    fn test_countdown_replaces_previous_number() {
        let mut fb = FrameBuffer::default();
        let panel = StatusPanel::new(0);

        panel.update_countdown(&mut fb, 15).unwrap();
        panel.update_countdown(&mut fb, 14).unwrap();
        assert_eq!(fb.text_at(20, 120), Some("14"));
    }
}
