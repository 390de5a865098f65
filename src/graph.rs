//! Rolling timeseries visualizer.
//!
//! Each channel owns a sprite exactly as wide as its graph. A qualifying
//! plot scrolls the sprite one column left, draws the newest sample at the
//! rightmost column (joined to the previous sample by a line), and pushes
//! the sprite to the screen. History only exists as the pixels currently on
//! screen.

use crate::clock::{Interval, Millis};
use crate::display::{Display, Sprite, DARK_GREEN};
use crate::error::GraphError;
use crate::sensor::Reading;
use embedded_graphics::{
    pixelcolor::Rgb565,
    prelude::*,
    primitives::{Line, PrimitiveStyle, Rectangle, RoundedRectangle},
};

/// Minimum time between two plotted samples of one channel.
pub const GRAPH_UPDATE_INTERVAL_MS: Millis = 1000;

const LABEL_SIZE: Size = Size::new(16, 10);
const BORDER_RADIUS: u32 = 2;
const VERTICAL_DIVISIONS: i32 = 5;

/// The two monitored quantities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Tvoc,
    Eco2,
}

impl Channel {
    pub const ALL: [Channel; 2] = [Channel::Tvoc, Channel::Eco2];

    /// This channel's value in `reading`.
    pub fn value(self, reading: Reading) -> u16 {
        match self {
            Channel::Tvoc => reading.tvoc,
            Channel::Eco2 => reading.eco2,
        }
    }
}

/// Static placement and value range of one graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphScale {
    origin: Point,
    size: Size,
    min: u16,
    mid: u16,
    max: u16,
}

impl GraphScale {
    /// Validate and build a scale. Requires `min < mid < max` and a
    /// non-empty pixel area.
    pub fn new(origin: Point, size: Size, min: u16, mid: u16, max: u16) -> Result<Self, GraphError> {
        if !(min < mid && mid < max) {
            return Err(GraphError::DegenerateScale { min, mid, max });
        }
        if size.width == 0 || size.height == 0 {
            return Err(GraphError::EmptyArea {
                width: size.width,
                height: size.height,
            });
        }

        Ok(Self {
            origin,
            size,
            min,
            mid,
            max,
        })
    }

    /// TVOC graph: 300x80 at (18, 40), 0..1000 ppb.
    pub fn tvoc() -> Result<Self, GraphError> {
        Self::new(Point::new(18, 40), Size::new(300, 80), 0, 500, 1000)
    }

    /// eCO2 graph: 300x80 at (18, 130), 400..5000 ppm.
    pub fn eco2() -> Result<Self, GraphError> {
        Self::new(Point::new(18, 130), Size::new(300, 80), 400, 2700, 5000)
    }

    /// Map `value` to a sprite row, inverted so larger values sit higher.
    ///
    /// Returns `height` at or below `min` and `0` at or above `max`.
    pub fn value_to_y(&self, value: u16) -> i32 {
        let height = self.size.height as i32;
        if value <= self.min {
            return height;
        }
        if value >= self.max {
            return 0;
        }

        let normalized = f64::from(value - self.min) / f64::from(self.max - self.min);
        height - (normalized * f64::from(self.size.height)) as i32
    }
}

/// One channel's scroll buffer and plotting state.
#[derive(Debug, Clone)]
pub struct ScrollGraph {
    scale: GraphScale,
    color: Rgb565,
    sprite: Sprite,
    y_prev: i32,
    first: bool,
    interval: Interval,
}

impl ScrollGraph {
    /// A blank graph whose rate limit starts counting at `now`.
    pub fn new(scale: GraphScale, color: Rgb565, now: Millis) -> Self {
        Self {
            scale,
            color,
            sprite: Sprite::new(scale.size),
            y_prev: 0,
            first: true,
            interval: Interval::starting_at(now, GRAPH_UPDATE_INTERVAL_MS),
        }
    }

    /// Plot `value` if the update interval has elapsed.
    ///
    /// Returns whether anything was drawn.
    pub fn plot<D: Display>(&mut self, display: &mut D, value: u16, now: Millis) -> Result<bool, D::Error> {
        if !self.interval.poll(now) {
            return Ok(false);
        }

        self.sprite.scroll_left(1);

        let bottom = self.scale.size.height as i32 - 1;
        let x = self.scale.size.width as i32 - 1;
        let y = self.scale.value_to_y(value);
        // `height` is one past the last row; pin it to the bottom edge.
        let row = y.min(bottom);

        if self.first {
            self.sprite.draw_point(Point::new(x, row), self.color);
            self.first = false;
        } else {
            let prev_row = self.y_prev.min(bottom);
            self.sprite
                .draw_line(Point::new(x - 1, prev_row), Point::new(x, row), self.color);
        }
        self.y_prev = y;

        display.push_sprite(&self.sprite, self.scale.origin)?;
        Ok(true)
    }

    /// Border, axis labels and gridlines around the graph area.
    pub fn draw_frame<D: Display>(&self, display: &mut D) -> Result<(), D::Error> {
        let GraphScale {
            origin,
            size,
            min,
            mid,
            max,
        } = self.scale;
        let (x, y) = (origin.x, origin.y);
        let (w, h) = (size.width as i32, size.height as i32);

        RoundedRectangle::with_equal_corners(
            Rectangle::new(Point::new(x - 1, y), size + Size::new(2, 2)),
            Size::new(BORDER_RADIUS, BORDER_RADIUS),
        )
        .into_styled(PrimitiveStyle::with_stroke(Rgb565::WHITE, 1))
        .draw(display)?;

        let labels = [(y + 3, max), (y + h / 2, mid), (y + h - 11, min)];
        for (row, _) in labels {
            display.clear_area(Rectangle::new(Point::new(0, row), LABEL_SIZE))?;
        }
        for (row, value) in labels {
            display.draw_number(Point::new(0, row), i64::from(value), self.color)?;
        }

        let grid = PrimitiveStyle::with_stroke(DARK_GREEN, 1);
        for row in [y + 13, y + h / 2 + 10, y + h - 1] {
            Line::new(Point::new(x, row), Point::new(x + w, row))
                .into_styled(grid)
                .draw(display)?;
        }

        let spacing = w / VERTICAL_DIVISIONS;
        for i in 1..VERTICAL_DIVISIONS {
            let gx = x + i * spacing;
            Line::new(Point::new(gx, y + 1), Point::new(gx, y + h - 1))
                .into_styled(grid)
                .draw(display)?;
        }
        Ok(())
    }
}

/// Both channel graphs.
#[derive(Debug, Clone)]
pub struct Visualizer {
    tvoc: ScrollGraph,
    eco2: ScrollGraph,
}

impl Visualizer {
    pub fn new(tvoc: ScrollGraph, eco2: ScrollGraph) -> Self {
        Self { tvoc, eco2 }
    }

    /// Magenta TVOC graph above a cyan eCO2 graph.
    pub fn with_default_scales(now: Millis) -> Result<Self, GraphError> {
        Ok(Self::new(
            ScrollGraph::new(GraphScale::tvoc()?, Rgb565::MAGENTA, now),
            ScrollGraph::new(GraphScale::eco2()?, Rgb565::CYAN, now),
        ))
    }

    fn graph_mut(&mut self, channel: Channel) -> &mut ScrollGraph {
        match channel {
            Channel::Tvoc => &mut self.tvoc,
            Channel::Eco2 => &mut self.eco2,
        }
    }

    /// Plot one channel; rate-limited per channel.
    pub fn plot<D: Display>(
        &mut self,
        display: &mut D,
        channel: Channel,
        value: u16,
        now: Millis,
    ) -> Result<bool, D::Error> {
        self.graph_mut(channel).plot(display, value, now)
    }

    /// Plot both channels from one reading, then redraw the frames the
    /// pushed sprites covered.
    pub fn update<D: Display>(&mut self, display: &mut D, reading: Reading, now: Millis) -> Result<bool, D::Error> {
        let mut plotted = false;
        for channel in Channel::ALL {
            plotted |= self.plot(display, channel, channel.value(reading), now)?;
        }
        if plotted {
            self.draw_frames(display)?;
        }
        Ok(plotted)
    }

    pub fn draw_frames<D: Display>(&self, display: &mut D) -> Result<(), D::Error> {
        self.tvoc.draw_frame(display)?;
        self.eco2.draw_frame(display)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::FrameBuffer;
    use proptest::prelude::*;

    fn small_scale() -> GraphScale {
        GraphScale::new(Point::zero(), Size::new(10, 8), 0, 50, 100).unwrap()
    }

    fn lit_rows(sprite: &Sprite, x: i32, color: Rgb565) -> Vec<i32> {
        (0..sprite.size().height as i32)
            .filter(|y| sprite.pixel(Point::new(x, *y)) == Some(color))
            .collect()
    }

    #[test]
    fn test_eco2_mapping_reference_points() {
        let scale = GraphScale::eco2().unwrap();
        assert_eq!(scale.value_to_y(400), 80);
        assert_eq!(scale.value_to_y(5000), 0);
        assert!((scale.value_to_y(2700) - 40).abs() <= 1);
    }

    #[test]
    fn test_mapping_clamps_outside_range() {
        let scale = GraphScale::eco2().unwrap();
        assert_eq!(scale.value_to_y(0), 80);
        assert_eq!(scale.value_to_y(399), 80);
        assert_eq!(scale.value_to_y(5001), 0);
        assert_eq!(scale.value_to_y(u16::MAX), 0);
    }

    #[test]
    fn test_degenerate_scales_rejected() {
        let size = Size::new(10, 10);
        assert_eq!(
            GraphScale::new(Point::zero(), size, 100, 100, 100),
            Err(GraphError::DegenerateScale {
                min: 100,
                mid: 100,
                max: 100
            })
        );
        assert!(GraphScale::new(Point::zero(), size, 0, 600, 500).is_err());
        assert!(GraphScale::new(Point::zero(), size, 500, 600, 400).is_err());
        assert_eq!(
            GraphScale::new(Point::zero(), Size::new(0, 10), 0, 1, 2),
            Err(GraphError::EmptyArea {
                width: 0,
                height: 10
            })
        );
    }

    #[test]
    fn test_default_scales_are_valid() {
        let visualizer = Visualizer::with_default_scales(0).unwrap();
        let tvoc = visualizer.tvoc.scale;
        assert_eq!((tvoc.min, tvoc.mid, tvoc.max), (0, 500, 1000));
        assert_eq!(visualizer.eco2.scale.origin, Point::new(18, 130));
    }

    #[test]
    fn test_plot_is_rate_limited_from_creation() {
        let mut fb = FrameBuffer::default();
        let mut graph = ScrollGraph::new(small_scale(), Rgb565::MAGENTA, 5_000);

        assert!(!graph.plot(&mut fb, 50, 5_500).unwrap());
        assert!(graph.plot(&mut fb, 50, 6_000).unwrap());
        assert!(!graph.plot(&mut fb, 50, 6_010).unwrap());
        assert!(!graph.plot(&mut fb, 50, 6_999).unwrap());
        assert!(graph.plot(&mut fb, 50, 7_000).unwrap());
    }

    #[test]
    fn test_first_sample_is_single_point() {
        let mut fb = FrameBuffer::default();
        let mut graph = ScrollGraph::new(small_scale(), Rgb565::MAGENTA, 0);

        graph.plot(&mut fb, 50, 1000).unwrap();
        assert_eq!(lit_rows(&graph.sprite, 9, Rgb565::MAGENTA), vec![4]);
        assert!(lit_rows(&graph.sprite, 8, Rgb565::MAGENTA).is_empty());
    }

    #[test]
    fn test_subsequent_samples_are_joined() {
        let mut fb = FrameBuffer::default();
        let mut graph = ScrollGraph::new(small_scale(), Rgb565::CYAN, 0);

        graph.plot(&mut fb, 0, 1000).unwrap();
        graph.plot(&mut fb, 100, 2000).unwrap();

        // Previous sample pinned to the bottom row, new one to the top.
        let sprite = &graph.sprite;
        assert_eq!(sprite.pixel(Point::new(8, 7)), Some(Rgb565::CYAN));
        assert_eq!(sprite.pixel(Point::new(9, 0)), Some(Rgb565::CYAN));
        let mut rows = lit_rows(sprite, 8, Rgb565::CYAN);
        rows.extend(lit_rows(sprite, 9, Rgb565::CYAN));
        rows.sort_unstable();
        rows.dedup();
        assert_eq!(rows, (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn test_oldest_sample_gone_after_width_plus_one_updates() {
        let mut fb = FrameBuffer::default();
        let scale = small_scale();
        let mut graph = ScrollGraph::new(scale, Rgb565::MAGENTA, 0);

        // One sample at the top, then `width` samples at the bottom.
        graph.plot(&mut fb, 100, 1000).unwrap();
        for i in 0..u64::from(scale.size.width) {
            graph.plot(&mut fb, 0, 2000 + i * 1000).unwrap();
        }

        let top_row: Vec<_> = (0..scale.size.width as i32)
            .filter(|x| graph.sprite.pixel(Point::new(*x, 0)) == Some(Rgb565::MAGENTA))
            .collect();
        assert!(top_row.is_empty(), "top sample still visible at {:?}", top_row);
    }

    #[test]
    fn test_plot_pushes_sprite_at_origin() {
        let mut fb = FrameBuffer::default();
        let scale = GraphScale::new(Point::new(20, 30), Size::new(10, 8), 0, 50, 100).unwrap();
        let mut graph = ScrollGraph::new(scale, Rgb565::MAGENTA, 0);

        graph.plot(&mut fb, 100, 1000).unwrap();
        assert_eq!(fb.pixel(Point::new(29, 30)), Some(Rgb565::MAGENTA));
    }

    #[test]
    fn test_update_redraws_frames_with_labels() {
        let mut fb = FrameBuffer::default();
        let mut visualizer = Visualizer::with_default_scales(0).unwrap();
        let reading = Reading::new(100, 450);

        assert!(!visualizer.update(&mut fb, reading, 10).unwrap());
        assert!(!fb.shows("2700"));

        assert!(visualizer.update(&mut fb, reading, 1000).unwrap());
        assert_eq!(fb.text_at(0, 43), Some("1000"));
        assert_eq!(fb.text_at(0, 80), Some("500"));
        assert_eq!(fb.text_at(0, 109), Some("0"));
        assert_eq!(fb.text_at(0, 133), Some("5000"));
        assert_eq!(fb.text_at(0, 170), Some("2700"));
        assert_eq!(fb.text_at(0, 199), Some("400"));

        // Gridlines overlay the pushed sprite.
        assert_eq!(fb.pixel(Point::new(30, 53)), Some(DARK_GREEN));
        assert_eq!(fb.pixel(Point::new(18 + 60, 100)), Some(DARK_GREEN));
    }

    #[test]
    fn test_channels_plot_independently() {
        let mut fb = FrameBuffer::default();
        let mut visualizer = Visualizer::with_default_scales(0).unwrap();

        assert!(visualizer.plot(&mut fb, Channel::Tvoc, 500, 1000).unwrap());
        assert!(visualizer.plot(&mut fb, Channel::Eco2, 2700, 1000).unwrap());
        assert!(!visualizer.plot(&mut fb, Channel::Tvoc, 500, 1500).unwrap());
    }

    proptest! {
        #[test]
        fn prop_mapping_is_monotone_non_increasing(a in any::<u16>(), b in any::<u16>()) {
            let scale = GraphScale::eco2().unwrap();
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(scale.value_to_y(lo) >= scale.value_to_y(hi));
        }

        #[test]
        fn prop_mapping_stays_in_bounds(value in any::<u16>()) {
            let scale = GraphScale::tvoc().unwrap();
            let y = scale.value_to_y(value);
            prop_assert!((0..=scale.size.height as i32).contains(&y));
        }
    }
}
