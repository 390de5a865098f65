//! Drawing surfaces for the graphs and status panel.
//!
//! Everything is an `embedded-graphics` [`DrawTarget`] over [`Rgb565`].
//! [`Sprite`] is an owned off-screen buffer that can be scrolled in place
//! and pushed to a display at an origin. [`FrameBuffer`] is the headless
//! 320x240 panel; it also remembers which strings are on screen.

use embedded_graphics::{
    mono_font::{ascii::FONT_6X10, MonoTextStyle},
    pixelcolor::Rgb565,
    prelude::*,
    primitives::{Line, PointsIter, PrimitiveStyle, Rectangle},
    text::{Baseline, Text},
};
use std::collections::BTreeMap;
use std::convert::Infallible;

/// Gridline color (RGB565 0x03E0).
pub const DARK_GREEN: Rgb565 = Rgb565::new(0, 31, 0);

/// Width of the default 320x240 panel.
pub const SCREEN_WIDTH: u32 = 320;
/// Height of the default 320x240 panel.
pub const SCREEN_HEIGHT: u32 = 240;

/// Off-screen scrollable pixel buffer, cleared to black.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sprite {
    size: Size,
    pixels: Vec<Rgb565>,
}

impl Sprite {
    pub fn new(size: Size) -> Self {
        Self {
            size,
            pixels: vec![Rgb565::BLACK; size.width as usize * size.height as usize],
        }
    }

    fn index(&self, point: Point) -> Option<usize> {
        let (x, y) = (point.x, point.y);
        if x < 0 || y < 0 || x >= self.size.width as i32 || y >= self.size.height as i32 {
            return None;
        }
        Some(y as usize * self.size.width as usize + x as usize)
    }

    fn set(&mut self, point: Point, color: Rgb565) {
        if let Some(i) = self.index(point) {
            self.pixels[i] = color;
        }
    }

    #[cfg(test)]
    pub fn pixel(&self, point: Point) -> Option<Rgb565> {
        self.index(point).map(|i| self.pixels[i])
    }

    /// Shift every row left by `columns`. Pixels shifted out are lost and
    /// the vacated columns on the right become black.
    pub fn scroll_left(&mut self, columns: u32) {
        let width = self.size.width as usize;
        if width == 0 {
            return;
        }
        let shift = (columns as usize).min(width);
        for row in self.pixels.chunks_exact_mut(width) {
            row.copy_within(shift.., 0);
            row[width - shift..].fill(Rgb565::BLACK);
        }
    }

    pub fn draw_point(&mut self, point: Point, color: Rgb565) {
        self.set(point, color);
    }

    /// One-pixel segment, both endpoints included.
    pub fn draw_line(&mut self, from: Point, to: Point, color: Rgb565) {
        for point in Line::new(from, to).points() {
            self.set(point, color);
        }
    }

    /// Pixels in row-major order.
    pub fn colors(&self) -> impl Iterator<Item = Rgb565> + '_ {
        self.pixels.iter().copied()
    }
}

impl OriginDimensions for Sprite {
    fn size(&self) -> Size {
        self.size
    }
}

impl DrawTarget for Sprite {
    type Color = Rgb565;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            self.set(point, color);
        }
        Ok(())
    }
}

/// Draw `text` in the panel font with its top-left corner at `origin`.
pub fn render_text<D>(display: &mut D, origin: Point, text: &str, color: Rgb565) -> Result<(), D::Error>
where
    D: DrawTarget<Color = Rgb565>,
{
    let style = MonoTextStyle::new(&FONT_6X10, color);
    Text::with_baseline(text, origin, style, Baseline::Top).draw(display)?;
    Ok(())
}

/// The screen the monitor renders to.
///
/// Shapes are drawn with `embedded-graphics` primitives directly; text,
/// clears and sprite pushes go through this trait so a panel can track them.
pub trait Display: DrawTarget<Color = Rgb565> + Sized {
    fn draw_text(&mut self, origin: Point, text: &str, color: Rgb565) -> Result<(), Self::Error> {
        render_text(self, origin, text, color)
    }

    fn draw_number(&mut self, origin: Point, value: i64, color: Rgb565) -> Result<(), Self::Error> {
        self.draw_text(origin, &value.to_string(), color)
    }

    /// Fill `area` with black.
    fn clear_area(&mut self, area: Rectangle) -> Result<(), Self::Error> {
        area.into_styled(PrimitiveStyle::with_fill(Rgb565::BLACK)).draw(self)
    }

    /// Copy `sprite` onto the screen with its top-left corner at `origin`.
    fn push_sprite(&mut self, sprite: &Sprite, origin: Point) -> Result<(), Self::Error> {
        self.fill_contiguous(&Rectangle::new(origin, sprite.size()), sprite.colors())
    }
}

/// In-memory display.
///
/// Text is kept as a layer keyed by origin next to the pixels; clearing an
/// area erases text whose origin lies inside it.
#[derive(Debug, Clone)]
pub struct FrameBuffer {
    plane: Sprite,
    text: BTreeMap<(i32, i32), String>,
}

impl FrameBuffer {
    pub fn new(size: Size) -> Self {
        Self {
            plane: Sprite::new(size),
            text: BTreeMap::new(),
        }
    }

    #[cfg(test)]
    pub fn pixel(&self, point: Point) -> Option<Rgb565> {
        self.plane.pixel(point)
    }

    /// Text whose origin is exactly `(x, y)`.
    #[cfg(test)]
    pub fn text_at(&self, x: i32, y: i32) -> Option<&str> {
        self.text.get(&(x, y)).map(String::as_str)
    }

    /// Whether any visible text contains `needle`.
    #[cfg(test)]
    pub fn shows(&self, needle: &str) -> bool {
        self.text.values().any(|s| s.contains(needle))
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new(Size::new(SCREEN_WIDTH, SCREEN_HEIGHT))
    }
}

impl OriginDimensions for FrameBuffer {
    fn size(&self) -> Size {
        self.plane.size()
    }
}

impl DrawTarget for FrameBuffer {
    type Color = Rgb565;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        self.plane.draw_iter(pixels)
    }
}

impl Display for FrameBuffer {
    fn draw_text(&mut self, origin: Point, text: &str, color: Rgb565) -> Result<(), Self::Error> {
        render_text(&mut self.plane, origin, text, color)?;
        self.text.insert((origin.x, origin.y), text.to_string());
        Ok(())
    }

    fn clear_area(&mut self, area: Rectangle) -> Result<(), Self::Error> {
        self.plane.fill_solid(&area, Rgb565::BLACK)?;
        self.text.retain(|&(x, y), _| !area.contains(Point::new(x, y)));
        Ok(())
    }
}
