use std::error;

pub mod font;
pub mod scrollphat;

pub use font::{Font, FONT_3X5};
pub use scrollphat::ScrollPhatHd;

/// Width of the Scroll pHAT HD matrix in pixels.
pub const WIDTH: usize = 17;

/// Height of the Scroll pHAT HD matrix in pixels.
pub const HEIGHT: usize = 7;

pub trait Display {
    type Err: error::Error + Send + Sync + 'static;

    /// Initialize the display.
    fn on(&mut self) -> Result<(), Self::Err>;

    /// Clear the display and power it down.
    fn off(&mut self) -> Result<(), Self::Err>;

    /// Push the full contents of the canvas to the hardware. Brightness values are in the range
    /// `0.0..=1.0`, with 0 being off.
    fn show(&mut self, canvas: &Canvas) -> Result<(), Self::Err>;

    /// Get the dimensions of the display in pixels (width, height).
    fn get_dimensions(&self) -> (usize, usize);
}

/// The pixel buffer that gets flushed to the display. Coordinates outside the matrix are
/// silently dropped, matching the behaviour of the hardware driver.
#[derive(Clone, Debug, PartialEq)]
pub struct Canvas {
    pixels: [f32; WIDTH * HEIGHT],
}

impl Canvas {
    pub fn new() -> Self {
        Self {
            pixels: [0.; WIDTH * HEIGHT],
        }
    }

    pub fn get_pixel(&self, x: usize, y: usize) -> f32 {
        if x < WIDTH && y < HEIGHT {
            self.pixels[y * WIDTH + x]
        } else {
            0.
        }
    }

    pub fn set_pixel(&mut self, x: usize, y: usize, brightness: f32) {
        if x < WIDTH && y < HEIGHT {
            self.pixels[y * WIDTH + x] = if brightness.is_nan() {
                0.
            } else {
                brightness.max(0.).min(1.)
            };
        }
    }

    pub fn clear_rect(&mut self, x: usize, y: usize, width: usize, height: usize) {
        for row in y..(y + height).min(HEIGHT) {
            for column in x..(x + width).min(WIDTH) {
                self.pixels[row * WIDTH + column] = 0.;
            }
        }
    }

    pub fn clear(&mut self) {
        self.pixels = [0.; WIDTH * HEIGHT];
    }

    /// Paint `text` with its top-left corner at `(x, y)`. Characters missing from the font
    /// leave a blank cell. Returns the column just past the last glyph cell.
    pub fn write_string(
        &mut self,
        text: &str,
        x: usize,
        y: usize,
        font: &Font,
        brightness: f32,
    ) -> usize {
        for (i, c) in text.chars().enumerate() {
            let cursor = x + i * (font.width + font.spacing);
            if let Some(rows) = font.glyph(c) {
                for (dy, row) in rows.iter().enumerate() {
                    for dx in 0..font.width {
                        if row & (1 << (font.width - 1 - dx)) != 0 {
                            self.set_pixel(cursor + dx, y + dy, brightness);
                        }
                    }
                }
            }
        }

        x + font.text_width(text)
    }

    /// Whether every pixel inside the rectangle is off.
    pub fn is_blank(&self, x: usize, y: usize, width: usize, height: usize) -> bool {
        (y..(y + height).min(HEIGHT))
            .all(|row| (x..(x + width).min(WIDTH)).all(|column| self.get_pixel(column, row) == 0.))
    }

    /// Rows of brightness values, top to bottom.
    pub fn rows(&self) -> impl Iterator<Item = &[f32]> {
        self.pixels.chunks(WIDTH)
    }
}

impl Default for Canvas {
    fn default() -> Self {
        Self::new()
    }
}
