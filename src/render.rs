use std::time::Duration;

use log::debug;

use crate::display::{Canvas, Display, FONT_3X5, HEIGHT, WIDTH};
use crate::geometry::{SweepDirection, WindBar, SWEEP_POSITIONS};
use crate::scheduler::Clock;
use crate::trend::TrendDirection;
use crate::{Error, Result};

pub const BRIGHT: f32 = 0.2;
pub const WIND_BRIGHTNESS: f32 = 0.1;
pub const GUST_BRIGHTNESS: f32 = 0.2;
pub const PULSE_BRIGHTNESS: f32 = 0.2;

/// A rectangle of the canvas owned by one element of the readout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Region {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

/// Digits, top left. Wide readings extend over the trend region.
pub const TEMPERATURE_REGION: Region = Region {
    x: 0,
    y: 0,
    width: 12,
    height: 5,
};

pub const TREND_REGION: Region = Region {
    x: 14,
    y: 0,
    width: 3,
    height: 5,
};

pub const HEARTBEAT_REGION: Region = Region {
    x: 12,
    y: 5,
    width: SWEEP_POSITIONS,
    height: 1,
};

pub const WIND_REGION: Region = Region {
    x: 0,
    y: HEIGHT - 1,
    width: WIDTH,
    height: 1,
};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Timing {
    /// How long a freshly drawn temperature stays up before animation resumes.
    pub dwell: Duration,
    /// Delay after each heartbeat frame.
    pub pulse_delay: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            dwell: Duration::from_secs(1),
            pulse_delay: Duration::from_millis(50),
        }
    }
}

/// Owns the canvas and the display it is flushed to. Every draw call clears the region it
/// owns before painting, so redrawing the same state is idempotent.
pub struct Renderer<D, C> {
    display: D,
    canvas: Canvas,
    clock: C,
    timing: Timing,
    // Columns covered by the last temperature readout.
    temperature_width: usize,
}

impl<D: Display, C: Clock> Renderer<D, C> {
    /// Power up the display and blank it.
    pub fn new(mut display: D, clock: C, timing: Timing) -> Result<Self> {
        let (width, height) = display.get_dimensions();
        if (width, height) != (WIDTH, HEIGHT) {
            return Err(Error::DisplaySize {
                width,
                height,
                expected_width: WIDTH,
                expected_height: HEIGHT,
            });
        }

        display.on().map_err(transport)?;

        let mut renderer = Self {
            display,
            canvas: Canvas::new(),
            clock,
            timing,
            temperature_width: 0,
        };
        renderer.flush()?;

        Ok(renderer)
    }

    pub fn canvas(&self) -> &Canvas {
        &self.canvas
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub fn flush(&mut self) -> Result<()> {
        self.display.show(&self.canvas).map_err(transport)
    }

    fn clear_region(&mut self, region: Region) {
        self.canvas
            .clear_rect(region.x, region.y, region.width, region.height);
    }

    /// Draw the temperature readout after clearing `clear_width` columns of the temperature
    /// rows, then hold it on screen for the dwell time. The clear also covers whatever the
    /// previous readout painted left of the trend arrow, so a shorter reading never leaves
    /// stray digits behind; the arrow's own columns are cleared by `draw_trend`.
    pub fn draw_temperature(&mut self, glyph: &str, clear_width: usize) -> Result<()> {
        self.clear_region(Region {
            width: clear_width.max(self.temperature_width.min(TREND_REGION.x)),
            ..TEMPERATURE_REGION
        });
        self.temperature_width = self.canvas.write_string(
            glyph,
            TEMPERATURE_REGION.x,
            TEMPERATURE_REGION.y,
            &FONT_3X5,
            BRIGHT,
        );
        debug!("Temperature string: [{}]", glyph);

        self.flush()?;
        self.clock.sleep(self.timing.dwell);

        Ok(())
    }

    /// Arrow on the right-hand edge: up for rising, down for falling, nothing for steady.
    pub fn draw_trend(&mut self, direction: TrendDirection) -> Result<()> {
        self.clear_region(TREND_REGION);

        let wings = match direction {
            TrendDirection::Steady => None,
            TrendDirection::Rising => Some(1),
            TrendDirection::Falling => Some(3),
        };

        if let Some(wing_row) = wings {
            let middle = TREND_REGION.x + 1;
            for y in TREND_REGION.y..TREND_REGION.y + TREND_REGION.height {
                self.canvas.set_pixel(middle, y, BRIGHT);
            }
            self.canvas.set_pixel(middle - 1, wing_row, BRIGHT);
            self.canvas.set_pixel(middle + 1, wing_row, BRIGHT);
        }

        self.flush()
    }

    /// Dim line for the wind speed along the bottom row, with a brighter dot where the gusts
    /// reach.
    pub fn draw_wind_bar(&mut self, bar: WindBar) -> Result<()> {
        self.clear_region(WIND_REGION);

        for x in 0..bar.speed_pixels.min(WIND_REGION.width) {
            self.canvas.set_pixel(WIND_REGION.x + x, WIND_REGION.y, WIND_BRIGHTNESS);
        }
        if let Some(gust) = bar.gust_pixel {
            let x = gust.min(WIND_REGION.width) - 1;
            self.canvas.set_pixel(
                WIND_REGION.x + x,
                WIND_REGION.y,
                GUST_BRIGHTNESS.max(WIND_BRIGHTNESS),
            );
        }

        self.flush()
    }

    /// Light heartbeat `position` (1-based), flush and wait out the pulse delay.
    pub fn pulse_heartbeat(&mut self, position: usize, direction: SweepDirection) -> Result<()> {
        self.clear_region(HEARTBEAT_REGION);
        if (1..=HEARTBEAT_REGION.width).contains(&position) {
            self.canvas.set_pixel(
                HEARTBEAT_REGION.x + position - 1,
                HEARTBEAT_REGION.y,
                PULSE_BRIGHTNESS,
            );
        } else {
            debug!("Heartbeat position {} ({:?}) out of range", position, direction);
        }

        self.flush()?;
        self.clock.sleep(self.timing.pulse_delay);

        Ok(())
    }

    pub fn clear_all(&mut self) -> Result<()> {
        self.canvas.clear();
        self.temperature_width = 0;
        self.flush()
    }

    /// Blank the matrix and put the driver into shutdown.
    pub fn off(&mut self) -> Result<()> {
        self.canvas.clear();
        self.display.off().map_err(transport)
    }
}

fn transport<E: std::error::Error + Send + Sync + 'static>(error: E) -> Error {
    Error::Display(Box::new(error))
}
