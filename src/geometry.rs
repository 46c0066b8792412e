//! Mapping from readings to pixels. Everything here is pure; clamping is the only policy.

use crate::display::WIDTH;
use crate::weather::Scale;

/// Columns cleared before a two-digit reading is drawn.
pub const NARROW_CLEAR_WIDTH: usize = 12;

/// Columns cleared before a reading with three characters of digits is drawn.
pub const WIDE_CLEAR_WIDTH: usize = WIDTH;

/// Readings this wide need the columns the trend arrow normally lives in.
fn is_wide(value: f64) -> bool {
    value >= 100. || value <= -10.
}

/// The readout for a temperature: truncated toward zero, with the scale letter appended.
pub fn temperature_glyph(value: f64, scale: Scale) -> String {
    format!("{}{}", value.trunc() as i64, scale.letter())
}

/// How many columns of the temperature region to clear before drawing `value`, wide enough to
/// erase whatever the previous, possibly longer reading left behind.
pub fn temperature_clear_width(value: f64) -> usize {
    if is_wide(value) {
        WIDE_CLEAR_WIDTH
    } else {
        NARROW_CLEAR_WIDTH
    }
}

/// Whether the trend arrow has to give up its columns to the temperature digits.
pub fn trend_glyph_suppressed(value: f64) -> bool {
    is_wide(value)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WindBar {
    /// Length of the wind speed line, from the left edge.
    pub speed_pixels: usize,
    /// 1-based column of the gust marker; `None` when there is no gust to show.
    pub gust_pixel: Option<usize>,
}

/// Scale wind and gust speeds onto a bar `canvas_width` pixels long, where `max_speed` fills
/// the whole bar. Faster winds are clamped to the bar.
pub fn wind_bar(speed: f64, gust: f64, max_speed: f64, canvas_width: usize) -> WindBar {
    let ratio = canvas_width as f64 / max_speed;
    let pixels = |value: f64| {
        let scaled = (ratio * value).floor();
        if scaled.is_nan() || scaled <= 0. {
            0
        } else {
            (scaled as usize).min(canvas_width)
        }
    };

    WindBar {
        speed_pixels: pixels(speed),
        gust_pixel: Some(pixels(gust)).filter(|gust| *gust > 0),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SweepDirection {
    Forward,
    Backward,
}

/// Number of positions in the heartbeat strip.
pub const SWEEP_POSITIONS: usize = 5;

/// One full back-and-forth pass of the heartbeat: out along positions 1-4, then back from 5
/// to 2, so the next pass picks up at 1 without lighting any end twice.
pub fn heartbeat_sweep() -> impl Iterator<Item = (usize, SweepDirection)> {
    (1..SWEEP_POSITIONS)
        .map(|position| (position, SweepDirection::Forward))
        .chain(
            (2..=SWEEP_POSITIONS)
                .rev()
                .map(|position| (position, SweepDirection::Backward)),
        )
}
