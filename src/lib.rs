use thiserror::Error;

pub mod config;
pub mod display;
pub mod geometry;
pub mod render;
pub mod scheduler;
pub mod trend;
pub mod weather;

/// Errors that stop the display loop.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Fetch(#[from] weather::FetchError),

    #[error("display transport failed: {0}")]
    Display(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("display is {width}x{height} pixels, expected {expected_width}x{expected_height}")]
    DisplaySize {
        width: usize,
        height: usize,
        expected_width: usize,
        expected_height: usize,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
