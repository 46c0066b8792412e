use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::{StatusCode, Url};
use thiserror::Error;

pub mod nws;
pub mod owm;

pub use nws::Nws;
pub use owm::OpenWeatherMap;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const USER_AGENT: &str = concat!("(weatherbot/", env!("CARGO_PKG_VERSION"), ")");

/// One reading from a weather provider, already converted to display units: degrees in the
/// configured scale, wind in mph (Fahrenheit) or km/h (Celsius).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Observation {
    pub temperature: f64,
    pub feels_like: f64,
    pub wind_speed: f64,
    pub wind_gust: f64,
}

#[derive(Debug, Error)]
pub enum FetchError {
    /// Timeouts, connection failures and server-side errors.
    #[error("weather source unavailable: {0}")]
    SourceUnavailable(String),

    /// The provider refused the credential or does not know the station.
    #[error("weather source rejected the request: {0}")]
    AuthFailure(String),

    #[error("malformed observation: {0}")]
    MalformedPayload(String),
}

impl FetchError {
    /// Whether trying the same request again could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::SourceUnavailable(_))
    }

    fn from_status(status: StatusCode, body: &str) -> Self {
        let message = format!(
            "HTTP {}: {}",
            status,
            body.trim().chars().take(200).collect::<String>()
        );

        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => {
                Self::AuthFailure(message)
            }
            _ => Self::SourceUnavailable(message),
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(error: reqwest::Error) -> Self {
        match error.status() {
            Some(status) => Self::from_status(status, ""),
            None if error.is_decode() => Self::MalformedPayload(error.to_string()),
            None => Self::SourceUnavailable(error.to_string()),
        }
    }
}

/// A provider of current conditions. Implementations make exactly one request per call and
/// never retry; retry policy belongs to the caller.
pub trait WeatherSource {
    fn fetch(&mut self) -> Result<Observation, FetchError>;

    /// Human-readable name of the station or place being polled.
    fn describe(&self) -> String;
}

impl<S: WeatherSource + ?Sized> WeatherSource for Box<S> {
    fn fetch(&mut self) -> Result<Observation, FetchError> {
        (**self).fetch()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scale {
    Fahrenheit,
    Celsius,
}

impl Scale {
    pub fn letter(self) -> char {
        match self {
            Self::Fahrenheit => 'F',
            Self::Celsius => 'C',
        }
    }

    /// Wind speed that fills the whole wind bar, in this scale's wind unit.
    pub fn max_wind_speed(self) -> f64 {
        match self {
            Self::Fahrenheit => 75.,
            Self::Celsius => 100.,
        }
    }

    fn wind_unit(self) -> SpeedUnit {
        match self {
            Self::Fahrenheit => SpeedUnit::MilesPerHour,
            Self::Celsius => SpeedUnit::KilometresPerHour,
        }
    }
}

impl FromStr for Scale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "F" | "f" => Ok(Self::Fahrenheit),
            "C" | "c" => Ok(Self::Celsius),
            other => Err(format!("expected F or C, got {:?}", other)),
        }
    }
}

impl fmt::Display for Scale {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Temperature {
    degrees: f64,
    scale: Scale,
}

impl Temperature {
    pub const fn celsius(degrees: f64) -> Self {
        Self {
            degrees,
            scale: Scale::Celsius,
        }
    }

    pub const fn fahrenheit(degrees: f64) -> Self {
        Self {
            degrees,
            scale: Scale::Fahrenheit,
        }
    }

    /// The temperature in degrees of `scale`. No conversion happens when the scales match, so
    /// whole-degree readings survive truncation unchanged.
    pub fn in_scale(&self, scale: Scale) -> f64 {
        match (self.scale, scale) {
            (Scale::Celsius, Scale::Fahrenheit) => self.degrees * 1.8 + 32.,
            (Scale::Fahrenheit, Scale::Celsius) => (self.degrees - 32.) / 1.8,
            _ => self.degrees,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpeedUnit {
    MilesPerHour,
    KilometresPerHour,
    MetresPerSecond,
    Knots,
}

impl SpeedUnit {
    fn kilometres_per_hour(self) -> f64 {
        match self {
            Self::MilesPerHour => 1.609344,
            Self::KilometresPerHour => 1.,
            Self::MetresPerSecond => 3.6,
            Self::Knots => 1.852,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WindSpeed {
    value: f64,
    unit: SpeedUnit,
}

impl WindSpeed {
    pub const fn new(value: f64, unit: SpeedUnit) -> Self {
        Self { value, unit }
    }

    /// The speed in mph for Fahrenheit or km/h for Celsius.
    pub fn in_scale(&self, scale: Scale) -> f64 {
        let target = scale.wind_unit();

        if self.unit == target {
            self.value
        } else {
            self.value * self.unit.kilometres_per_hour() / target.kilometres_per_hour()
        }
    }
}

fn build_client() -> Result<Client, FetchError> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| FetchError::SourceUnavailable(e.to_string()))
}

/// Issue a GET and parse the body as JSON, classifying HTTP failures by status.
fn get_json(client: &Client, url: Url) -> Result<json::JsonValue, FetchError> {
    let response = client.get(url).send()?;
    let status = response.status();
    let body = response.text()?;

    if !status.is_success() {
        return Err(FetchError::from_status(status, &body));
    }

    json::parse(&body).map_err(|e| FetchError::MalformedPayload(e.to_string()))
}
