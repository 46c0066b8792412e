//! Settings come from the environment (optionally seeded from a `.env` file), falling back to
//! compiled-in defaults.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::weather::Scale;

pub const DEFAULT_STATION: &str = "KHEF";
pub const DEFAULT_OWM_STATION: &str = "Haymarket,VA,US";
pub const DEFAULT_POLL_INTERVAL: u64 = 180;
pub const DEFAULT_RESET_INTERVAL: u64 = 60;
pub const DEFAULT_PULSE_DELAY: f64 = 0.05;
pub const DEFAULT_LOG_FILE: &str = "weatherbot.log";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{key}={value:?} is invalid: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub enum Provider {
    /// US National Weather Service, polled by station identifier.
    Nws { station: String },
    /// OpenWeatherMap, polled by place name. The key is checked when the source is built.
    OpenWeatherMap {
        place: String,
        api_key: Option<String>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TemperatureDisplay {
    Actual,
    FeelsLike,
}

impl FromStr for TemperatureDisplay {
    type Err = String;

    /// `1` or `actual` selects the measured temperature; anything else means feels-like.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1" | "actual" => Ok(Self::Actual),
            "" => Err("empty value".to_string()),
            _ => Ok(Self::FeelsLike),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    pub provider: Provider,
    pub poll_interval_secs: u64,
    pub reset_window_minutes: u64,
    pub scale: Scale,
    pub temperature_display: TemperatureDisplay,
    pub pulse_delay: Duration,
    pub rotate: bool,
    pub log_file: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F: Fn(&str) -> Option<String>>(lookup: F) -> Result<Self, ConfigError> {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let provider = match get("WEATHER_PROVIDER", "nws").trim().to_ascii_lowercase().as_str()
        {
            "nws" => Provider::Nws {
                station: get("WEATHER_STATION", DEFAULT_STATION).trim().to_string(),
            },
            "owm" | "openweathermap" => Provider::OpenWeatherMap {
                place: get("OWM_STATION", DEFAULT_OWM_STATION).trim().to_string(),
                api_key: lookup("OWM_API_KEY"),
            },
            other => {
                return Err(invalid(
                    "WEATHER_PROVIDER",
                    other,
                    "expected nws or owm".to_string(),
                ))
            }
        };

        let poll_interval_secs = parse(&lookup, "POLL_INTERVAL", DEFAULT_POLL_INTERVAL)?;
        if poll_interval_secs == 0 {
            return Err(invalid(
                "POLL_INTERVAL",
                "0",
                "must be at least one second".to_string(),
            ));
        }

        let pulse_delay: f64 = parse(&lookup, "KR_PULSE_DELAY", DEFAULT_PULSE_DELAY)?;
        if !(0. ..=10.).contains(&pulse_delay) {
            return Err(invalid(
                "KR_PULSE_DELAY",
                &pulse_delay.to_string(),
                "must be between 0 and 10 seconds".to_string(),
            ));
        }

        Ok(Self {
            provider,
            poll_interval_secs,
            reset_window_minutes: parse(&lookup, "AVG_TEMP_RESET_INTERVAL", DEFAULT_RESET_INTERVAL)?,
            scale: parse(&lookup, "TEMP_SCALE", Scale::Fahrenheit)?,
            temperature_display: parse(
                &lookup,
                "CURRENT_TEMP_DISPLAY",
                TemperatureDisplay::Actual,
            )?,
            pulse_delay: Duration::from_secs_f64(pulse_delay),
            rotate: parse_flag(&lookup, "DISPLAY_ROTATE", true)?,
            log_file: get("WEATHERBOT_LOG", DEFAULT_LOG_FILE).into(),
        })
    }

    /// Human-readable description of what is being polled.
    pub fn station(&self) -> &str {
        match &self.provider {
            Provider::Nws { station } => station,
            Provider::OpenWeatherMap { place, .. } => place,
        }
    }
}

fn invalid(key: &'static str, value: &str, reason: String) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason,
    }
}

fn parse<T, F>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: ToString,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|e: T::Err| invalid(key, &value, e.to_string())),
        None => Ok(default),
    }
}

fn parse_flag<F>(lookup: &F, key: &'static str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key).as_deref().map(str::trim) {
        None => Ok(default),
        Some("1") | Some("true") | Some("yes") | Some("on") => Ok(true),
        Some("0") | Some("false") | Some("no") | Some("off") => Ok(false),
        Some(other) => Err(invalid(key, other, "expected true or false".to_string())),
    }
}
