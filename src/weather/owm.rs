//! OpenWeatherMap current weather endpoint.

use std::convert::TryFrom;

use reqwest::blocking::Client;
use reqwest::Url;

use super::{
    build_client, get_json, FetchError, Observation, Scale, SpeedUnit, Temperature,
    WeatherSource, WindSpeed,
};

const API_URL: &str = "https://api.openweathermap.org/data/2.5/weather";

pub struct OpenWeatherMap {
    client: Client,
    place: String,
    url: Url,
    scale: Scale,
}

impl OpenWeatherMap {
    pub fn new(place: &str, api_key: Option<&str>, scale: Scale) -> Result<Self, FetchError> {
        let api_key = api_key
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or_else(|| {
                FetchError::AuthFailure("No API key (did you set OWM_API_KEY?)".to_string())
            })?;

        Ok(Self {
            client: build_client()?,
            place: place.to_string(),
            url: weather_url(place, api_key, scale)?,
            scale,
        })
    }
}

impl WeatherSource for OpenWeatherMap {
    fn fetch(&mut self) -> Result<Observation, FetchError> {
        let report = OwmObservation::try_from(get_json(&self.client, self.url.clone())?)?;
        Ok(report.observation(self.scale))
    }

    fn describe(&self) -> String {
        format!("OpenWeatherMap {}", self.place)
    }
}

fn units(scale: Scale) -> &'static str {
    match scale {
        Scale::Fahrenheit => "imperial",
        Scale::Celsius => "metric",
    }
}

fn weather_url(place: &str, api_key: &str, scale: Scale) -> Result<Url, FetchError> {
    Url::parse_with_params(
        API_URL,
        &[("q", place), ("appid", api_key), ("units", units(scale))],
    )
    .map_err(|e| FetchError::AuthFailure(e.to_string()))
}

/// ```json
/// {
///     "main": { "temp": 72.0, "feels_like": 71.2, "pressure": 1017, "humidity": 40 },
///     "wind": { "speed": 10.0, "deg": 320, "gust": 20.0 },
///     "name": "Haymarket"
/// }
/// ```
///
/// Values are in the unit system requested by the query: imperial gives Fahrenheit and mph,
/// metric gives Celsius and m/s.
struct OwmObservation {
    temp: f64,
    feels_like: Option<f64>,
    wind_speed: Option<f64>,
    wind_gust: Option<f64>,
}

impl OwmObservation {
    fn observation(&self, scale: Scale) -> Observation {
        let (temperature, wind): (fn(f64) -> Temperature, SpeedUnit) = match scale {
            Scale::Fahrenheit => (Temperature::fahrenheit, SpeedUnit::MilesPerHour),
            Scale::Celsius => (Temperature::celsius, SpeedUnit::MetresPerSecond),
        };
        let wind_speed = |value: Option<f64>| {
            value.map_or(0., |value| WindSpeed::new(value, wind).in_scale(scale))
        };

        Observation {
            temperature: temperature(self.temp).in_scale(scale),
            feels_like: temperature(self.feels_like.unwrap_or(self.temp)).in_scale(scale),
            wind_speed: wind_speed(self.wind_speed),
            wind_gust: wind_speed(self.wind_gust),
        }
    }
}

impl TryFrom<json::JsonValue> for OwmObservation {
    type Error = FetchError;

    fn try_from(mut json: json::JsonValue) -> Result<Self, Self::Error> {
        let mut main = json.remove("main");
        let mut wind = json.remove("wind");

        Ok(Self {
            temp: main.remove("temp").as_f64().ok_or_else(|| {
                FetchError::MalformedPayload("Missing or invalid \"main.temp\" value.".to_string())
            })?,
            feels_like: optional(main.remove("feels_like"), "main.feels_like")?,
            wind_speed: optional(wind.remove("speed"), "wind.speed")?,
            wind_gust: optional(wind.remove("gust"), "wind.gust")?,
        })
    }
}

fn optional(value: json::JsonValue, field: &str) -> Result<Option<f64>, FetchError> {
    if value.is_null() {
        Ok(None)
    } else {
        value.as_f64().map(Some).ok_or_else(|| {
            FetchError::MalformedPayload(format!("Invalid \"{}\" value.", field))
        })
    }
}
