//! US National Weather Service latest-observation endpoint.

use std::convert::TryFrom;

use reqwest::blocking::Client;
use reqwest::Url;

use super::{
    build_client, get_json, FetchError, Observation, Scale, SpeedUnit, Temperature,
    WeatherSource, WindSpeed,
};

const API_BASE: &str = "https://api.weather.gov/stations/";

pub struct Nws {
    client: Client,
    station: String,
    url: Url,
    scale: Scale,
}

impl Nws {
    pub fn new(station: &str, scale: Scale) -> Result<Self, FetchError> {
        Ok(Self {
            client: build_client()?,
            station: station.to_string(),
            url: observation_url(station)?,
            scale,
        })
    }
}

impl WeatherSource for Nws {
    fn fetch(&mut self) -> Result<Observation, FetchError> {
        let report = NwsObservation::try_from(get_json(&self.client, self.url.clone())?)?;
        Ok(report.observation(self.scale))
    }

    fn describe(&self) -> String {
        format!("NWS station {}", self.station)
    }
}

fn observation_url(station: &str) -> Result<Url, FetchError> {
    if station.is_empty() || !station.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(FetchError::AuthFailure(format!(
            "invalid station identifier {:?}",
            station
        )));
    }

    Url::parse(API_BASE)
        .and_then(|base| base.join(&format!("{}/observations/latest", station)))
        .map_err(|e| FetchError::AuthFailure(e.to_string()))
}

/// ```json
/// {
///     "properties": {
///         "timestamp": "2021-11-18T15:52:00+00:00",
///         "temperature": { "unitCode": "wmoUnit:degC", "value": 5.6, "qualityControl": "V" },
///         "windSpeed": { "unitCode": "wmoUnit:km_h-1", "value": 18.36, "qualityControl": "V" },
///         "windGust": { "unitCode": "wmoUnit:km_h-1", "value": null, "qualityControl": "Z" },
///         "windChill": { "unitCode": "wmoUnit:degC", "value": 2.1, "qualityControl": "V" },
///         "heatIndex": { "unitCode": "wmoUnit:degC", "value": null, "qualityControl": "V" }
///     }
/// }
/// ```
struct NwsObservation {
    temperature: Temperature,
    feels_like: Option<Temperature>,
    wind_speed: Option<WindSpeed>,
    wind_gust: Option<WindSpeed>,
}

impl NwsObservation {
    fn observation(&self, scale: Scale) -> Observation {
        let temperature = self.temperature.in_scale(scale);

        Observation {
            temperature,
            feels_like: self
                .feels_like
                .map_or(temperature, |feels_like| feels_like.in_scale(scale)),
            wind_speed: self.wind_speed.map_or(0., |speed| speed.in_scale(scale)),
            wind_gust: self.wind_gust.map_or(0., |gust| gust.in_scale(scale)),
        }
    }
}

impl TryFrom<json::JsonValue> for NwsObservation {
    type Error = FetchError;

    fn try_from(mut json: json::JsonValue) -> Result<Self, Self::Error> {
        let mut properties = json.remove("properties");
        if !properties.is_object() {
            return Err(FetchError::MalformedPayload(
                "Missing \"properties\" object.".to_string(),
            ));
        }

        let temperature = Quantity::try_from(properties.remove("temperature"))?
            .temperature("temperature")?
            .ok_or_else(|| {
                FetchError::MalformedPayload("Missing or null \"temperature\" value.".to_string())
            })?;
        let wind_chill = Quantity::try_from(properties.remove("windChill"))?
            .temperature("windChill")?;
        let heat_index = Quantity::try_from(properties.remove("heatIndex"))?
            .temperature("heatIndex")?;

        Ok(Self {
            temperature,
            feels_like: wind_chill.or(heat_index),
            wind_speed: Quantity::try_from(properties.remove("windSpeed"))?
                .wind_speed("windSpeed")?,
            wind_gust: Quantity::try_from(properties.remove("windGust"))?
                .wind_speed("windGust")?,
        })
    }
}

/// A `{ "unitCode": ..., "value": ... }` pair. Stations report `null` for anything they
/// did not measure.
struct Quantity {
    unit_code: Option<String>,
    value: Option<f64>,
}

impl Quantity {
    fn temperature(&self, field: &str) -> Result<Option<Temperature>, FetchError> {
        let value = match self.value {
            Some(value) => value,
            None => return Ok(None),
        };

        match self.unit_code.as_deref() {
            None | Some("wmoUnit:degC") => Ok(Some(Temperature::celsius(value))),
            Some("wmoUnit:degF") => Ok(Some(Temperature::fahrenheit(value))),
            Some(unit) => Err(unexpected_unit(field, unit)),
        }
    }

    fn wind_speed(&self, field: &str) -> Result<Option<WindSpeed>, FetchError> {
        let value = match self.value {
            Some(value) => value,
            None => return Ok(None),
        };

        let unit = match self.unit_code.as_deref() {
            None | Some("wmoUnit:km_h-1") => SpeedUnit::KilometresPerHour,
            Some("wmoUnit:m_s-1") => SpeedUnit::MetresPerSecond,
            Some("wmoUnit:kt") => SpeedUnit::Knots,
            Some(unit) => return Err(unexpected_unit(field, unit)),
        };

        Ok(Some(WindSpeed::new(value, unit)))
    }
}

impl TryFrom<json::JsonValue> for Quantity {
    type Error = FetchError;

    fn try_from(mut json: json::JsonValue) -> Result<Self, Self::Error> {
        let value = json.remove("value");

        Ok(Self {
            unit_code: json.remove("unitCode").as_str().map(str::to_string),
            value: if value.is_null() {
                None
            } else {
                Some(value.as_f64().ok_or_else(|| {
                    FetchError::MalformedPayload(format!("Invalid measurement value {}.", value))
                })?)
            },
        })
    }
}

fn unexpected_unit(field: &str, unit: &str) -> FetchError {
    FetchError::MalformedPayload(format!("Unexpected unit {:?} for \"{}\".", unit, field))
}
