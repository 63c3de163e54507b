//! Endpoint payloads and their validation.
//!
//! Property structs keep unknown fields in `extra` so a feature's properties
//! survive a decode/encode cycle unchanged.

use std::fmt;
use std::str::FromStr;

use map::feature::{FeatureCollection, Properties};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// Satellite pollutant products.
#[derive(
    Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Pollutant {
    #[default]
    #[serde(rename = "NO2")]
    No2,
    #[serde(rename = "SO2")]
    So2,
    #[serde(rename = "CO")]
    Co,
    #[serde(rename = "O3")]
    O3,
    #[serde(rename = "HCHO")]
    Hcho,
    #[serde(rename = "AER_AI")]
    AerAi,
}

impl Pollutant {
    pub const ALL: [Pollutant; 6] = [
        Pollutant::No2,
        Pollutant::So2,
        Pollutant::Co,
        Pollutant::O3,
        Pollutant::Hcho,
        Pollutant::AerAi,
    ];

    pub fn code(self) -> &'static str {
        match self {
            Pollutant::No2 => "NO2",
            Pollutant::So2 => "SO2",
            Pollutant::Co => "CO",
            Pollutant::O3 => "O3",
            Pollutant::Hcho => "HCHO",
            Pollutant::AerAi => "AER_AI",
        }
    }
}

impl fmt::Display for Pollutant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Pollutant {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Pollutant::ALL
            .into_iter()
            .find(|p| p.code().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ApiError::Validation(format!("unknown pollutant: {s}")))
    }
}

/// `YYYY-MM-DD` with a plausible month and day.
pub fn is_valid_date(s: &str) -> bool {
    let b = s.as_bytes();
    if b.len() != 10 || b[4] != b'-' || b[7] != b'-' {
        return false;
    }
    let digits = |r: std::ops::Range<usize>| -> Option<u32> {
        s.get(r)
            .filter(|p| p.bytes().all(|c| c.is_ascii_digit()))
            .and_then(|p| p.parse().ok())
    };
    matches!(
        (digits(0..4), digits(5..7), digits(8..10)),
        (Some(_), Some(1..=12), Some(1..=31))
    )
}

pub fn validate_date(s: &str) -> Result<(), ApiError> {
    if is_valid_date(s) {
        Ok(())
    } else {
        Err(ApiError::Validation(format!("date must be YYYY-MM-DD, got {s:?}")))
    }
}

/// Structural checks applied to every decoded payload.
pub trait Validate {
    fn validate(&self) -> Result<(), String>;
}

fn check_value(name: &str, v: Option<f64>) -> Result<(), String> {
    match v {
        Some(x) if !x.is_finite() || x < 0.0 => Err(format!("{name} out of range: {x}")),
        _ => Ok(()),
    }
}

fn check_name(name: &str) -> Result<(), String> {
    if name.trim().is_empty() {
        Err("feature name is empty".to_string())
    } else {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationProperties {
    pub name: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pm25: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aqi: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    #[serde(flatten)]
    pub extra: Properties,
}

fn default_true() -> bool {
    true
}

impl Validate for StationProperties {
    fn validate(&self) -> Result<(), String> {
        check_name(&self.name)?;
        check_value("pm25", self.pm25)?;
        check_value("aqi", self.aqi)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistrictProperties {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub province: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean_aqi: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub population: Option<f64>,
    #[serde(flatten)]
    pub extra: Properties,
}

impl Validate for DistrictProperties {
    fn validate(&self) -> Result<(), String> {
        check_name(&self.name)?;
        check_value("mean_aqi", self.mean_aqi)?;
        check_value("population", self.population)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvinceProperties {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mean_aqi: Option<f64>,
    #[serde(flatten)]
    pub extra: Properties,
}

impl Validate for ProvinceProperties {
    fn validate(&self) -> Result<(), String> {
        check_name(&self.name)?;
        check_value("mean_aqi", self.mean_aqi)
    }
}

impl<P: Validate> Validate for FeatureCollection<P> {
    fn validate(&self) -> Result<(), String> {
        self.features
            .iter()
            .enumerate()
            .try_for_each(|(i, f)| f.properties.validate().map_err(|e| format!("feature {i}: {e}")))
    }
}

pub type StationCollection = FeatureCollection<StationProperties>;
pub type DistrictCollection = FeatureCollection<DistrictProperties>;
pub type ProvinceCollection = FeatureCollection<ProvinceProperties>;

/// Raster tile descriptor returned by the satellite and exposure endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TileDescriptor {
    #[serde(alias = "url", alias = "tile_url_template")]
    pub tile_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pollutant: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub palette: Option<Vec<String>>,
}

impl Validate for TileDescriptor {
    fn validate(&self) -> Result<(), String> {
        if self.tile_url.trim().is_empty() {
            return Err("tile_url is empty".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SatelliteDates {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pollutant: Option<String>,
    pub dates: Vec<String>,
}

impl SatelliteDates {
    /// Most recent available date.
    pub fn latest(&self) -> Option<&str> {
        self.dates.iter().map(String::as_str).max()
    }
}

impl Validate for SatelliteDates {
    fn validate(&self) -> Result<(), String> {
        match self.dates.iter().find(|d| !is_valid_date(d)) {
            Some(bad) => Err(format!("malformed date {bad:?}")),
            None => Ok(()),
        }
    }
}

/// Point sample of a satellite product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SatelliteValue {
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pollutant: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

impl SatelliteValue {
    /// Popup text for this sample.
    pub fn describe(&self, pollutant: Pollutant) -> String {
        match (self.value, self.unit.as_deref()) {
            (Some(v), Some(unit)) => format!("{pollutant}: {v:.4} {unit}"),
            (Some(v), None) => format!("{pollutant}: {v:.4}"),
            (None, _) => format!("{pollutant}: no data"),
        }
    }
}

impl Validate for SatelliteValue {
    fn validate(&self) -> Result<(), String> {
        match self.value {
            Some(v) if !v.is_finite() => Err(format!("value is not finite: {v}")),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn pollutant_codes() {
        assert_eq!("aer_ai".parse::<Pollutant>(), Ok(Pollutant::AerAi));
        assert_eq!(serde_json::to_value(Pollutant::No2).expect("ser"), json!("NO2"));
        assert!("PM10".parse::<Pollutant>().is_err());
    }

    #[test]
    fn dates() {
        assert!(is_valid_date("2024-06-30"));
        assert!(!is_valid_date("2024-13-01"));
        assert!(!is_valid_date("2024/06/30"));
        assert!(!is_valid_date("24-06-30"));
        let d = SatelliteDates {
            pollutant: None,
            dates: vec!["2024-05-01".into(), "2024-06-02".into(), "2024-06-01".into()],
        };
        assert_eq!(d.latest(), Some("2024-06-02"));
    }

    #[test]
    fn district_properties_survive_a_round_trip() {
        let raw = json!({
            "name": "Gasabo",
            "province": "Kigali City",
            "mean_aqi": 75.0,
            "station_count": 3
        });
        let props: DistrictProperties = serde_json::from_value(raw.clone()).expect("parse");
        assert_eq!(props.mean_aqi, Some(75.0));
        assert_eq!(serde_json::to_value(&props).expect("ser"), raw);
    }

    #[test]
    fn validation_rejects_bad_values() {
        let fc: DistrictCollection = serde_json::from_value(json!({
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "geometry": { "type": "Point", "coordinates": [0.0, 0.0] },
                "properties": { "name": "X", "mean_aqi": -4.0 }
            }]
        }))
        .expect("parse");
        let err = fc.validate().expect_err("negative aqi");
        assert!(err.contains("feature 0"));
    }

    #[test]
    fn stations_default_to_active() {
        let s: StationProperties =
            serde_json::from_value(json!({ "name": "A" })).expect("parse");
        assert!(s.is_active);
        assert_eq!(s.pm25, None);
    }
}
