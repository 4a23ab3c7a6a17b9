//! Per-location readings extracted from decoded composites.
//!
//! Each configured location is projected into the composite grid once,
//! then every decoded product yields one reading per location per
//! observable. Observation keys are stable strings suitable for use as
//! field names downstream.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use radolan_parser::{DecodedProduct, GridGeometry, Product, DE1200_WGS84};
use serde::Deserialize;
use tracing::warn;

/// A point of interest in projected DE1200 coordinates.
#[derive(Debug, Clone, Deserialize)]
pub struct Location {
    /// Short identifier used as the observation key suffix.
    pub name: String,
    /// Easting in metres, DE1200 WGS84 frame.
    pub easting: f64,
    /// Northing in metres, DE1200 WGS84 frame.
    pub northing: f64,
    /// Optional prefix prepended to observation keys.
    #[serde(default)]
    pub prefix: Option<String>,
}

impl Location {
    /// Observation key for one observable of this location, e.g.
    /// `radarHGWawa` or `southRadarRVRainRate`. Distinct locations
    /// are expected to carry distinct prefixes.
    pub fn observation_key(&self, product: Product, suffix: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}Radar{}{suffix}", product.code()),
            None => format!("radar{}{suffix}", product.code()),
        }
    }
}

/// One observed value at a location.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadingValue {
    /// Raw categorical bit pattern (HG).
    Category(u32),
    /// WMO 4680 weather code derived from the precipitation kind.
    Wawa(u8),
    /// Reflectivity in dBZ (WN).
    Dbz(f32),
    /// Precipitation rate in mm/h (RV).
    RainRate(f32),
    /// Scaled class value (RX, WX, EX).
    Class(f32),
    /// Data timestamp as Unix seconds.
    Timestamp(i64),
}

/// A single keyed reading with its valid time.
#[derive(Debug, Clone)]
pub struct Reading {
    pub key: String,
    pub value: ReadingValue,
    pub valid_time: DateTime<Utc>,
}

/// Readings keyed by observation name; missing cells are absent keys,
/// never zeros.
pub type ReadingsMap = HashMap<String, Reading>;

/// Extract readings for each location from one decoded product.
///
/// Locations outside the composite frame are skipped with a warning
/// rather than failing the whole extraction.
pub fn extract_readings(product: &DecodedProduct, locations: &[Location]) -> ReadingsMap {
    let geometry = GridGeometry::for_header(&DE1200_WGS84, &product.header);
    let valid_time = product.header.valid_time();
    let mut readings = ReadingsMap::new();

    for location in locations {
        let index = match geometry.index(location.easting, location.northing) {
            Ok(index) => index,
            Err(e) => {
                warn!(
                    location = %location.name,
                    error = %e,
                    "location outside composite frame, skipping"
                );
                continue;
            }
        };

        let mut insert = |suffix: &str, value: ReadingValue| {
            let key = location.observation_key(product.header.product, suffix);
            readings.insert(
                key.clone(),
                Reading {
                    key,
                    value,
                    valid_time,
                },
            );
        };

        match product.header.product {
            Product::Hg => {
                if let Some(raw) = product.grid.raw_category(index) {
                    insert("Value", ReadingValue::Category(raw));
                }
                if let Some(wawa) = product.grid.wawa(index) {
                    insert("Wawa", ReadingValue::Wawa(wawa));
                }
            }
            Product::Wn => {
                if let Some(dbz) = product.grid.dbz(index) {
                    insert("Dbz", ReadingValue::Dbz(dbz));
                }
            }
            Product::Rv => {
                if let Some(rate) = product.grid.rain_rate(index) {
                    insert("RainRate", ReadingValue::RainRate(rate));
                }
            }
            Product::Rx | Product::Wx | Product::Ex => {
                if let Some(value) = product.grid.class_value(index) {
                    insert("Class", ReadingValue::Class(value));
                }
            }
        }
        insert(
            "DateTime",
            ReadingValue::Timestamp(valid_time.timestamp()),
        );
    }

    readings
}
