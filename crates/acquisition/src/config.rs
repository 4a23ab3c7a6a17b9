//! Configuration loading for radar composite acquisition.
//!
//! Loads the stream and location setup from a YAML file.

use std::path::Path;

use radolan_parser::Product;
use serde::Deserialize;
use tracing::debug;

use crate::error::{AcquireError, Result};
use crate::readings::Location;

/// Root configuration loaded from a radar YAML file.
#[derive(Debug, Clone, Deserialize)]
pub struct RadarConfig {
    /// Composite directory on the open data server.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    pub streams: Vec<StreamConfig>,
    pub locations: Vec<LocationConfig>,
    /// How long observation cycles stay queryable.
    #[serde(default = "default_retention_minutes")]
    pub retention_minutes: i64,
    /// Delay after an interval boundary before products are expected
    /// on the server.
    #[serde(default = "default_settle_secs")]
    pub settle_secs: u64,
    /// Waits shorter than this are folded into the next interval.
    #[serde(default = "default_guard_secs")]
    pub guard_secs: u64,
    /// HTTP timeout per download.
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://opendata.dwd.de/weather/radar/composite".to_string()
}

fn default_retention_minutes() -> i64 {
    60
}

fn default_settle_secs() -> u64 {
    30
}

fn default_guard_secs() -> u64 {
    60
}

fn default_fetch_timeout_secs() -> u64 {
    10
}

/// One product stream to poll.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    /// Product code, e.g. "HG", "WN" or "RV".
    pub product: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Random spread subtracted from each wait; defaults per product.
    #[serde(default)]
    pub jitter_secs: Option<u64>,
}

fn default_enabled() -> bool {
    true
}

impl StreamConfig {
    pub fn product(&self) -> Result<Product> {
        Product::from_code(&self.product)
            .map_err(|_| AcquireError::InvalidConfig(format!("unknown product {:?}", self.product)))
    }

    /// Jitter for this stream; RV refreshes on the server later than
    /// the other composites and gets a wider default spread.
    pub fn jitter_secs(&self) -> Result<u64> {
        if let Some(jitter) = self.jitter_secs {
            return Ok(jitter);
        }
        Ok(match self.product()? {
            Product::Rv => 30,
            _ => 15,
        })
    }
}

/// A named query point in DE1200 projected coordinates.
#[derive(Debug, Clone, Deserialize)]
pub struct LocationConfig {
    pub name: String,
    pub easting: f64,
    pub northing: f64,
    #[serde(default)]
    pub prefix: Option<String>,
}

impl From<&LocationConfig> for Location {
    fn from(config: &LocationConfig) -> Self {
        Location {
            name: config.name.clone(),
            easting: config.easting,
            northing: config.northing,
            prefix: config.prefix.clone(),
        }
    }
}

impl RadarConfig {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            AcquireError::InvalidConfig(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: RadarConfig = serde_yaml::from_str(&content).map_err(|e| {
            AcquireError::InvalidConfig(format!("cannot parse {}: {e}", path.display()))
        })?;
        config.validate()?;
        debug!(path = %path.display(), streams = config.streams.len(), "loaded radar config");
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.locations.is_empty() {
            return Err(AcquireError::InvalidConfig(
                "no locations configured".to_string(),
            ));
        }
        for stream in &self.streams {
            let product = stream.product()?;
            if !matches!(product, Product::Hg | Product::Wn | Product::Rv) {
                return Err(AcquireError::InvalidConfig(format!(
                    "product {product} has no latest-composite stream"
                )));
            }
        }
        Ok(())
    }

    /// Streams that are switched on.
    pub fn enabled_streams(&self) -> impl Iterator<Item = &StreamConfig> {
        self.streams.iter().filter(|s| s.enabled)
    }

    pub fn locations(&self) -> Vec<Location> {
        self.locations.iter().map(Location::from).collect()
    }
}
