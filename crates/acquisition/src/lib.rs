//! Acquisition pipeline for DWD radar composite products.
//!
//! One polling task per enabled product stream downloads the latest
//! composite on the fixed five-minute publication cadence, decodes it
//! and appends per-location readings to its cache. The HG (precipitation
//! kind) and RV (precipitation rate) streams additionally feed a
//! correlator task over a bounded channel; the correlator merges the two
//! grids only when their issue timestamp and format version match
//! exactly and maintains the short-term forecast series.
//!
//! Each cache has exactly one writer task; the host's reporting cycle
//! reads snapshots through short lock-guarded accessors.

pub mod cache;
pub mod config;
pub mod correlator;
pub mod error;
pub mod fetch;
pub mod readings;
pub mod scheduler;
pub mod unpack;

pub use cache::{Aggregate, CacheEntry, ForecastCache, ForecastSeries, ReadingsCache};
pub use config::{LocationConfig, RadarConfig, StreamConfig};
pub use correlator::{
    update_channel, CorrelatedProduct, CorrelatorSettings, ProductUpdate, StreamCorrelator,
};
pub use error::{AcquireError, Result};
pub use fetch::{Fetch, HttpFetcher};
pub use readings::{Location, Reading, ReadingValue, ReadingsMap};
pub use scheduler::{waiting_time, AcquisitionScheduler, StreamSettings};
pub use unpack::{decode_bz2, decode_tar_bz2, latest_url};
