//! In-memory caches bridging poll cadence and consumer cadence.
//!
//! Producers push at the product cadence; consumers ask "what was
//! current as of this instant". Entries older than the retention
//! horizon are evicted on write, so an idle consumer never walks an
//! unbounded backlog.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::error::{AcquireError, Result};
use crate::readings::ReadingsMap;

const DEFAULT_RETENTION_MINUTES: i64 = 60;

/// One cached observation cycle.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Valid time of the readings.
    pub timestamp: DateTime<Utc>,
    /// Product interval, forwarded to consumers for archive binning.
    pub interval_minutes: u32,
    pub readings: ReadingsMap,
}

/// Rolling as-of cache of observation cycles, newest at the back.
#[derive(Debug)]
pub struct ReadingsCache {
    entries: Mutex<VecDeque<CacheEntry>>,
    retention: Duration,
}

impl Default for ReadingsCache {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION_MINUTES)
    }
}

impl ReadingsCache {
    pub fn new(retention_minutes: i64) -> Self {
        Self {
            entries: Mutex::new(VecDeque::new()),
            retention: Duration::minutes(retention_minutes),
        }
    }

    /// Append a cycle and drop everything past the retention horizon.
    ///
    /// Entries are expected in ascending timestamp order; a refetch of
    /// an already-cached timestamp is ignored.
    pub fn push(&self, entry: CacheEntry) {
        let horizon = Utc::now() - self.retention;
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if entries.iter().any(|e| e.timestamp == entry.timestamp) {
            debug!(timestamp = %entry.timestamp, "cycle already cached, skipping");
            return;
        }
        entries.push_back(entry);
        while entries.front().is_some_and(|e| e.timestamp < horizon) {
            entries.pop_front();
        }
    }

    /// Readings current as of `as_of`: the most recent entry whose
    /// timestamp is at or before that instant. An empty map when the
    /// cache holds nothing that old.
    pub fn get_data(&self, as_of: DateTime<Utc>) -> (ReadingsMap, u32) {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries
            .iter()
            .rev()
            .find(|e| e.timestamp <= as_of)
            .map(|e| (e.readings.clone(), e.interval_minutes))
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Aggregations over a forecast series; `None` cells are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    Max,
    Min,
    Avg,
    /// Count of cells that carry a value.
    NotNull,
}

/// One complete forecast run, replaced wholesale on every update.
#[derive(Debug, Clone, Default)]
pub struct ForecastSeries {
    /// Window start per step.
    pub starts: Vec<DateTime<Utc>>,
    /// Window end per step.
    pub ends: Vec<DateTime<Utc>>,
    /// Per-observation value track, one slot per step.
    pub values: HashMap<String, Vec<Option<f32>>>,
}

/// Holder for the latest forecast run.
#[derive(Debug, Default)]
pub struct ForecastCache {
    series: Mutex<ForecastSeries>,
}

impl ForecastCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Swap in a fresh run, discarding the previous one entirely.
    pub fn replace(&self, series: ForecastSeries) {
        *self.series.lock().unwrap_or_else(|e| e.into_inner()) = series;
    }

    /// Snapshot of the current run.
    pub fn get_forecast(&self) -> ForecastSeries {
        self.series
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Value track for one observation key.
    pub fn get_series(&self, key: &str) -> Result<Vec<Option<f32>>> {
        let series = self.series.lock().unwrap_or_else(|e| e.into_inner());
        series
            .values
            .get(key)
            .cloned()
            .ok_or_else(|| AcquireError::UnknownObservation(key.to_string()))
    }

    /// Aggregate one observation track; `Ok(None)` when every cell of
    /// the track is empty.
    pub fn get_aggregate(&self, key: &str, aggregate: Aggregate) -> Result<Option<f32>> {
        let track = self.get_series(key)?;
        let mut present = track.iter().filter_map(|v| *v).peekable();
        Ok(match aggregate {
            Aggregate::NotNull => Some(present.count() as f32),
            Aggregate::Max => present.fold(None, |acc: Option<f32>, v| {
                Some(acc.map_or(v, |a| a.max(v)))
            }),
            Aggregate::Min => present.fold(None, |acc: Option<f32>, v| {
                Some(acc.map_or(v, |a| a.min(v)))
            }),
            Aggregate::Avg => {
                if present.peek().is_none() {
                    None
                } else {
                    let (sum, count) =
                        present.fold((0.0f32, 0u32), |(s, c), v| (s + v, c + 1));
                    Some(sum / count as f32)
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(minute: u32) -> CacheEntry {
        CacheEntry {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 12, minute, 0).unwrap(),
            interval_minutes: 5,
            readings: ReadingsMap::new(),
        }
    }

    #[test]
    fn test_as_of_picks_most_recent_at_or_before() {
        let cache = ReadingsCache::new(24 * 60 * 365 * 10);
        cache.push(entry(0));
        cache.push(entry(5));
        cache.push(entry(10));

        let exactly = Utc.with_ymd_and_hms(2024, 1, 1, 12, 5, 0).unwrap();
        let (_, interval) = cache.get_data(exactly);
        assert_eq!(interval, 5);

        let between = Utc.with_ymd_and_hms(2024, 1, 1, 12, 7, 0).unwrap();
        let found = {
            let entries = cache.entries.lock().unwrap();
            entries
                .iter()
                .rev()
                .find(|e| e.timestamp <= between)
                .map(|e| e.timestamp)
        };
        assert_eq!(
            found,
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 12, 5, 0).unwrap())
        );
    }

    #[test]
    fn test_as_of_before_everything_is_empty() {
        let cache = ReadingsCache::new(24 * 60 * 365 * 10);
        cache.push(entry(30));
        let early = Utc.with_ymd_and_hms(2024, 1, 1, 11, 0, 0).unwrap();
        let (readings, interval) = cache.get_data(early);
        assert!(readings.is_empty());
        assert_eq!(interval, 0);
    }

    #[test]
    fn test_duplicate_timestamp_ignored() {
        let cache = ReadingsCache::new(24 * 60 * 365 * 10);
        cache.push(entry(0));
        cache.push(entry(0));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_retention_evicts_old_entries() {
        let cache = ReadingsCache::new(60);
        let stale = CacheEntry {
            timestamp: Utc::now() - Duration::minutes(90),
            interval_minutes: 5,
            readings: ReadingsMap::new(),
        };
        let fresh = CacheEntry {
            timestamp: Utc::now(),
            interval_minutes: 5,
            readings: ReadingsMap::new(),
        };
        cache.push(stale);
        cache.push(fresh);
        assert_eq!(cache.len(), 1);
    }

    fn forecast_with(values: Vec<Option<f32>>) -> ForecastCache {
        let cache = ForecastCache::new();
        let mut tracks = HashMap::new();
        tracks.insert("radarRVRainRate".to_string(), values);
        cache.replace(ForecastSeries {
            starts: Vec::new(),
            ends: Vec::new(),
            values: tracks,
        });
        cache
    }

    #[test]
    fn test_aggregates_skip_empty_cells() {
        let cache = forecast_with(vec![Some(1.0), None, Some(3.0), None]);
        let key = "radarRVRainRate";
        assert_eq!(cache.get_aggregate(key, Aggregate::Max).unwrap(), Some(3.0));
        assert_eq!(cache.get_aggregate(key, Aggregate::Min).unwrap(), Some(1.0));
        assert_eq!(cache.get_aggregate(key, Aggregate::Avg).unwrap(), Some(2.0));
        assert_eq!(
            cache.get_aggregate(key, Aggregate::NotNull).unwrap(),
            Some(2.0)
        );
    }

    #[test]
    fn test_all_empty_track_aggregates_to_none() {
        let cache = forecast_with(vec![None, None]);
        let key = "radarRVRainRate";
        assert_eq!(cache.get_aggregate(key, Aggregate::Max).unwrap(), None);
        assert_eq!(cache.get_aggregate(key, Aggregate::Avg).unwrap(), None);
        assert_eq!(
            cache.get_aggregate(key, Aggregate::NotNull).unwrap(),
            Some(0.0)
        );
    }

    #[test]
    fn test_unknown_observation_is_an_error() {
        let cache = forecast_with(vec![Some(1.0)]);
        assert!(matches!(
            cache.get_series("radarWNDbz"),
            Err(AcquireError::UnknownObservation(_))
        ));
    }

    #[test]
    fn test_replace_discards_previous_run() {
        let cache = forecast_with(vec![Some(1.0)]);
        cache.replace(ForecastSeries::default());
        assert!(cache.get_series("radarRVRainRate").is_err());
    }
}
