//! Pairing of the categorical and rate streams.
//!
//! The precipitation-kind composite and the rain-rate composite are
//! published independently but describe the same five-minute cycle.
//! This task collects the latest update from each stream and merges
//! them only when their issue time and format version match exactly,
//! so a consumer never sees a rain kind from one cycle glued to a rate
//! from another.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use radolan_parser::DecodedProduct;
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::cache::{CacheEntry, ForecastCache, ForecastSeries, ReadingsCache};
use crate::readings::{extract_readings, Location};
use crate::scheduler::waiting_time;

/// Channel capacity: a full channel means the correlator is stalled
/// and fresher data is on the way, so senders drop instead of waiting.
const CHANNEL_CAPACITY: usize = 4;

/// One decoded download handed from a scheduler to the correlator.
#[derive(Debug)]
pub enum ProductUpdate {
    /// Precipitation-kind composite.
    Categorical(DecodedProduct),
    /// Rain-rate set, measurement first, then forecast members.
    Rate(Vec<DecodedProduct>),
}

/// Tuning knobs for the pairing loop.
#[derive(Debug, Clone)]
pub struct CorrelatorSettings {
    /// Product cadence.
    pub interval: StdDuration,
    /// Delay after an interval boundary before both downloads are
    /// expected to have arrived.
    pub settle: StdDuration,
    /// How long past the wake-up the loop keeps waiting for the
    /// missing half of a pair.
    pub drain_window: StdDuration,
}

impl Default for CorrelatorSettings {
    fn default() -> Self {
        Self {
            interval: StdDuration::from_secs(300),
            settle: StdDuration::from_secs(30),
            drain_window: StdDuration::from_secs(60),
        }
    }
}

/// A matched pair for one cycle.
#[derive(Debug)]
pub struct CorrelatedProduct {
    pub timestamp: DateTime<Utc>,
    pub version: Option<u16>,
    pub categorical: DecodedProduct,
    /// Measurement first, then forecast members ordered by lead time.
    pub rate_set: Vec<DecodedProduct>,
}

/// Create the scheduler-to-correlator channel.
pub fn update_channel() -> (mpsc::Sender<ProductUpdate>, mpsc::Receiver<ProductUpdate>) {
    mpsc::channel(CHANNEL_CAPACITY)
}

/// Pairing task over the two product streams.
pub struct StreamCorrelator {
    rx: mpsc::Receiver<ProductUpdate>,
    locations: Vec<Location>,
    merged_cache: Arc<ReadingsCache>,
    forecast_cache: Arc<ForecastCache>,
    settings: CorrelatorSettings,
    /// Halves waiting for a partner. A mismatch survivor stays here
    /// into the next cycle.
    pending_categorical: Option<DecodedProduct>,
    pending_rate: Option<Vec<DecodedProduct>>,
}

impl StreamCorrelator {
    pub fn new(
        rx: mpsc::Receiver<ProductUpdate>,
        locations: Vec<Location>,
        merged_cache: Arc<ReadingsCache>,
        forecast_cache: Arc<ForecastCache>,
        settings: CorrelatorSettings,
    ) -> Self {
        Self {
            rx,
            locations,
            merged_cache,
            forecast_cache,
            settings,
            pending_categorical: None,
            pending_rate: None,
        }
    }

    /// Run until shutdown. Wakes shortly after each interval boundary,
    /// drains whatever the schedulers delivered and publishes a merged
    /// cycle when the halves agree.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        loop {
            let wait = waiting_time(Utc::now(), self.settings.interval, StdDuration::ZERO)
                + self.settings.settle;
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("shutting down correlator");
                    return;
                }
                _ = tokio::time::sleep(wait) => {}
            }

            if !self.drain_cycle().await {
                return;
            }
        }
    }

    /// Collect updates for one cycle and publish a merged result if
    /// the categorical and rate halves describe the same cycle.
    /// Returns false when every sender is gone.
    async fn drain_cycle(&mut self) -> bool {
        let deadline = tokio::time::Instant::now() + self.settings.drain_window;
        loop {
            if self.pending_categorical.is_some() && self.pending_rate.is_some() {
                break;
            }
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                break;
            }
            match timeout(remaining, self.rx.recv()).await {
                Ok(Some(update)) => {
                    accept(update, &mut self.pending_categorical, &mut self.pending_rate);
                }
                Ok(None) => return false,
                Err(_) => break,
            }
        }

        match reconcile(&mut self.pending_categorical, &mut self.pending_rate) {
            Some(correlated) => self.publish(correlated),
            None => {
                debug!("no matching pair this cycle, nothing published");
            }
        }
        true
    }

    fn publish(&self, correlated: CorrelatedProduct) {
        let (entry, series) = merge_readings(&correlated, &self.locations);
        info!(
            timestamp = %correlated.timestamp,
            readings = entry.readings.len(),
            forecast_steps = series.starts.len(),
            "publishing correlated cycle"
        );
        self.merged_cache.push(entry);
        self.forecast_cache.replace(series);
    }
}

/// Store an update in its pending slot. A newer update for the same
/// slot replaces the older one.
fn accept(
    update: ProductUpdate,
    pending_categorical: &mut Option<DecodedProduct>,
    pending_rate: &mut Option<Vec<DecodedProduct>>,
) {
    match update {
        ProductUpdate::Categorical(p) => {
            if pending_categorical.is_some() {
                debug!("replacing pending categorical update");
            }
            *pending_categorical = Some(p);
        }
        ProductUpdate::Rate(set) => {
            if set.is_empty() {
                warn!("dropping empty rate set");
                return;
            }
            if pending_rate.is_some() {
                debug!("replacing pending rate update");
            }
            *pending_rate = Some(set);
        }
    }
}

/// Decide what to do with the two pending halves.
///
/// A pair is merged only on exact `(timestamp, version)` equality.
/// On a timestamp mismatch the older half is discarded and the newer
/// one stays pending for the next cycle; equal timestamps with
/// different versions discard both. A lone half is dropped with a
/// logged gap.
pub(crate) fn reconcile(
    categorical: &mut Option<DecodedProduct>,
    rate: &mut Option<Vec<DecodedProduct>>,
) -> Option<CorrelatedProduct> {
    let cat_cycle = categorical
        .as_ref()
        .map(|c| (c.header.timestamp, c.header.version));
    let rate_cycle = rate
        .as_ref()
        .and_then(|set| set.first())
        .map(|r| (r.header.timestamp, r.header.version));

    match (cat_cycle, rate_cycle) {
        (Some(c), Some(r)) if c == r => {
            let categorical = categorical.take()?;
            let rate_set = rate.take()?;
            Some(CorrelatedProduct {
                timestamp: c.0,
                version: c.1,
                categorical,
                rate_set,
            })
        }
        (Some(c), Some(r)) => {
            warn!(categorical = %c.0, rate = %r.0, "cycle mismatch between streams");
            if c.0 < r.0 {
                *categorical = None;
            } else if r.0 < c.0 {
                *rate = None;
            } else {
                // same instant, different format versions
                *categorical = None;
                *rate = None;
            }
            None
        }
        (Some(c), None) => {
            warn!(timestamp = %c.0, "rate half missing, discarding cycle");
            *categorical = None;
            None
        }
        (None, Some(r)) => {
            warn!(timestamp = %r.0, "categorical half missing, discarding cycle");
            *rate = None;
            None
        }
        (None, None) => None,
    }
}

/// Build the merged readings entry and the forecast series from a
/// matched pair.
fn merge_readings(
    correlated: &CorrelatedProduct,
    locations: &[Location],
) -> (CacheEntry, ForecastSeries) {
    let mut readings = extract_readings(&correlated.categorical, locations);
    let rate_now = correlated
        .rate_set
        .iter()
        .find(|p| p.header.forecast_minutes == 0);
    if let Some(rate_now) = rate_now {
        readings.extend(extract_readings(rate_now, locations));
    } else {
        warn!(timestamp = %correlated.timestamp, "rate set has no measurement member");
    }

    let entry = CacheEntry {
        timestamp: correlated.timestamp,
        interval_minutes: correlated.categorical.header.interval_minutes,
        readings,
    };

    (entry, forecast_series(&correlated.rate_set, locations))
}

/// Forecast tracks from the rate set: one window per member, one value
/// track per location.
fn forecast_series(rate_set: &[DecodedProduct], locations: &[Location]) -> ForecastSeries {
    let mut series = ForecastSeries::default();
    for member in rate_set {
        let start = member.header.valid_time();
        series.starts.push(start);
        series
            .ends
            .push(start + Duration::minutes(member.header.interval_minutes as i64));
    }

    for location in locations {
        let key = location.observation_key(radolan_parser::Product::Rv, "RainRate");
        let track = rate_set
            .iter()
            .map(|member| {
                extract_readings(member, std::slice::from_ref(location))
                    .get(&key)
                    .and_then(|reading| match reading.value {
                        crate::readings::ReadingValue::RainRate(rate) => Some(rate),
                        _ => None,
                    })
            })
            .collect();
        series.values.insert(key, track);
    }
    series
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use radolan_parser::decode_bytes;

    fn product(code: &str, minute: u32, version: u32, word: u16) -> DecodedProduct {
        let mut bytes =
            format!("{code}0100{minute:02}100000124VS {version}PR E-02GP 001x 001").into_bytes();
        bytes.push(0x03);
        bytes.extend_from_slice(&word.to_le_bytes());
        decode_bytes(&bytes).unwrap()
    }

    fn hg(minute: u32, version: u32) -> DecodedProduct {
        let mut bytes =
            format!("HG0100{minute:02}100000124VS {version}GP 001x 001").into_bytes();
        bytes.push(0x03);
        bytes.extend_from_slice(&16u32.to_le_bytes());
        decode_bytes(&bytes).unwrap()
    }

    fn rv_set(minute: u32, version: u32) -> Vec<DecodedProduct> {
        vec![product("RV", minute, version, 150)]
    }

    fn rv_forecast(lead_minutes: u32, word: u16) -> DecodedProduct {
        let mut bytes =
            format!("RV010000100000124VS 5PR E-02GP 001x 001VV{lead_minutes:4}").into_bytes();
        bytes.push(0x03);
        bytes.extend_from_slice(&word.to_le_bytes());
        decode_bytes(&bytes).unwrap()
    }

    fn sw_corner() -> Location {
        Location {
            name: "home".to_string(),
            easting: 0.0,
            northing: -1_199_000.0,
            prefix: None,
        }
    }

    #[test]
    fn test_matching_pair_is_merged() {
        let mut cat = Some(hg(0, 5));
        let mut rate = Some(rv_set(0, 5));
        let correlated = reconcile(&mut cat, &mut rate).unwrap();
        assert_eq!(
            correlated.timestamp,
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(correlated.version, Some(5));
        assert!(cat.is_none());
        assert!(rate.is_none());
    }

    #[test]
    fn test_timestamp_mismatch_keeps_the_newer_half() {
        let mut cat = Some(hg(0, 5));
        let mut rate = Some(rv_set(5, 5));
        assert!(reconcile(&mut cat, &mut rate).is_none());
        // categorical is from the older cycle, rate survives
        assert!(cat.is_none());
        assert!(rate.is_some());
    }

    #[test]
    fn test_version_mismatch_discards_both() {
        let mut cat = Some(hg(0, 4));
        let mut rate = Some(rv_set(0, 5));
        assert!(reconcile(&mut cat, &mut rate).is_none());
        assert!(cat.is_none());
        assert!(rate.is_none());
    }

    #[test]
    fn test_lone_half_is_discarded() {
        let mut cat = Some(hg(0, 5));
        let mut rate = None;
        assert!(reconcile(&mut cat, &mut rate).is_none());
        assert!(cat.is_none());

        let mut cat = None;
        let mut rate = Some(rv_set(0, 5));
        assert!(reconcile(&mut cat, &mut rate).is_none());
        assert!(rate.is_none());

        assert!(reconcile(&mut None, &mut None).is_none());
    }

    #[test]
    fn test_newer_update_replaces_pending() {
        let mut cat = None;
        let mut rate = None;
        accept(ProductUpdate::Categorical(hg(0, 5)), &mut cat, &mut rate);
        accept(ProductUpdate::Categorical(hg(5, 5)), &mut cat, &mut rate);
        assert_eq!(
            cat.unwrap().header.timestamp,
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 5, 0).unwrap()
        );
        assert!(rate.is_none());
    }

    #[test]
    fn test_merged_entry_carries_both_streams() {
        let correlated =
            reconcile(&mut Some(hg(0, 5)), &mut Some(rv_set(0, 5))).unwrap();
        let (entry, series) = merge_readings(&correlated, &[sw_corner()]);

        assert_eq!(
            entry.readings.get("radarHGWawa").map(|r| &r.value),
            Some(&crate::readings::ReadingValue::Wawa(60))
        );
        assert_eq!(
            entry.readings.get("radarRVRainRate").map(|r| &r.value),
            Some(&crate::readings::ReadingValue::RainRate(1.5))
        );
        assert_eq!(series.starts.len(), 1);
        assert_eq!(series.values["radarRVRainRate"], vec![Some(1.5)]);
    }

    #[test]
    fn test_forecast_only_set_adds_no_now_reading() {
        let correlated = reconcile(
            &mut Some(hg(0, 5)),
            &mut Some(vec![rv_forecast(5, 200)]),
        )
        .unwrap();
        let (entry, series) = merge_readings(&correlated, &[sw_corner()]);

        // categorical half still present, but no rate observation
        assert!(entry.readings.contains_key("radarHGWawa"));
        assert!(!entry.readings.contains_key("radarRVRainRate"));
        // the forecast track is unaffected
        assert_eq!(series.values["radarRVRainRate"], vec![Some(2.0)]);
    }

    #[test]
    fn test_forecast_series_windows() {
        let correlated = reconcile(
            &mut Some(hg(0, 5)),
            &mut Some(vec![product("RV", 0, 5, 100), rv_forecast(5, 200)]),
        )
        .unwrap();

        let series = forecast_series(&correlated.rate_set, &[sw_corner()]);
        assert_eq!(
            series.starts,
            vec![
                Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 1, 1, 0, 5, 0).unwrap(),
            ]
        );
        assert_eq!(
            series.ends[1],
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 10, 0).unwrap()
        );
        assert_eq!(
            series.values["radarRVRainRate"],
            vec![Some(1.0), Some(2.0)]
        );
    }
}
