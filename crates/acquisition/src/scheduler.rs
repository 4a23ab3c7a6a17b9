//! Per-stream polling aligned to the product cadence.
//!
//! Composites appear on the server a little after each five-minute
//! boundary, so each poll is timed against the wall clock instead of a
//! fixed sleep. A random jitter pulls the fleet of pollers apart so
//! they do not hit the server in the same second.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use radolan_parser::Product;
use rand::Rng;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};

use crate::cache::{CacheEntry, ReadingsCache};
use crate::correlator::ProductUpdate;
use crate::error::Result;
use crate::fetch::Fetch;
use crate::readings::{extract_readings, Location};
use crate::unpack::{decode_bz2, decode_tar_bz2};

/// Time until the next interval boundary. A wait inside the guard
/// window is folded into the following interval, because the product
/// for the imminent boundary will not be on the server yet.
pub fn waiting_time(now: DateTime<Utc>, interval: Duration, guard: Duration) -> Duration {
    let interval_secs = interval.as_secs().max(1);
    let elapsed = now.timestamp().rem_euclid(interval_secs as i64) as u64;
    let mut wait = interval_secs - elapsed;
    if wait <= guard.as_secs() {
        wait += interval_secs;
    }
    Duration::from_secs(wait)
}

/// Shorten a wait by a random spread of up to `jitter_secs`.
fn apply_jitter(wait: Duration, jitter_secs: u64) -> Duration {
    let jitter = rand::thread_rng().gen_range(0..=jitter_secs);
    wait.saturating_sub(Duration::from_secs(jitter))
}

/// Settings for one polled product stream.
#[derive(Debug, Clone)]
pub struct StreamSettings {
    pub product: Product,
    /// Fully resolved download URL of the latest composite.
    pub url: String,
    /// Product cadence.
    pub interval: Duration,
    /// Waits shorter than this fold into the next interval.
    pub guard: Duration,
    /// Upper bound of the random spread subtracted from each wait.
    pub jitter_secs: u64,
}

impl StreamSettings {
    pub fn new(product: Product, url: String, jitter_secs: u64) -> Self {
        Self {
            product,
            url,
            interval: Duration::from_secs(300),
            guard: Duration::from_secs(60),
            jitter_secs,
        }
    }
}

/// Polling task for one product stream.
pub struct AcquisitionScheduler {
    fetcher: Arc<dyn Fetch>,
    settings: StreamSettings,
    locations: Vec<Location>,
    cache: Arc<ReadingsCache>,
    /// Hand-off to the correlator, for the streams it pairs.
    updates: Option<mpsc::Sender<ProductUpdate>>,
}

impl AcquisitionScheduler {
    pub fn new(
        fetcher: Arc<dyn Fetch>,
        settings: StreamSettings,
        locations: Vec<Location>,
        cache: Arc<ReadingsCache>,
        updates: Option<mpsc::Sender<ProductUpdate>>,
    ) -> Self {
        Self {
            fetcher,
            settings,
            locations,
            cache,
            updates,
        }
    }

    /// Poll until shutdown. A failed cycle is logged and skipped; the
    /// task itself only exits on shutdown.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(product = %self.settings.product, url = %self.settings.url, "starting poll loop");
        loop {
            let wait = apply_jitter(
                waiting_time(Utc::now(), self.settings.interval, self.settings.guard),
                self.settings.jitter_secs,
            );
            tokio::select! {
                _ = shutdown.recv() => {
                    info!(product = %self.settings.product, "shutting down poll loop");
                    return;
                }
                _ = tokio::time::sleep(wait) => {}
            }

            if let Err(e) = self.poll_once().await {
                error!(product = %self.settings.product, error = %e, "poll cycle failed");
            }
        }
    }

    /// One fetch-decode-publish cycle.
    pub async fn poll_once(&self) -> Result<()> {
        let Some(bytes) = self.fetcher.fetch(&self.settings.url).await? else {
            warn!(product = %self.settings.product, "composite not available, skipping cycle");
            return Ok(());
        };

        match self.settings.product {
            Product::Hg => {
                let product = decode_bz2(&bytes)?;
                self.publish(&product);
                self.forward(ProductUpdate::Categorical(product));
            }
            product if product.is_forecast_set() => {
                let set = decode_tar_bz2(&bytes)?;
                // only the measurement itself becomes a "now" reading;
                // a set without one carries forecasts only
                match set.iter().find(|p| p.header.forecast_minutes == 0) {
                    Some(now) => self.publish(now),
                    None => {
                        warn!(product = %product, "set has no measurement member");
                    }
                }
                if product == Product::Rv {
                    self.forward(ProductUpdate::Rate(set));
                }
            }
            other => {
                warn!(product = %other, "product has no poll handler");
            }
        }
        Ok(())
    }

    fn publish(&self, product: &radolan_parser::DecodedProduct) {
        let readings = extract_readings(product, &self.locations);
        info!(
            product = %self.settings.product,
            timestamp = %product.header.timestamp,
            readings = readings.len(),
            "caching observation cycle"
        );
        self.cache.push(CacheEntry {
            timestamp: product.header.timestamp,
            interval_minutes: product.header.interval_minutes,
            readings,
        });
    }

    fn forward(&self, update: ProductUpdate) {
        let Some(tx) = &self.updates else {
            return;
        };
        // drop when full: the correlator is behind and a fresher
        // update will follow next cycle
        if let Err(e) = tx.try_send(update) {
            warn!(product = %self.settings.product, error = %e, "correlator channel full, dropping update");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bytes::Bytes;
    use chrono::TimeZone;

    #[test]
    fn test_waiting_time_inside_interval() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 1, 30).unwrap();
        let wait = waiting_time(now, Duration::from_secs(300), Duration::from_secs(60));
        assert_eq!(wait, Duration::from_secs(210));
    }

    #[test]
    fn test_waiting_time_guard_folds_into_next_interval() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 4, 30).unwrap();
        let wait = waiting_time(now, Duration::from_secs(300), Duration::from_secs(60));
        assert_eq!(wait, Duration::from_secs(330));
    }

    #[test]
    fn test_waiting_time_at_boundary_skips_ahead() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 12, 5, 0).unwrap();
        let wait = waiting_time(now, Duration::from_secs(300), Duration::from_secs(60));
        // a full interval from the boundary is outside the guard
        assert_eq!(wait, Duration::from_secs(300));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let wait = Duration::from_secs(200);
        for _ in 0..64 {
            let jittered = apply_jitter(wait, 30);
            assert!(jittered <= wait);
            assert!(jittered >= wait - Duration::from_secs(30));
        }
    }

    #[test]
    fn test_jitter_never_underflows() {
        assert_eq!(apply_jitter(Duration::ZERO, 30), Duration::ZERO);
    }

    struct StaticFetcher(Option<Bytes>);

    #[async_trait]
    impl Fetch for StaticFetcher {
        async fn fetch(&self, _url: &str) -> Result<Option<Bytes>> {
            Ok(self.0.clone())
        }
    }

    fn hg_bz2() -> Bytes {
        use bzip2::write::BzEncoder;
        use bzip2::Compression;
        use std::io::Write;

        let mut raw = b"HG010000100000124VS 5GP 001x 001".to_vec();
        raw.push(0x03);
        raw.extend_from_slice(&16u32.to_le_bytes());
        let mut encoder = BzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&raw).unwrap();
        Bytes::from(encoder.finish().unwrap())
    }

    fn sw_corner() -> Location {
        Location {
            name: "home".to_string(),
            easting: 0.0,
            northing: -1_199_000.0,
            prefix: None,
        }
    }

    fn scheduler(
        fetcher: StaticFetcher,
        updates: Option<mpsc::Sender<ProductUpdate>>,
    ) -> (AcquisitionScheduler, Arc<ReadingsCache>) {
        let cache = Arc::new(ReadingsCache::default());
        let scheduler = AcquisitionScheduler::new(
            Arc::new(fetcher),
            StreamSettings::new(Product::Hg, "http://test/hg".to_string(), 15),
            vec![sw_corner()],
            cache.clone(),
            updates,
        );
        (scheduler, cache)
    }

    #[tokio::test]
    async fn test_poll_once_fills_cache_and_forwards() {
        let (tx, mut rx) = mpsc::channel(4);
        let (scheduler, cache) = scheduler(StaticFetcher(Some(hg_bz2())), Some(tx));

        scheduler.poll_once().await.unwrap();

        assert_eq!(cache.len(), 1);
        let (readings, interval) = cache.get_data(Utc::now());
        assert_eq!(interval, 5);
        assert!(readings.contains_key("radarHGWawa"));
        assert!(matches!(
            rx.try_recv().unwrap(),
            ProductUpdate::Categorical(_)
        ));
    }

    fn rv_forecast_only_tar_bz2() -> Bytes {
        use bzip2::write::BzEncoder;
        use bzip2::Compression;
        use std::io::Write;

        // a set holding one forecast member and no measurement
        let mut member = b"RV010000100000124VS 5PR E-02GP 001x 001VV   5".to_vec();
        member.push(0x03);
        member.extend_from_slice(&200u16.to_le_bytes());

        let mut builder = tar::Builder::new(Vec::new());
        let mut header = tar::Header::new_gnu();
        header.set_size(member.len() as u64);
        header.set_cksum();
        builder
            .append_data(&mut header, "RV_005", member.as_slice())
            .unwrap();
        let tar_bytes = builder.into_inner().unwrap();

        let mut encoder = BzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&tar_bytes).unwrap();
        Bytes::from(encoder.finish().unwrap())
    }

    #[tokio::test]
    async fn test_forecast_only_set_not_cached_as_observation() {
        let (tx, mut rx) = mpsc::channel(4);
        let cache = Arc::new(ReadingsCache::default());
        let scheduler = AcquisitionScheduler::new(
            Arc::new(StaticFetcher(Some(rv_forecast_only_tar_bz2()))),
            StreamSettings::new(Product::Rv, "http://test/rv".to_string(), 30),
            vec![sw_corner()],
            cache.clone(),
            Some(tx),
        );

        scheduler.poll_once().await.unwrap();

        // no measurement member, so nothing becomes a current reading
        assert!(cache.is_empty());
        // the set is still handed to the correlator for its forecast track
        assert!(matches!(rx.try_recv().unwrap(), ProductUpdate::Rate(set) if set.len() == 1));
    }

    #[tokio::test]
    async fn test_unavailable_composite_skips_cycle() {
        let (scheduler, cache) = scheduler(StaticFetcher(None), None);
        scheduler.poll_once().await.unwrap();
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_full_channel_drops_update() {
        let (tx, _rx) = mpsc::channel(1);
        tx.try_send(ProductUpdate::Rate(Vec::new())).unwrap();

        let (scheduler, cache) = scheduler(StaticFetcher(Some(hg_bz2())), Some(tx));
        // must not error even though the channel is full
        scheduler.poll_once().await.unwrap();
        assert_eq!(cache.len(), 1);
    }
}
