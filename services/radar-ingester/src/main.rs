//! Radar composite ingestion service.
//!
//! Polls the DWD open data server for the latest precipitation
//! composites, decodes them and keeps per-location readings queryable
//! through in-memory caches:
//! - one polling task per enabled product stream
//! - a correlator task merging the precipitation-kind and rain-rate
//!   streams into one consistent cycle
//! - a reporting loop that reads the caches shortly after each
//!   five-minute boundary and logs the readings as JSON

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tokio::sync::broadcast;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use acquisition::scheduler::waiting_time;
use acquisition::{
    latest_url, update_channel, AcquisitionScheduler, CorrelatorSettings, ForecastCache,
    HttpFetcher, RadarConfig, Reading, ReadingValue, ReadingsCache, StreamCorrelator,
    StreamSettings,
};
use radolan_parser::Product;

#[derive(Parser, Debug)]
#[command(name = "radar-ingester")]
#[command(about = "DWD radar composite poller with per-location readings")]
struct Args {
    /// Configuration file
    #[arg(long, env = "RADAR_CONFIG", default_value = "config/radar.yaml")]
    config: PathBuf,

    /// Run one poll cycle per stream and exit
    #[arg(long)]
    once: bool,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting radar composite ingester");

    let config = RadarConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    let locations = config.locations();
    let fetcher = Arc::new(HttpFetcher::new(Duration::from_secs(
        config.fetch_timeout_secs,
    ))?);

    let enabled_products: Vec<Product> = config
        .enabled_streams()
        .map(|s| s.product())
        .collect::<acquisition::Result<_>>()?;
    // pairing needs both halves of a cycle
    let correlate = enabled_products.contains(&Product::Hg)
        && enabled_products.contains(&Product::Rv);

    let mut stream_caches: HashMap<Product, Arc<ReadingsCache>> = HashMap::new();
    let mut schedulers = Vec::new();

    let (update_tx, update_rx) = update_channel();

    for stream in config.enabled_streams() {
        let product = stream.product()?;

        let mut settings = StreamSettings::new(
            product,
            latest_url(&config.base_url, product)?,
            stream.jitter_secs()?,
        );
        settings.guard = Duration::from_secs(config.guard_secs);

        let cache = Arc::new(ReadingsCache::new(config.retention_minutes));
        stream_caches.insert(product, cache.clone());

        // only the paired streams feed the correlator
        let updates = (correlate && matches!(product, Product::Hg | Product::Rv))
            .then(|| update_tx.clone());
        schedulers.push(AcquisitionScheduler::new(
            fetcher.clone(),
            settings,
            locations.clone(),
            cache,
            updates,
        ));
    }
    drop(update_tx);

    if args.once {
        info!("Running single poll cycle");
        for scheduler in &schedulers {
            scheduler.poll_once().await?;
        }
        for (product, cache) in &stream_caches {
            let (readings, _) = cache.get_data(Utc::now());
            info!(product = %product, readings = %readings_json(&readings), "poll result");
        }
        return Ok(());
    }

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let merged_cache = Arc::new(ReadingsCache::new(config.retention_minutes));
    let forecast_cache = Arc::new(ForecastCache::new());

    let mut tasks = Vec::new();
    if correlate {
        let correlator = StreamCorrelator::new(
            update_rx,
            locations.clone(),
            merged_cache.clone(),
            forecast_cache.clone(),
            CorrelatorSettings {
                settle: Duration::from_secs(config.settle_secs),
                ..CorrelatorSettings::default()
            },
        );
        tasks.push(tokio::spawn(correlator.run(shutdown_tx.subscribe())));
    } else {
        drop(update_rx);
        info!("categorical/rate pairing disabled, both streams not enabled");
    }

    for scheduler in schedulers {
        tasks.push(tokio::spawn(scheduler.run(shutdown_tx.subscribe())));
    }

    let shutdown_tx_clone = shutdown_tx.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        shutdown_tx_clone.send(()).ok();
    });

    report_loop(
        &stream_caches,
        correlate.then_some((&merged_cache, &forecast_cache)),
        Duration::from_secs(config.settle_secs),
        shutdown_tx.subscribe(),
    )
    .await;

    for task in tasks {
        task.await.ok();
    }
    info!("Ingester stopped");
    Ok(())
}

/// Log the current cache contents shortly after every interval
/// boundary, standing in for an archive writer.
async fn report_loop(
    stream_caches: &HashMap<Product, Arc<ReadingsCache>>,
    merged: Option<(&Arc<ReadingsCache>, &Arc<ForecastCache>)>,
    settle: Duration,
    mut shutdown: broadcast::Receiver<()>,
) {
    let interval = Duration::from_secs(300);
    loop {
        // extra settle so the caches are written before we read them
        let wait = waiting_time(Utc::now(), interval, Duration::ZERO) + settle * 2;
        tokio::select! {
            _ = shutdown.recv() => {
                info!("Shutting down reporter");
                return;
            }
            _ = tokio::time::sleep(wait) => {}
        }

        let now = Utc::now();
        for (product, cache) in stream_caches {
            let (readings, interval_minutes) = cache.get_data(now);
            info!(
                product = %product,
                interval_minutes,
                readings = %readings_json(&readings),
                "current readings"
            );
        }
        if let Some((merged_cache, forecast_cache)) = merged {
            let (readings, _) = merged_cache.get_data(now);
            info!(readings = %readings_json(&readings), "merged cycle readings");
            let series = forecast_cache.get_forecast();
            info!(steps = series.starts.len(), "forecast series available");
        }
    }
}

/// Reading map rendered as a JSON object for the log stream.
fn readings_json(readings: &HashMap<String, Reading>) -> serde_json::Value {
    let map: serde_json::Map<String, serde_json::Value> = readings
        .iter()
        .map(|(key, reading)| (key.clone(), reading_json(reading)))
        .collect();
    serde_json::Value::Object(map)
}

fn reading_json(reading: &Reading) -> serde_json::Value {
    match &reading.value {
        ReadingValue::Category(raw) => serde_json::json!(raw),
        ReadingValue::Wawa(code) => serde_json::json!(code),
        ReadingValue::Dbz(dbz) => serde_json::json!(dbz),
        ReadingValue::RainRate(rate) => serde_json::json!(rate),
        ReadingValue::Class(value) => serde_json::json!(value),
        ReadingValue::Timestamp(secs) => serde_json::json!(secs),
    }
}
