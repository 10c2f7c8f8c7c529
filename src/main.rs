//! place-monitor - place boundary monitoring daemon
//!
//! Bridges a platform location/geofencing feed to a single registered
//! observer: per-place containment state, de-bounced enter/exit
//! notifications, and visit egress.
//!
//! Module structure:
//! - `domain/` - Core types (PlaceId, ContainmentState, LocationSample, Visit)
//! - `io/` - External interfaces (MQTT feed, visit egress)
//! - `services/` - Business logic (ContainmentMap, PlaceMonitor)
//! - `infra/` - Infrastructure (Config, Metrics, Broker)

use clap::Parser;
use place_monitor::domain::types::{LocationSample, PlaceId};
use place_monitor::infra::{Config, Metrics};
use place_monitor::services::{PlaceMonitor, PlaceObserver};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::info;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// place-monitor - geofenced place monitoring daemon
#[derive(Parser, Debug)]
#[command(name = "place-monitor", version, about)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, default_value = "config/dev.toml")]
    config: String,
}

/// Default observer wired in by the daemon: logs every notification
struct EventLogObserver;

impl PlaceObserver for EventLogObserver {
    fn did_enter_place(&self, place: &PlaceId) {
        info!(place = %place, "place_entered");
    }

    fn did_exit_place(&self, place: &PlaceId) {
        info!(place = %place, "place_exited");
    }

    fn did_update_location(&self, sample: &LocationSample) {
        info!(
            latitude = %sample.latitude,
            longitude = %sample.longitude,
            accuracy_m = ?sample.accuracy_m,
            timestamp = %sample.timestamp.to_rfc3339(),
            "location_updated"
        );
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured logging with configurable level via RUST_LOG env var
    // Default: INFO, use RUST_LOG=debug for full signal visibility
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!(git_hash = %env!("GIT_HASH"), "place-monitor starting");

    let args = Args::parse();
    let config = Config::load_from_path(&args.config);

    // Start embedded MQTT broker if enabled
    place_monitor::infra::broker::start_embedded_broker(&config);

    info!(
        config_file = %config.config_file(),
        feed_host = %config.feed_host(),
        feed_port = %config.feed_port(),
        feed_topic = %config.feed_topic(),
        places = ?config.monitor_places(),
        egress_file = %config.egress_file(),
        "config_loaded"
    );

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let metrics = Arc::new(Metrics::new());

    // Create event channel (bounded for backpressure)
    let (event_tx, event_rx) = mpsc::channel(1000);

    // Start feed client
    let feed_config = config.clone();
    let feed_metrics = metrics.clone();
    let feed_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        if let Err(e) = place_monitor::io::feed::start_feed_client(
            &feed_config,
            event_tx,
            feed_metrics,
            feed_shutdown,
        )
        .await
        {
            tracing::error!(error = %e, "feed client error");
        }
    });

    let monitor = Arc::new(PlaceMonitor::new(&config, metrics.clone()));

    // Start metrics reporter (lock-free reads with full summary)
    let metrics_clone = metrics.clone();
    let reporter_monitor = monitor.clone();
    let metrics_interval = config.metrics_interval_secs();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(metrics_interval));
        loop {
            interval.tick().await;
            let summary = metrics_clone.report(reporter_monitor.monitored_count());
            summary.log();
        }
    });

    // Register the logging observer and start the configured places.
    // The Arc here owns the observer; the monitor only holds a weak ref.
    let observer: Arc<dyn PlaceObserver> = Arc::new(EventLogObserver);
    monitor.set_observer(&observer);
    for place in config.monitor_places() {
        monitor.start_monitoring(PlaceId::from(place.as_str()));
    }

    // Handle shutdown on Ctrl+C: explicit teardown before the tasks stop
    let shutdown_signal = shutdown_tx;
    let shutdown_monitor = monitor.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        shutdown_monitor.shutdown();
        let _ = shutdown_signal.send(true);
    });

    info!("monitor_started");

    // Run monitor - consumes feed events until the channel closes
    monitor.run(event_rx).await;

    info!("place-monitor shutdown complete");
    Ok(())
}
