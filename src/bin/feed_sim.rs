//! Feed simulator - publishes a scripted signal sequence over MQTT
//!
//! Drives a running place-monitor end to end without real location
//! hardware: region crossings (including deliberate duplicates, which
//! the monitor must collapse) and location updates.
//!
//! Usage:
//!   cargo run --bin feed-sim -- --topic location/feed/sim

use chrono::Utc;
use clap::Parser;
use rumqttc::{AsyncClient, MqttOptions, QoS};
use serde_json::json;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// feed-sim - scripted platform feed publisher
#[derive(Parser, Debug)]
#[command(name = "feed-sim", version, about)]
struct Args {
    /// MQTT broker host
    #[arg(long, default_value = "localhost")]
    host: String,

    /// MQTT broker port
    #[arg(long, default_value_t = 1883)]
    port: u16,

    /// Topic to publish feed messages on
    #[arg(long, default_value = "location/feed/sim")]
    topic: String,

    /// Place identifier used in the scripted crossings
    #[arg(long, default_value = "store-42")]
    place: String,

    /// Delay between published messages (milliseconds)
    #[arg(long, default_value_t = 500)]
    step_ms: u64,
}

fn crossing(kind: &str, place: &str) -> serde_json::Value {
    json!({
        "events": [{
            "type": kind,
            "place_id": place,
            "time": Utc::now().to_rfc3339()
        }]
    })
}

fn location(latitude: f64, longitude: f64) -> serde_json::Value {
    json!({
        "events": [{
            "type": "LOCATION_UPDATE",
            "time": Utc::now().to_rfc3339(),
            "location": {
                "latitude": latitude,
                "longitude": longitude,
                "accuracy": 15.0
            }
        }]
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    let args = Args::parse();

    let mut mqttoptions = MqttOptions::new("feed-sim", &args.host, args.port);
    mqttoptions.set_keep_alive(Duration::from_secs(30));
    let (client, mut eventloop) = AsyncClient::new(mqttoptions, 16);

    // Drive the event loop in the background; the publisher only pushes
    tokio::spawn(async move {
        loop {
            if let Err(e) = eventloop.poll().await {
                error!(error = %e, "sim MQTT error");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    });

    // A walk past the place: approach fixes, a noisy double-enter,
    // a fix inside, a noisy double-exit, then a re-entry.
    let script = [
        location(43.6500, -79.3800),
        location(43.6510, -79.3810),
        crossing("REGION_ENTER", &args.place),
        crossing("REGION_ENTER", &args.place),
        location(43.6532, -79.3832),
        crossing("REGION_EXIT", &args.place),
        crossing("REGION_EXIT", &args.place),
        location(43.6540, -79.3840),
        crossing("REGION_ENTER", &args.place),
    ];

    info!(
        topic = %args.topic,
        place = %args.place,
        steps = %script.len(),
        "feed-sim publishing"
    );

    for payload in &script {
        client.publish(args.topic.clone(), QoS::AtMostOnce, false, payload.to_string()).await?;
        tokio::time::sleep(Duration::from_millis(args.step_ms)).await;
    }

    // Let the last publish flush before disconnecting
    tokio::time::sleep(Duration::from_millis(200)).await;
    client.disconnect().await.ok();
    info!("feed-sim done");
    Ok(())
}
