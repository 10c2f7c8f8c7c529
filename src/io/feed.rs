//! MQTT client for receiving platform location/geofencing signals
//!
//! The platform service publishes JSON messages carrying an ordered
//! `events` array of region crossings and location updates. Events are
//! forwarded to the monitor channel in arrival order; the channel is
//! bounded and overflow is dropped, never blocking the MQTT event loop.

use crate::domain::types::{
    CrossingDirection, FeedEvent, FeedMessage, LocationSample, PlaceId, SignalKind, TimestampValue,
    WireEvent,
};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use chrono::{DateTime, Utc};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use smallvec::SmallVec;
use std::sync::Arc;
use std::time::{Duration, Instant};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Start the MQTT feed client and send parsed events to the channel
///
/// Events are sent via try_send to avoid blocking the MQTT eventloop.
/// Dropped events are counted in metrics and logged (rate-limited).
pub async fn start_feed_client(
    config: &Config,
    event_tx: mpsc::Sender<FeedEvent>,
    metrics: Arc<Metrics>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut mqttoptions = MqttOptions::new("place-monitor", config.feed_host(), config.feed_port());
    mqttoptions.set_keep_alive(Duration::from_secs(30));

    if let (Some(username), Some(password)) = (config.feed_username(), config.feed_password()) {
        mqttoptions.set_credentials(username, password);
    }

    let (client, mut eventloop) = AsyncClient::new(mqttoptions, 100);
    client.subscribe(config.feed_topic(), QoS::AtMostOnce).await?;

    info!(
        topic = %config.feed_topic(),
        host = %config.feed_host(),
        port = %config.feed_port(),
        "feed client subscribed"
    );

    // Rate-limit drop warnings to 1 per second
    let mut last_drop_warn = Instant::now() - Duration::from_secs(2);

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("feed_shutdown");
                    return Ok(());
                }
            }
            result = eventloop.poll() => {
                match result {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let received_at = Instant::now();
                        match std::str::from_utf8(&publish.payload) {
                            Ok(json_str) => {
                                let events = parse_feed_message(json_str, received_at);
                                if !events.is_empty() {
                                    debug!(
                                        topic = %publish.topic,
                                        event_count = %events.len(),
                                        "feed message with events"
                                    );
                                }
                                for event in events {
                                    metrics.record_feed_signal_received();
                                    if let Err(e) = event_tx.try_send(event) {
                                        match e {
                                            TrySendError::Full(_) => {
                                                metrics.record_feed_signal_dropped();
                                                if last_drop_warn.elapsed() > Duration::from_secs(1) {
                                                    warn!("feed_signal_dropped: channel full");
                                                    last_drop_warn = Instant::now();
                                                }
                                            }
                                            TrySendError::Closed(_) => {
                                                warn!("event channel closed");
                                                return Ok(());
                                            }
                                        }
                                    }
                                }
                            }
                            Err(e) => {
                                warn!(error = %e, "invalid UTF-8 in feed payload");
                            }
                        }
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("feed connected");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!(error = %e, "feed MQTT error");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        }
    }
}

/// Parse a feed JSON message into typed events, preserving array order
pub fn parse_feed_message(json_str: &str, received_at: Instant) -> SmallVec<[FeedEvent; 4]> {
    let mut parsed = SmallVec::new();

    let message: FeedMessage = match serde_json::from_str(json_str) {
        Ok(m) => m,
        Err(e) => {
            debug!(error = %e, "failed to parse feed message");
            return parsed;
        }
    };

    for wire_event in message.events {
        if let Some(event) = parse_wire_event(wire_event, received_at) {
            parsed.push(event);
        }
    }

    parsed
}

fn parse_wire_event(wire: WireEvent, received_at: Instant) -> Option<FeedEvent> {
    let kind: SignalKind = wire.kind.parse().unwrap();

    let direction = match kind {
        SignalKind::RegionEnter => CrossingDirection::Enter,
        SignalKind::RegionExit => CrossingDirection::Exit,
        SignalKind::LocationUpdate => {
            let Some(location) = wire.location else {
                debug!("location update without location payload");
                return None;
            };
            return Some(FeedEvent::Location(LocationSample {
                latitude: location.latitude,
                longitude: location.longitude,
                accuracy_m: location.accuracy,
                altitude_m: location.altitude,
                timestamp: timestamp_to_datetime(&wire.time),
                received_at,
            }));
        }
        SignalKind::Unknown(ref other) => {
            debug!(kind = %other, "unknown feed event type");
            return None;
        }
    };

    let Some(place_id) = wire.place_id else {
        debug!(kind = %wire.kind, "crossing signal without place_id");
        return None;
    };

    Some(FeedEvent::Crossing {
        place: PlaceId(place_id),
        direction,
        event_time: timestamp_to_epoch_ms(&wire.time),
        received_at,
    })
}

/// Parse an RFC 3339 timestamp to epoch milliseconds
fn parse_rfc3339_ms(time_str: &str) -> Option<u64> {
    OffsetDateTime::parse(time_str, &Rfc3339)
        .ok()
        .map(|dt| (dt.unix_timestamp_nanos() / 1_000_000) as u64)
}

/// Extract epoch milliseconds from TimestampValue
fn timestamp_to_epoch_ms(ts: &TimestampValue) -> u64 {
    match ts {
        TimestampValue::EpochMs(ms) => *ms,
        TimestampValue::IsoString(s) => parse_rfc3339_ms(s).unwrap_or(0),
        TimestampValue::None => 0,
    }
}

/// Convert a wire timestamp to a UTC datetime, falling back to now for
/// absent or unparseable values
fn timestamp_to_datetime(ts: &TimestampValue) -> DateTime<Utc> {
    match ts {
        TimestampValue::EpochMs(ms) => {
            DateTime::from_timestamp_millis(*ms as i64).unwrap_or_else(Utc::now)
        }
        TimestampValue::IsoString(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        TimestampValue::None => Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_region_enter() {
        let json = r#"{
            "events": [{
                "type": "REGION_ENTER",
                "place_id": "store-42",
                "time": "2026-08-06T10:15:30.048+00:00"
            }]
        }"#;

        let events = parse_feed_message(json, Instant::now());
        assert_eq!(events.len(), 1);
        match &events[0] {
            FeedEvent::Crossing { place, direction, event_time, .. } => {
                assert_eq!(place, &PlaceId::from("store-42"));
                assert_eq!(*direction, CrossingDirection::Enter);
                assert!(*event_time > 1700000000000, "event_time should be parsed from RFC 3339");
            }
            other => panic!("expected crossing, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_region_exit_epoch_ms_time() {
        let json = r#"{
            "events": [{
                "type": "REGION_EXIT",
                "place_id": "store-42",
                "time": 1767617600000
            }]
        }"#;

        let events = parse_feed_message(json, Instant::now());
        assert_eq!(events.len(), 1);
        match &events[0] {
            FeedEvent::Crossing { direction, event_time, .. } => {
                assert_eq!(*direction, CrossingDirection::Exit);
                assert_eq!(*event_time, 1767617600000);
            }
            other => panic!("expected crossing, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_location_update() {
        let json = r#"{
            "events": [{
                "type": "LOCATION_UPDATE",
                "time": 1767617600000,
                "location": {
                    "latitude": 43.6532,
                    "longitude": -79.3832,
                    "accuracy": 12.5,
                    "altitude": 76.0
                }
            }]
        }"#;

        let events = parse_feed_message(json, Instant::now());
        assert_eq!(events.len(), 1);
        match &events[0] {
            FeedEvent::Location(sample) => {
                assert_eq!(sample.latitude, 43.6532);
                assert_eq!(sample.longitude, -79.3832);
                assert_eq!(sample.accuracy_m, Some(12.5));
                assert_eq!(sample.altitude_m, Some(76.0));
                assert_eq!(sample.timestamp.timestamp_millis(), 1767617600000);
            }
            other => panic!("expected location, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_preserves_arrival_order() {
        let json = r#"{
            "events": [
                {"type": "REGION_ENTER", "place_id": "store-42"},
                {"type": "LOCATION_UPDATE", "location": {"latitude": 1.0, "longitude": 2.0}},
                {"type": "REGION_EXIT", "place_id": "store-42"}
            ]
        }"#;

        let events = parse_feed_message(json, Instant::now());
        assert_eq!(events.len(), 3);
        assert!(matches!(
            events[0],
            FeedEvent::Crossing { direction: CrossingDirection::Enter, .. }
        ));
        assert!(matches!(events[1], FeedEvent::Location(_)));
        assert!(matches!(
            events[2],
            FeedEvent::Crossing { direction: CrossingDirection::Exit, .. }
        ));
    }

    #[test]
    fn test_parse_skips_unknown_types() {
        let json = r#"{
            "events": [
                {"type": "BEACON_SIGHTING", "place_id": "store-42"},
                {"type": "REGION_ENTER", "place_id": "store-42"}
            ]
        }"#;

        let events = parse_feed_message(json, Instant::now());
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_parse_skips_crossing_without_place() {
        let json = r#"{"events": [{"type": "REGION_ENTER"}]}"#;

        let events = parse_feed_message(json, Instant::now());
        assert!(events.is_empty());
    }

    #[test]
    fn test_parse_invalid_json() {
        let events = parse_feed_message("not json", Instant::now());
        assert!(events.is_empty());
    }

    #[test]
    fn test_parse_empty_events() {
        let events = parse_feed_message(r#"{"events": []}"#, Instant::now());
        assert!(events.is_empty());
    }

    #[test]
    fn test_parse_rfc3339_ms() {
        let ts = parse_rfc3339_ms("2026-08-06T10:15:30.048+00:00");
        assert!(ts.is_some());
        let ms = ts.unwrap();
        assert!(ms > 1700000000000, "timestamp should be in 2026");
        assert!(ms < 1800000000000, "timestamp should be before 2027");

        assert!(parse_rfc3339_ms("not a timestamp").is_none());
        assert!(parse_rfc3339_ms("").is_none());
    }
}
