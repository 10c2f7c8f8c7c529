//! Tests for the PlaceMonitor

use super::*;
use crate::domain::types::CrossingDirection;
use chrono::Utc;
use std::sync::Arc;

/// Test harness that keeps the egress temp dir alive for the monitor's
/// lifetime
struct TestMonitor {
    monitor: PlaceMonitor,
    egress_dir: tempfile::TempDir,
}

impl std::ops::Deref for TestMonitor {
    type Target = PlaceMonitor;
    fn deref(&self) -> &Self::Target {
        &self.monitor
    }
}

impl TestMonitor {
    fn egress_path(&self) -> std::path::PathBuf {
        self.egress_dir.path().join("visits.jsonl")
    }

    fn egress_lines(&self) -> Vec<serde_json::Value> {
        let content = std::fs::read_to_string(self.egress_path()).unwrap_or_default();
        content.lines().map(|l| serde_json::from_str(l).unwrap()).collect()
    }
}

fn create_test_monitor() -> TestMonitor {
    let egress_dir = tempfile::tempdir().unwrap();
    let egress_file = egress_dir.path().join("visits.jsonl");
    let config = Config::default().with_egress_file(egress_file.to_str().unwrap());
    let monitor = PlaceMonitor::new(&config, Arc::new(Metrics::new()));
    TestMonitor { monitor, egress_dir }
}

#[derive(Debug, Clone, PartialEq)]
enum Notification {
    Entered(String),
    Exited(String),
    Location { latitude: f64, longitude: f64 },
}

#[derive(Default)]
struct RecordingObserver {
    notifications: parking_lot::Mutex<Vec<Notification>>,
}

impl RecordingObserver {
    fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().clone()
    }
}

impl PlaceObserver for RecordingObserver {
    fn did_enter_place(&self, place: &PlaceId) {
        self.notifications.lock().push(Notification::Entered(place.0.clone()));
    }

    fn did_exit_place(&self, place: &PlaceId) {
        self.notifications.lock().push(Notification::Exited(place.0.clone()));
    }

    fn did_update_location(&self, sample: &LocationSample) {
        self.notifications.lock().push(Notification::Location {
            latitude: sample.latitude,
            longitude: sample.longitude,
        });
    }
}

fn register(monitor: &PlaceMonitor, observer: &Arc<RecordingObserver>) {
    let as_dyn: Arc<dyn PlaceObserver> = observer.clone();
    monitor.set_observer(&as_dyn);
}

fn place(id: &str) -> PlaceId {
    PlaceId::from(id)
}

fn sample(latitude: f64, longitude: f64) -> LocationSample {
    LocationSample {
        latitude,
        longitude,
        accuracy_m: Some(10.0),
        altitude_m: None,
        timestamp: Utc::now(),
        received_at: Instant::now(),
    }
}

#[test]
fn test_repeated_enter_dispatches_once() {
    let monitor = create_test_monitor();
    let observer = Arc::new(RecordingObserver::default());
    register(&monitor, &observer);

    monitor.start_monitoring(place("store-42"));
    monitor.on_region_crossing(&place("store-42"), CrossingDirection::Enter);
    monitor.on_region_crossing(&place("store-42"), CrossingDirection::Enter);
    monitor.on_region_crossing(&place("store-42"), CrossingDirection::Enter);

    assert_eq!(observer.notifications(), vec![Notification::Entered("store-42".to_string())]);
    assert_eq!(monitor.containment(&place("store-42")), Some(ContainmentState::Inside));
}

#[test]
fn test_exit_before_any_enter() {
    let monitor = create_test_monitor();
    let observer = Arc::new(RecordingObserver::default());
    register(&monitor, &observer);

    monitor.start_monitoring(place("store-42"));
    monitor.on_region_crossing(&place("store-42"), CrossingDirection::Exit);

    assert_eq!(observer.notifications(), vec![Notification::Exited("store-42".to_string())]);
    assert_eq!(monitor.containment(&place("store-42")), Some(ContainmentState::Outside));
}

#[test]
fn test_noisy_crossing_sequence() {
    // Enter, Enter, Exit, Exit, Enter with an observer registered
    // throughout produces exactly three notifications
    let monitor = create_test_monitor();
    let observer = Arc::new(RecordingObserver::default());
    register(&monitor, &observer);

    monitor.start_monitoring(place("store-42"));
    for direction in [
        CrossingDirection::Enter,
        CrossingDirection::Enter,
        CrossingDirection::Exit,
        CrossingDirection::Exit,
        CrossingDirection::Enter,
    ] {
        monitor.on_region_crossing(&place("store-42"), direction);
    }

    assert_eq!(
        observer.notifications(),
        vec![
            Notification::Entered("store-42".to_string()),
            Notification::Exited("store-42".to_string()),
            Notification::Entered("store-42".to_string()),
        ]
    );
}

#[test]
fn test_unmonitored_place_produces_nothing() {
    let monitor = create_test_monitor();
    let observer = Arc::new(RecordingObserver::default());
    register(&monitor, &observer);

    monitor.on_region_crossing(&place("unknown-place"), CrossingDirection::Enter);

    assert!(observer.notifications().is_empty());
    assert_eq!(monitor.monitored_count(), 0);
}

#[test]
fn test_stop_monitoring_drops_in_flight_signals() {
    let monitor = create_test_monitor();
    let observer = Arc::new(RecordingObserver::default());
    register(&monitor, &observer);

    monitor.start_monitoring(place("store-42"));
    monitor.on_region_crossing(&place("store-42"), CrossingDirection::Enter);
    monitor.stop_monitoring(&place("store-42"));

    monitor.on_region_crossing(&place("store-42"), CrossingDirection::Exit);
    monitor.on_region_crossing(&place("store-42"), CrossingDirection::Enter);

    assert_eq!(observer.notifications(), vec![Notification::Entered("store-42".to_string())]);
    assert!(!monitor.is_monitored(&place("store-42")));
}

#[test]
fn test_start_monitoring_is_idempotent() {
    let monitor = create_test_monitor();
    let observer = Arc::new(RecordingObserver::default());
    register(&monitor, &observer);

    monitor.start_monitoring(place("store-42"));
    monitor.on_region_crossing(&place("store-42"), CrossingDirection::Enter);

    // Re-starting must not reset containment to Unknown
    monitor.start_monitoring(place("store-42"));
    monitor.on_region_crossing(&place("store-42"), CrossingDirection::Enter);

    assert_eq!(observer.notifications(), vec![Notification::Entered("store-42".to_string())]);
}

#[test]
fn test_location_updates_dispatch_unconditionally() {
    let monitor = create_test_monitor();
    let observer = Arc::new(RecordingObserver::default());
    register(&monitor, &observer);

    // No monitored places at all - location updates still flow
    monitor.on_location_update(sample(43.65, -79.38));
    monitor.on_location_update(sample(43.66, -79.39));

    assert_eq!(observer.notifications().len(), 2);
}

#[test]
fn test_ordering_preserved_across_event_kinds() {
    let monitor = create_test_monitor();
    let observer = Arc::new(RecordingObserver::default());
    register(&monitor, &observer);

    monitor.start_monitoring(place("store-42"));
    monitor.on_region_crossing(&place("store-42"), CrossingDirection::Enter);
    monitor.on_location_update(sample(43.65, -79.38));
    monitor.on_region_crossing(&place("store-42"), CrossingDirection::Exit);

    assert_eq!(
        observer.notifications(),
        vec![
            Notification::Entered("store-42".to_string()),
            Notification::Location { latitude: 43.65, longitude: -79.38 },
            Notification::Exited("store-42".to_string()),
        ]
    );
}

#[test]
fn test_no_observer_means_silent_transitions() {
    let monitor = create_test_monitor();

    monitor.start_monitoring(place("store-42"));
    monitor.on_region_crossing(&place("store-42"), CrossingDirection::Enter);
    monitor.on_location_update(sample(43.65, -79.38));

    // State still advances without anyone listening
    assert_eq!(monitor.containment(&place("store-42")), Some(ContainmentState::Inside));
}

#[test]
fn test_observer_replacement_mid_stream() {
    let monitor = create_test_monitor();
    let first = Arc::new(RecordingObserver::default());
    let second = Arc::new(RecordingObserver::default());
    register(&monitor, &first);

    monitor.start_monitoring(place("store-42"));
    monitor.on_region_crossing(&place("store-42"), CrossingDirection::Enter);

    register(&monitor, &second);
    monitor.on_region_crossing(&place("store-42"), CrossingDirection::Exit);
    monitor.on_location_update(sample(43.65, -79.38));

    assert_eq!(first.notifications(), vec![Notification::Entered("store-42".to_string())]);
    assert_eq!(
        second.notifications(),
        vec![
            Notification::Exited("store-42".to_string()),
            Notification::Location { latitude: 43.65, longitude: -79.38 },
        ]
    );
}

#[test]
fn test_clear_observer_stops_dispatch() {
    let monitor = create_test_monitor();
    let observer = Arc::new(RecordingObserver::default());
    register(&monitor, &observer);

    monitor.start_monitoring(place("store-42"));
    monitor.on_region_crossing(&place("store-42"), CrossingDirection::Enter);

    monitor.clear_observer();
    monitor.on_region_crossing(&place("store-42"), CrossingDirection::Exit);

    assert_eq!(observer.notifications(), vec![Notification::Entered("store-42".to_string())]);
    // The exit still transitioned state
    assert_eq!(monitor.containment(&place("store-42")), Some(ContainmentState::Outside));
}

#[test]
fn test_deallocated_observer_is_tolerated() {
    let monitor = create_test_monitor();
    let observer = Arc::new(RecordingObserver::default());
    register(&monitor, &observer);

    monitor.start_monitoring(place("store-42"));
    drop(observer);

    // Dispatch to a dead observer is silently dropped, never a failure
    monitor.on_region_crossing(&place("store-42"), CrossingDirection::Enter);
    monitor.on_location_update(sample(43.65, -79.38));

    assert_eq!(monitor.containment(&place("store-42")), Some(ContainmentState::Inside));
}

#[test]
fn test_completed_visit_egressed() {
    let monitor = create_test_monitor();
    let observer = Arc::new(RecordingObserver::default());
    register(&monitor, &observer);

    monitor.start_monitoring(place("store-42"));
    monitor.on_region_crossing(&place("store-42"), CrossingDirection::Enter);
    monitor.on_region_crossing(&place("store-42"), CrossingDirection::Exit);

    let lines = monitor.egress_lines();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["place"], "store-42");
    assert_eq!(lines[0]["out"], "completed");
}

#[test]
fn test_stop_while_inside_truncates_visit() {
    let monitor = create_test_monitor();

    monitor.start_monitoring(place("store-42"));
    monitor.on_region_crossing(&place("store-42"), CrossingDirection::Enter);
    monitor.stop_monitoring(&place("store-42"));

    let lines = monitor.egress_lines();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["out"], "truncated");
}

#[test]
fn test_exit_from_unknown_writes_no_visit() {
    let monitor = create_test_monitor();

    monitor.start_monitoring(place("store-42"));
    monitor.on_region_crossing(&place("store-42"), CrossingDirection::Exit);

    assert!(monitor.egress_lines().is_empty());
}

#[test]
fn test_shutdown_tears_everything_down() {
    let monitor = create_test_monitor();
    let observer = Arc::new(RecordingObserver::default());
    register(&monitor, &observer);

    monitor.start_monitoring(place("store-42"));
    monitor.start_monitoring(place("cafe-7"));
    monitor.on_region_crossing(&place("store-42"), CrossingDirection::Enter);

    monitor.shutdown();

    assert_eq!(monitor.monitored_count(), 0);

    // The open visit was truncated on the way out
    let lines = monitor.egress_lines();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["out"], "truncated");

    // Everything after shutdown is dropped silently
    monitor.on_region_crossing(&place("store-42"), CrossingDirection::Enter);
    monitor.on_location_update(sample(43.65, -79.38));
    assert_eq!(observer.notifications(), vec![Notification::Entered("store-42".to_string())]);
}

#[tokio::test]
async fn test_run_consumes_feed_events_in_order() {
    let monitor = create_test_monitor();
    let observer = Arc::new(RecordingObserver::default());
    register(&monitor, &observer);
    monitor.start_monitoring(place("store-42"));

    let (event_tx, event_rx) = mpsc::channel(16);
    for event in [
        FeedEvent::Crossing {
            place: place("store-42"),
            direction: CrossingDirection::Enter,
            event_time: 0,
            received_at: Instant::now(),
        },
        FeedEvent::Location(sample(43.65, -79.38)),
        FeedEvent::Crossing {
            place: place("store-42"),
            direction: CrossingDirection::Exit,
            event_time: 0,
            received_at: Instant::now(),
        },
    ] {
        event_tx.send(event).await.unwrap();
    }
    drop(event_tx);

    // run() exits once the channel closes
    monitor.run(event_rx).await;

    assert_eq!(
        observer.notifications(),
        vec![
            Notification::Entered("store-42".to_string()),
            Notification::Location { latitude: 43.65, longitude: -79.38 },
            Notification::Exited("store-42".to_string()),
        ]
    );
    assert_eq!(monitor.metrics.signals_total(), 3);
}
