//! Place boundary monitoring and observer dispatch
//!
//! The PlaceMonitor is the central event processor that coordinates:
//! - Containment state per monitored place (de-bounced crossings)
//! - Observer notification (enter, exit, location updates)
//! - Visit lifecycle (open on enter, close on exit, egress to file)

mod handlers;
#[cfg(test)]
mod tests;

use crate::domain::types::{ContainmentState, FeedEvent, LocationSample, PlaceId};
use crate::domain::visit::Visit;
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use crate::io::egress::Egress;
use crate::services::containment::ContainmentMap;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::{Arc, Weak};
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Observer receiving place boundary notifications.
///
/// At most one observer is registered at a time, held non-owning: the
/// application controls its lifetime, and a deallocated observer simply
/// stops receiving notifications.
///
/// Callbacks run synchronously in the context that delivered the
/// triggering signal, while the monitor's internal lock is held.
/// Implementations must return promptly and must not call back into
/// the monitor.
pub trait PlaceObserver: Send + Sync {
    fn did_enter_place(&self, place: &PlaceId);
    fn did_exit_place(&self, place: &PlaceId);
    fn did_update_location(&self, sample: &LocationSample);
}

/// A visit that has been entered but not yet exited
pub(crate) struct OpenVisit {
    pub(crate) visit: Visit,
    /// Monotonic enter time for dwell calculation
    pub(crate) entered: Instant,
}

/// State guarded by the monitor's lock: the containment map, open
/// visits, and the observer slot. All public operations serialize on
/// this one lock, so the de-bounce check, the state mutation, and the
/// observer dispatch for a signal are atomic with respect to every
/// other operation.
pub(crate) struct MonitorInner {
    pub(crate) containment: ContainmentMap,
    pub(crate) open_visits: FxHashMap<PlaceId, OpenVisit>,
    pub(crate) observer: Option<Weak<dyn PlaceObserver>>,
}

/// Central processor for place containment tracking and observer dispatch
pub struct PlaceMonitor {
    pub(crate) inner: Mutex<MonitorInner>,
    /// Writes closed visits to file
    pub(crate) egress: Egress,
    /// Metrics collector
    pub(crate) metrics: Arc<Metrics>,
    pub(crate) site_id: String,
}

impl PlaceMonitor {
    /// Create a new monitor with zero monitored places and no observer
    pub fn new(config: &Config, metrics: Arc<Metrics>) -> Self {
        let egress = Egress::new(config.egress_file());
        Self {
            inner: Mutex::new(MonitorInner {
                containment: ContainmentMap::new(),
                open_visits: FxHashMap::default(),
                observer: None,
            }),
            egress,
            metrics,
            site_id: config.site_id().to_string(),
        }
    }

    /// Register `observer` as the single notification target, replacing
    /// any previous one. Only a weak reference is kept. Events occurring
    /// after this call returns are delivered to `observer` only; there
    /// is no replay of past events.
    pub fn set_observer(&self, observer: &Arc<dyn PlaceObserver>) {
        let mut inner = self.inner.lock();
        inner.observer = Some(Arc::downgrade(observer));
        debug!("observer_registered");
    }

    /// Remove the current observer, if any. Subsequent events are
    /// silently dropped until a new observer is registered.
    pub fn clear_observer(&self) {
        let mut inner = self.inner.lock();
        inner.observer = None;
        debug!("observer_cleared");
    }

    /// Begin tracking a place with containment state `Unknown`.
    ///
    /// Idempotent: re-calling for an already-monitored place is a no-op
    /// and does not reset its state.
    pub fn start_monitoring(&self, place: PlaceId) {
        let mut inner = self.inner.lock();
        if inner.containment.start(place.clone()) {
            info!(place = %place, "monitoring_started");
        } else {
            debug!(place = %place, "monitoring_already_active");
        }
    }

    /// Stop tracking a place and discard its state. Idempotent.
    ///
    /// No events for the place are dispatched after this call returns;
    /// crossing signals already in flight are dropped. A visit still
    /// open for the place is closed as truncated.
    pub fn stop_monitoring(&self, place: &PlaceId) {
        let truncated = {
            let mut inner = self.inner.lock();
            let Some(last_state) = inner.containment.stop(place) else {
                debug!(place = %place, "monitoring_not_active");
                return;
            };
            info!(place = %place, last_state = %last_state.as_str(), "monitoring_stopped");
            inner.open_visits.remove(place).map(Self::close_truncated)
        };

        if let Some(visit) = truncated {
            self.write_visit(&visit);
        }
    }

    /// Tear down: stop monitoring every place and clear the observer.
    /// Open visits are closed as truncated.
    pub fn shutdown(&self) {
        let truncated: Vec<Visit> = {
            let mut inner = self.inner.lock();
            let places = inner.containment.drain();
            inner.observer = None;
            info!(places = %places.len(), "monitor_shutdown");
            inner.open_visits.drain().map(|(_, open)| Self::close_truncated(open)).collect()
        };

        for visit in &truncated {
            self.write_visit(visit);
        }
    }

    /// Consume feed events until the channel closes
    pub async fn run(&self, mut event_rx: mpsc::Receiver<FeedEvent>) {
        while let Some(event) = event_rx.recv().await {
            self.process_event(event);
        }
        debug!("feed_channel_closed");
    }

    /// Apply a single feed event
    pub fn process_event(&self, event: FeedEvent) {
        let process_start = Instant::now();

        match event {
            FeedEvent::Crossing { place, direction, .. } => {
                self.on_region_crossing(&place, direction);
            }
            FeedEvent::Location(sample) => {
                self.on_location_update(sample);
            }
        }

        let latency_us = process_start.elapsed().as_micros() as u64;
        self.metrics.record_signal_processed(latency_us);
    }

    /// Number of places currently monitored
    pub fn monitored_count(&self) -> usize {
        self.inner.lock().containment.len()
    }

    pub fn is_monitored(&self, place: &PlaceId) -> bool {
        self.inner.lock().containment.contains(place)
    }

    /// Current containment state for a place, if monitored
    pub fn containment(&self, place: &PlaceId) -> Option<ContainmentState> {
        self.inner.lock().containment.state(place)
    }
}
