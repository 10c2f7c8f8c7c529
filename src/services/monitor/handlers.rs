//! Signal handlers for the PlaceMonitor
//!
//! Each handler applies one signal from the feed. The de-bounce
//! decision, the containment mutation, and the observer dispatch happen
//! in a single critical section, so concurrent signals for the same
//! place and racing observer changes cannot interleave.

use super::{MonitorInner, OpenVisit, PlaceMonitor, PlaceObserver};
use crate::domain::types::{ContainmentState, CrossingDirection, LocationSample, PlaceId};
use crate::domain::visit::{Visit, VisitOutcome};
use crate::services::containment::CrossingDecision;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

impl PlaceMonitor {
    /// Handle a region crossing signal from the feed
    ///
    /// Signals for unmonitored places and signals that would not change
    /// containment state are suppressed, never surfaced as errors.
    /// Spurious repeated platform signals therefore produce exactly one
    /// enter/exit notification per real boundary crossing.
    pub fn on_region_crossing(&self, place: &PlaceId, direction: CrossingDirection) {
        let completed = {
            let mut inner = self.inner.lock();

            match inner.containment.apply(place, direction) {
                CrossingDecision::Unmonitored => {
                    self.metrics.record_unmonitored_dropped();
                    debug!(
                        place = %place,
                        direction = %direction.as_str(),
                        "signal_unmonitored"
                    );
                    None
                }
                CrossingDecision::Duplicate(state) => {
                    self.metrics.record_duplicate_suppressed();
                    debug!(
                        place = %place,
                        direction = %direction.as_str(),
                        state = %state.as_str(),
                        "signal_suppressed"
                    );
                    None
                }
                CrossingDecision::Transition { from, to } => {
                    self.handle_transition(&mut inner, place, from, to)
                }
            }
        };

        // File append happens outside the critical section
        if let Some(visit) = completed {
            self.write_visit(&visit);
        }
    }

    /// Apply a real containment transition: visit bookkeeping plus
    /// observer dispatch. Returns a visit that became ready for egress.
    fn handle_transition(
        &self,
        inner: &mut MonitorInner,
        place: &PlaceId,
        from: ContainmentState,
        to: ContainmentState,
    ) -> Option<Visit> {
        info!(
            place = %place,
            from = %from.as_str(),
            to = %to.as_str(),
            "containment_transition"
        );

        match to {
            ContainmentState::Inside => {
                inner.open_visits.insert(
                    place.clone(),
                    OpenVisit { visit: Visit::begin(place.clone()), entered: Instant::now() },
                );
                if let Some(observer) = self.live_observer(inner) {
                    observer.did_enter_place(place);
                    self.metrics.record_enter_dispatched();
                }
                None
            }
            ContainmentState::Outside => {
                // Exit from Unknown has no open visit; only the
                // notification is produced.
                let completed = inner.open_visits.remove(place).map(|open| {
                    let dwell_ms = open.entered.elapsed().as_millis() as u64;
                    let mut visit = open.visit;
                    visit.close(dwell_ms, VisitOutcome::Completed);
                    visit
                });
                if let Some(observer) = self.live_observer(inner) {
                    observer.did_exit_place(place);
                    self.metrics.record_exit_dispatched();
                }
                completed
            }
            // Unknown is never a transition target
            ContainmentState::Unknown => None,
        }
    }

    /// Handle a location update from the feed
    ///
    /// Dispatched unconditionally while an observer is registered; no
    /// deduplication, no containment change.
    pub fn on_location_update(&self, sample: LocationSample) {
        let mut inner = self.inner.lock();
        if let Some(observer) = self.live_observer(&mut inner) {
            observer.did_update_location(&sample);
            self.metrics.record_location_dispatched();
        }
    }

    /// Upgrade the observer slot, clearing it if the observer has been
    /// deallocated. Returns None (and counts the dropped dispatch) when
    /// nobody is listening.
    fn live_observer(&self, inner: &mut MonitorInner) -> Option<Arc<dyn PlaceObserver>> {
        let Some(weak) = inner.observer.as_ref() else {
            self.metrics.record_no_observer();
            return None;
        };

        match weak.upgrade() {
            Some(observer) => Some(observer),
            None => {
                inner.observer = None;
                self.metrics.record_no_observer();
                debug!("observer_deallocated");
                None
            }
        }
    }

    /// Close an open visit whose place stopped being monitored
    pub(crate) fn close_truncated(open: OpenVisit) -> Visit {
        let dwell_ms = open.entered.elapsed().as_millis() as u64;
        let mut visit = open.visit;
        visit.close(dwell_ms, VisitOutcome::Truncated);
        visit
    }

    pub(crate) fn write_visit(&self, visit: &Visit) {
        self.egress.write_visit(visit, &self.site_id);
    }
}
