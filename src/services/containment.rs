//! Per-place containment state machine
//!
//! Decides, for each crossing signal, whether it represents a real
//! transition or noise to suppress. Geofence hardware is known to
//! repeat boundary triggers; a signal only transitions a place when the
//! target state differs from the current one, so repeated signals in
//! the same direction collapse to a single transition.

use crate::domain::types::{ContainmentState, CrossingDirection, PlaceId};
use rustc_hash::FxHashMap;

/// Outcome of applying one crossing signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossingDecision {
    /// State changed; the observer should be notified
    Transition { from: ContainmentState, to: ContainmentState },
    /// Signal would not change containment state; suppressed
    Duplicate(ContainmentState),
    /// Place is not currently monitored; dropped
    Unmonitored,
}

/// Containment state for every monitored place
pub struct ContainmentMap {
    states: FxHashMap<PlaceId, ContainmentState>,
}

impl ContainmentMap {
    pub fn new() -> Self {
        Self { states: FxHashMap::default() }
    }

    /// Begin tracking a place with state `Unknown`.
    ///
    /// Idempotent: an already-monitored place keeps its current state.
    /// Returns true if the place was newly added.
    pub fn start(&mut self, place: PlaceId) -> bool {
        match self.states.entry(place) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert(ContainmentState::Unknown);
                true
            }
        }
    }

    /// Discard state for a place. Idempotent.
    /// Returns the state the place was in, if it was monitored.
    pub fn stop(&mut self, place: &PlaceId) -> Option<ContainmentState> {
        self.states.remove(place)
    }

    /// Apply a crossing signal to a place
    pub fn apply(&mut self, place: &PlaceId, direction: CrossingDirection) -> CrossingDecision {
        let Some(state) = self.states.get_mut(place) else {
            return CrossingDecision::Unmonitored;
        };

        let target = match direction {
            CrossingDirection::Enter => ContainmentState::Inside,
            CrossingDirection::Exit => ContainmentState::Outside,
        };

        if *state == target {
            return CrossingDecision::Duplicate(target);
        }

        let from = *state;
        *state = target;
        CrossingDecision::Transition { from, to: target }
    }

    /// Current state for a place, if monitored
    pub fn state(&self, place: &PlaceId) -> Option<ContainmentState> {
        self.states.get(place).copied()
    }

    pub fn contains(&self, place: &PlaceId) -> bool {
        self.states.contains_key(place)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Remove and return all places, for teardown
    pub fn drain(&mut self) -> Vec<(PlaceId, ContainmentState)> {
        self.states.drain().collect()
    }
}

impl Default for ContainmentMap {
    fn default() -> Self {
        Self::new()
    }
}
