//! Visit data model - one inside-span at a monitored place

use crate::domain::types::PlaceId;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Generate a new UUIDv7 (time-sortable)
pub fn new_uuid_v7() -> String {
    Uuid::now_v7().to_string()
}

/// Get current epoch milliseconds
#[inline]
pub fn epoch_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

/// How a visit ended
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VisitOutcome {
    /// Exit crossing observed
    Completed,
    /// Monitoring for the place stopped while still inside
    Truncated,
}

impl VisitOutcome {
    #[inline]
    pub fn as_str(&self) -> &str {
        match self {
            VisitOutcome::Completed => "completed",
            VisitOutcome::Truncated => "truncated",
        }
    }
}

/// A single stay at a place, from enter crossing to exit (or to
/// monitoring stop)
#[derive(Debug, Clone)]
pub struct Visit {
    pub vid: String, // UUIDv7 visit ID
    pub place: PlaceId,
    pub entered_at: u64, // epoch ms
    pub exited_at: Option<u64>,
    pub dwell_ms: u64,
    pub outcome: VisitOutcome,
}

impl Visit {
    /// Open a new visit at the moment of an enter crossing
    pub fn begin(place: PlaceId) -> Self {
        Self {
            vid: new_uuid_v7(),
            place,
            entered_at: epoch_ms(),
            exited_at: None,
            dwell_ms: 0,
            outcome: VisitOutcome::Completed,
        }
    }

    /// Close the visit with the given dwell and outcome
    pub fn close(&mut self, dwell_ms: u64, outcome: VisitOutcome) {
        self.exited_at = Some(epoch_ms());
        self.dwell_ms = dwell_ms;
        self.outcome = outcome;
    }

    /// Convert to short-key JSON string
    pub fn to_json(&self) -> String {
        self.to_json_with_site_opt(None)
    }

    /// Convert to short-key JSON string with site id included
    pub fn to_json_with_site(&self, site_id: &str) -> String {
        self.to_json_with_site_opt(Some(site_id))
    }

    fn to_json_with_site_opt(&self, site_id: Option<&str>) -> String {
        let mut obj = serde_json::Map::new();

        if let Some(site) = site_id {
            obj.insert("site".to_string(), serde_json::Value::String(site.to_string()));
        }

        obj.insert("vid".to_string(), serde_json::Value::String(self.vid.clone()));
        obj.insert("place".to_string(), serde_json::Value::String(self.place.0.clone()));
        obj.insert("t0".to_string(), serde_json::Value::Number(self.entered_at.into()));
        if let Some(exited) = self.exited_at {
            obj.insert("t1".to_string(), serde_json::Value::Number(exited.into()));
        }
        obj.insert("dwell".to_string(), serde_json::Value::Number(self.dwell_ms.into()));
        obj.insert("out".to_string(), serde_json::Value::String(self.outcome.as_str().to_string()));

        serde_json::Value::Object(obj).to_string()
    }
}
