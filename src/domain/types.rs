//! Shared types for the place monitor

use serde::{Deserialize, Deserializer, Serialize};
use std::time::Instant;

use chrono::{DateTime, Utc};

/// Newtype wrapper for place identifiers to provide type safety
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct PlaceId(pub String);

impl PlaceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PlaceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PlaceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Direction of a region crossing signal from the platform feed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossingDirection {
    Enter,
    Exit,
}

impl CrossingDirection {
    pub fn as_str(&self) -> &str {
        match self {
            CrossingDirection::Enter => "enter",
            CrossingDirection::Exit => "exit",
        }
    }
}

/// Containment state of a monitored place
///
/// `Unknown` is the state before any crossing signal has been observed
/// for the place since monitoring began. Transitions only
/// `Unknown -> {Inside, Outside}` and thereafter `Inside <-> Outside`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContainmentState {
    #[default]
    Unknown,
    Outside,
    Inside,
}

impl ContainmentState {
    pub fn as_str(&self) -> &str {
        match self {
            ContainmentState::Unknown => "unknown",
            ContainmentState::Outside => "outside",
            ContainmentState::Inside => "inside",
        }
    }
}

/// Feed message structure for parsing
#[derive(Debug, Deserialize)]
pub struct FeedMessage {
    #[serde(default)]
    pub events: Vec<WireEvent>,
}

/// A single raw event inside a feed message
#[derive(Debug, Deserialize)]
pub struct WireEvent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub place_id: Option<String>,
    /// Timestamp - can be RFC 3339 string or epoch milliseconds integer
    #[serde(default, deserialize_with = "deserialize_timestamp")]
    pub time: TimestampValue,
    #[serde(default)]
    pub location: Option<WireLocation>,
}

#[derive(Debug, Deserialize)]
pub struct WireLocation {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub accuracy: Option<f64>,
    #[serde(default)]
    pub altitude: Option<f64>,
}

/// Timestamp that can be either an RFC 3339 string or epoch milliseconds
#[derive(Debug, Clone, Default)]
pub enum TimestampValue {
    #[default]
    None,
    IsoString(String),
    EpochMs(u64),
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<TimestampValue, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::{self, Visitor};

    struct TimestampVisitor;

    impl<'de> Visitor<'de> for TimestampVisitor {
        type Value = TimestampValue;

        fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
            formatter.write_str("a string or integer timestamp")
        }

        fn visit_str<E>(self, value: &str) -> Result<TimestampValue, E>
        where
            E: de::Error,
        {
            Ok(TimestampValue::IsoString(value.to_string()))
        }

        fn visit_string<E>(self, value: String) -> Result<TimestampValue, E>
        where
            E: de::Error,
        {
            Ok(TimestampValue::IsoString(value))
        }

        fn visit_u64<E>(self, value: u64) -> Result<TimestampValue, E>
        where
            E: de::Error,
        {
            Ok(TimestampValue::EpochMs(value))
        }

        fn visit_i64<E>(self, value: i64) -> Result<TimestampValue, E>
        where
            E: de::Error,
        {
            let epoch_ms = u64::try_from(value).unwrap_or(0);
            Ok(TimestampValue::EpochMs(epoch_ms))
        }
    }

    deserializer.deserialize_any(TimestampVisitor)
}

/// Signal kinds carried on the wire
#[derive(Debug, Clone, PartialEq)]
pub enum SignalKind {
    RegionEnter,
    RegionExit,
    LocationUpdate,
    Unknown(String),
}

impl std::str::FromStr for SignalKind {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "REGION_ENTER" => SignalKind::RegionEnter,
            "REGION_EXIT" => SignalKind::RegionExit,
            "LOCATION_UPDATE" => SignalKind::LocationUpdate,
            other => SignalKind::Unknown(other.to_string()),
        })
    }
}

/// A timestamped geographic fix received from the platform feed.
/// Immutable once parsed.
#[derive(Debug, Clone)]
pub struct LocationSample {
    pub latitude: f64,
    pub longitude: f64,
    /// Horizontal accuracy in meters, when the platform reports one
    pub accuracy_m: Option<f64>,
    pub altitude_m: Option<f64>,
    pub timestamp: DateTime<Utc>,
    pub received_at: Instant,
}

/// Parsed event for internal processing
#[derive(Debug, Clone)]
pub enum FeedEvent {
    Crossing {
        place: PlaceId,
        direction: CrossingDirection,
        /// Original event timestamp from the feed (epoch ms, 0 if absent)
        event_time: u64,
        received_at: Instant,
    },
    Location(LocationSample),
}
