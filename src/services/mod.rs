//! Services - business logic and state management
//!
//! - `containment` - Per-place containment state machine (de-bounce)
//! - `monitor` - Central signal processor and observer dispatch

pub mod containment;
pub mod monitor;

// Re-export commonly used types
pub use containment::{ContainmentMap, CrossingDecision};
pub use monitor::{PlaceMonitor, PlaceObserver};
