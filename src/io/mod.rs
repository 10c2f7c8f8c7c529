//! IO modules - external system interfaces
//!
//! - `feed` - MQTT client for receiving platform location/geofencing signals
//! - `egress` - Visit output to file (JSONL format)

pub mod egress;
pub mod feed;

// Re-export commonly used types
pub use egress::Egress;
pub use feed::start_feed_client;
