//! Configuration loading from TOML files
//!
//! The config file path is passed on the command line (`--config`);
//! a missing or unparseable file falls back to defaults with a warning.

use anyhow::Context;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Site identifier included in egressed visits
    #[serde(default = "default_site_id")]
    pub id: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self { id: default_site_id() }
    }
}

fn default_site_id() -> String {
    "place-monitor".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedConfig {
    #[serde(default = "default_feed_host")]
    pub host: String,
    #[serde(default = "default_feed_port")]
    pub port: u16,
    #[serde(default = "default_feed_topic")]
    pub topic: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            host: default_feed_host(),
            port: default_feed_port(),
            topic: default_feed_topic(),
            username: None,
            password: None,
        }
    }
}

fn default_feed_host() -> String {
    "localhost".to_string()
}

fn default_feed_port() -> u16 {
    1883
}

fn default_feed_topic() -> String {
    "location/feed/#".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    /// Run the embedded MQTT broker so the daemon is self-contained
    #[serde(default = "default_broker_enabled")]
    pub enabled: bool,
    #[serde(default = "default_broker_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_broker_port")]
    pub port: u16,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            enabled: default_broker_enabled(),
            bind_address: default_broker_bind_address(),
            port: default_broker_port(),
        }
    }
}

fn default_broker_enabled() -> bool {
    true
}

fn default_broker_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_broker_port() -> u16 {
    1883
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct PlacesConfig {
    /// Place identifiers to start monitoring at boot
    #[serde(default)]
    pub monitor: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EgressConfig {
    /// File path for visit egress (JSONL format)
    #[serde(default = "default_egress_file")]
    pub file: String,
}

impl Default for EgressConfig {
    fn default() -> Self {
        Self { file: default_egress_file() }
    }
}

fn default_egress_file() -> String {
    "visits.jsonl".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval")]
    pub interval_secs: u64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval() }
    }
}

fn default_metrics_interval() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub site: SiteConfig,
    #[serde(default)]
    pub feed: FeedConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub places: PlacesConfig,
    #[serde(default)]
    pub egress: EgressConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    site_id: String,
    feed_host: String,
    feed_port: u16,
    feed_topic: String,
    feed_username: Option<String>,
    feed_password: Option<String>,
    broker_enabled: bool,
    broker_bind_address: String,
    broker_port: u16,
    monitor_places: Vec<String>,
    egress_file: String,
    metrics_interval_secs: u64,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_toml(TomlConfig::default(), "default")
    }
}

impl Config {
    fn from_toml(toml_config: TomlConfig, config_file: &str) -> Self {
        Self {
            site_id: toml_config.site.id,
            feed_host: toml_config.feed.host,
            feed_port: toml_config.feed.port,
            feed_topic: toml_config.feed.topic,
            feed_username: toml_config.feed.username,
            feed_password: toml_config.feed.password,
            broker_enabled: toml_config.broker.enabled,
            broker_bind_address: toml_config.broker.bind_address,
            broker_port: toml_config.broker.port,
            monitor_places: toml_config.places.monitor,
            egress_file: toml_config.egress.file,
            metrics_interval_secs: toml_config.metrics.interval_secs,
            config_file: config_file.to_string(),
        }
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        Ok(Self::from_toml(toml_config, &path.display().to_string()))
    }

    /// Load configuration - tries the TOML file first, falls back to defaults
    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {}. Using defaults.", e);
                Self::default()
            }
        }
    }

    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn feed_host(&self) -> &str {
        &self.feed_host
    }

    pub fn feed_port(&self) -> u16 {
        self.feed_port
    }

    pub fn feed_topic(&self) -> &str {
        &self.feed_topic
    }

    pub fn feed_username(&self) -> Option<&str> {
        self.feed_username.as_deref()
    }

    pub fn feed_password(&self) -> Option<&str> {
        self.feed_password.as_deref()
    }

    pub fn broker_enabled(&self) -> bool {
        self.broker_enabled
    }

    pub fn broker_bind_address(&self) -> &str {
        &self.broker_bind_address
    }

    pub fn broker_port(&self) -> u16 {
        self.broker_port
    }

    /// Places to start monitoring at boot
    pub fn monitor_places(&self) -> &[String] {
        &self.monitor_places
    }

    pub fn egress_file(&self) -> &str {
        &self.egress_file
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests to set the egress file
    #[cfg(test)]
    pub fn with_egress_file(mut self, path: &str) -> Self {
        self.egress_file = path.to_string();
        self
    }

    /// Builder method for tests to set the boot-time place list
    #[cfg(test)]
    pub fn with_monitor_places(mut self, places: Vec<String>) -> Self {
        self.monitor_places = places;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.site_id(), "place-monitor");
        assert_eq!(config.feed_host(), "localhost");
        assert_eq!(config.feed_port(), 1883);
        assert_eq!(config.feed_topic(), "location/feed/#");
        assert!(config.broker_enabled());
        assert!(config.monitor_places().is_empty());
        assert_eq!(config.egress_file(), "visits.jsonl");
        assert_eq!(config.metrics_interval_secs(), 10);
    }

    #[test]
    fn test_egress_file_default() {
        let egress = EgressConfig::default();
        assert_eq!(egress.file, "visits.jsonl");
        assert!(!egress.file.is_empty());
    }

    #[test]
    fn test_parse_minimal_toml() {
        let toml_config: TomlConfig = toml::from_str(
            r#"
            [places]
            monitor = ["store-42", "cafe-7"]
            "#,
        )
        .unwrap();
        let config = Config::from_toml(toml_config, "inline");

        assert_eq!(config.monitor_places(), &["store-42", "cafe-7"]);
        // Unspecified sections keep their defaults
        assert_eq!(config.feed_host(), "localhost");
        assert_eq!(config.config_file(), "inline");
    }
}
