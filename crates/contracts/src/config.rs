//! BridgeConfig - Config Loader output
//!
//! Describes the full bridge setup: processing options, tag names, sources
//! and sinks. Optional settings stay `Option` here; sinks resolve their own
//! defaults once at construction.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Complete bridge configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Enable the debug (console) sink
    #[serde(default)]
    pub debug: bool,

    /// Processor settings
    #[serde(default)]
    pub processing: ProcessingConfig,

    /// Device display names, keyed by hardware address
    /// (separators optional, case-insensitive)
    #[serde(default)]
    pub tag_names: HashMap<String, String>,

    /// MQTT publisher sink
    #[serde(default)]
    pub mqtt_publisher: Option<MqttPublisherConfig>,

    /// Prometheus exporter sink
    #[serde(default)]
    pub prometheus: Option<PrometheusConfig>,

    /// MQTT listener source
    #[serde(default)]
    pub mqtt_listener: Option<MqttListenerConfig>,

    /// Synthetic measurement source
    #[serde(default)]
    pub mock_source: Option<MockSourceConfig>,
}

impl BridgeConfig {
    /// Enabled MQTT publisher, if any
    pub fn active_mqtt_publisher(&self) -> Option<&MqttPublisherConfig> {
        self.mqtt_publisher.as_ref().filter(|c| c.enabled)
    }

    /// Enabled Prometheus sink, if any
    pub fn active_prometheus(&self) -> Option<&PrometheusConfig> {
        self.prometheus.as_ref().filter(|c| c.enabled)
    }

    /// Enabled MQTT listener, if any
    pub fn active_mqtt_listener(&self) -> Option<&MqttListenerConfig> {
        self.mqtt_listener.as_ref().filter(|c| c.enabled)
    }

    /// Enabled mock source, if any
    pub fn active_mock_source(&self) -> Option<&MockSourceConfig> {
        self.mock_source.as_ref().filter(|c| c.enabled)
    }

    /// Number of sinks that will be registered
    pub fn active_sink_count(&self) -> usize {
        usize::from(self.debug)
            + usize::from(self.active_prometheus().is_some())
            + usize::from(self.active_mqtt_publisher().is_some())
    }

    /// Number of sources that will be started
    pub fn active_source_count(&self) -> usize {
        usize::from(self.active_mqtt_listener().is_some())
            + usize::from(self.active_mock_source().is_some())
    }
}

/// Processor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Compute derived values (dew point, absolute humidity, ...)
    #[serde(default = "default_true")]
    pub extended_values: bool,

    /// Capacity of the shared input queue
    #[serde(default = "default_input_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            extended_values: true,
            queue_capacity: default_input_queue_capacity(),
        }
    }
}

/// MQTT publisher sink configuration
///
/// Everything except `enabled` is optional; see the MQTT sink for defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MqttPublisherConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Full broker URL (`tcp://host:port`); wins over address/port
    #[serde(default)]
    pub broker_url: Option<String>,
    #[serde(default)]
    pub broker_address: Option<String>,
    #[serde(default)]
    pub broker_port: Option<u16>,

    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,

    /// Measurements go to `<topic_prefix>/<mac>`
    #[serde(default)]
    pub topic_prefix: Option<String>,

    /// Minimum seconds between two publishes of the same device
    #[serde(default)]
    pub minimum_interval_sec: Option<f64>,

    /// Presence topic (Last Will and Testament)
    #[serde(default)]
    pub lwt_topic: Option<String>,
    #[serde(default)]
    pub lwt_online_payload: Option<String>,
    #[serde(default)]
    pub lwt_offline_payload: Option<String>,

    /// Home Assistant discovery prefix; discovery is off when unset
    #[serde(default)]
    pub homeassistant_discovery_prefix: Option<String>,

    /// Sink queue capacity
    #[serde(default)]
    pub queue_capacity: Option<usize>,
}

/// Prometheus sink configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrometheusConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Port of the scrape endpoint
    #[serde(default = "default_prometheus_port")]
    pub port: u16,
}

/// MQTT listener source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttListenerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub broker_url: Option<String>,
    #[serde(default)]
    pub broker_address: Option<String>,
    #[serde(default)]
    pub broker_port: Option<u16>,

    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,

    /// Topic filter to subscribe to; must not match the publisher's own
    /// state topics
    #[serde(default = "default_listener_topic")]
    pub topic: String,
}

/// Synthetic measurement source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockSourceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Hardware addresses to simulate
    pub devices: Vec<String>,

    /// Emission interval (milliseconds)
    #[serde(default = "default_mock_interval_ms")]
    pub interval_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_input_queue_capacity() -> usize {
    1024
}

fn default_prometheus_port() -> u16 {
    8081
}

fn default_listener_topic() -> String {
    "ruuvi/in/#".to_string()
}

fn default_mock_interval_ms() -> u64 {
    1000
}
