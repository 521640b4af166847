//! Configuration validation
//!
//! Rules:
//! - topic prefixes are non-empty and contain no MQTT wildcards
//! - 0 <= minimum_interval_sec <= one year
//! - queue capacities > 0
//! - ports > 0
//! - tag name keys are non-empty
//! - mock devices are valid hardware addresses
//! - broker URLs parse
//! - the listener does not subscribe to the publisher's own state topics

use contracts::{
    topic_matches, BridgeConfig, BrokerAddress, ContractError, DeviceId, MqttPublisherConfig,
};

/// Prefix the MQTT sink falls back to when none is configured
const DEFAULT_TOPIC_PREFIX: &str = "ruuvi";

/// Largest accepted publish interval (one year)
const MAX_MINIMUM_INTERVAL_SEC: f64 = 365.0 * 24.0 * 3600.0;

/// Validate a BridgeConfig
///
/// Returns the first error encountered, or Ok(()).
pub fn validate(config: &BridgeConfig) -> Result<(), ContractError> {
    validate_processing(config)?;
    validate_tag_names(config)?;
    if let Some(mqtt) = &config.mqtt_publisher {
        validate_mqtt_publisher(mqtt)?;
    }
    validate_prometheus(config)?;
    validate_mqtt_listener(config)?;
    validate_mock_source(config)?;
    validate_no_feedback_loop(config)?;
    Ok(())
}

fn validate_processing(config: &BridgeConfig) -> Result<(), ContractError> {
    if config.processing.queue_capacity == 0 {
        return Err(ContractError::config_validation(
            "processing.queue_capacity",
            "queue_capacity must be > 0",
        ));
    }
    Ok(())
}

fn validate_tag_names(config: &BridgeConfig) -> Result<(), ContractError> {
    for (mac, name) in &config.tag_names {
        if contracts::normalize_mac(mac).is_empty() {
            return Err(ContractError::config_validation(
                format!("tag_names[{mac}]"),
                "tag name key cannot be empty",
            ));
        }
        if name.is_empty() {
            return Err(ContractError::config_validation(
                format!("tag_names[{mac}]"),
                "tag name cannot be empty",
            ));
        }
    }
    Ok(())
}

fn validate_mqtt_publisher(mqtt: &MqttPublisherConfig) -> Result<(), ContractError> {
    if let Some(prefix) = &mqtt.topic_prefix {
        validate_topic_prefix("mqtt_publisher.topic_prefix", prefix)?;
    }
    if let Some(prefix) = &mqtt.homeassistant_discovery_prefix {
        validate_topic_prefix("mqtt_publisher.homeassistant_discovery_prefix", prefix)?;
    }
    if let Some(topic) = &mqtt.lwt_topic {
        validate_topic_prefix("mqtt_publisher.lwt_topic", topic)?;
    }
    if let Some(interval) = mqtt.minimum_interval_sec {
        if !interval.is_finite() || interval < 0.0 {
            return Err(ContractError::config_validation(
                "mqtt_publisher.minimum_interval_sec",
                format!("minimum_interval_sec must be >= 0, got {interval}"),
            ));
        }
        if interval > MAX_MINIMUM_INTERVAL_SEC {
            return Err(ContractError::config_validation(
                "mqtt_publisher.minimum_interval_sec",
                format!(
                    "minimum_interval_sec must be <= {MAX_MINIMUM_INTERVAL_SEC}, got {interval}"
                ),
            ));
        }
    }
    validate_broker_url("mqtt_publisher.broker_url", mqtt.broker_url.as_deref())?;
    if mqtt.broker_port == Some(0) {
        return Err(ContractError::config_validation(
            "mqtt_publisher.broker_port",
            "broker_port must be > 0",
        ));
    }
    if mqtt.queue_capacity == Some(0) {
        return Err(ContractError::config_validation(
            "mqtt_publisher.queue_capacity",
            "queue_capacity must be > 0",
        ));
    }
    Ok(())
}

fn validate_topic_prefix(field: &str, prefix: &str) -> Result<(), ContractError> {
    if prefix.is_empty() {
        return Err(ContractError::config_validation(field, "topic cannot be empty"));
    }
    if prefix.contains(['+', '#']) {
        return Err(ContractError::config_validation(
            field,
            format!("topic '{prefix}' cannot contain MQTT wildcards"),
        ));
    }
    Ok(())
}

fn validate_broker_url(field: &str, url: Option<&str>) -> Result<(), ContractError> {
    match url.map(str::trim).filter(|u| !u.is_empty()) {
        Some(url) => BrokerAddress::parse(url)
            .map(|_| ())
            .map_err(|e| ContractError::config_validation(field, e.to_string())),
        None => Ok(()),
    }
}

fn validate_prometheus(config: &BridgeConfig) -> Result<(), ContractError> {
    if let Some(prometheus) = &config.prometheus {
        if prometheus.port == 0 {
            return Err(ContractError::config_validation(
                "prometheus.port",
                "port must be > 0",
            ));
        }
    }
    Ok(())
}

fn validate_mqtt_listener(config: &BridgeConfig) -> Result<(), ContractError> {
    if let Some(listener) = &config.mqtt_listener {
        if listener.topic.is_empty() {
            return Err(ContractError::config_validation(
                "mqtt_listener.topic",
                "topic cannot be empty",
            ));
        }
        validate_broker_url("mqtt_listener.broker_url", listener.broker_url.as_deref())?;
        if listener.broker_port == Some(0) {
            return Err(ContractError::config_validation(
                "mqtt_listener.broker_port",
                "broker_port must be > 0",
            ));
        }
    }
    Ok(())
}

fn validate_mock_source(config: &BridgeConfig) -> Result<(), ContractError> {
    if let Some(mock) = &config.mock_source {
        if mock.interval_ms == 0 {
            return Err(ContractError::config_validation(
                "mock_source.interval_ms",
                "interval_ms must be > 0",
            ));
        }
        for (idx, device) in mock.devices.iter().enumerate() {
            if !DeviceId::from(device.as_str()).is_valid_mac() {
                return Err(ContractError::config_validation(
                    format!("mock_source.devices[{idx}]"),
                    format!("'{device}' is not a valid hardware address"),
                ));
            }
        }
    }
    Ok(())
}

/// A listener subscribed to the publisher's state topics would re-ingest
/// every published measurement.
fn validate_no_feedback_loop(config: &BridgeConfig) -> Result<(), ContractError> {
    let (Some(listener), Some(publisher)) =
        (config.active_mqtt_listener(), config.active_mqtt_publisher())
    else {
        return Ok(());
    };

    let prefix = publisher
        .topic_prefix
        .as_deref()
        .unwrap_or(DEFAULT_TOPIC_PREFIX)
        .trim_end_matches('/');
    let state_topic = format!("{prefix}/AA:BB:CC:DD:EE:FF");
    if topic_matches(&listener.topic, &state_topic) {
        return Err(ContractError::config_validation(
            "mqtt_listener.topic",
            format!(
                "topic filter '{}' matches the publisher's state topics under '{prefix}/'",
                listener.topic
            ),
        ));
    }
    Ok(())
}
