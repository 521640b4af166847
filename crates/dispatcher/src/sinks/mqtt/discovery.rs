//! Home Assistant MQTT discovery documents
//!
//! One retained config message per populated field of a measurement, so
//! Home Assistant creates an entity per field and reads its value from the
//! device's state topic.

use contracts::{Measurement, MeasurementField};
use serde::Serialize;

use super::settings::{MqttSinkSettings, Presence};

const MANUFACTURER: &str = "Ruuvi Innovations";

/// Topic and encoded body of one discovery message
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveryMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Sensor config document
#[derive(Debug, Serialize)]
pub struct DiscoveryConfig<'a> {
    pub name: &'static str,
    pub unique_id: String,
    pub state_topic: String,
    pub value_template: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit_of_measurement: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_class: Option<&'static str>,
    pub state_class: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub availability_topic: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub availability_template: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_available: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload_not_available: Option<&'a str>,
    pub device: DiscoveryDevice,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryDevice {
    pub identifiers: Vec<String>,
    pub connections: Vec<(&'static str, String)>,
    pub name: String,
    pub manufacturer: &'static str,
}

/// `<prefix>/sensor/<compact mac>/<field key>/config`
pub fn config_topic(prefix: &str, mac_compact: &str, field: MeasurementField) -> String {
    format!("{prefix}/sensor/{mac_compact}/{}/config", field.key())
}

/// Build the discovery messages for every populated field
///
/// Returns nothing when discovery is disabled.
pub fn discovery_messages(
    settings: &MqttSinkSettings,
    measurement: &Measurement,
) -> Result<Vec<DiscoveryMessage>, serde_json::Error> {
    let Some(prefix) = settings.discovery_prefix.as_deref() else {
        return Ok(Vec::new());
    };

    let compact = measurement.mac.compact();
    let state_topic = settings.state_topic(&measurement.mac);
    let device = DiscoveryDevice {
        identifiers: vec![format!("ruuvi_{compact}")],
        connections: vec![("mac", measurement.mac.to_string())],
        name: measurement
            .name
            .clone()
            .unwrap_or_else(|| format!("Ruuvi {}", measurement.mac)),
        manufacturer: MANUFACTURER,
    };

    measurement
        .fields()
        .into_iter()
        .map(|(field, _)| {
            let config = sensor_config(
                field,
                &compact,
                &state_topic,
                settings.presence.as_ref(),
                device.clone(),
            );
            Ok(DiscoveryMessage {
                topic: config_topic(prefix, &compact, field),
                payload: serde_json::to_vec(&config)?,
            })
        })
        .collect()
}

fn sensor_config<'a>(
    field: MeasurementField,
    compact: &str,
    state_topic: &str,
    presence: Option<&'a Presence>,
    device: DiscoveryDevice,
) -> DiscoveryConfig<'a> {
    // The template only works on the default JSON presence documents;
    // custom payloads are compared verbatim instead.
    let (availability_template, payload_available, payload_not_available) = match presence {
        Some(p) if p.uses_default_payloads() => {
            (Some("{{ value_json.state }}"), Some("online"), Some("offline"))
        }
        Some(p) => (
            None,
            Some(p.online_payload.as_str()),
            Some(p.offline_payload.as_str()),
        ),
        None => (None, None, None),
    };

    DiscoveryConfig {
        name: field.label(),
        unique_id: format!("ruuvi_{compact}_{}", field.key()),
        state_topic: state_topic.to_string(),
        value_template: format!("{{{{ value_json.{} }}}}", field.key()),
        unit_of_measurement: field.unit(),
        device_class: field.device_class(),
        state_class: "measurement",
        availability_topic: presence.map(|p| p.topic.as_str()),
        availability_template,
        payload_available,
        payload_not_available,
        device,
    }
}
