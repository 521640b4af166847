//! Resolved MQTT sink settings
//!
//! All defaults are applied once here; the sink never looks at the raw
//! configuration again.

use std::time::Duration;

use contracts::{BrokerAddress, ContractError, DeviceId, MqttPublisherConfig};
use rumqttc::{LastWill, MqttOptions, QoS, Transport};

pub const DEFAULT_CLIENT_ID: &str = "RuuviBridgePublisher";
pub const DEFAULT_TOPIC_PREFIX: &str = "ruuvi";
pub const DEFAULT_LWT_ONLINE_PAYLOAD: &str = r#"{"state":"online"}"#;
pub const DEFAULT_LWT_OFFLINE_PAYLOAD: &str = r#"{"state":"offline"}"#;
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

const KEEP_ALIVE: Duration = Duration::from_secs(10);
const MAX_RECONNECT_INTERVAL: Duration = Duration::from_secs(10);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Presence (Last Will and Testament) settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Presence {
    pub topic: String,
    pub online_payload: String,
    pub offline_payload: String,
}

impl Presence {
    /// Whether the payloads are the default `{"state":...}` documents
    pub fn uses_default_payloads(&self) -> bool {
        self.online_payload == DEFAULT_LWT_ONLINE_PAYLOAD
            && self.offline_payload == DEFAULT_LWT_OFFLINE_PAYLOAD
    }
}

/// Fully resolved MQTT sink settings
#[derive(Debug, Clone)]
pub struct MqttSinkSettings {
    /// Broker URL as used for logging (`tcp://host:port`)
    pub server_url: String,
    pub broker: BrokerAddress,
    pub client_id: String,
    pub credentials: Option<(String, String)>,
    pub topic_prefix: String,
    pub minimum_interval: Option<Duration>,
    pub presence: Option<Presence>,
    pub discovery_prefix: Option<String>,
    pub queue_capacity: usize,
    pub keep_alive: Duration,
    pub max_reconnect_interval: Duration,
    pub connect_timeout: Duration,
    pub clean_session: bool,
}

impl MqttSinkSettings {
    /// Apply defaults to the raw configuration
    ///
    /// The broker is taken from `broker_url` when set, else from
    /// `broker_address`/`broker_port`. Presence is enabled only when a
    /// presence topic is configured; unset payloads fall back to the
    /// `{"state":"online"}` / `{"state":"offline"}` documents.
    pub fn resolve(config: &MqttPublisherConfig) -> Result<Self, ContractError> {
        let broker = BrokerAddress::resolve(
            config.broker_url.as_deref(),
            config.broker_address.as_deref(),
            config.broker_port,
        )?;

        let credentials = non_empty(&config.username)
            .map(|user| (user.to_string(), config.password.clone().unwrap_or_default()));

        let minimum_interval = config
            .minimum_interval_sec
            .filter(|secs| *secs != 0.0)
            .map(|secs| {
                Duration::try_from_secs_f64(secs).map_err(|e| {
                    ContractError::config_validation(
                        "mqtt_publisher.minimum_interval_sec",
                        format!("{secs} is not a usable interval: {e}"),
                    )
                })
            })
            .transpose()?;

        let presence = non_empty(&config.lwt_topic).map(|topic| Presence {
            topic: topic.to_string(),
            online_payload: non_empty(&config.lwt_online_payload)
                .unwrap_or(DEFAULT_LWT_ONLINE_PAYLOAD)
                .to_string(),
            offline_payload: non_empty(&config.lwt_offline_payload)
                .unwrap_or(DEFAULT_LWT_OFFLINE_PAYLOAD)
                .to_string(),
        });

        Ok(Self {
            server_url: broker.to_string(),
            broker,
            client_id: non_empty(&config.client_id)
                .unwrap_or(DEFAULT_CLIENT_ID)
                .to_string(),
            credentials,
            topic_prefix: non_empty(&config.topic_prefix)
                .unwrap_or(DEFAULT_TOPIC_PREFIX)
                .trim_end_matches('/')
                .to_string(),
            minimum_interval,
            presence,
            discovery_prefix: non_empty(&config.homeassistant_discovery_prefix)
                .map(|p| p.trim_end_matches('/').to_string()),
            queue_capacity: config
                .queue_capacity
                .filter(|c| *c > 0)
                .unwrap_or(DEFAULT_QUEUE_CAPACITY),
            keep_alive: KEEP_ALIVE,
            max_reconnect_interval: MAX_RECONNECT_INTERVAL,
            connect_timeout: CONNECT_TIMEOUT,
            clean_session: false,
        })
    }

    /// State topic of a device: `<prefix>/<mac>`
    pub fn state_topic(&self, mac: &DeviceId) -> String {
        format!("{}/{}", self.topic_prefix, mac)
    }

    /// Client options, with the Last Will registered when presence is on
    pub fn mqtt_options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(&self.client_id, &self.broker.host, self.broker.port);
        options
            .set_keep_alive(self.keep_alive)
            .set_clean_session(self.clean_session);

        if let Some((user, pass)) = &self.credentials {
            options.set_credentials(user, pass);
        }
        if let Some(presence) = &self.presence {
            options.set_last_will(LastWill::new(
                &presence.topic,
                presence.offline_payload.as_bytes().to_vec(),
                QoS::AtMostOnce,
                true,
            ));
        }
        if self.broker.tls {
            options.set_transport(Transport::tls_with_default_config());
        }
        options
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
