//! MQTT listener source
//!
//! Subscribes to a topic filter and turns every JSON payload into a
//! `Measurement`. Bad payloads are logged and skipped.

use std::sync::Arc;
use std::time::Duration;

use async_channel::Sender;
use chrono::Utc;
use contracts::{
    BrokerAddress, ContractError, DeviceId, Measurement, MeasurementSource, MqttListenerConfig,
    StopSignal,
};
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS, Transport};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::error::IngestionError;
use crate::metrics::IngestionMetrics;

const DEFAULT_CLIENT_ID: &str = "ruuvi-bridge-listener";
const KEEP_ALIVE: Duration = Duration::from_secs(10);
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(10);
const REQUEST_CAPACITY: usize = 64;

/// Resolved listener settings
#[derive(Debug, Clone)]
pub struct MqttListenerSettings {
    pub broker: BrokerAddress,
    pub client_id: String,
    pub credentials: Option<(String, String)>,
    pub topic: String,
}

impl MqttListenerSettings {
    pub fn resolve(config: &MqttListenerConfig) -> Result<Self, ContractError> {
        let broker = BrokerAddress::resolve(
            config.broker_url.as_deref(),
            config.broker_address.as_deref(),
            config.broker_port,
        )?;
        let username = config.username.as_deref().filter(|u| !u.is_empty());

        Ok(Self {
            broker,
            client_id: config
                .client_id
                .clone()
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| DEFAULT_CLIENT_ID.to_string()),
            credentials: username
                .map(|u| (u.to_string(), config.password.clone().unwrap_or_default())),
            topic: config.topic.clone(),
        })
    }

    fn mqtt_options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(&self.client_id, &self.broker.host, self.broker.port);
        options.set_keep_alive(KEEP_ALIVE);
        if let Some((user, pass)) = &self.credentials {
            options.set_credentials(user, pass);
        }
        if self.broker.tls {
            options.set_transport(Transport::tls_with_default_config());
        }
        options
    }
}

/// Parse a JSON payload into a measurement
///
/// A payload without `mac` takes it from the last topic level when that
/// level is a hardware address; a payload without `timestamp` is stamped
/// with the receive time.
pub fn parse_payload(topic: &str, payload: &[u8]) -> Result<Measurement, IngestionError> {
    let mut value: Value = serde_json::from_slice(payload)
        .map_err(|e| IngestionError::parse_failed(topic, e.to_string()))?;
    let object = value
        .as_object_mut()
        .ok_or_else(|| IngestionError::parse_failed(topic, "payload is not a JSON object"))?;

    if !object.contains_key("mac") {
        let mac = topic
            .rsplit('/')
            .next()
            .filter(|level| DeviceId::from(*level).is_valid_mac())
            .ok_or_else(|| IngestionError::parse_failed(topic, "no hardware address"))?;
        object.insert("mac".to_string(), Value::from(mac));
    }
    if !object.contains_key("timestamp") {
        object.insert("timestamp".to_string(), Value::from(Utc::now().timestamp()));
    }

    serde_json::from_value(value).map_err(|e| IngestionError::parse_failed(topic, e.to_string()))
}

/// Source that feeds measurements received over MQTT
pub struct MqttListenerSource {
    name: String,
    settings: MqttListenerSettings,
    metrics: Arc<IngestionMetrics>,
}

impl MqttListenerSource {
    pub fn new(name: impl Into<String>, settings: MqttListenerSettings) -> Self {
        Self {
            name: name.into(),
            settings,
            metrics: Arc::new(IngestionMetrics::new()),
        }
    }

    /// 共享 metrics 实例
    pub fn with_metrics(mut self, metrics: Arc<IngestionMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    fn handle_publish(&self, topic: &str, payload: &[u8]) -> Option<Measurement> {
        match parse_payload(topic, payload) {
            Ok(measurement) => Some(measurement),
            Err(e) => {
                self.metrics.record_parse_error();
                observability::record_source_error(&self.name);
                warn!(source = %self.name, error = %e, "Skipping unparseable payload");
                None
            }
        }
    }
}

impl MeasurementSource for MqttListenerSource {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "mqtt_listener_run",
        skip_all,
        fields(source = %self.name, broker = %self.settings.broker, topic = %self.settings.topic)
    )]
    async fn run(
        &mut self,
        tx: Sender<Measurement>,
        mut stop: StopSignal,
    ) -> Result<(), ContractError> {
        let (client, mut eventloop) =
            AsyncClient::new(self.settings.mqtt_options(), REQUEST_CAPACITY);
        let mut backoff = INITIAL_BACKOFF;

        info!("MQTT listener started");

        loop {
            let event = tokio::select! {
                _ = &mut stop => break,
                event = eventloop.poll() => event,
            };

            match event {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    backoff = INITIAL_BACKOFF;
                    // Subscriptions do not survive a clean session
                    if let Err(e) = client.try_subscribe(&self.settings.topic, QoS::AtMostOnce) {
                        warn!(error = %e, "Subscribe failed");
                    } else {
                        info!("Subscribed");
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    let Some(measurement) = self.handle_publish(&publish.topic, &publish.payload)
                    else {
                        continue;
                    };
                    tokio::select! {
                        result = tx.send(measurement) => {
                            if result.is_err() {
                                debug!("Queue closed, listener ending");
                                break;
                            }
                            self.metrics.record_received();
                        }
                        _ = &mut stop => break,
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, retry_in = ?backoff, "MQTT listener connection error");
                    tokio::select! {
                        _ = &mut stop => break,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                    backoff = (backoff * 2).min(MAX_BACKOFF);
                }
            }
        }

        if let Err(e) = client.try_disconnect() {
            debug!(error = %e, "Disconnect request not queued");
        }
        info!("MQTT listener stopped");
        Ok(())
    }
}
