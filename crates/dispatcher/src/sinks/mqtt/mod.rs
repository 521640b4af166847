//! MqttSink - publishes measurements as JSON to an MQTT broker
//!
//! Measurements go to `<prefix>/<mac>` at QoS 0, not retained. Publishing
//! is fire-and-forget: a failed publish is logged and counted, never
//! retried, and never stalls the sink worker.
//!
//! When a presence topic is configured the broker is handed a retained
//! Last Will (offline payload) at connect time, and the online payload is
//! published retained before any measurement. The connection task
//! re-announces online after every reconnect.

pub mod discovery;
pub mod settings;

use std::time::Duration;

use contracts::{ContractError, Measurement, MeasurementSink};
use rumqttc::{AsyncClient, Event, EventLoop, Outgoing, Packet, QoS};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::limiter::Limiter;

pub use self::discovery::{discovery_messages, DiscoveryMessage};
pub use self::settings::{MqttSinkSettings, Presence};

/// Capacity of the client's request channel
const REQUEST_CAPACITY: usize = 4096;
/// First reconnect delay; doubles up to the configured maximum
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
/// Time the connection task gets to flush the disconnect on close
const CLOSE_TIMEOUT: Duration = Duration::from_secs(2);

/// Non-blocking publish side of an MQTT client
///
/// All publishes are QoS 0. Implemented for `rumqttc::AsyncClient`.
pub trait MqttPublish: Send {
    fn publish(&self, topic: &str, retain: bool, payload: Vec<u8>) -> Result<(), ContractError>;

    fn disconnect(&self) -> Result<(), ContractError>;
}

impl MqttPublish for AsyncClient {
    fn publish(&self, topic: &str, retain: bool, payload: Vec<u8>) -> Result<(), ContractError> {
        self.try_publish(topic, QoS::AtMostOnce, retain, payload)
            .map_err(|e| ContractError::sink_write("mqtt", e.to_string()))
    }

    fn disconnect(&self) -> Result<(), ContractError> {
        self.try_disconnect()
            .map_err(|e| ContractError::sink_connection("mqtt", e.to_string()))
    }
}

/// Sink that publishes each accepted measurement to its state topic
pub struct MqttSink<P = AsyncClient> {
    name: String,
    settings: MqttSinkSettings,
    publisher: P,
    limiter: Limiter,
    connection: Option<JoinHandle<()>>,
}

impl MqttSink<AsyncClient> {
    /// Connect to the broker and start the connection task
    ///
    /// Waits up to the connect timeout for the broker to accept the session.
    /// A failed first attempt is logged, not returned: the connection task
    /// keeps retrying and the sink starts either way.
    #[instrument(
        name = "mqtt_sink_connect",
        skip(name, settings),
        fields(sink = %name.as_ref(), broker = %settings.server_url)
    )]
    pub async fn connect(name: impl AsRef<str>, settings: MqttSinkSettings) -> Self {
        info!(
            target_url = %settings.server_url,
            topic_prefix = %settings.topic_prefix,
            minimum_interval = ?settings.minimum_interval,
            presence = settings.presence.is_some(),
            discovery = settings.discovery_prefix.is_some(),
            "Starting MQTT sink"
        );

        let (client, mut eventloop) = AsyncClient::new(settings.mqtt_options(), REQUEST_CAPACITY);

        match await_connack(&mut eventloop, settings.connect_timeout).await {
            Ok(()) => info!(target_url = %settings.server_url, "Connected to MQTT broker"),
            Err(e) => error!(
                target_url = %settings.server_url,
                error = %e,
                "Failed to connect to MQTT broker, will keep retrying"
            ),
        }

        let connection = tokio::spawn(drive_connection(
            name.as_ref().to_string(),
            eventloop,
            client.clone(),
            settings.presence.clone(),
            settings.max_reconnect_interval,
        ));

        let mut sink = Self::start(name, settings, client);
        sink.connection = Some(connection);
        sink
    }
}

impl<P: MqttPublish> MqttSink<P> {
    /// Build the sink around an existing publisher
    ///
    /// Announces presence (retained online payload) before returning, so it
    /// precedes every measurement publish.
    pub fn start(name: impl AsRef<str>, settings: MqttSinkSettings, publisher: P) -> Self {
        let sink = Self {
            name: name.as_ref().to_string(),
            limiter: Limiter::new(settings.minimum_interval),
            settings,
            publisher,
            connection: None,
        };
        if let Some(presence) = &sink.settings.presence {
            sink.publish(&presence.topic, true, presence.online_payload.as_bytes().to_vec());
        }
        sink
    }

    pub fn settings(&self) -> &MqttSinkSettings {
        &self.settings
    }

    /// Fire-and-forget publish; failures are logged and counted
    fn publish(&self, topic: &str, retain: bool, payload: Vec<u8>) {
        if let Err(e) = self.publisher.publish(topic, retain, payload) {
            observability::record_publish_failure(&self.name);
            warn!(sink = %self.name, topic, error = %e, "MQTT publish failed");
        }
    }
}

impl<P: MqttPublish> MeasurementSink for MqttSink<P> {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "mqtt_sink_write",
        skip(self, measurement),
        fields(sink = %self.name, mac = %measurement.mac)
    )]
    async fn write(&mut self, measurement: &Measurement) -> Result<(), ContractError> {
        if !self.limiter.check(measurement) {
            trace!("Rate limited");
            observability::record_rate_limited(&self.name);
            return Ok(());
        }

        let payload = serde_json::to_vec(measurement)
            .map_err(|e| ContractError::serialization(measurement.mac.as_str(), e.to_string()))?;
        self.publish(&self.settings.state_topic(&measurement.mac), false, payload);

        let messages = discovery_messages(&self.settings, measurement)
            .map_err(|e| ContractError::serialization(measurement.mac.as_str(), e.to_string()))?;
        for message in messages {
            self.publish(&message.topic, true, message.payload);
        }

        Ok(())
    }

    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    #[instrument(name = "mqtt_sink_close", skip(self), fields(sink = %self.name))]
    async fn close(&mut self) -> Result<(), ContractError> {
        if let Some(presence) = &self.settings.presence {
            self.publish(&presence.topic, true, presence.offline_payload.as_bytes().to_vec());
        }
        if let Err(e) = self.publisher.disconnect() {
            warn!(sink = %self.name, error = %e, "MQTT disconnect failed");
        }

        if let Some(connection) = self.connection.take() {
            let abort = connection.abort_handle();
            if tokio::time::timeout(CLOSE_TIMEOUT, connection).await.is_err() {
                warn!(sink = %self.name, "MQTT connection task did not stop, aborting");
                abort.abort();
            }
        }

        info!(sink = %self.name, "MqttSink closed");
        Ok(())
    }
}

/// Poll until the broker acknowledges the session
async fn await_connack(eventloop: &mut EventLoop, timeout: Duration) -> Result<(), String> {
    let attempt = async {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => return Ok(()),
                Ok(_) => {}
                Err(e) => return Err(e.to_string()),
            }
        }
    };

    match tokio::time::timeout(timeout, attempt).await {
        Ok(result) => result,
        Err(_) => Err(format!("no CONNACK within {timeout:?}")),
    }
}

/// Drive the event loop until the client disconnects
///
/// Reconnects with exponential backoff and re-announces presence on every
/// new session.
#[instrument(name = "mqtt_connection", skip_all, fields(sink = %name))]
async fn drive_connection(
    name: String,
    mut eventloop: EventLoop,
    client: AsyncClient,
    presence: Option<Presence>,
    max_backoff: Duration,
) {
    let mut backoff = INITIAL_BACKOFF;

    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                info!(code = ?ack.code, "MQTT session established");
                backoff = INITIAL_BACKOFF;
                if let Some(p) = &presence {
                    let payload = p.online_payload.as_bytes().to_vec();
                    if let Err(e) = MqttPublish::publish(&client, &p.topic, true, payload) {
                        warn!(error = %e, "Failed to re-announce presence");
                    }
                }
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                debug!("MQTT disconnect sent");
                break;
            }
            Ok(_) => {}
            Err(rumqttc::ConnectionError::RequestsDone) => break,
            Err(e) => {
                warn!(error = %e, retry_in = ?backoff, "MQTT connection error");
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(max_backoff);
            }
        }
    }

    debug!("MQTT connection task stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use contracts::MqttPublisherConfig;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Publish {
            topic: String,
            retain: bool,
            payload: Vec<u8>,
        },
        Disconnect,
    }

    /// Publisher that records calls instead of talking to a broker
    #[derive(Clone, Default)]
    struct RecordingPublisher {
        calls: Arc<Mutex<Vec<Call>>>,
        fail: bool,
    }

    impl RecordingPublisher {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn topics(&self) -> Vec<String> {
            self.calls()
                .into_iter()
                .filter_map(|c| match c {
                    Call::Publish { topic, .. } => Some(topic),
                    Call::Disconnect => None,
                })
                .collect()
        }
    }

    impl MqttPublish for RecordingPublisher {
        fn publish(&self, topic: &str, retain: bool, payload: Vec<u8>) -> Result<(), ContractError> {
            if self.fail {
                return Err(ContractError::sink_write("mqtt", "queue full"));
            }
            self.calls.lock().unwrap().push(Call::Publish {
                topic: topic.to_string(),
                retain,
                payload,
            });
            Ok(())
        }

        fn disconnect(&self) -> Result<(), ContractError> {
            self.calls.lock().unwrap().push(Call::Disconnect);
            Ok(())
        }
    }

    fn settings(config: MqttPublisherConfig) -> MqttSinkSettings {
        MqttSinkSettings::resolve(&config).unwrap()
    }

    fn measurement(secs: i64) -> Measurement {
        Measurement {
            temperature: Some(20.0),
            ..Measurement::new("aa:bb:cc:dd:ee:ff", Utc.timestamp_opt(secs, 0).unwrap())
        }
    }

    #[tokio::test]
    async fn test_publishes_json_to_state_topic() {
        let publisher = RecordingPublisher::default();
        let mut sink = MqttSink::start("mqtt", settings(Default::default()), publisher.clone());

        sink.write(&measurement(100)).await.unwrap();

        let calls = publisher.calls();
        assert_eq!(calls.len(), 1);
        let Call::Publish { topic, retain, payload } = &calls[0] else {
            panic!("expected publish, got {calls:?}");
        };
        assert_eq!(topic, "ruuvi/aa:bb:cc:dd:ee:ff");
        assert!(!retain);
        let body: Measurement = serde_json::from_slice(payload).unwrap();
        assert_eq!(body, measurement(100));
    }

    #[tokio::test]
    async fn test_online_announced_before_measurements() {
        let publisher = RecordingPublisher::default();
        let config = MqttPublisherConfig {
            lwt_topic: Some("ruuvi/bridge/status".to_string()),
            ..Default::default()
        };
        let mut sink = MqttSink::start("mqtt", settings(config), publisher.clone());
        sink.write(&measurement(100)).await.unwrap();

        let calls = publisher.calls();
        assert_eq!(
            calls[0],
            Call::Publish {
                topic: "ruuvi/bridge/status".to_string(),
                retain: true,
                payload: br#"{"state":"online"}"#.to_vec(),
            }
        );
        assert_eq!(publisher.topics()[1], "ruuvi/aa:bb:cc:dd:ee:ff");
    }

    #[tokio::test]
    async fn test_no_presence_without_topic() {
        let publisher = RecordingPublisher::default();
        let mut sink = MqttSink::start("mqtt", settings(Default::default()), publisher.clone());
        sink.close().await.unwrap();

        assert_eq!(publisher.calls(), vec![Call::Disconnect]);
    }

    #[tokio::test]
    async fn test_close_announces_offline_then_disconnects() {
        let publisher = RecordingPublisher::default();
        let config = MqttPublisherConfig {
            lwt_topic: Some("status".to_string()),
            lwt_offline_payload: Some("gone".to_string()),
            ..Default::default()
        };
        let mut sink = MqttSink::start("mqtt", settings(config), publisher.clone());
        sink.close().await.unwrap();

        let calls = publisher.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(
            calls[1],
            Call::Publish {
                topic: "status".to_string(),
                retain: true,
                payload: b"gone".to_vec(),
            }
        );
        assert_eq!(calls[2], Call::Disconnect);
    }

    #[tokio::test]
    async fn test_rate_limited_measurements_are_not_published() {
        let publisher = RecordingPublisher::default();
        let config = MqttPublisherConfig {
            minimum_interval_sec: Some(10.0),
            ..Default::default()
        };
        let mut sink = MqttSink::start("mqtt", settings(config), publisher.clone());

        for secs in [0, 5, 10, 12, 21] {
            sink.write(&measurement(secs)).await.unwrap();
        }

        let published: Vec<i64> = publisher
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::Publish { payload, .. } => serde_json::from_slice::<Measurement>(&payload)
                    .ok()
                    .map(|m| m.timestamp.timestamp()),
                Call::Disconnect => None,
            })
            .collect();
        assert_eq!(published, vec![0, 10, 21]);
    }

    #[tokio::test]
    async fn test_discovery_published_retained_after_state() {
        let publisher = RecordingPublisher::default();
        let config = MqttPublisherConfig {
            homeassistant_discovery_prefix: Some("homeassistant".to_string()),
            ..Default::default()
        };
        let mut sink = MqttSink::start("mqtt", settings(config), publisher.clone());
        sink.write(&measurement(100)).await.unwrap();

        let calls = publisher.calls();
        assert_eq!(calls.len(), 2);
        assert!(matches!(
            &calls[1],
            Call::Publish { topic, retain: true, .. }
                if topic == "homeassistant/sensor/aabbccddeeff/temperature/config"
        ));
    }

    #[tokio::test]
    async fn test_no_discovery_without_prefix() {
        let publisher = RecordingPublisher::default();
        let mut sink = MqttSink::start("mqtt", settings(Default::default()), publisher.clone());
        sink.write(&measurement(100)).await.unwrap();

        assert!(publisher.topics().iter().all(|t| !t.contains("/config")));
    }

    #[tokio::test]
    async fn test_publish_failure_does_not_fail_write() {
        let publisher = RecordingPublisher {
            fail: true,
            ..Default::default()
        };
        let mut sink = MqttSink::start("mqtt", settings(Default::default()), publisher.clone());

        assert!(sink.write(&measurement(100)).await.is_ok());
        assert!(publisher.calls().is_empty());
    }
}
