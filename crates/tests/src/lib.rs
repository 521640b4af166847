//! # Integration Tests
//!
//! 集成测试与端到端测试。
//!
//! 负责：
//! - 配置加载 → processor 构建
//! - 模拟 e2e 测试（无需 broker / 传感器）
//! - 背压与限流的跨 crate 行为

#[cfg(test)]
mod contract_tests {
    use contracts::{BridgeConfig, DeviceId, MeasurementField};

    #[test]
    fn test_contracts_compile() {
        // 验证 contracts crate 可编译
        let config = BridgeConfig::default();
        assert_eq!(config.active_sink_count(), 0);
        assert!(DeviceId::from("aa:bb:cc:dd:ee:ff").is_valid_mac());
        assert!(!MeasurementField::ALL.is_empty());
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{ContractError, DeviceId, Measurement, MeasurementSink, MqttPublisherConfig};
    use dispatcher::{
        create_processor, MqttPublish, MqttSink, MqttSinkSettings, Processor, ProcessorSettings,
        SinkHandle, TagNames,
    };
    use ingestion::{MockSource, SourceSet};

    const DEVICE_A: &str = "aa:bb:cc:dd:ee:01";
    const DEVICE_B: &str = "aa:bb:cc:dd:ee:02";

    /// Sink that records every measurement, optionally slowly
    struct CaptureSink {
        received: Arc<Mutex<Vec<Measurement>>>,
        delay: Duration,
    }

    impl CaptureSink {
        fn new(delay: Duration) -> (Self, Arc<Mutex<Vec<Measurement>>>) {
            let received = Arc::new(Mutex::new(Vec::new()));
            let sink = Self {
                received: received.clone(),
                delay,
            };
            (sink, received)
        }
    }

    impl MeasurementSink for CaptureSink {
        fn name(&self) -> &str {
            "capture"
        }

        async fn write(&mut self, measurement: &Measurement) -> Result<(), ContractError> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.received.lock().unwrap().push(measurement.clone());
            Ok(())
        }

        async fn flush(&mut self) -> Result<(), ContractError> {
            Ok(())
        }

        async fn close(&mut self) -> Result<(), ContractError> {
            Ok(())
        }
    }

    /// Broker stand-in that records publishes
    #[derive(Clone, Default)]
    struct RecordingPublisher {
        published: Arc<Mutex<Vec<(String, bool, Vec<u8>)>>>,
        disconnected: Arc<Mutex<bool>>,
    }

    impl RecordingPublisher {
        fn topics(&self) -> Vec<String> {
            self.published
                .lock()
                .unwrap()
                .iter()
                .map(|(topic, _, _)| topic.clone())
                .collect()
        }
    }

    impl MqttPublish for RecordingPublisher {
        fn publish(&self, topic: &str, retain: bool, payload: Vec<u8>) -> Result<(), ContractError> {
            self.published
                .lock()
                .unwrap()
                .push((topic.to_string(), retain, payload));
            Ok(())
        }

        fn disconnect(&self) -> Result<(), ContractError> {
            *self.disconnected.lock().unwrap() = true;
            Ok(())
        }
    }

    fn mock_sources(rounds: u64, queue_capacity: usize) -> SourceSet {
        let mut sources = SourceSet::new(queue_capacity);
        let devices = vec![DeviceId::from(DEVICE_A), DeviceId::from(DEVICE_B)];
        sources.register(
            MockSource::new("mock", devices, Duration::from_millis(1))
                .with_rounds(rounds)
                .with_metrics(sources.metrics()),
        );
        sources
    }

    fn mqtt_settings(config: MqttPublisherConfig) -> MqttSinkSettings {
        MqttSinkSettings::resolve(&config).unwrap()
    }

    /// End-to-end test: MockSource -> SourceSet -> Processor -> sinks
    ///
    /// 验证完整的数据流：
    /// 1. MockSource 生成测量值并写入共享队列
    /// 2. Processor 补充派生值与设备名称
    /// 3. 每个 sink 按输入顺序收到各自的副本
    /// 4. 数据源结束后队列关闭，sink 排空后关闭
    #[tokio::test]
    async fn test_e2e_mock_pipeline() {
        let mut sources = mock_sources(5, 16);
        let input_rx = sources.take_receiver().unwrap();

        let (capture, received) = CaptureSink::new(Duration::ZERO);
        let publisher = RecordingPublisher::default();
        let mqtt = MqttSink::start(
            "mqtt",
            mqtt_settings(MqttPublisherConfig {
                lwt_topic: Some("ruuvi/bridge/status".to_string()),
                ..Default::default()
            }),
            publisher.clone(),
        );

        let settings = ProcessorSettings {
            extended_values: true,
            tag_names: [("AABBCCDDEE01", "Sauna")].into_iter().collect::<TagNames>(),
        };
        let handles = vec![SinkHandle::spawn(capture, 8), SinkHandle::spawn(mqtt, 8)];
        let processor = Processor::new(settings, handles, input_rx);
        let task = processor.spawn();

        sources.start_all().unwrap();
        // Mock source ends after its rounds; the queue then closes by itself
        let report = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("processor should finish once sources end")
            .unwrap();
        let summary = report.shutdown_sinks().await;
        sources.stop_all().await;

        assert_eq!(summary.total_measurements, 10);
        assert_eq!(summary.devices, 2);
        assert_eq!(summary.named, 5);
        assert_eq!(sources.metrics().snapshot().measurements_received, 10);

        let received = received.lock().unwrap();
        assert_eq!(received.len(), 10);
        let sequences: Vec<_> = received
            .iter()
            .filter(|m| m.mac == DEVICE_A)
            .map(|m| m.measurement_sequence_number)
            .collect();
        assert_eq!(sequences, (0..5).map(Some).collect::<Vec<_>>());
        assert!(received.iter().all(|m| m.dew_point.is_some()));
        assert!(received
            .iter()
            .filter(|m| m.mac == DEVICE_A)
            .all(|m| m.name.as_deref() == Some("Sauna")));
        assert!(received.iter().filter(|m| m.mac == DEVICE_B).all(|m| m.name.is_none()));

        // Presence first, then one state publish per measurement, then offline
        let topics = publisher.topics();
        assert_eq!(topics.len(), 12);
        assert_eq!(topics[0], "ruuvi/bridge/status");
        assert_eq!(topics[11], "ruuvi/bridge/status");
        assert_eq!(
            topics.iter().filter(|t| *t == &format!("ruuvi/{DEVICE_A}")).count(),
            5
        );
        assert!(*publisher.disconnected.lock().unwrap());

        let published = publisher.published.lock().unwrap();
        let state: serde_json::Value = serde_json::from_slice(&published[1].2).unwrap();
        assert_eq!(state["mac"], DEVICE_A);
        assert_eq!(state["name"], "Sauna");
        assert!(state["dewPoint"].is_number());
    }

    /// A slow sink throttles the whole pipeline without losing data
    #[tokio::test]
    async fn test_e2e_backpressure_without_loss() {
        let mut sources = mock_sources(10, 2);
        let input_rx = sources.take_receiver().unwrap();

        let (slow, slow_received) = CaptureSink::new(Duration::from_millis(5));
        let (fast, fast_received) = CaptureSink::new(Duration::ZERO);
        let handles = vec![SinkHandle::spawn(slow, 1), SinkHandle::spawn(fast, 1)];
        let task = Processor::with_handles(handles, input_rx).spawn();

        sources.start_all().unwrap();
        let report = task.await.unwrap();
        report.shutdown_sinks().await;

        assert_eq!(slow_received.lock().unwrap().len(), 20);
        assert_eq!(fast_received.lock().unwrap().len(), 20);
    }

    /// The MQTT rate limit applies per device, using measurement timestamps
    #[tokio::test]
    async fn test_e2e_mqtt_rate_limit_per_device() {
        let mut sources = mock_sources(4, 16);
        let input_rx = sources.take_receiver().unwrap();

        let publisher = RecordingPublisher::default();
        let mqtt = MqttSink::start(
            "mqtt",
            mqtt_settings(MqttPublisherConfig {
                minimum_interval_sec: Some(3600.0),
                ..Default::default()
            }),
            publisher.clone(),
        );
        let task = Processor::with_handles(vec![SinkHandle::spawn(mqtt, 8)], input_rx).spawn();

        sources.start_all().unwrap();
        task.await.unwrap().shutdown_sinks().await;

        // The mock stamps every round with "now": one publish per device
        let mut topics = publisher.topics();
        topics.sort();
        assert_eq!(
            topics,
            vec![format!("ruuvi/{DEVICE_A}"), format!("ruuvi/{DEVICE_B}")]
        );
    }

    /// Configuration file -> create_processor -> debug sink
    #[tokio::test]
    async fn test_e2e_config_driven_processor() {
        let config = ConfigLoader::load_from_str(
            r#"
debug = true

[processing]
extended_values = false
queue_capacity = 8

[tag_names]
"aa:bb:cc:dd:ee:01" = "Fridge"

[mock_source]
devices = ["aa:bb:cc:dd:ee:01"]
interval_ms = 1
"#,
            ConfigFormat::Toml,
        )
        .unwrap();

        let mut sources = SourceSet::new(config.processing.queue_capacity);
        let mock = config.active_mock_source().unwrap();
        sources.register(MockSource::from_config("mock", mock).with_rounds(3));
        let input_rx = sources.take_receiver().unwrap();

        let processor = create_processor(&config, input_rx).await.unwrap();
        assert_eq!(processor.sink_names(), vec!["debug"]);
        let task = processor.spawn();

        sources.start_all().unwrap();
        let summary = task.await.unwrap().shutdown_sinks().await;

        assert_eq!(summary.total_measurements, 3);
        assert_eq!(summary.named, 3);
        assert_eq!(summary.enriched, 0);
    }

    #[test]
    fn test_config_rejects_feedback_loop() {
        let result = ConfigLoader::load_from_str(
            r#"
[mqtt_publisher]
topic_prefix = "ruuvi"

[mqtt_listener]
topic = "ruuvi/#"
"#,
            ConfigFormat::Toml,
        );
        assert!(result.is_err());
    }
}
