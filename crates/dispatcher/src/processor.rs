//! Processor - enrichment and fan-out of measurements to sinks

use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use contracts::{BridgeConfig, Measurement};
use observability::{MeasurementAggregator, MetricsSummary};

use crate::enrich::calculate_extended_values;
use crate::error::DispatcherError;
use crate::handle::SinkHandle;
use crate::metrics::MetricsSnapshot;
use crate::names::TagNames;
use crate::sinks::{DebugSink, MqttSink, MqttSinkSettings, PrometheusSink};

/// Queue capacity of sinks that do not configure their own
pub const DEFAULT_SINK_QUEUE_CAPACITY: usize = 1024;

/// Per-measurement processing options
#[derive(Debug, Clone, Default)]
pub struct ProcessorSettings {
    /// Compute derived values before forwarding
    pub extended_values: bool,
    /// Display names by hardware address
    pub tag_names: TagNames,
}

impl ProcessorSettings {
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            extended_values: config.processing.extended_values,
            tag_names: TagNames::new(&config.tag_names),
        }
    }
}

/// Builder for creating a Processor with its sinks
pub struct ProcessorBuilder<'a> {
    config: &'a BridgeConfig,
    input_rx: async_channel::Receiver<Measurement>,
}

impl<'a> ProcessorBuilder<'a> {
    /// Create a new ProcessorBuilder
    pub fn new(config: &'a BridgeConfig, input_rx: async_channel::Receiver<Measurement>) -> Self {
        Self { config, input_rx }
    }

    /// Create all enabled sinks and the processor in front of them
    #[instrument(name = "processor_builder_build", skip(self))]
    pub async fn build(self) -> Result<Processor, DispatcherError> {
        let handles = Self::initialize_handles(self.config).await?;

        Ok(Processor::new(
            ProcessorSettings::from_config(self.config),
            handles,
            self.input_rx,
        ))
    }

    #[instrument(
        name = "processor_initialize_handles",
        skip(config),
        fields(sink_count = config.active_sink_count())
    )]
    async fn initialize_handles(config: &BridgeConfig) -> Result<Vec<SinkHandle>, DispatcherError> {
        let mut handles = Vec::with_capacity(config.active_sink_count());

        if config.debug {
            handles.push(SinkHandle::spawn(
                DebugSink::new("debug"),
                DEFAULT_SINK_QUEUE_CAPACITY,
            ));
        }

        if config.active_prometheus().is_some() {
            handles.push(SinkHandle::spawn(
                PrometheusSink::new("prometheus"),
                DEFAULT_SINK_QUEUE_CAPACITY,
            ));
        }

        if let Some(mqtt) = config.active_mqtt_publisher() {
            let settings = MqttSinkSettings::resolve(mqtt)
                .map_err(|e| DispatcherError::sink_creation("mqtt", e.to_string()))?;
            let capacity = settings.queue_capacity;
            let sink = MqttSink::connect("mqtt", settings).await;
            handles.push(SinkHandle::spawn(sink, capacity));
        }

        if handles.is_empty() {
            warn!("No sinks enabled, measurements will be discarded");
        }
        Ok(handles)
    }
}

/// Outcome of a processor run
///
/// The sink handles are returned still running so the caller decides when
/// to drain and close them.
pub struct ProcessorReport {
    pub summary: MetricsSummary,
    pub handles: Vec<SinkHandle>,
}

impl ProcessorReport {
    /// Drain every sink queue, then flush and close the sinks
    pub async fn shutdown_sinks(self) -> MetricsSummary {
        for handle in self.handles {
            handle.shutdown().await;
        }
        self.summary
    }
}

/// Consumes the shared input queue and fans out to every sink
///
/// Each sink receives its own copy of every measurement, in input order.
/// A full sink queue blocks the processor, which in turn fills the input
/// queue and slows the sources down.
pub struct Processor {
    settings: ProcessorSettings,
    handles: Vec<SinkHandle>,
    input_rx: async_channel::Receiver<Measurement>,
}

impl Processor {
    pub fn new(
        settings: ProcessorSettings,
        handles: Vec<SinkHandle>,
        input_rx: async_channel::Receiver<Measurement>,
    ) -> Self {
        Self {
            settings,
            handles,
            input_rx,
        }
    }

    /// Create a processor with default settings and custom sink handles
    pub fn with_handles(
        handles: Vec<SinkHandle>,
        input_rx: async_channel::Receiver<Measurement>,
    ) -> Self {
        Self::new(ProcessorSettings::default(), handles, input_rx)
    }

    /// Names of the registered sinks, in registration order
    pub fn sink_names(&self) -> Vec<&str> {
        self.handles.iter().map(SinkHandle::name).collect()
    }

    /// Get metrics for all sinks
    pub fn metrics(&self) -> Vec<(String, MetricsSnapshot)> {
        self.handles
            .iter()
            .map(|h| (h.name().to_string(), h.metrics().snapshot()))
            .collect()
    }

    /// Apply enrichment and naming to one measurement
    pub fn prepare(&self, measurement: &mut Measurement) {
        if self.settings.extended_values {
            calculate_extended_values(measurement);
        }
        if let Some(name) = self.settings.tag_names.lookup(&measurement.mac) {
            measurement.name = Some(name.to_string());
        }
    }

    /// Run the processor main loop
    ///
    /// Returns when the input queue is closed and drained. Sinks are left
    /// running; see [`ProcessorReport::shutdown_sinks`].
    #[instrument(name = "processor_run", skip(self))]
    pub async fn run(self) -> ProcessorReport {
        info!(
            sinks = self.handles.len(),
            extended_values = self.settings.extended_values,
            tag_names = self.settings.tag_names.len(),
            "Processor started"
        );

        let mut aggregator = MeasurementAggregator::new();

        while let Ok(mut measurement) = self.input_rx.recv().await {
            self.prepare(&mut measurement);
            observability::record_measurement_received(&measurement);
            aggregator.update(&measurement);

            self.dispatch(measurement).await;

            if aggregator.total_measurements.is_multiple_of(100) {
                debug!(
                    measurements = aggregator.total_measurements,
                    "Processor progress"
                );
            }
        }

        info!(
            measurements = aggregator.total_measurements,
            devices = aggregator.device_counts.len(),
            "Processor input closed"
        );

        ProcessorReport {
            summary: aggregator.summary(),
            handles: self.handles,
        }
    }

    /// Spawn the processor as a background task
    pub fn spawn(self) -> JoinHandle<ProcessorReport> {
        tokio::spawn(self.run())
    }

    /// Hand a copy to every sink, blocking on full queues
    async fn dispatch(&self, measurement: Measurement) {
        let Some((last, rest)) = self.handles.split_last() else {
            return;
        };
        for handle in rest {
            handle.send(measurement.clone()).await;
        }
        last.send(measurement).await;
    }
}

/// Convenience function to create a processor from the bridge configuration
#[instrument(name = "processor_create", skip(config, input_rx))]
pub async fn create_processor(
    config: &BridgeConfig,
    input_rx: async_channel::Receiver<Measurement>,
) -> Result<Processor, DispatcherError> {
    ProcessorBuilder::new(config, input_rx).build().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use contracts::{ContractError, MeasurementSink};
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Sink that records what it receives, optionally slowly
    struct CaptureSink {
        name: String,
        received: Arc<Mutex<Vec<Measurement>>>,
        delay: Duration,
    }

    impl CaptureSink {
        fn new(name: &str, delay: Duration) -> (Self, Arc<Mutex<Vec<Measurement>>>) {
            let received = Arc::new(Mutex::new(Vec::new()));
            let sink = Self {
                name: name.to_string(),
                received: Arc::clone(&received),
                delay,
            };
            (sink, received)
        }
    }

    impl MeasurementSink for CaptureSink {
        fn name(&self) -> &str {
            &self.name
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

    fn measurement(seq: u32) -> Measurement {
        Measurement {
            temperature: Some(20.0),
            humidity: Some(50.0),
            measurement_sequence_number: Some(seq),
            ..Measurement::new("aa:bb:cc:dd:ee:ff", Utc.timestamp_opt(1_000 + seq as i64, 0).unwrap())
        }
    }

    fn sequence(received: &Arc<Mutex<Vec<Measurement>>>) -> Vec<u32> {
        received
            .lock()
            .unwrap()
            .iter()
            .filter_map(|m| m.measurement_sequence_number)
            .collect()
    }

    #[tokio::test]
    async fn test_fanout_preserves_order_per_sink() {
        let (input_tx, input_rx) = async_channel::bounded(10);
        let (fast, fast_rx) = CaptureSink::new("fast", Duration::ZERO);
        let (slow, slow_rx) = CaptureSink::new("slow", Duration::from_millis(2));

        let handles = vec![SinkHandle::spawn(fast, 4), SinkHandle::spawn(slow, 4)];
        let processor = Processor::with_handles(handles, input_rx).spawn();

        for seq in 0..20 {
            input_tx.send(measurement(seq)).await.unwrap();
        }
        drop(input_tx);

        let report = processor.await.unwrap();
        assert_eq!(report.summary.total_measurements, 20);
        report.shutdown_sinks().await;

        let expected: Vec<u32> = (0..20).collect();
        assert_eq!(sequence(&fast_rx), expected);
        assert_eq!(sequence(&slow_rx), expected);
    }

    #[tokio::test]
    async fn test_sinks_get_independent_copies() {
        let (input_tx, input_rx) = async_channel::bounded(4);
        let (a, a_rx) = CaptureSink::new("a", Duration::ZERO);
        let (b, b_rx) = CaptureSink::new("b", Duration::ZERO);

        let processor = Processor::with_handles(
            vec![SinkHandle::spawn(a, 4), SinkHandle::spawn(b, 4)],
            input_rx,
        )
        .spawn();

        input_tx.send(measurement(1)).await.unwrap();
        drop(input_tx);
        processor.await.unwrap().shutdown_sinks().await;

        let a_copy = a_rx.lock().unwrap()[0].clone();
        let b_copy = b_rx.lock().unwrap()[0].clone();
        assert_eq!(a_copy, b_copy);
        assert_eq!(a_copy, measurement(1));
    }

    #[tokio::test]
    async fn test_prepare_enriches_and_names() {
        let (_tx, input_rx) = async_channel::bounded(1);
        let settings = ProcessorSettings {
            extended_values: true,
            tag_names: [("AABBCCDDEEFF", "Sauna")].into_iter().collect(),
        };
        let processor = Processor::new(settings, Vec::new(), input_rx);

        let mut m = measurement(1);
        processor.prepare(&mut m);

        assert_eq!(m.name.as_deref(), Some("Sauna"));
        assert!(m.dew_point.is_some());
        assert!(m.absolute_humidity.is_some());
    }

    #[tokio::test]
    async fn test_prepare_without_extended_values() {
        let (_tx, input_rx) = async_channel::bounded(1);
        let processor = Processor::with_handles(Vec::new(), input_rx);

        let mut m = measurement(1);
        processor.prepare(&mut m);

        assert_eq!(m, measurement(1));
    }

    #[tokio::test]
    async fn test_slow_sink_applies_backpressure_without_loss() {
        let (input_tx, input_rx) = async_channel::bounded(2);
        let (slow, slow_rx) = CaptureSink::new("slow", Duration::from_millis(5));

        let processor =
            Processor::with_handles(vec![SinkHandle::spawn(slow, 1)], input_rx).spawn();

        for seq in 0..10 {
            input_tx.send(measurement(seq)).await.unwrap();
        }
        // The producer was throttled, yet nothing was dropped
        drop(input_tx);
        processor.await.unwrap().shutdown_sinks().await;

        assert_eq!(sequence(&slow_rx), (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_no_sinks_discards() {
        let (input_tx, input_rx) = async_channel::bounded(4);
        let processor = Processor::with_handles(Vec::new(), input_rx).spawn();

        input_tx.send(measurement(1)).await.unwrap();
        drop(input_tx);

        let report = processor.await.unwrap();
        assert_eq!(report.summary.total_measurements, 1);
        assert!(report.handles.is_empty());
    }

    #[tokio::test]
    async fn test_create_processor_from_config() {
        let (input_tx, input_rx) = async_channel::bounded(4);
        let config = BridgeConfig {
            debug: true,
            tag_names: HashMap::from([("aa:bb:cc:dd:ee:ff".to_string(), "Fridge".to_string())]),
            ..Default::default()
        };

        let processor = create_processor(&config, input_rx).await.unwrap();
        assert_eq!(processor.sink_names(), vec!["debug"]);

        let handle = processor.spawn();
        input_tx.send(measurement(1)).await.unwrap();
        drop(input_tx);

        let summary = handle.await.unwrap().shutdown_sinks().await;
        assert_eq!(summary.named, 1);
        assert_eq!(summary.enriched, 1);
    }
}
