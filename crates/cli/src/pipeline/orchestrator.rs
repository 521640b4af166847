//! Bridge orchestrator - wires sources, processor and sinks together.

use std::future::Future;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use contracts::BridgeConfig;
use ingestion::{MockSource, MqttListenerSettings, MqttListenerSource, SourceSet};
use tracing::{info, warn};

use super::{BridgeStats, StopReason};
use crate::error::CliError;

/// Bridge run options
#[derive(Debug, Clone)]
pub struct BridgeOptions {
    /// Validated bridge configuration
    pub config: BridgeConfig,

    /// Stop after this long (None = until shutdown)
    pub timeout: Option<Duration>,

    /// Metrics endpoint port (None = disabled)
    pub metrics_port: Option<u16>,
}

impl BridgeOptions {
    /// Options for a run without timeout, exposing metrics on the
    /// Prometheus sink port when that sink is enabled
    pub fn new(config: BridgeConfig) -> Self {
        let metrics_port = config.active_prometheus().map(|p| p.port);
        Self {
            config,
            timeout: None,
            metrics_port,
        }
    }
}

/// Main bridge orchestrator
pub struct Bridge {
    options: BridgeOptions,
}

impl Bridge {
    pub fn new(options: BridgeOptions) -> Self {
        Self { options }
    }

    /// Run the bridge until `shutdown` resolves, the timeout passes or
    /// every source has ended
    ///
    /// Shutdown order: sources stop, the processor drains the input queue,
    /// then every sink drains its queue and closes.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> Result<BridgeStats> {
        let start_time = Instant::now();
        let config = &self.options.config;

        if let Some(port) = self.options.metrics_port {
            observability::init_metrics_only(port)?;
            info!(port, "Metrics endpoint available");
        }

        let mut sources = build_sources(config);
        if sources.source_count() == 0 {
            warn!("No sources enabled, the bridge will stop immediately");
        }
        let input_rx = sources
            .take_receiver()
            .ok_or_else(|| CliError::startup("sources", "input queue already taken"))?;

        let processor = dispatcher::create_processor(config, input_rx)
            .await
            .context("Failed to create processor")?;
        let active_sinks = processor.sink_names().len();
        let mut processor_task = processor.spawn();
        info!(active_sinks, "Processor started");

        sources
            .start_all()
            .map_err(|e| CliError::startup("sources", e.to_string()))?;
        info!(active_sources = sources.source_count(), "Bridge running");

        let (stop_reason, finished) = tokio::select! {
            _ = shutdown => {
                warn!("Received shutdown signal, stopping bridge...");
                (StopReason::Signal, None)
            }
            _ = deadline(self.options.timeout) => {
                info!(timeout = ?self.options.timeout, "Run timeout reached");
                (StopReason::Timeout, None)
            }
            // The input queue closes once every source has ended
            report = &mut processor_task => (StopReason::SourcesEnded, Some(report)),
        };

        info!("Stopping sources...");
        sources.stop_all().await;

        let report = match finished {
            Some(report) => report,
            None => processor_task.await,
        }
        .context("Processor task failed")?;

        let sink_metrics: Vec<_> = report
            .handles
            .iter()
            .map(|h| (h.name().to_string(), h.metrics().clone()))
            .collect();

        info!("Draining sinks...");
        let summary = report.shutdown_sinks().await;

        let stats = BridgeStats {
            duration: start_time.elapsed(),
            stop_reason,
            active_sources: sources.source_count(),
            active_sinks,
            ingestion: sources.metrics().snapshot(),
            sinks: sink_metrics
                .into_iter()
                .map(|(name, metrics)| (name, metrics.snapshot()))
                .collect(),
            summary,
        };

        info!(
            duration_secs = stats.duration.as_secs_f64(),
            measurements = stats.summary.total_measurements,
            rate = format!("{:.2}", stats.rate()),
            "Bridge shutdown complete"
        );

        Ok(stats)
    }
}

/// Register every enabled source, sharing one ingestion metrics instance
fn build_sources(config: &BridgeConfig) -> SourceSet {
    let mut sources = SourceSet::new(config.processing.queue_capacity);
    let metrics = sources.metrics();

    if let Some(mock) = config.active_mock_source() {
        info!(devices = mock.devices.len(), "Registering mock source");
        sources.register(MockSource::from_config("mock", mock).with_metrics(metrics.clone()));
    }

    if let Some(listener) = config.active_mqtt_listener() {
        match MqttListenerSettings::resolve(listener) {
            Ok(settings) => {
                info!(broker = %settings.broker, topic = %settings.topic, "Registering MQTT listener");
                sources.register(
                    MqttListenerSource::new("mqtt_listener", settings).with_metrics(metrics),
                );
            }
            // Validated configs always resolve
            Err(e) => warn!(error = %e, "MQTT listener disabled"),
        }
    }

    sources
}

async fn deadline(timeout: Option<Duration>) {
    match timeout {
        Some(timeout) => tokio::time::sleep(timeout).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::MockSourceConfig;

    fn mock_config(devices: &[&str], interval_ms: u64) -> BridgeConfig {
        BridgeConfig {
            mock_source: Some(MockSourceConfig {
                enabled: true,
                devices: devices.iter().map(|d| d.to_string()).collect(),
                interval_ms,
            }),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_no_sources_stops_immediately() {
        let stats = Bridge::new(BridgeOptions::new(BridgeConfig::default()))
            .run(std::future::pending())
            .await
            .unwrap();

        assert_eq!(stats.stop_reason, StopReason::SourcesEnded);
        assert_eq!(stats.active_sources, 0);
        assert_eq!(stats.summary.total_measurements, 0);
    }

    #[tokio::test]
    async fn test_shutdown_signal_stops_bridge() {
        let config = BridgeConfig {
            debug: true,
            ..mock_config(&["aa:bb:cc:dd:ee:01", "aa:bb:cc:dd:ee:02"], 5)
        };
        let shutdown = tokio::time::sleep(Duration::from_millis(100));

        let stats = Bridge::new(BridgeOptions::new(config))
            .run(shutdown)
            .await
            .unwrap();

        assert_eq!(stats.stop_reason, StopReason::Signal);
        assert_eq!(stats.active_sources, 1);
        assert_eq!(stats.active_sinks, 1);
        assert!(stats.summary.total_measurements > 0);
        // Everything that entered the queue reached the sink
        assert_eq!(
            stats.ingestion.measurements_received,
            stats.summary.total_measurements
        );
        assert_eq!(stats.sinks[0].1.write_count, stats.summary.total_measurements);
        assert_eq!(stats.summary.devices, 2);
    }

    #[tokio::test]
    async fn test_timeout_stops_bridge() {
        let options = BridgeOptions {
            timeout: Some(Duration::from_millis(50)),
            ..BridgeOptions::new(mock_config(&["aa:bb:cc:dd:ee:01"], 10))
        };

        let stats = Bridge::new(options)
            .run(std::future::pending())
            .await
            .unwrap();

        assert_eq!(stats.stop_reason, StopReason::Timeout);
        assert!(stats.duration >= Duration::from_millis(50));
    }
}
