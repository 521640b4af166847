//! Mock 测量源
//!
//! 按固定间隔为每个配置的设备生成合成测量值，用于无硬件环境的测试。

use std::sync::Arc;
use std::time::Duration;

use async_channel::Sender;
use chrono::Utc;
use contracts::{ContractError, DeviceId, Measurement, MeasurementSource, MockSourceConfig, StopSignal};
use tracing::{debug, info, instrument, trace};

use crate::metrics::IngestionMetrics;

/// Mock 测量源
///
/// 每个 tick 为每个设备生成一条测量值（RAWv2 风格的字段）。
pub struct MockSource {
    name: String,
    devices: Vec<DeviceId>,
    interval: Duration,
    /// 生成轮数上限（None = 直到停止）
    rounds: Option<u64>,
    metrics: Arc<IngestionMetrics>,
}

impl MockSource {
    /// 创建新的 Mock 测量源
    pub fn new(name: impl Into<String>, devices: Vec<DeviceId>, interval: Duration) -> Self {
        Self {
            name: name.into(),
            devices,
            interval,
            rounds: None,
            metrics: Arc::new(IngestionMetrics::new()),
        }
    }

    /// 从配置创建
    pub fn from_config(name: impl Into<String>, config: &MockSourceConfig) -> Self {
        Self::new(
            name,
            config.devices.iter().map(|d| DeviceId::from(d.as_str())).collect(),
            Duration::from_millis(config.interval_ms),
        )
    }

    /// 限制生成轮数，之后数据源自行结束
    pub fn with_rounds(mut self, rounds: u64) -> Self {
        self.rounds = Some(rounds);
        self
    }

    /// 共享 metrics 实例
    pub fn with_metrics(mut self, metrics: Arc<IngestionMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> Arc<IngestionMetrics> {
        self.metrics.clone()
    }
}

/// 生成一条合成测量值
///
/// 数值随轮数平滑变化，不同设备之间有固定偏移。
fn synthesize(mac: &DeviceId, device_index: usize, round: u64) -> Measurement {
    let r = round as f64;
    let offset = device_index as f64;

    Measurement {
        data_format: Some(5),
        temperature: Some(20.0 + offset * 1.5 + 2.0 * (r * 0.1).sin()),
        humidity: Some(45.0 + offset * 2.0 + 10.0 * (r * 0.05).cos()),
        pressure: Some(100_500.0 + offset * 50.0 + 100.0 * (r * 0.02).sin()),
        acceleration_x: Some(0.02 * (r * 0.3).sin()),
        acceleration_y: Some(0.02 * (r * 0.3).cos()),
        acceleration_z: Some(1.0),
        battery_voltage: Some(3.0 - r * 0.0001),
        tx_power: Some(4),
        rssi: Some(-60 - (device_index as i32) * 5),
        movement_counter: Some((round / 10) as u32),
        measurement_sequence_number: Some(round as u32),
        ..Measurement::new(mac.clone(), Utc::now())
    }
}

impl MeasurementSource for MockSource {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(name = "mock_source_run", skip_all, fields(source = %self.name))]
    async fn run(
        &mut self,
        tx: Sender<Measurement>,
        mut stop: StopSignal,
    ) -> Result<(), ContractError> {
        info!(
            devices = self.devices.len(),
            interval_ms = self.interval.as_millis() as u64,
            "Mock source started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        let mut round: u64 = 0;

        'outer: loop {
            if self.rounds.is_some_and(|limit| round >= limit) {
                break;
            }

            tokio::select! {
                _ = &mut stop => break,
                _ = ticker.tick() => {}
            }

            for (idx, mac) in self.devices.iter().enumerate() {
                let measurement = synthesize(mac, idx, round);
                trace!(mac = %mac, round, "Generated measurement");

                // Sending waits while the queue is full, but never past a stop
                tokio::select! {
                    result = tx.send(measurement) => {
                        if result.is_err() {
                            debug!("Queue closed, mock source ending");
                            break 'outer;
                        }
                        self.metrics.record_received();
                    }
                    _ = &mut stop => break 'outer,
                }
            }
            round += 1;
        }

        info!(rounds = round, "Mock source stopped");
        Ok(())
    }
}
