//! 测量值 / sink 指标收集模块
//!
//! 记录 processor 与各 sink 的运行指标，并在内存中聚合运行摘要。

use std::collections::HashMap;

use contracts::Measurement;
use metrics::{counter, gauge};

/// 记录 processor 接收到的测量值
pub fn record_measurement_received(measurement: &Measurement) {
    counter!("ruuvi_bridge_measurements_received_total").increment(1);
    gauge!(
        "ruuvi_bridge_device_last_seen_seconds",
        "mac" => measurement.mac.to_string()
    )
    .set(measurement.timestamp.timestamp() as f64);
}

/// 记录测量值转发到 sink 队列
pub fn record_measurement_forwarded(sink_name: &str) {
    counter!(
        "ruuvi_bridge_measurements_forwarded_total",
        "sink" => sink_name.to_string()
    )
    .increment(1);
}

/// 记录 sink 写入结果
pub fn record_sink_write(sink_name: &str, success: bool) {
    let status = if success { "success" } else { "failure" };
    counter!(
        "ruuvi_bridge_sink_writes_total",
        "sink" => sink_name.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// 记录被限流丢弃的测量值
pub fn record_rate_limited(sink_name: &str) {
    counter!(
        "ruuvi_bridge_rate_limited_total",
        "sink" => sink_name.to_string()
    )
    .increment(1);
}

/// 记录发布失败（fire-and-forget，失败只计数）
pub fn record_publish_failure(sink_name: &str) {
    counter!(
        "ruuvi_bridge_publish_failures_total",
        "sink" => sink_name.to_string()
    )
    .increment(1);
}

/// 记录数据源错误
pub fn record_source_error(source_name: &str) {
    counter!(
        "ruuvi_bridge_source_errors_total",
        "source" => source_name.to_string()
    )
    .increment(1);
}

/// 记录 sink 队列深度
pub fn record_sink_queue_depth(sink_name: &str, depth: usize) {
    gauge!(
        "ruuvi_bridge_sink_queue_depth",
        "sink" => sink_name.to_string()
    )
    .set(depth as f64);
}

/// 测量值指标聚合器
///
/// 在内存中聚合指标，便于运行结束时输出摘要。
#[derive(Debug, Clone, Default)]
pub struct MeasurementAggregator {
    /// 总测量值数
    pub total_measurements: u64,

    /// 计算了派生值的测量值数
    pub enriched: u64,

    /// 带显示名称的测量值数
    pub named: u64,

    /// 同一设备相邻测量值的时间间隔（秒）
    pub interval_stats: RunningStats,

    /// 各设备测量值数
    pub device_counts: HashMap<String, u64>,

    /// 各设备上一条测量值的时间戳
    last_seen: HashMap<String, i64>,
}

impl MeasurementAggregator {
    /// 创建新的聚合器
    pub fn new() -> Self {
        Self::default()
    }

    /// 更新聚合统计
    pub fn update(&mut self, measurement: &Measurement) {
        self.total_measurements += 1;
        if measurement.acceleration_total.is_some() || measurement.dew_point.is_some() {
            self.enriched += 1;
        }
        if measurement.name.is_some() {
            self.named += 1;
        }

        let mac = measurement.mac.to_string();
        let ts = measurement.timestamp.timestamp();
        if let Some(prev) = self.last_seen.insert(mac.clone(), ts) {
            self.interval_stats.push((ts - prev) as f64);
        }
        *self.device_counts.entry(mac).or_insert(0) += 1;
    }

    /// 生成摘要报告
    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            total_measurements: self.total_measurements,
            devices: self.device_counts.len(),
            enriched: self.enriched,
            named: self.named,
            interval_s: StatsSummary::from(&self.interval_stats),
            device_counts: self.device_counts.clone(),
        }
    }

    /// 重置统计
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 指标摘要
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub total_measurements: u64,
    pub devices: usize,
    pub enriched: u64,
    pub named: u64,
    pub interval_s: StatsSummary,
    pub device_counts: HashMap<String, u64>,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Measurement Summary ===")?;
        writeln!(f, "Total measurements: {}", self.total_measurements)?;
        writeln!(f, "Devices: {}", self.devices)?;
        writeln!(f, "Enriched: {}", self.enriched)?;
        writeln!(f, "Named: {}", self.named)?;
        writeln!(f, "Interval per device (s): {}", self.interval_s)?;

        if !self.device_counts.is_empty() {
            let mut devices: Vec<_> = self.device_counts.iter().collect();
            devices.sort();
            writeln!(f, "Measurements per device:")?;
            for (mac, count) in devices {
                writeln!(f, "  {}: {}", mac, count)?;
            }
        }

        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计计算器 (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    /// 添加新值
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    /// 样本数量
    pub fn count(&self) -> u64 {
        self.count
    }

    /// 均值
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    /// 标准差
    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// 最小值
    pub fn min(&self) -> f64 {
        self.min
    }

    /// 最大值
    pub fn max(&self) -> f64 {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn measurement(mac: &str, secs: i64) -> Measurement {
        Measurement::new(mac, Utc.timestamp_opt(secs, 0).unwrap())
    }

    #[test]
    fn test_running_stats() {
        let mut stats = RunningStats::default();

        for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
            stats.push(v);
        }

        assert_eq!(stats.count(), 5);
        assert!((stats.mean() - 3.0).abs() < 1e-10);
        assert!((stats.min() - 1.0).abs() < 1e-10);
        assert!((stats.max() - 5.0).abs() < 1e-10);
        assert!((stats.variance() - 2.5).abs() < 1e-10);
    }

    #[test]
    fn test_aggregator_tracks_intervals_per_device() {
        let mut aggregator = MeasurementAggregator::new();

        aggregator.update(&measurement("aa:bb:cc:dd:ee:01", 100));
        aggregator.update(&measurement("aa:bb:cc:dd:ee:02", 101));
        aggregator.update(&measurement("aa:bb:cc:dd:ee:01", 110));

        let mut named = measurement("aa:bb:cc:dd:ee:02", 106);
        named.name = Some("Sauna".to_string());
        aggregator.update(&named);

        assert_eq!(aggregator.total_measurements, 4);
        assert_eq!(aggregator.named, 1);
        assert_eq!(aggregator.device_counts.get("aa:bb:cc:dd:ee:01"), Some(&2));
        assert_eq!(aggregator.interval_stats.count(), 2);
        assert!((aggregator.interval_stats.mean() - 7.5).abs() < 1e-10);
    }

    #[test]
    fn test_summary_display() {
        let mut aggregator = MeasurementAggregator::new();
        aggregator.update(&measurement("aa:bb:cc:dd:ee:01", 100));
        aggregator.update(&measurement("aa:bb:cc:dd:ee:01", 105));

        let output = format!("{}", aggregator.summary());
        assert!(output.contains("Total measurements: 2"));
        assert!(output.contains("Devices: 1"));
        assert!(output.contains("aa:bb:cc:dd:ee:01: 2"));

        aggregator.reset();
        assert_eq!(aggregator.total_measurements, 0);
    }
}
