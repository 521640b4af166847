//! PrometheusSink - exposes the latest value of every field as a gauge
//!
//! Gauges are written through the `metrics` facade; the scrape endpoint is
//! the recorder installed by `observability::init_metrics_only`.

use contracts::{ContractError, Measurement, MeasurementSink};
use metrics::gauge;
use tracing::{debug, instrument};

/// Sink that mirrors measurements into per-device gauges
pub struct PrometheusSink {
    name: String,
}

impl PrometheusSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Label set of one device: hardware address and display name
fn device_labels(measurement: &Measurement) -> [(&'static str, String); 2] {
    [
        ("mac", measurement.mac.to_string()),
        ("name", measurement.name.clone().unwrap_or_default()),
    ]
}

impl MeasurementSink for PrometheusSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "prometheus_sink_write",
        skip(self, measurement),
        fields(sink = %self.name, mac = %measurement.mac)
    )]
    async fn write(&mut self, measurement: &Measurement) -> Result<(), ContractError> {
        let labels = device_labels(measurement);

        for (field, value) in measurement.fields() {
            gauge!(field.metric_name(), &labels).set(value);
        }
        gauge!("ruuvi_last_updated_seconds", &labels)
            .set(measurement.timestamp.timestamp() as f64);

        Ok(())
    }

    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ContractError> {
        debug!(sink = %self.name, "PrometheusSink closed");
        Ok(())
    }
}
