//! DebugSink - logs every measurement via tracing

use contracts::{ContractError, Measurement, MeasurementSink};
use tracing::{info, instrument};

/// Sink that logs each measurement for debugging
pub struct DebugSink {
    name: String,
}

impl DebugSink {
    /// Create a new DebugSink with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    fn log_measurement(&self, measurement: &Measurement) {
        info!(
            sink = %self.name,
            mac = %measurement.mac,
            name = measurement.name.as_deref().unwrap_or("-"),
            timestamp = measurement.timestamp.timestamp(),
            fields = measurement.fields().len(),
            temperature = ?measurement.temperature,
            humidity = ?measurement.humidity,
            pressure = ?measurement.pressure,
            "Measurement received"
        );
    }
}

impl MeasurementSink for DebugSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "debug_sink_write",
        skip(self, measurement),
        fields(sink = %self.name, mac = %measurement.mac)
    )]
    async fn write(&mut self, measurement: &Measurement) -> Result<(), ContractError> {
        self.log_measurement(measurement);
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    #[instrument(name = "debug_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        info!(sink = %self.name, "DebugSink closed");
        Ok(())
    }
}
