//! MeasurementSink trait - Dispatcher output interface
//!
//! Defines the abstract interface for sinks.

use crate::{ContractError, Measurement};

/// Data output trait
///
/// Every sink implementation (debug console, Prometheus, MQTT) implements this
/// trait. A sink is driven by exactly one worker task, so methods take
/// `&mut self` and need no internal locking.
#[trait_variant::make(MeasurementSink: Send)]
pub trait LocalMeasurementSink {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Publish one measurement
    ///
    /// The measurement is the worker's private copy.
    ///
    /// # Errors
    /// Returns write error (should include context). The worker logs it and
    /// keeps draining the queue.
    async fn write(&mut self, measurement: &Measurement) -> Result<(), ContractError>;

    /// Flush buffer (if any)
    async fn flush(&mut self) -> Result<(), ContractError>;

    /// Close sink
    async fn close(&mut self) -> Result<(), ContractError>;
}
