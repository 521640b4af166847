//! # Dispatcher
//!
//! Measurement distribution module.
//!
//! Responsibilities:
//! - Consume `Measurement`s from the shared source queue
//! - Enrich with derived values and configured display names
//! - Fan-out a private copy to every sink, blocking on a full sink queue
//! - Per-sink publish-rate limiting (MQTT)

pub mod enrich;
pub mod error;
pub mod handle;
pub mod limiter;
pub mod metrics;
pub mod names;
pub mod processor;
pub mod sinks;

pub use contracts::{Measurement, MeasurementSink};
pub use error::DispatcherError;
pub use handle::SinkHandle;
pub use limiter::Limiter;
pub use metrics::{MetricsSnapshot, SinkMetrics};
pub use names::TagNames;
pub use processor::{
    create_processor, Processor, ProcessorBuilder, ProcessorReport, ProcessorSettings,
};
pub use sinks::{DebugSink, MqttPublish, MqttSink, MqttSinkSettings, PrometheusSink};
