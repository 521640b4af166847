//! Sink implementations
//!
//! Contains DebugSink, PrometheusSink, and MqttSink.

mod debug;
pub mod mqtt;
mod prometheus;

pub use self::debug::DebugSink;
pub use self::mqtt::{MqttPublish, MqttSink, MqttSinkSettings};
pub use self::prometheus::PrometheusSink;
