//! # Ingestion
//!
//! Measurement source module.
//!
//! Responsibilities:
//! - Run measurement sources (mock generator, MQTT listener)
//! - Parse incoming payloads into `Measurement`
//! - Feed every source into one shared bounded queue
//! - Stop sources on request so the queue closes
//!
//! ## Usage Example
//!
//! ```ignore
//! use ingestion::{MockSource, SourceSet};
//!
//! let mut sources = SourceSet::new(1024);
//! sources.register(MockSource::new("mock", devices, Duration::from_secs(1)));
//!
//! let rx = sources.take_receiver().unwrap();
//! sources.start_all()?;
//! while let Ok(measurement) = rx.recv().await {
//!     // Process measurement
//! }
//! ```

mod error;
mod metrics;
mod mock;
mod mqtt_listener;
mod source_set;

// Re-exports
pub use contracts::Measurement;
pub use error::{IngestionError, Result};
pub use metrics::{IngestionMetrics, MetricsSnapshot};
pub use mock::MockSource;
pub use mqtt_listener::{parse_payload, MqttListenerSettings, MqttListenerSource};
pub use source_set::SourceSet;
