//! # Contracts
//!
//! Shared interface contracts for the bridge: the measurement model, the
//! configuration model and the sink/source traits.
//! All business crates depend on this crate, reverse dependencies are prohibited.
//!
//! ## Time Model
//! - Every `Measurement` carries the observation time as `DateTime<Utc>`
//! - On the wire the timestamp is unix seconds

mod broker;
mod config;
mod device_id;
mod error;
mod measurement;
mod sink;
mod source;

pub use broker::{
    topic_matches, BrokerAddress, DEFAULT_BROKER_ADDRESS, DEFAULT_BROKER_PORT, DEFAULT_TLS_PORT,
};
pub use config::*;
pub use device_id::{normalize_mac, DeviceId};
pub use error::*;
pub use measurement::*;
pub use sink::*;
pub use source::*;
