//! Layered error definitions
//!
//! Categorized by source: config / sink / source / serialization

use thiserror::Error;

/// Unified error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== Sink Errors =====
    /// Sink write error
    #[error("sink '{sink_name}' write error: {message}")]
    SinkWrite { sink_name: String, message: String },

    /// Sink connection error
    #[error("sink '{sink_name}' connection error: {message}")]
    SinkConnection { sink_name: String, message: String },

    // ===== Source Errors =====
    /// Source connection error
    #[error("source '{source_name}' connection error: {message}")]
    SourceConnection {
        source_name: String,
        message: String,
    },

    // ===== Payload Errors =====
    /// Measurement (de)serialization error
    #[error("serialization error for '{mac}': {message}")]
    Serialization { mac: String, message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create sink write error
    pub fn sink_write(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkWrite {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }

    /// Create sink connection error
    pub fn sink_connection(sink_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SinkConnection {
            sink_name: sink_name.into(),
            message: message.into(),
        }
    }

    /// Create source connection error
    pub fn source_connection(source_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SourceConnection {
            source_name: source_name.into(),
            message: message.into(),
        }
    }

    /// Create serialization error
    pub fn serialization(mac: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Serialization {
            mac: mac.into(),
            message: message.into(),
        }
    }
}
