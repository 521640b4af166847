//! Error types for CLI operations.

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// Configuration could not be loaded or failed validation
    #[error("Invalid configuration: {0}")]
    Config(#[from] contracts::ContractError),

    /// A bridge component could not be started
    #[error("Failed to start {component}: {message}")]
    Startup { component: String, message: String },
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    pub fn startup(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Startup {
            component: component.into(),
            message: message.into(),
        }
    }
}

/// Result type alias for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(
            CliError::config_not_found("missing.toml").to_string(),
            "Configuration file not found: missing.toml"
        );
        assert_eq!(
            CliError::startup("sources", "already running").to_string(),
            "Failed to start sources: already running"
        );
    }
}
