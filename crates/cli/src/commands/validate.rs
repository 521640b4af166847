//! `validate` command implementation.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use contracts::BridgeConfig;

use crate::cli::ValidateArgs;

use super::load_config;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    source_count: usize,
    sink_count: usize,
    tag_name_count: usize,
    extended_values: bool,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    match load_config(&args.config) {
        Ok(config) => {
            let warnings = collect_warnings(&config);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(ConfigSummary {
                    source_count: config.active_source_count(),
                    sink_count: config.active_sink_count(),
                    tag_name_count: config.tag_names.len(),
                    extended_values: config.processing.extended_values,
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(config: &BridgeConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.active_source_count() == 0 {
        warnings.push("No sources enabled - the bridge will exit immediately".to_string());
    }
    if config.active_sink_count() == 0 {
        warnings.push("No sinks enabled - measurements will be discarded".to_string());
    }

    if let Some(mqtt) = config.active_mqtt_publisher() {
        if mqtt.homeassistant_discovery_prefix.is_some() && mqtt.lwt_topic.is_none() {
            warnings.push(
                "Home Assistant discovery without lwt_topic - entities will not track availability"
                    .to_string(),
            );
        }
    }

    if let Some(mock) = config.active_mock_source() {
        if mock.devices.is_empty() {
            warnings.push("mock_source has no devices - it will emit nothing".to_string());
        }
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Sources: {}", summary.source_count);
            println!("  Sinks: {}", summary.sink_count);
            println!("  Tag names: {}", summary.tag_name_count);
            println!("  Extended values: {}", summary.extended_values);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
