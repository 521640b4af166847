//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use observability::ObservabilityConfig;
use std::path::PathBuf;

/// Ruuvi Bridge - forwards sensor measurements to MQTT, Prometheus and the console
#[derive(Parser, Debug)]
#[command(
    name = "ruuvi-bridge",
    author,
    version,
    about = "Ruuvi sensor measurement bridge",
    long_about = "Collects measurements from the configured sources, enriches them with\n\
                  derived values and display names, and forwards every measurement to\n\
                  each enabled sink (MQTT, Prometheus, console)."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "RUUVI_BRIDGE_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "RUUVI_BRIDGE_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the bridge
    Run(RunArgs),

    /// Validate configuration file without running
    Validate(ValidateArgs),

    /// Display configuration information
    Info(InfoArgs),
}

/// Arguments for the `run` command
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Path to configuration file (TOML or JSON)
    #[arg(
        short,
        long,
        default_value = "ruuvi-bridge.toml",
        env = "RUUVI_BRIDGE_CONFIG"
    )]
    pub config: PathBuf,

    /// Stop after this many seconds (0 = run until interrupted)
    #[arg(long, default_value = "0", env = "RUUVI_BRIDGE_TIMEOUT")]
    pub timeout: u64,

    /// Validate configuration and exit without starting sources or sinks
    #[arg(long)]
    pub dry_run: bool,

    /// Override the shared input queue capacity
    #[arg(long, env = "RUUVI_BRIDGE_QUEUE_CAPACITY")]
    pub queue_capacity: Option<usize>,

    /// Override the metrics endpoint port (defaults to the Prometheus sink port)
    #[arg(long, env = "RUUVI_BRIDGE_METRICS_PORT")]
    pub metrics_port: Option<u16>,

    /// Enable the debug sink regardless of configuration
    #[arg(long)]
    pub debug: bool,
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file to validate
    #[arg(short, long, default_value = "ruuvi-bridge.toml")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "ruuvi-bridge.toml")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,

    /// Show configured device names
    #[arg(long)]
    pub tags: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl Cli {
    /// Logging setup selected by `-q`, `-v` and `--log-format`
    ///
    /// `RUST_LOG` still takes precedence over the level chosen here. The
    /// metrics endpoint is left to the `run` command.
    pub fn observability_config(&self) -> ObservabilityConfig {
        let level = if self.quiet {
            "warn"
        } else {
            match self.verbose {
                0 => "info",
                1 => "debug",
                _ => "trace",
            }
        };

        ObservabilityConfig {
            log_format: self.log_format.clone().into(),
            metrics_port: None,
            default_log_level: level.to_string(),
        }
    }
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}
