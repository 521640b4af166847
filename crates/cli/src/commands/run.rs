//! `run` command implementation.

use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{error, info};

use crate::cli::RunArgs;
use crate::pipeline::{Bridge, BridgeOptions};

use super::load_config;

/// Execute the `run` command
pub async fn run_bridge(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    let mut config = load_config(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    // Apply CLI overrides
    if let Some(capacity) = args.queue_capacity.filter(|c| *c > 0) {
        info!(capacity, "Overriding input queue capacity from CLI");
        config.processing.queue_capacity = capacity;
    }
    if args.debug {
        config.debug = true;
    }

    info!(
        sources = config.active_source_count(),
        sinks = config.active_sink_count(),
        tag_names = config.tag_names.len(),
        extended_values = config.processing.extended_values,
        "Configuration loaded"
    );

    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&config);
        return Ok(());
    }

    let mut options = BridgeOptions::new(config);
    if args.timeout > 0 {
        options.timeout = Some(Duration::from_secs(args.timeout));
    }
    if let Some(port) = args.metrics_port {
        options.metrics_port = Some(port);
    }

    info!("Starting bridge...");
    let stats = Bridge::new(options)
        .run(shutdown_signal())
        .await
        .context("Bridge execution failed")?;

    stats.print_summary();

    info!("Ruuvi Bridge finished");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
///
/// A handler that cannot be installed is logged and never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(config: &contracts::BridgeConfig) {
    println!("\n=== Configuration Summary ===\n");

    println!("Processing:");
    println!("  Extended values: {}", config.processing.extended_values);
    println!("  Input queue capacity: {}", config.processing.queue_capacity);
    println!("  Tag names: {}", config.tag_names.len());

    println!("\nSources ({}):", config.active_source_count());
    if let Some(mock) = config.active_mock_source() {
        println!(
            "  - mock ({} devices, every {} ms)",
            mock.devices.len(),
            mock.interval_ms
        );
    }
    if let Some(listener) = config.active_mqtt_listener() {
        println!("  - mqtt_listener (topic {})", listener.topic);
    }

    println!("\nSinks ({}):", config.active_sink_count());
    if config.debug {
        println!("  - debug");
    }
    if let Some(prometheus) = config.active_prometheus() {
        println!("  - prometheus (port {})", prometheus.port);
    }
    if let Some(mqtt) = config.active_mqtt_publisher() {
        println!(
            "  - mqtt (prefix {})",
            mqtt.topic_prefix.as_deref().unwrap_or("ruuvi")
        );
    }

    println!();
}
