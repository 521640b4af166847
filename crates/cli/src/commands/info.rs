//! `info` command implementation.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use contracts::BridgeConfig;
use serde::Serialize;
use tracing::info;

use crate::cli::InfoArgs;

use super::load_config;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    processing: ProcessingInfo,
    sources: Vec<EndpointInfo>,
    sinks: Vec<EndpointInfo>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    tag_names: BTreeMap<String, String>,
}

#[derive(Serialize)]
struct ProcessingInfo {
    extended_values: bool,
    queue_capacity: usize,
    tag_name_count: usize,
}

/// One source or sink and its most relevant settings
#[derive(Serialize)]
struct EndpointInfo {
    name: String,
    detail: String,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    let config = load_config(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;
    let info = build_config_info(&config, args);

    if args.json {
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&info);
    }

    Ok(())
}

fn build_config_info(config: &BridgeConfig, args: &InfoArgs) -> ConfigInfo {
    let mut sources = Vec::new();
    if let Some(mock) = config.active_mock_source() {
        sources.push(EndpointInfo {
            name: "mock".to_string(),
            detail: format!("{} devices every {} ms", mock.devices.len(), mock.interval_ms),
        });
    }
    if let Some(listener) = config.active_mqtt_listener() {
        let broker = listener
            .broker_url
            .clone()
            .or_else(|| listener.broker_address.clone())
            .unwrap_or_else(|| contracts::DEFAULT_BROKER_ADDRESS.to_string());
        sources.push(EndpointInfo {
            name: "mqtt_listener".to_string(),
            detail: format!("{} on {}", listener.topic, broker),
        });
    }

    let mut sinks = Vec::new();
    if config.debug {
        sinks.push(EndpointInfo {
            name: "debug".to_string(),
            detail: "console".to_string(),
        });
    }
    if let Some(prometheus) = config.active_prometheus() {
        sinks.push(EndpointInfo {
            name: "prometheus".to_string(),
            detail: format!("port {}", prometheus.port),
        });
    }
    if let Some(mqtt) = config.active_mqtt_publisher() {
        let mut detail = format!(
            "prefix {}",
            mqtt.topic_prefix.as_deref().unwrap_or("ruuvi")
        );
        if let Some(interval) = mqtt.minimum_interval_sec.filter(|s| *s > 0.0) {
            detail.push_str(&format!(", min interval {interval}s"));
        }
        if let Some(topic) = &mqtt.lwt_topic {
            detail.push_str(&format!(", presence on {topic}"));
        }
        if let Some(prefix) = &mqtt.homeassistant_discovery_prefix {
            detail.push_str(&format!(", discovery under {prefix}"));
        }
        sinks.push(EndpointInfo {
            name: "mqtt".to_string(),
            detail,
        });
    }

    let tag_names = if args.tags {
        config
            .tag_names
            .iter()
            .map(|(mac, name)| (mac.clone(), name.clone()))
            .collect()
    } else {
        BTreeMap::new()
    };

    ConfigInfo {
        processing: ProcessingInfo {
            extended_values: config.processing.extended_values,
            queue_capacity: config.processing.queue_capacity,
            tag_name_count: config.tag_names.len(),
        },
        sources,
        sinks,
        tag_names,
    }
}

fn print_config_info(info: &ConfigInfo) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                Ruuvi Bridge Configuration                    ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    println!("⚙️  Processing");
    println!("   ├─ Extended values: {}", info.processing.extended_values);
    println!("   ├─ Input queue capacity: {}", info.processing.queue_capacity);
    println!("   └─ Tag names: {}", info.processing.tag_name_count);

    print_endpoints("📥 Sources", &info.sources);
    print_endpoints("📤 Sinks", &info.sinks);

    if !info.tag_names.is_empty() {
        println!("\n🏷️  Tag Names");
        for (i, (mac, name)) in info.tag_names.iter().enumerate() {
            let prefix = if i == info.tag_names.len() - 1 { "└─" } else { "├─" };
            println!("   {} {} → {}", prefix, mac, name);
        }
    }

    println!();
}

fn print_endpoints(title: &str, endpoints: &[EndpointInfo]) {
    println!("\n{} ({})", title, endpoints.len());
    for (i, endpoint) in endpoints.iter().enumerate() {
        let prefix = if i == endpoints.len() - 1 { "└─" } else { "├─" };
        println!("   {} {} ({})", prefix, endpoint.name, endpoint.detail);
    }
}
