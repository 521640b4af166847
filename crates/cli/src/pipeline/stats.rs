//! Bridge run statistics.

use std::fmt;
use std::time::Duration;

use observability::MetricsSummary;

/// Why the bridge stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopReason {
    /// Ctrl+C or SIGTERM
    #[default]
    Signal,
    /// The configured run timeout passed
    Timeout,
    /// Every source ended on its own
    SourcesEnded,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::Signal => "shutdown signal",
            Self::Timeout => "timeout",
            Self::SourcesEnded => "all sources ended",
        };
        f.write_str(reason)
    }
}

/// Statistics from a bridge run
#[derive(Debug, Clone, Default)]
pub struct BridgeStats {
    /// Total duration of the run
    pub duration: Duration,

    pub stop_reason: StopReason,

    /// Number of sources that were started
    pub active_sources: usize,

    /// Number of sinks that received data
    pub active_sinks: usize,

    /// Source-side counters
    pub ingestion: ingestion::MetricsSnapshot,

    /// Final per-sink counters, in registration order
    pub sinks: Vec<(String, dispatcher::MetricsSnapshot)>,

    /// Processor-side measurement summary
    pub summary: MetricsSummary,
}

impl BridgeStats {
    /// Processed measurements per second
    pub fn rate(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.summary.total_measurements as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                     Bridge Statistics                        ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        println!("📊 Overview");
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Stopped by: {}", self.stop_reason);
        println!("   ├─ Measurements received: {}", self.ingestion.measurements_received);
        println!("   ├─ Parse errors: {}", self.ingestion.parse_errors);
        println!("   ├─ Source failures: {}", self.ingestion.source_failures);
        println!("   ├─ Rate: {:.2}/s", self.rate());
        println!("   ├─ Active sources: {}", self.active_sources);
        println!("   └─ Active sinks: {}", self.active_sinks);

        if !self.sinks.is_empty() {
            println!("\n📤 Sinks");
            for (i, (name, metrics)) in self.sinks.iter().enumerate() {
                let prefix = if i == self.sinks.len() - 1 { "└─" } else { "├─" };
                println!(
                    "   {} {}: {} written, {} failed",
                    prefix, name, metrics.write_count, metrics.failure_count
                );
            }
        }

        println!("\n{}", self.summary);
    }
}
