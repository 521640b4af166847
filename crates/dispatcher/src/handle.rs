//! SinkHandle - manages a sink with isolated queue and worker task

use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument};

use contracts::{Measurement, MeasurementSink};

use crate::metrics::SinkMetrics;

/// Handle to a running sink worker
pub struct SinkHandle {
    /// Sink name
    name: String,
    /// Channel to send measurements to worker
    tx: mpsc::Sender<Measurement>,
    /// Shared metrics
    metrics: Arc<SinkMetrics>,
    /// Worker task handle
    worker_handle: JoinHandle<()>,
}

impl SinkHandle {
    /// Create a new SinkHandle and spawn the worker task
    pub fn spawn<S: MeasurementSink + Send + 'static>(sink: S, queue_capacity: usize) -> Self {
        let name = sink.name().to_string();
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let metrics = Arc::new(SinkMetrics::new());

        let worker_metrics = Arc::clone(&metrics);
        let worker_name = name.clone();

        let worker_handle = tokio::spawn(async move {
            sink_worker(sink, rx, worker_metrics, worker_name).await;
        });

        Self {
            name,
            tx,
            metrics,
            worker_handle,
        }
    }

    /// Get sink name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get current metrics
    pub fn metrics(&self) -> &Arc<SinkMetrics> {
        &self.metrics
    }

    /// Number of measurements waiting in the queue
    pub fn queue_len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    /// Send a measurement to the sink
    ///
    /// Waits while the queue is full, so a slow sink throttles the caller
    /// instead of losing data. Returns false only if the worker is gone.
    pub async fn send(&self, measurement: Measurement) -> bool {
        match self.tx.send(measurement).await {
            Ok(()) => {
                let depth = self.queue_len();
                self.metrics.set_queue_len(depth);
                observability::record_sink_queue_depth(&self.name, depth);
                observability::record_measurement_forwarded(&self.name);
                true
            }
            Err(_) => {
                error!(sink = %self.name, "Sink worker closed unexpectedly");
                false
            }
        }
    }

    /// Shutdown the sink worker gracefully
    ///
    /// Queued measurements are drained before the sink is flushed and closed.
    #[instrument(name = "sink_handle_shutdown", skip(self), fields(sink = %self.name))]
    pub async fn shutdown(self) {
        // Drop sender to signal worker to stop
        drop(self.tx);
        if let Err(e) = self.worker_handle.await {
            error!(sink = %self.name, error = ?e, "Worker task panicked");
        }
        debug!(sink = %self.name, "SinkHandle shutdown complete");
    }
}

/// Worker task that consumes measurements and writes to sink
#[instrument(
    name = "sink_worker_loop",
    skip(sink, rx, metrics),
    fields(sink = %name)
)]
async fn sink_worker<S: MeasurementSink>(
    mut sink: S,
    mut rx: mpsc::Receiver<Measurement>,
    metrics: Arc<SinkMetrics>,
    name: String,
) {
    debug!(sink = %name, "Sink worker started");

    while let Some(measurement) = rx.recv().await {
        metrics.set_queue_len(rx.len());

        match sink.write(&measurement).await {
            Ok(()) => {
                metrics.inc_write_count();
                observability::record_sink_write(&name, true);
            }
            Err(e) => {
                metrics.inc_failure_count();
                observability::record_sink_write(&name, false);
                error!(
                    sink = %name,
                    mac = %measurement.mac,
                    error = %e,
                    "Write failed"
                );
                // A single failure never stops the worker
            }
        }
    }

    if let Err(e) = sink.flush().await {
        error!(sink = %name, error = %e, "Flush failed on shutdown");
    }
    if let Err(e) = sink.close().await {
        error!(sink = %name, error = %e, "Close failed on shutdown");
    }

    debug!(sink = %name, "Sink worker stopped");
}
