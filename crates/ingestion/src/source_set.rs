//! SourceSet - runs every measurement source into one shared queue

use std::sync::Arc;
use std::time::Duration;

use async_channel::{bounded, Receiver, Sender};
use contracts::{ContractError, Measurement, MeasurementSource};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{IngestionError, Result};
use crate::metrics::IngestionMetrics;

/// How long a source gets to honor its stop signal
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

type SourceTask = JoinHandle<std::result::Result<(), ContractError>>;
type Launch = Box<dyn FnOnce(Sender<Measurement>, oneshot::Receiver<()>) -> SourceTask + Send>;

struct RegisteredSource {
    name: String,
    launch: Option<Launch>,
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<SourceTask>,
}

impl RegisteredSource {
    fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

/// Measurement source set
///
/// Owns the shared input queue. Every source gets a clone of the sender
/// and the set gives up its own on `start_all`, so the queue closes once
/// all sources have ended.
pub struct SourceSet {
    /// Registered sources, in registration order
    sources: Vec<RegisteredSource>,

    /// Shared metrics
    metrics: Arc<IngestionMetrics>,

    /// Data sender (cloned into every source, released on start)
    tx: Option<Sender<Measurement>>,

    /// Data receiver
    rx: Option<Receiver<Measurement>>,
}

impl SourceSet {
    /// Create a new SourceSet
    ///
    /// # Arguments
    /// * `queue_capacity` - Capacity of the shared input queue
    pub fn new(queue_capacity: usize) -> Self {
        let (tx, rx) = bounded(queue_capacity.max(1));

        Self {
            sources: Vec::new(),
            metrics: Arc::new(IngestionMetrics::new()),
            tx: Some(tx),
            rx: Some(rx),
        }
    }

    /// Register a source; it starts with `start_all`
    #[instrument(name = "ingestion_register_source", skip_all, fields(source = %source.name()))]
    pub fn register<S: MeasurementSource + 'static>(&mut self, mut source: S) {
        let name = source.name().to_string();
        let launch: Launch = Box::new(move |tx, stop| {
            tokio::spawn(async move { source.run(tx, stop).await })
        });

        debug!(source = %name, "registered measurement source");
        self.sources.push(RegisteredSource {
            name,
            launch: Some(launch),
            stop_tx: None,
            task: None,
        });
    }

    /// Start all registered sources
    ///
    /// The set hands its sender over to the sources, so the queue closes on
    /// its own once every source has ended.
    #[instrument(name = "ingestion_start_all", skip(self))]
    pub fn start_all(&mut self) -> Result<()> {
        if let Some(source) = self.sources.iter().find(|s| s.launch.is_none()) {
            return Err(IngestionError::AlreadyRunning {
                source_name: source.name.clone(),
            });
        }
        let Some(tx) = self.tx.take() else {
            warn!("source set already stopped, not starting sources");
            return Ok(());
        };

        info!(count = self.sources.len(), "starting all measurement sources");
        for source in &mut self.sources {
            let Some(launch) = source.launch.take() else {
                continue;
            };
            let (stop_tx, stop_rx) = oneshot::channel();
            source.task = Some(launch(tx.clone(), stop_rx));
            source.stop_tx = Some(stop_tx);
            debug!(source = %source.name, "source started");
        }
        Ok(())
    }

    /// Signal every source to stop and wait for them
    ///
    /// Releases the set's own sender, so the queue closes once the sources
    /// are gone and the consumer has drained it.
    #[instrument(name = "ingestion_stop_all", skip(self))]
    pub async fn stop_all(&mut self) {
        info!(count = self.sources.len(), "stopping all measurement sources");
        self.signal_stop();
        self.join_all().await;
    }

    /// Wait for every source to end on its own
    pub async fn join_all(&mut self) {
        self.tx = None;

        for source in &mut self.sources {
            let Some(task) = source.task.take() else {
                continue;
            };
            let abort = task.abort_handle();
            match tokio::time::timeout(STOP_TIMEOUT, task).await {
                Ok(Ok(Ok(()))) => debug!(source = %source.name, "source stopped"),
                Ok(Ok(Err(e))) => {
                    self.metrics.record_source_failure();
                    observability::record_source_error(&source.name);
                    error!(source = %source.name, error = %e, "source failed");
                }
                Ok(Err(e)) => {
                    self.metrics.record_source_failure();
                    error!(source = %source.name, error = ?e, "source task panicked");
                }
                Err(_) => {
                    warn!(source = %source.name, "source did not stop in time, aborting");
                    abort.abort();
                }
            }
        }
    }

    fn signal_stop(&mut self) {
        for source in &mut self.sources {
            if let Some(stop_tx) = source.stop_tx.take() {
                // The source may have already ended
                let _ = stop_tx.send(());
            }
        }
    }

    /// Get data stream receiver
    ///
    /// Note: Can only be called once, subsequent calls return None
    pub fn take_receiver(&mut self) -> Option<Receiver<Measurement>> {
        self.rx.take()
    }

    /// Get metrics reference
    pub fn metrics(&self) -> Arc<IngestionMetrics> {
        self.metrics.clone()
    }

    /// Get registered source count
    pub fn source_count(&self) -> usize {
        self.sources.len()
    }

    /// Check if the named source is running
    pub fn is_source_running(&self, name: &str) -> bool {
        self.sources
            .iter()
            .any(|s| s.name == name && s.is_running())
    }
}

impl Drop for SourceSet {
    fn drop(&mut self) {
        self.signal_stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use contracts::StopSignal;

    /// Emits `count` measurements, then idles until stopped
    struct CountingSource {
        name: String,
        count: u32,
        fail: bool,
    }

    impl MeasurementSource for CountingSource {
        fn name(&self) -> &str {
            &self.name
        }

        async fn run(
            &mut self,
            tx: Sender<Measurement>,
            stop: StopSignal,
        ) -> std::result::Result<(), ContractError> {
            for seq in 0..self.count {
                let m = Measurement {
                    measurement_sequence_number: Some(seq),
                    ..Measurement::new("aa:bb:cc:dd:ee:ff", Utc::now())
                };
                if tx.send(m).await.is_err() {
                    return Ok(());
                }
            }
            if self.fail {
                return Err(ContractError::source_connection(&self.name, "broker gone"));
            }
            let _ = stop.await;
            Ok(())
        }
    }

    fn counting(name: &str, count: u32) -> CountingSource {
        CountingSource {
            name: name.to_string(),
            count,
            fail: false,
        }
    }

    #[test]
    fn test_source_set_creation() {
        let set = SourceSet::new(100);
        assert_eq!(set.source_count(), 0);
    }

    #[test]
    fn test_take_receiver_once() {
        let mut set = SourceSet::new(100);
        assert!(set.take_receiver().is_some());
        assert!(set.take_receiver().is_none());
    }

    #[tokio::test]
    async fn test_sources_share_queue_and_queue_closes_on_stop() {
        let mut set = SourceSet::new(16);
        set.register(counting("a", 3));
        set.register(counting("b", 2));
        let rx = set.take_receiver().unwrap();

        set.start_all().unwrap();
        let mut received = 0;
        while received < 5 {
            rx.recv().await.unwrap();
            received += 1;
        }
        assert!(set.is_source_running("a"));

        set.stop_all().await;
        assert!(rx.recv().await.is_err(), "queue should be closed");
        assert!(!set.is_source_running("a"));
    }

    #[tokio::test]
    async fn test_queue_closes_when_sources_end() {
        let mut set = SourceSet::new(16);
        set.register(CountingSource {
            name: "short".to_string(),
            count: 2,
            fail: true,
        });
        let rx = set.take_receiver().unwrap();
        set.start_all().unwrap();

        assert!(rx.recv().await.is_ok());
        assert!(rx.recv().await.is_ok());
        assert!(rx.recv().await.is_err(), "queue should close without stop_all");
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let mut set = SourceSet::new(4);
        set.register(counting("a", 0));
        set.start_all().unwrap();

        let err = set.start_all().unwrap_err();
        assert!(matches!(err, IngestionError::AlreadyRunning { .. }));
        set.stop_all().await;
    }

    #[tokio::test]
    async fn test_failed_source_is_counted() {
        let mut set = SourceSet::new(4);
        set.register(CountingSource {
            name: "flaky".to_string(),
            count: 1,
            fail: true,
        });
        let rx = set.take_receiver().unwrap();
        set.start_all().unwrap();

        rx.recv().await.unwrap();
        set.join_all().await;

        assert_eq!(set.metrics().snapshot().source_failures, 1);
        assert!(rx.recv().await.is_err());
    }
}
