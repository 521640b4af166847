//! MeasurementSource trait - ingestion input interface
//!
//! Sources share a single bounded queue towards the processor. Each source
//! gets its own stop signal.

use async_channel::Sender;
use tokio::sync::oneshot;

use crate::{ContractError, Measurement};

/// Stop signal handed to a running source
pub type StopSignal = oneshot::Receiver<()>;

/// Measurement producer
///
/// `run` produces measurements into `tx` until `stop` fires or the queue is
/// closed, then returns. Dropping `tx` on return is what eventually closes
/// the shared queue once every source has stopped.
#[trait_variant::make(MeasurementSource: Send)]
pub trait LocalMeasurementSource {
    /// Source name (used for logging)
    fn name(&self) -> &str;

    /// Run until stopped
    async fn run(
        &mut self,
        tx: Sender<Measurement>,
        stop: StopSignal,
    ) -> Result<(), ContractError>;
}
