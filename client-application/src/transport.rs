// Transport strategies
// Push (streaming) and pull (polling) deliver the same event stream to the
// session driver; the strategies are interchangeable per capability.

pub mod poll;

pub use poll::PollTransport;

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use client_domain::{Finding, Job, ScanEvent};

/// What a transport feeds into the session driver.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    Event(ScanEvent),
    /// Pull mode delivers the full findings list exactly once, at job
    /// completion; the session replaces its collection wholesale.
    FindingsSnapshot(Vec<Finding>),
}

#[async_trait]
pub trait ScanTransport: Send + Sync {
    /// Wall-clock budget for reaching a terminal event in this mode.
    fn deadline(&self) -> Duration;

    /// Open the event stream for one job. The returned channel closing
    /// without a terminal event is treated as a transport failure.
    async fn open(&self, job: &Job) -> anyhow::Result<mpsc::Receiver<TransportEvent>>;
}
