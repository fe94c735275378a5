//! # Orchestrator Dispatcher
//!
//! Runs one [`Orchestrator`] inside its own tokio task and feeds it jobs
//! strictly one after another. Every mutation of the master document made
//! through a handle is therefore serialized.
//!
//! ```text
//! HTTP handler / CLI                  Orchestrator task
//!     │                                     │
//!     ├─── Job(event) ───────────────────▶ │
//!     │                                     ├── Splitter / Coordinator / ...
//!     │ ◀──── AgentEvent (progress) ────────┤
//!     │ ◀──── EventOutcome (oneshot) ───────┘
//! ```

use super::events::PipelineEvent;
use super::orchestrator::{EventOutcome, Orchestrator};
use crate::error::{PipelineError, Result};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

const QUEUE_DEPTH: usize = 32;

/// One event waiting for the orchestrator
#[derive(Debug)]
pub struct Job {
    pub event: PipelineEvent,
    /// Channel to send the outcome back
    pub response_tx: oneshot::Sender<Result<EventOutcome>>,
}

/// Cloneable submission side of a running dispatcher
#[derive(Debug, Clone)]
pub struct OrchestratorHandle {
    job_tx: mpsc::Sender<Job>,
}

impl OrchestratorHandle {
    /// Queue an event and wait for its outcome
    pub async fn submit(&self, event: PipelineEvent) -> Result<EventOutcome> {
        let (response_tx, response_rx) = oneshot::channel();
        self.job_tx
            .send(Job { event, response_tx })
            .await
            .map_err(|_| PipelineError::DispatcherClosed)?;
        response_rx
            .await
            .map_err(|_| PipelineError::DispatcherClosed)?
    }
}

/// Spawn the dispatcher task
///
/// The task ends once every handle has been dropped and the queue is drained.
pub fn spawn_orchestrator(mut orchestrator: Orchestrator) -> (OrchestratorHandle, JoinHandle<()>) {
    let (job_tx, mut job_rx) = mpsc::channel::<Job>(QUEUE_DEPTH);

    let task_handle = tokio::spawn(async move {
        while let Some(job) = job_rx.recv().await {
            let kind = job.event.kind();
            tracing::debug!(event = kind, "Dispatching event");
            let result = orchestrator.handle_event(job.event).await;
            if job.response_tx.send(result).is_err() {
                tracing::warn!(event = kind, "Submitter went away before the outcome was ready");
            }
        }
        tracing::info!("Orchestrator dispatcher stopped");
    });

    (OrchestratorHandle { job_tx }, task_handle)
}
