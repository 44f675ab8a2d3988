//! Stage job queue and worker loop
//!
//! Workflow entrypoints never execute LLM stages inline. They perform the
//! guarded status transition and hand a [`StageJob`] to a [`StageScheduler`];
//! a worker pops jobs and drives them through the engine. Delivery is
//! at-least-once: the engine re-checks the session status before running a
//! stage, so a duplicate or stale job becomes a no-op.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::domain::StepType;
use crate::workflow::WorkflowEngine;

/// Depth of the stage queue before schedule() applies backpressure
const STAGE_QUEUE_DEPTH: usize = 64;

/// A unit of background work: run one stage for one session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageJob {
    pub session_id: String,
    pub stage: StepType,
}

impl StageJob {
    pub fn new(session_id: impl Into<String>, stage: StepType) -> Self {
        Self {
            session_id: session_id.into(),
            stage,
        }
    }
}

/// Returned when the worker side of the queue has shut down
#[derive(Debug, Error)]
#[error("Stage queue closed")]
pub struct QueueClosed;

/// Hands stage jobs to whatever executes them
#[async_trait]
pub trait StageScheduler: Send + Sync {
    /// Enqueue a stage job for background execution
    async fn schedule(&self, job: StageJob) -> Result<(), QueueClosed>;
}

/// Channel-backed scheduler feeding a worker loop
pub struct QueueScheduler {
    tx: mpsc::Sender<StageJob>,
}

/// Create a stage queue, returning the scheduler and the worker's receiver
pub fn stage_channel() -> (QueueScheduler, mpsc::Receiver<StageJob>) {
    let (tx, rx) = mpsc::channel(STAGE_QUEUE_DEPTH);
    (QueueScheduler { tx }, rx)
}

#[async_trait]
impl StageScheduler for QueueScheduler {
    async fn schedule(&self, job: StageJob) -> Result<(), QueueClosed> {
        debug!(session_id = %job.session_id, stage = %job.stage, "schedule: called");
        self.tx.send(job).await.map_err(|_| QueueClosed)
    }
}

/// Worker loop: pop stage jobs and run them through the engine
///
/// Runs until the scheduler side is dropped. A failing stage marks its
/// session failed inside the engine; the worker just logs and moves on.
pub async fn run_worker(mut rx: mpsc::Receiver<StageJob>, engine: Arc<WorkflowEngine>) {
    debug!("run_worker: started");
    while let Some(job) = rx.recv().await {
        debug!(session_id = %job.session_id, stage = %job.stage, "run_worker: picked up job");
        if let Err(e) = engine.run_stage(&job.session_id, job.stage).await {
            if e.is_rejection() {
                debug!(session_id = %job.session_id, stage = %job.stage, error = %e, "run_worker: job rejected");
            } else {
                error!(session_id = %job.session_id, stage = %job.stage, error = %e, "run_worker: stage failed");
            }
        }
    }
    debug!("run_worker: queue closed, exiting");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_schedule_delivers_in_order() {
        let (scheduler, mut rx) = stage_channel();

        scheduler.schedule(StageJob::new("s-1", StepType::Validation)).await.unwrap();
        scheduler.schedule(StageJob::new("s-1", StepType::Planning)).await.unwrap();

        assert_eq!(rx.recv().await.unwrap(), StageJob::new("s-1", StepType::Validation));
        assert_eq!(rx.recv().await.unwrap(), StageJob::new("s-1", StepType::Planning));
    }

    #[tokio::test]
    async fn test_schedule_after_worker_gone() {
        let (scheduler, rx) = stage_channel();
        drop(rx);

        let result = scheduler.schedule(StageJob::new("s-1", StepType::Validation)).await;
        assert!(result.is_err());
    }
}
