use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use meetscribe_common::types::{WorkQueueJob, WorkQueueJobStatus};

use crate::store::StoreClient;

const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Executes one post-call analysis job. The prompt templates, model
/// selection, and token accounting this dispatches to are external to
/// this crate (spec §1 non-goal) — `StubExecutor` is the default,
/// logging the job kind and marking it complete without doing any work.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    async fn execute(&self, job: &WorkQueueJob) -> Result<(), String>;
}

/// Default executor: acknowledges every job without performing the
/// underlying analysis. A deployment wires a real implementation in by
/// constructing `JobDriver::start_with_executor`.
pub struct StubExecutor;

#[async_trait]
impl JobExecutor for StubExecutor {
    async fn execute(&self, job: &WorkQueueJob) -> Result<(), String> {
        tracing::info!(room_id = %job.room_id, kind = job.kind.as_db_str(), "Stub job executor: no-op completion");
        Ok(())
    }
}

/// Thin AI-jobs poller (C10, spec §4.9 step 6). Claims the
/// highest-priority queued row via `FOR UPDATE SKIP LOCKED` so multiple
/// `ai-jobs`-mode workers compete safely for the same table, dispatches
/// to a pluggable executor, and records the terminal status.
pub struct JobDriver {
    handle: JoinHandle<()>,
}

impl JobDriver {
    pub fn start(store: Arc<StoreClient>, cancel: CancellationToken) -> Self {
        Self::start_with_executor(store, Arc::new(StubExecutor), cancel)
    }

    pub fn start_with_executor(
        store: Arc<StoreClient>,
        executor: Arc<dyn JobExecutor>,
        cancel: CancellationToken,
    ) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(POLL_INTERVAL);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = Self::poll_once(&store, executor.as_ref()).await {
                            tracing::error!(error = %e, "AI-jobs poll cycle failed");
                        }
                    }
                }
            }
        });

        Self { handle }
    }

    async fn poll_once(store: &StoreClient, executor: &dyn JobExecutor) -> Result<(), meetscribe_common::WorkerError> {
        let Some(job) = store.claim_next_work_queue_job().await? else {
            return Ok(());
        };

        let job_id = job.id;
        match executor.execute(&job).await {
            Ok(()) => {
                store
                    .complete_work_queue_job(job_id, WorkQueueJobStatus::Completed, None)
                    .await?;
                metrics::counter!("ai_jobs_completed_total").increment(1);
            }
            Err(reason) => {
                tracing::error!(room_id = %job.room_id, kind = job.kind.as_db_str(), error = %reason, "AI job execution failed");
                store
                    .complete_work_queue_job(job_id, WorkQueueJobStatus::Failed, Some(&reason))
                    .await?;
                metrics::counter!("ai_jobs_failed_total").increment(1);
            }
        }

        Ok(())
    }

    pub async fn join(self) {
        let _ = self.handle.await;
    }
}
