use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use lumina_model::BackgroundJob;

use crate::error::{CoreError, Result};
use crate::store::JobRepository;

use super::handlers::HandlerRegistry;
use super::JobContext;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    /// The handler ran and the job is Completed.
    Completed(String),
    /// Someone else picked the job up first, or shutdown arrived before the
    /// job started; nothing was changed.
    Skipped,
}

/// Runs one job end to end: compare-and-set pickup, handler dispatch under a
/// concurrency semaphore, and the terminal status write.
pub struct JobExecutor {
    context: JobContext,
    jobs: Arc<dyn JobRepository>,
    registry: HandlerRegistry,
    semaphore: Arc<Semaphore>,
}

impl std::fmt::Debug for JobExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobExecutor")
            .field("registry", &self.registry)
            .field("permits", &self.semaphore.available_permits())
            .finish()
    }
}

impl JobExecutor {
    pub fn new(
        context: JobContext,
        registry: HandlerRegistry,
        max_concurrent: usize,
    ) -> Self {
        let jobs = context.jobs.clone();
        Self {
            context,
            jobs,
            registry,
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Execute `job`. Errors mean the handler failed (the job is already
    /// marked Failed); callers use that to dead-letter the triggering
    /// message.
    pub async fn execute(
        &self,
        job: BackgroundJob,
        cancel: &CancellationToken,
    ) -> Result<ExecutionOutcome> {
        if cancel.is_cancelled() {
            debug!("Shutdown before start, leaving job {} pending", job.id);
            return Ok(ExecutionOutcome::Skipped);
        }

        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| CoreError::Cancelled("executor shut down".into()))?;

        let Some(handler) = self.registry.get(job.job_type) else {
            let message = format!("no handler for job type {}", job.job_type.as_str());
            self.jobs.fail(job.id, &message).await?;
            return Err(CoreError::Validation(message));
        };

        if !self.jobs.try_mark_running(job.id, Utc::now()).await? {
            debug!("Job {} already picked up elsewhere", job.id);
            return Ok(ExecutionOutcome::Skipped);
        }
        info!(
            job_id = %job.id,
            job_type = job.job_type.as_str(),
            "Job started"
        );

        match handler.run(self.context.clone(), &job, cancel).await {
            Ok(message) => {
                if let Err(e) = self.jobs.complete(job.id, &message).await {
                    warn!("Failed to persist completion of {}: {}", job.id, e);
                }
                info!(job_id = %job.id, "Job completed: {}", message);
                Ok(ExecutionOutcome::Completed(message))
            }
            Err(handler_error) => {
                error!(
                    job_id = %job.id,
                    "Job failed: {}", handler_error
                );
                // A failed persistence of the failure must not mask the
                // handler's own error.
                if let Err(persist_error) = self
                    .jobs
                    .fail(job.id, &handler_error.to_string())
                    .await
                {
                    warn!(
                        "Failed to persist failure of {}: {}",
                        job.id, persist_error
                    );
                }
                Err(handler_error)
            }
        }
    }
}
