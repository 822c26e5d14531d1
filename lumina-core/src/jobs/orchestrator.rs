use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use lumina_model::{BackgroundJob, JobKind};

use crate::bus::{MessageBus, MessageEnvelope, MessageKind};
use crate::error::{CoreError, Result};
use crate::store::JobRepository;

use super::handlers::validate_params;

/// Wire payload of a job message; parameters stay on the durable job record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobMessage {
    pub job_id: Uuid,
}

/// Entry point for the API façade: validates, persists, and announces jobs.
pub struct JobOrchestrator {
    jobs: Arc<dyn JobRepository>,
    bus: Arc<dyn MessageBus>,
}

impl std::fmt::Debug for JobOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobOrchestrator").finish_non_exhaustive()
    }
}

impl JobOrchestrator {
    pub fn new(jobs: Arc<dyn JobRepository>, bus: Arc<dyn MessageBus>) -> Self {
        Self { jobs, bus }
    }

    /// Create a Pending job and publish its trigger message.
    ///
    /// The durable record is the source of truth: when the publish is
    /// rejected or the broker is down, the job is still picked up by the
    /// supervisor's pending sweep, so publish failures only cost latency.
    pub async fn enqueue(
        &self,
        kind: JobKind,
        parameters: serde_json::Value,
    ) -> Result<BackgroundJob> {
        validate_params(kind, &parameters)?;

        let job = BackgroundJob::new(kind, parameters);
        self.jobs.insert(&job).await?;

        let envelope = MessageEnvelope::new(
            MessageKind::for_job(kind),
            serde_json::to_value(JobMessage { job_id: job.id })?,
        )
        .with_correlation(job.id);
        if let Err(e) = self.bus.publish(MessageKind::for_job(kind), envelope).await
        {
            warn!(
                "Publish for job {} failed, supervisor will pick it up: {}",
                job.id, e
            );
        }

        info!(
            job_id = %job.id,
            job_type = kind.as_str(),
            "Job enqueued"
        );
        Ok(job)
    }

    /// Cancel a job that has not started yet.
    pub async fn cancel(&self, id: Uuid) -> Result<()> {
        if self.jobs.cancel(id).await? {
            info!(job_id = %id, "Job cancelled");
            Ok(())
        } else {
            match self.jobs.get(id).await? {
                Some(job) => Err(CoreError::Validation(format!(
                    "job {id} is {} and cannot be cancelled",
                    job.status.as_str()
                ))),
                None => Err(CoreError::NotFound(format!("job {id} does not exist"))),
            }
        }
    }

    pub async fn get(&self, id: Uuid) -> Result<BackgroundJob> {
        self.jobs
            .get(id)
            .await?
            .ok_or_else(|| CoreError::NotFound(format!("job {id} does not exist")))
    }

    pub async fn list_recent(&self, limit: u64) -> Result<Vec<BackgroundJob>> {
        self.jobs.list_recent(limit).await
    }
}
