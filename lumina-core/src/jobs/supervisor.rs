use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::WorkerConfig;
use crate::store::JobRepository;

use super::executor::JobExecutor;

/// Polling sweep over the Pending job collection.
///
/// The queue consumers normally win the race for fresh jobs; this loop
/// catches jobs whose message was rejected, expired, or lost, and is the
/// only execution path when the broker is down. Outside of the creating API
/// call, the executor reached from here and from the consumers is the sole
/// writer of job lifecycle fields.
pub struct JobSupervisor {
    jobs: Arc<dyn JobRepository>,
    executor: Arc<JobExecutor>,
    config: WorkerConfig,
    cancel: CancellationToken,
}

impl std::fmt::Debug for JobSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobSupervisor")
            .field("config", &self.config)
            .finish()
    }
}

impl JobSupervisor {
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        executor: Arc<JobExecutor>,
        config: WorkerConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            jobs,
            executor,
            config,
            cancel,
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(self) {
        info!("Background job supervisor started");
        let normal = Duration::from_secs(self.config.poll_interval_secs);
        let backoff = Duration::from_secs(self.config.error_poll_interval_secs);
        let mut interval = normal;

        loop {
            match self
                .jobs
                .find_pending(self.config.max_concurrent as u64)
                .await
            {
                Ok(pending) => {
                    interval = normal;
                    for job in pending {
                        let executor = self.executor.clone();
                        let cancel = self.cancel.clone();
                        // Each job runs on its own task; the executor's
                        // semaphore bounds how many make progress at once,
                        // and in-flight jobs may complete after shutdown.
                        tokio::spawn(async move {
                            let _ = executor.execute(job, &cancel).await;
                        });
                    }
                }
                Err(e) => {
                    warn!("Pending job poll failed: {}", e);
                    interval = backoff;
                }
            }

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }
        info!("Background job supervisor stopped");
    }
}
