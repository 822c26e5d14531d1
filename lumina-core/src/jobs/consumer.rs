use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use lumina_model::{JobKind, JobStatus};

use crate::bus::{Delivery, MessageBus, MessageKind};
use crate::config::BusConfig;
use crate::store::JobRepository;

use super::executor::JobExecutor;
use super::orchestrator::JobMessage;

/// One consumer loop per job-type queue.
///
/// Delivery is at-least-once: a message is acknowledged once its job reached
/// a terminal state (or was already handled), and rejected to the
/// dead-letter queue when the handler failed or the message is garbage.
pub struct QueueConsumer {
    bus: Arc<dyn MessageBus>,
    jobs: Arc<dyn JobRepository>,
    executor: Arc<JobExecutor>,
    config: BusConfig,
    cancel: CancellationToken,
}

impl std::fmt::Debug for QueueConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueConsumer").finish_non_exhaustive()
    }
}

impl QueueConsumer {
    pub fn new(
        bus: Arc<dyn MessageBus>,
        jobs: Arc<dyn JobRepository>,
        executor: Arc<JobExecutor>,
        config: BusConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            bus,
            jobs,
            executor,
            config,
            cancel,
        }
    }

    /// Spawn one loop per job-kind queue.
    pub fn spawn_all(self: Arc<Self>) -> Vec<JoinHandle<()>> {
        [
            JobKind::ScanCollection,
            JobKind::GenerateThumbnails,
            JobKind::GenerateCache,
            JobKind::CleanupCache,
        ]
        .into_iter()
        .map(|kind| {
            let consumer = self.clone();
            tokio::spawn(async move {
                consumer.run_queue(MessageKind::for_job(kind).route().queue).await
            })
        })
        .collect()
    }

    async fn run_queue(&self, queue: &'static str) {
        info!(queue, "Queue consumer started");
        let block = Duration::from_secs(self.config.consumer_block_secs.max(1));
        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            let delivery = tokio::select! {
                _ = self.cancel.cancelled() => break,
                received = self.bus.receive(queue, block) => received,
            };
            match delivery {
                Ok(Some(delivery)) => self.handle(queue, delivery).await,
                Ok(None) => {}
                Err(e) => {
                    warn!(queue, "Broker receive failed: {}", e);
                    tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        _ = tokio::time::sleep(block) => {}
                    }
                }
            }
        }
        info!(queue, "Queue consumer stopped");
    }

    async fn handle(&self, queue: &str, delivery: Delivery) {
        let message: JobMessage =
            match serde_json::from_value(delivery.envelope.payload.clone()) {
                Ok(message) => message,
                Err(e) => {
                    warn!(queue, "Unparseable job message: {}", e);
                    self.finish(queue, &delivery, Some("unparseable payload"))
                        .await;
                    return;
                }
            };

        let job = match self.jobs.get(message.job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                warn!(queue, job_id = %message.job_id, "Message for unknown job");
                self.finish(queue, &delivery, Some("unknown job")).await;
                return;
            }
            Err(e) => {
                // The store will heal; leave the message unacknowledged so a
                // redelivery retries it.
                warn!(queue, "Job lookup failed, leaving message pending: {}", e);
                return;
            }
        };

        if job.status != JobStatus::Pending {
            debug!(queue, job_id = %job.id, "Job already handled, acknowledging");
            self.finish(queue, &delivery, None).await;
            return;
        }

        match self.executor.execute(job, &self.cancel).await {
            Ok(_) => self.finish(queue, &delivery, None).await,
            Err(e) => {
                self.finish(queue, &delivery, Some(&e.to_string())).await
            }
        }
    }

    /// Ack, or reject with a reason. Broker errors here are logged only;
    /// the redelivered message is handled idempotently.
    async fn finish(&self, queue: &str, delivery: &Delivery, reject: Option<&str>) {
        let result = match reject {
            Some(reason) => self.bus.reject(queue, delivery, reason).await,
            None => self.bus.ack(queue, delivery).await,
        };
        if let Err(e) = result {
            warn!(queue, "Failed to settle delivery: {}", e);
        }
    }
}
