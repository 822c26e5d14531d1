//! Background processing pipeline.
//!
//! Work enters as a durable [`lumina_model::BackgroundJob`] plus a bus
//! message. Queue consumers execute messages as they arrive; a polling
//! supervisor sweeps up pending jobs whose message was lost. Both paths meet
//! in the [`JobExecutor`], where a compare-and-set pickup keeps execution
//! single-winner and a semaphore bounds concurrency.

pub mod consumer;
pub mod executor;
pub mod handlers;
pub mod orchestrator;
pub mod scanner;
pub mod supervisor;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::index::CollectionIndexEngine;
use crate::store::{
    CacheFolderRepository, CollectionRepository, JobRepository,
};

pub use consumer::QueueConsumer;
pub use executor::{ExecutionOutcome, JobExecutor};
pub use handlers::{HandlerRegistry, JobHandler};
pub use orchestrator::JobOrchestrator;
pub use supervisor::JobSupervisor;

/// Service handles a job execution runs against. Cloned fresh for every
/// execution so each job gets its own scope.
#[derive(Clone)]
pub struct JobContext {
    pub collections: Arc<dyn CollectionRepository>,
    pub jobs: Arc<dyn JobRepository>,
    pub cache_folders: Arc<dyn CacheFolderRepository>,
    pub index: Arc<CollectionIndexEngine>,
    pub config: Arc<AppConfig>,
}

impl std::fmt::Debug for JobContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobContext").finish_non_exhaustive()
    }
}
