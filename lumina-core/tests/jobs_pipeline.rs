mod support;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use lumina_core::bus::{MemoryBus, MessageBus, MessageKind};
use lumina_core::config::{BusConfig, WorkerConfig};
use lumina_core::jobs::{
    ExecutionOutcome, HandlerRegistry, JobContext, JobExecutor,
    JobOrchestrator, JobSupervisor, QueueConsumer,
};
use lumina_core::store::JobRepository;
use lumina_core::store::{CacheFolderRepository, CollectionRepository};
use lumina_model::{
    BackgroundJob, Collection, JobKind, JobStatus, SortDirection, SortField,
};

use support::{
    app_config, cache_folder, collection, harness, image_entry, t0, Harness,
};

fn context(h: &Harness) -> JobContext {
    JobContext {
        collections: h.collections.clone(),
        jobs: h.jobs.clone(),
        cache_folders: h.cache_folders.clone(),
        index: h.engine.clone(),
        config: app_config(),
    }
}

fn executor(h: &Harness) -> Arc<JobExecutor> {
    Arc::new(JobExecutor::new(
        context(h),
        HandlerRegistry::standard(),
        2,
    ))
}

fn bus_config() -> BusConfig {
    BusConfig {
        message_ttl_secs: 60,
        max_queue_length: 100,
        consumer_block_secs: 1,
    }
}

use support::write_png;

async fn wait_for_status(
    jobs: &dyn JobRepository,
    id: uuid::Uuid,
    status: JobStatus,
) -> BackgroundJob {
    for _ in 0..200 {
        if let Some(job) = jobs.get(id).await.unwrap() {
            if job.status == status {
                return job;
            }
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("job {id} never reached {status:?}");
}

/// Folder-backed collection with five images, one of which is not decodable.
async fn seed_media_collection(h: &Harness, dir: &std::path::Path) -> Collection {
    let mut c = collection(1, "shoot", t0());
    c.path = dir.to_string_lossy().to_string();
    for n in 1..=5u32 {
        let filename = format!("{n:03}.png");
        let path = dir.join(&filename);
        if n == 3 {
            std::fs::write(&path, b"this is not an image").unwrap();
        } else {
            write_png(&path, 64, 48);
        }
        let size = std::fs::metadata(&path).unwrap().len();
        c.images.push(image_entry(&c.path, &filename, size));
    }
    c.statistics.total_items = 5;
    h.collections.upsert(&c).await.unwrap();
    c
}

// Scenario: five images, the third fails to decode; the job completes and
// reports four successes with monotone progress.
#[tokio::test]
async fn thumbnail_job_skips_undecodable_images() {
    let h = harness();
    let media_dir = tempfile::tempdir().unwrap();
    let cache_dir = tempfile::tempdir().unwrap();
    let c = seed_media_collection(&h, media_dir.path()).await;
    h.cache_folders
        .upsert(&cache_folder(cache_dir.path().to_str().unwrap()))
        .await
        .unwrap();

    let job = BackgroundJob::new(
        JobKind::GenerateThumbnails,
        json!({"collectionId": c.id}),
    );
    h.jobs.insert(&job).await.unwrap();

    let outcome = executor(&h)
        .execute(job.clone(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(
        outcome,
        ExecutionOutcome::Completed("Generated 4 thumbnails".into())
    );

    let stored = h.jobs.get(job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Completed);
    assert_eq!(stored.result_message.as_deref(), Some("Generated 4 thumbnails"));
    assert_eq!(stored.progress_current, 5);
    assert_eq!(stored.progress_total, 5);
    let started = stored.started_at.expect("started_at set");
    let completed = stored.completed_at.expect("completed_at set");
    assert!(completed >= started);

    let updated = h.collections.get(c.id).await.unwrap().unwrap();
    assert_eq!(updated.thumbnails.len(), 4);
    assert!(updated
        .thumbnails
        .iter()
        .all(|t| !t.is_direct && t.width <= 300 && t.height <= 300));

    // the index was refreshed with the new counts
    let page = h
        .engine
        .page(1, 10, SortField::UpdatedAt, SortDirection::Desc)
        .await
        .unwrap();
    assert_eq!(page.items[0].thumbnail_count, 4);
}

#[tokio::test]
async fn scan_job_rebuilds_image_entries() {
    let h = harness();
    let media_dir = tempfile::tempdir().unwrap();
    write_png(&media_dir.path().join("a.png"), 32, 32);
    write_png(&media_dir.path().join("b.png"), 32, 32);

    let mut c = collection(2, "fresh", t0());
    c.path = media_dir.path().to_string_lossy().to_string();
    h.collections.upsert(&c).await.unwrap();

    let job = BackgroundJob::new(
        JobKind::ScanCollection,
        json!({"collectionId": c.id}),
    );
    h.jobs.insert(&job).await.unwrap();
    let outcome = executor(&h)
        .execute(job, &CancellationToken::new())
        .await
        .unwrap();
    assert!(matches!(outcome, ExecutionOutcome::Completed(_)));

    let updated = h.collections.get(c.id).await.unwrap().unwrap();
    assert_eq!(updated.images.len(), 2);
    assert_eq!(updated.statistics.total_items, 2);
    assert!(updated.statistics.total_size > 0);
    assert!(updated.updated_at > c.updated_at);

    let page = h
        .engine
        .page(1, 10, SortField::UpdatedAt, SortDirection::Desc)
        .await
        .unwrap();
    assert_eq!(page.items[0].image_count, 2);
}

#[tokio::test]
async fn enqueue_publishes_a_trigger_message() {
    let h = harness();
    let bus = Arc::new(MemoryBus::new(bus_config()));
    let orchestrator = JobOrchestrator::new(h.jobs.clone(), bus.clone());

    let job = orchestrator
        .enqueue(JobKind::CleanupCache, json!({}))
        .await
        .unwrap();
    assert_eq!(job.status, JobStatus::Pending);

    let queue = MessageKind::for_job(JobKind::CleanupCache).route().queue;
    assert_eq!(bus.queue_len(queue).await.unwrap(), 1);
    let delivery = bus
        .receive(queue, Duration::from_millis(100))
        .await
        .unwrap()
        .expect("message");
    assert_eq!(delivery.envelope.payload["jobId"], json!(job.id));
    assert_eq!(delivery.envelope.correlation_id, Some(job.id));
    assert!(delivery.envelope.persistent);
}

#[tokio::test]
async fn enqueue_rejects_malformed_parameters() {
    let h = harness();
    let bus = Arc::new(MemoryBus::new(bus_config()));
    let orchestrator = JobOrchestrator::new(h.jobs.clone(), bus.clone());

    let err = orchestrator
        .enqueue(JobKind::ScanCollection, json!({"collectionId": "bogus"}))
        .await
        .unwrap_err();
    assert!(matches!(err, lumina_core::CoreError::Validation(_)));
    assert_eq!(h.jobs.list_recent(10).await.unwrap().len(), 0);
}

#[tokio::test]
async fn full_queue_still_creates_the_job() {
    let h = harness();
    let bus = Arc::new(MemoryBus::new(BusConfig {
        max_queue_length: 1,
        ..bus_config()
    }));
    let orchestrator = JobOrchestrator::new(h.jobs.clone(), bus.clone());

    let first = orchestrator
        .enqueue(JobKind::CleanupCache, json!({}))
        .await
        .unwrap();
    let second = orchestrator
        .enqueue(JobKind::CleanupCache, json!({}))
        .await
        .unwrap();

    let queue = MessageKind::for_job(JobKind::CleanupCache).route().queue;
    assert_eq!(bus.queue_len(queue).await.unwrap(), 1);
    // both jobs are durable; the supervisor sweep covers the rejected one
    for id in [first.id, second.id] {
        assert_eq!(
            h.jobs.get(id).await.unwrap().unwrap().status,
            JobStatus::Pending
        );
    }
}

#[tokio::test]
async fn consumer_dead_letters_failed_jobs() {
    let h = harness();
    let bus = Arc::new(MemoryBus::new(bus_config()));
    let orchestrator = JobOrchestrator::new(h.jobs.clone(), bus.clone());
    let cancel = CancellationToken::new();

    let consumer = Arc::new(QueueConsumer::new(
        bus.clone(),
        h.jobs.clone(),
        executor(&h),
        bus_config(),
        cancel.clone(),
    ));
    let handles = consumer.spawn_all();

    // scan of a collection that does not exist: handler fails
    let job = orchestrator
        .enqueue(
            JobKind::ScanCollection,
            json!({"collectionId": "ffffffffffffffffffffffff"}),
        )
        .await
        .unwrap();

    let failed = wait_for_status(h.jobs.as_ref(), job.id, JobStatus::Failed).await;
    assert!(failed
        .error_message
        .as_deref()
        .unwrap_or_default()
        .contains("not found"));
    assert!(failed.completed_at.is_some());

    for _ in 0..100 {
        if bus.dead_letter_len().await.unwrap() > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let dead = bus.dead_letters();
    assert_eq!(dead.len(), 1);
    assert!(dead[0].reason.contains("not found"));

    cancel.cancel();
    for handle in handles {
        let _ = handle.await;
    }
}

#[tokio::test]
async fn consumer_completes_jobs_end_to_end() {
    let h = harness();
    let bus = Arc::new(MemoryBus::new(bus_config()));
    let orchestrator = JobOrchestrator::new(h.jobs.clone(), bus.clone());
    let cancel = CancellationToken::new();

    let consumer = Arc::new(QueueConsumer::new(
        bus.clone(),
        h.jobs.clone(),
        executor(&h),
        bus_config(),
        cancel.clone(),
    ));
    let handles = consumer.spawn_all();

    let job = orchestrator
        .enqueue(JobKind::CleanupCache, json!({}))
        .await
        .unwrap();
    let done = wait_for_status(h.jobs.as_ref(), job.id, JobStatus::Completed).await;
    assert!(done.result_message.is_some());
    assert_eq!(bus.dead_letter_len().await.unwrap(), 0);

    cancel.cancel();
    for handle in handles {
        let _ = handle.await;
    }
}

// The supervisor and a consumer may race for the same job; the
// compare-and-set pickup lets exactly one of them run it.
#[tokio::test]
async fn concurrent_pickup_runs_a_job_once() {
    let h = harness();
    let job = BackgroundJob::new(JobKind::CleanupCache, json!({}));
    h.jobs.insert(&job).await.unwrap();

    let left = executor(&h);
    let right = executor(&h);
    let cancel = CancellationToken::new();
    let (a, b) = tokio::join!(
        left.execute(job.clone(), &cancel),
        right.execute(job.clone(), &cancel)
    );
    let outcomes = [a.unwrap(), b.unwrap()];
    let completed = outcomes
        .iter()
        .filter(|o| matches!(o, ExecutionOutcome::Completed(_)))
        .count();
    let skipped = outcomes
        .iter()
        .filter(|o| matches!(o, ExecutionOutcome::Skipped))
        .count();
    assert_eq!((completed, skipped), (1, 1));
}

#[tokio::test]
async fn supervisor_sweeps_pending_jobs() {
    let h = harness();
    let job = BackgroundJob::new(JobKind::CleanupCache, json!({}));
    h.jobs.insert(&job).await.unwrap();

    let cancel = CancellationToken::new();
    let supervisor = JobSupervisor::new(
        h.jobs.clone(),
        executor(&h),
        WorkerConfig {
            max_concurrent: 2,
            poll_interval_secs: 1,
            error_poll_interval_secs: 1,
        },
        cancel.clone(),
    );
    let handle = supervisor.spawn();

    let done = wait_for_status(h.jobs.as_ref(), job.id, JobStatus::Completed).await;
    assert!(done.started_at.is_some());

    cancel.cancel();
    let _ = handle.await;
}

#[tokio::test]
async fn cancel_only_touches_pending_jobs() {
    let h = harness();
    let bus = Arc::new(MemoryBus::new(bus_config()));
    let orchestrator = JobOrchestrator::new(h.jobs.clone(), bus.clone());

    let job = orchestrator
        .enqueue(JobKind::CleanupCache, json!({}))
        .await
        .unwrap();
    orchestrator.cancel(job.id).await.unwrap();
    let cancelled = h.jobs.get(job.id).await.unwrap().unwrap();
    assert_eq!(cancelled.status, JobStatus::Cancelled);
    assert!(cancelled.completed_at.is_some());

    // a second cancel is a validation error, not a silent success
    let err = orchestrator.cancel(job.id).await.unwrap_err();
    assert!(matches!(err, lumina_core::CoreError::Validation(_)));

    // cancelled jobs are not picked up
    let outcome = executor(&h)
        .execute(cancelled, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(outcome, ExecutionOutcome::Skipped);
}
