use std::path::Path;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use lumina_model::{BackgroundJob, CacheFolder, JobKind};

use crate::error::Result;
use crate::jobs::JobContext;

use super::JobHandler;

/// Cache images older than this are removed regardless of their expiry.
const MAX_CACHE_AGE_DAYS: i64 = 30;
const BATCH_SIZE: u64 = 100;

/// Sweep expired and stale cache images off disk and out of the collection
/// documents, then report cache folder statistics.
#[derive(Debug, Clone, Copy, Default)]
pub struct CleanupCacheHandler;

#[async_trait]
impl JobHandler for CleanupCacheHandler {
    fn kind(&self) -> JobKind {
        JobKind::CleanupCache
    }

    async fn run(
        &self,
        ctx: JobContext,
        _job: &BackgroundJob,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let now = Utc::now();
        let age_cutoff = now - Duration::days(MAX_CACHE_AGE_DAYS);
        let folders = ctx.cache_folders.list_all().await?;

        let mut removed_files: u64 = 0;
        let mut removed_bytes: u64 = 0;
        let mut touched_collections: u64 = 0;
        let mut last_id = None;

        loop {
            if cancel.is_cancelled() {
                info!("Cache cleanup cancelled after {} files", removed_files);
                break;
            }
            let batch = ctx
                .collections
                .batch_after(last_id, BATCH_SIZE, false)
                .await?;
            if batch.is_empty() {
                break;
            }
            last_id = batch.last().map(|c| c.id);

            for collection in batch {
                let (keep, drop): (Vec<_>, Vec<_>) = collection
                    .cache_images
                    .iter()
                    .cloned()
                    .partition(|cache| {
                        let expired = cache
                            .expires_at
                            .map(|at| at <= now)
                            .unwrap_or(false);
                        !expired && cache.generated_at >= age_cutoff
                    });
                if drop.is_empty() {
                    continue;
                }

                for cache in &drop {
                    match tokio::fs::remove_file(&cache.cache_path).await {
                        Ok(()) => {}
                        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                            debug!("Cache file {} already gone", cache.cache_path)
                        }
                        Err(e) => warn!(
                            "Failed to remove cache file {}: {}",
                            cache.cache_path, e
                        ),
                    }
                    removed_bytes += cache.file_size;
                    removed_files += 1;

                    if let Some(folder) =
                        folder_for_path(&folders, &cache.cache_path)
                    {
                        if let Err(e) = ctx
                            .cache_folders
                            .record_usage(
                                folder.id,
                                -(cache.file_size as i64),
                                -1,
                            )
                            .await
                        {
                            warn!(
                                "Failed to record usage for folder {}: {}",
                                folder.id, e
                            );
                        }
                    }
                }

                let mut updated = collection;
                updated.cache_images = keep;
                updated.updated_at = now;
                ctx.collections.upsert(&updated).await?;
                ctx.index.add_or_update(&updated).await;
                touched_collections += 1;
            }
        }

        let folders = ctx.cache_folders.list_all().await?;
        let total_files: u64 = folders.iter().map(|f| f.total_files).sum();
        let total_bytes: u64 =
            folders.iter().map(|f| f.current_size_bytes).sum();

        Ok(format!(
            "Removed {removed_files} cache images ({removed_bytes} bytes) \
             across {touched_collections} collections; {} folders now hold \
             {total_files} files ({total_bytes} bytes)",
            folders.len()
        ))
    }
}

fn folder_for_path<'a>(
    folders: &'a [CacheFolder],
    cache_path: &str,
) -> Option<&'a CacheFolder> {
    folders
        .iter()
        .find(|folder| Path::new(cache_path).starts_with(&folder.path))
}
