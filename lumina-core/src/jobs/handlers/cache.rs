use async_trait::async_trait;
use chrono::{Duration, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use lumina_model::{BackgroundJob, CacheImageEmbedded, JobKind};

use crate::error::{CoreError, Result};
use crate::imaging::{EncodeFormat, ImageProcessor};
use crate::jobs::JobContext;

use super::source::{collection_dir, load_entry_bytes, pick_cache_folder};
use super::{parse_params, CacheParams, JobHandler};

/// Viewer-resolution cache images expire after this many days unless touched.
const CACHE_IMAGE_TTL_DAYS: i64 = 30;
const CACHE_QUALITY: u8 = 90;

/// Pre-render full-size viewing copies of each embedded image, mirroring the
/// thumbnail handler's progress and failure pattern.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenerateCacheHandler;

#[async_trait]
impl JobHandler for GenerateCacheHandler {
    fn kind(&self) -> JobKind {
        JobKind::GenerateCache
    }

    async fn run(
        &self,
        ctx: JobContext,
        job: &BackgroundJob,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let params: CacheParams = parse_params(job)?;
        let mut collection = ctx
            .collections
            .get(params.collection_id)
            .await?
            .filter(|c| !c.is_deleted)
            .ok_or_else(|| {
                CoreError::NotFound(format!(
                    "collection {} does not exist",
                    params.collection_id
                ))
            })?;

        if collection.images.is_empty() {
            return Ok("No images to cache".to_string());
        }

        let max_width = params
            .width
            .unwrap_or(ctx.config.thumbnails.cache_width);
        let max_height = params
            .height
            .unwrap_or(ctx.config.thumbnails.cache_height);

        let total = collection.images.len() as u64;
        ctx.jobs.update_progress(job.id, 0, total).await?;

        let folder = pick_cache_folder(ctx.cache_folders.as_ref(), 0).await?;
        let out_dir = collection_dir(&folder, "cache", &collection);
        tokio::fs::create_dir_all(&out_dir).await?;

        let processor = ImageProcessor::new();
        let images = collection.images.clone();

        let mut generated: u64 = 0;
        let mut bytes_written: i64 = 0;
        for (index, image) in images.iter().enumerate() {
            if cancel.is_cancelled() {
                info!(
                    "Cache generation for {} cancelled after {} images",
                    collection.id, generated
                );
                break;
            }

            let produced = match load_entry_bytes(&collection, image).await {
                Ok(bytes) => processor.process(
                    &bytes,
                    max_width,
                    max_height,
                    EncodeFormat::Jpeg,
                    CACHE_QUALITY,
                ),
                Err(e) => Err(e),
            };

            match produced {
                Ok(cached) => {
                    let filename =
                        format!("{}.{}", image.id, cached.format.extension());
                    let path = out_dir.join(&filename);
                    match tokio::fs::write(&path, &cached.data).await {
                        Ok(()) => {
                            let now = Utc::now();
                            let record = CacheImageEmbedded {
                                image_id: image.id,
                                cache_path: path.to_string_lossy().to_string(),
                                width: cached.width,
                                height: cached.height,
                                file_size: cached.data.len() as u64,
                                generated_at: now,
                                expires_at: Some(
                                    now + Duration::days(CACHE_IMAGE_TTL_DAYS),
                                ),
                            };
                            collection
                                .cache_images
                                .retain(|c| c.image_id != image.id);
                            collection.cache_images.push(record);
                            bytes_written += cached.data.len() as i64;
                            generated += 1;
                        }
                        Err(e) => warn!(
                            "Failed to write cache image for {}/{}: {}",
                            collection.id, image.filename, e
                        ),
                    }
                }
                Err(e) => warn!(
                    "Cache image for {}/{} failed: {}",
                    collection.id, image.filename, e
                ),
            }

            ctx.jobs
                .update_progress(job.id, (index + 1) as u64, total)
                .await?;
        }

        if generated > 0 {
            ctx.cache_folders
                .record_usage(folder.id, bytes_written, generated as i64)
                .await?;
            ctx.cache_folders
                .add_cached_collection(folder.id, collection.id)
                .await?;
        }

        collection.updated_at = Utc::now();
        ctx.collections.upsert(&collection).await?;
        ctx.index.add_or_update(&collection).await;

        Ok(format!("Generated {generated} cache images"))
    }
}
