use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use lumina_model::{BackgroundJob, JobKind, ThumbnailEmbedded};

use crate::archive::is_apple_double;
use crate::error::{CoreError, Result};
use crate::imaging::ImageProcessor;
use crate::jobs::JobContext;

use super::source::{collection_dir, load_entry_bytes, pick_cache_folder};
use super::{parse_params, JobHandler, ThumbnailParams};

/// Generate a thumbnail per embedded image, updating job progress after each
/// one. Per-image failures are logged and skipped; the job completes with
/// the success count.
#[derive(Debug, Clone, Copy, Default)]
pub struct GenerateThumbnailsHandler;

#[async_trait]
impl JobHandler for GenerateThumbnailsHandler {
    fn kind(&self) -> JobKind {
        JobKind::GenerateThumbnails
    }

    async fn run(
        &self,
        ctx: JobContext,
        job: &BackgroundJob,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let params: ThumbnailParams = parse_params(job)?;
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
            return Ok("No images to thumbnail".to_string());
        }

        let total = collection.images.len() as u64;
        ctx.jobs.update_progress(job.id, 0, total).await?;

        let folder = pick_cache_folder(ctx.cache_folders.as_ref(), 0).await?;
        let out_dir = collection_dir(&folder, "thumbnails", &collection);
        tokio::fs::create_dir_all(&out_dir).await?;

        let settings = ctx.index.thumbnail_settings().await;
        let processor = ImageProcessor::new();
        let images = collection.images.clone();

        let mut generated: u64 = 0;
        let mut bytes_written: i64 = 0;
        for (index, image) in images.iter().enumerate() {
            if cancel.is_cancelled() {
                info!(
                    "Thumbnail generation for {} cancelled after {} images",
                    collection.id, generated
                );
                break;
            }

            let produced = match load_entry_bytes(&collection, image).await {
                Ok(bytes) => processor.process(
                    &bytes,
                    params.width,
                    params.height,
                    settings.format,
                    settings.quality,
                ),
                Err(e) => Err(e),
            };

            match produced {
                Ok(thumb) => {
                    let filename =
                        format!("{}.{}", image.id, thumb.format.extension());
                    let path = out_dir.join(&filename);
                    match tokio::fs::write(&path, &thumb.data).await {
                        Ok(()) => {
                            let record = ThumbnailEmbedded {
                                image_id: image.id,
                                thumbnail_path: Some(
                                    path.to_string_lossy().to_string(),
                                ),
                                width: thumb.width,
                                height: thumb.height,
                                file_size: thumb.data.len() as u64,
                                format: thumb.format.extension().to_string(),
                                is_direct: false,
                                generated_at: Utc::now(),
                            };
                            collection
                                .thumbnails
                                .retain(|t| t.image_id != image.id);
                            collection.thumbnails.push(record);
                            bytes_written += thumb.data.len() as i64;
                            generated += 1;
                        }
                        Err(e) => warn!(
                            "Failed to write thumbnail for {}/{}: {}",
                            collection.id, image.filename, e
                        ),
                    }
                }
                Err(e) => {
                    if is_apple_double(&image.relative_path) {
                        debug!(
                            "Skipping AppleDouble entry {}: {}",
                            image.relative_path, e
                        );
                    } else {
                        warn!(
                            "Thumbnail for {}/{} failed: {}",
                            collection.id, image.filename, e
                        );
                    }
                }
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

        Ok(format!("Generated {generated} thumbnails"))
    }
}
