use async_trait::async_trait;
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use lumina_model::{BackgroundJob, JobKind};

use crate::error::{CoreError, Result};
use crate::jobs::scanner::CollectionScanner;
use crate::jobs::JobContext;

use super::{parse_params, JobHandler, ScanParams};

/// Full rescan of one collection's backing store.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScanCollectionHandler;

#[async_trait]
impl JobHandler for ScanCollectionHandler {
    fn kind(&self) -> JobKind {
        JobKind::ScanCollection
    }

    async fn run(
        &self,
        ctx: JobContext,
        job: &BackgroundJob,
        _cancel: &CancellationToken,
    ) -> Result<String> {
        let params: ScanParams = parse_params(job)?;
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

        let outcome = CollectionScanner::new().scan(&collection)?;

        // Drop derived records whose entries vanished from the store.
        let live: std::collections::HashSet<uuid::Uuid> =
            outcome.images.iter().map(|img| img.id).collect();
        collection
            .thumbnails
            .retain(|thumb| live.contains(&thumb.image_id));
        collection
            .cache_images
            .retain(|cache| live.contains(&cache.image_id));

        collection.statistics.total_items = outcome.images.len() as u64;
        collection.statistics.total_size = outcome.total_size;
        collection.images = outcome.images;
        collection.updated_at = Utc::now();

        ctx.collections.upsert(&collection).await?;
        ctx.index.add_or_update(&collection).await;

        let message = format!(
            "Scanned {} images ({} bytes)",
            collection.images.len(),
            collection.statistics.total_size
        );
        info!("Collection {} rescanned: {}", collection.id, message);
        Ok(message)
    }
}
