use tokio_util::sync::CancellationToken;
use tracing::debug;

use lumina_model::{
    ActivityEntry, CacheFolderStats, DashboardStatistics, JobStatus,
    SystemHealth, TopCollection,
};

use crate::error::{CoreError, Result};

use super::{keys, CollectionIndexEngine};

const BATCH_SIZE: u64 = 100;
const TOP_N: usize = 10;

impl CollectionIndexEngine {
    /// Build dashboard aggregates with a streaming pass over the document
    /// store; the full collection set is never resident at once.
    pub async fn build_dashboard(
        &self,
        cancel: &CancellationToken,
    ) -> Result<DashboardStatistics> {
        let mut stats = DashboardStatistics::empty();
        let mut last_id = None;

        loop {
            if cancel.is_cancelled() {
                return Err(CoreError::Cancelled("dashboard statistics".into()));
            }
            let batch = self
                .collections()
                .batch_after(last_id, BATCH_SIZE, false)
                .await?;
            if batch.is_empty() {
                break;
            }
            last_id = batch.last().map(|c| c.id);

            for collection in &batch {
                stats.total_collections += 1;
                stats.total_images += collection.images.len() as u64;
                stats.total_thumbnails += collection.thumbnails.len() as u64;
                stats.total_cache_images +=
                    collection.cache_images.len() as u64;
                stats.total_size_bytes += collection.statistics.total_size;
                *stats
                    .collections_by_type
                    .entry(collection.collection_type.as_str().to_string())
                    .or_insert(0) += 1;

                let top = TopCollection {
                    id: collection.id,
                    name: collection.name.clone(),
                    image_count: collection.images.len() as u64,
                    total_size: collection.statistics.total_size,
                };
                push_top(&mut stats.top_by_image_count, top.clone(), |t| {
                    t.image_count
                });
                push_top(&mut stats.top_by_size, top, |t| t.total_size);
            }
            drop(batch);
        }

        stats.cache_folders = self
            .cache_folders()
            .list_all()
            .await?
            .into_iter()
            .map(|folder| CacheFolderStats {
                id: folder.id,
                name: folder.name,
                current_size_bytes: folder.current_size_bytes,
                max_size_bytes: folder.max_size_bytes,
                total_files: folder.total_files,
                is_active: folder.is_active,
            })
            .collect();

        stats.system_health = SystemHealth {
            kvs_healthy: self.kvs().is_ready().await,
            docstore_healthy: true,
            pending_jobs: self.jobs().count_by_status(JobStatus::Pending).await?,
            running_jobs: self.jobs().count_by_status(JobStatus::Running).await?,
        };
        stats.generated_at = chrono::Utc::now();
        Ok(stats)
    }

    pub async fn store_dashboard(&self, stats: &DashboardStatistics) -> Result<()> {
        self.kvs()
            .set_string(
                keys::DASHBOARD_STATS_KEY,
                &serde_json::to_string(stats)?,
                Some(keys::DASHBOARD_TTL),
            )
            .await
    }

    pub async fn dashboard(&self) -> Result<Option<DashboardStatistics>> {
        let raw = self.kvs().get_string(keys::DASHBOARD_STATS_KEY).await?;
        Ok(raw.and_then(|json| serde_json::from_str(&json).ok()))
    }

    /// True while a stored snapshot is inside its TTL window.
    pub async fn dashboard_is_fresh(&self) -> Result<bool> {
        Ok(self
            .kvs()
            .get_string(keys::DASHBOARD_STATS_KEY)
            .await?
            .is_some())
    }

    /// Prepend one entry to the bounded recent-activity list.
    pub async fn record_activity(&self, entry: ActivityEntry) -> Result<()> {
        let mut entries: Vec<ActivityEntry> = self
            .kvs()
            .get_string(keys::DASHBOARD_META_KEY)
            .await?
            .and_then(|json| serde_json::from_str(&json).ok())
            .unwrap_or_default();
        entries.insert(0, entry);
        entries.truncate(keys::ACTIVITY_CAP);
        self.kvs()
            .set_string(
                keys::DASHBOARD_META_KEY,
                &serde_json::to_string(&entries)?,
                None,
            )
            .await
    }

    pub async fn recent_activity(&self) -> Result<Vec<ActivityEntry>> {
        let raw = self.kvs().get_string(keys::DASHBOARD_META_KEY).await?;
        debug!("Recent activity payload present: {}", raw.is_some());
        Ok(raw
            .and_then(|json| serde_json::from_str(&json).ok())
            .unwrap_or_default())
    }
}

/// Keep `items` holding the N largest entries by `key`, descending.
fn push_top<F>(items: &mut Vec<TopCollection>, candidate: TopCollection, key: F)
where
    F: Fn(&TopCollection) -> u64,
{
    items.push(candidate);
    items.sort_by(|a, b| key(b).cmp(&key(a)));
    items.truncate(TOP_N);
}
