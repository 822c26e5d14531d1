//! Collection index engine.
//!
//! A denormalized layer over the primary collection store: per-sort-field
//! ordered sets for O(log N) positional lookups, JSON summary payloads with
//! inline thumbnails for zero-fetch listings, per-collection state records
//! for change detection, and dashboard aggregates. Everything here is
//! reconstructable from the document store; per-item write failures are
//! logged and healed by the next rebuild or verify pass.

pub mod dashboard;
pub mod keys;
pub mod rebuild;
pub mod score;
pub mod verify;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::RwLock;
use tracing::{debug, warn};

use lumina_model::{
    page::total_pages, Collection, CollectionId, CollectionPage,
    CollectionSummary, CollectionType, NavigationInfo, SiblingsPage,
    SortDirection, SortField, settings,
};
use uuid::Uuid;

use crate::config::ThumbnailConfig;
use crate::error::{CoreError, Result};
use crate::imaging::{to_data_url, EncodeFormat, ImageProcessor, ThumbnailPolicy};
use crate::kvs::{Kvs, KvsBatch};
use crate::store::{
    CacheFolderRepository, CollectionQuery, CollectionRepository,
    JobRepository, SettingsRepository,
};

pub use rebuild::{RebuildMode, RebuildOptions, RebuildStatistics};
pub use verify::VerifyReport;

const SETTINGS_CACHE_TTL: Duration = Duration::from_secs(60);

/// Effective thumbnail encoding parameters: system settings override the
/// configured defaults.
#[derive(Debug, Clone, Copy)]
pub struct ThumbnailSettings {
    pub width: u32,
    pub height: u32,
    pub format: EncodeFormat,
    pub quality: u8,
}

#[derive(Debug, Clone)]
struct CachedSettings {
    fetched_at: Instant,
    settings: ThumbnailSettings,
}

pub struct CollectionIndexEngine {
    kvs: Arc<dyn Kvs>,
    collections: Arc<dyn CollectionRepository>,
    cache_folders: Arc<dyn CacheFolderRepository>,
    jobs: Arc<dyn JobRepository>,
    settings: Arc<dyn SettingsRepository>,
    processor: ImageProcessor,
    policy: ThumbnailPolicy,
    thumbnail_defaults: ThumbnailConfig,
    cached_settings: RwLock<Option<CachedSettings>>,
}

impl std::fmt::Debug for CollectionIndexEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CollectionIndexEngine")
            .field("thumbnail_defaults", &self.thumbnail_defaults)
            .finish()
    }
}

impl CollectionIndexEngine {
    pub fn new(
        kvs: Arc<dyn Kvs>,
        collections: Arc<dyn CollectionRepository>,
        cache_folders: Arc<dyn CacheFolderRepository>,
        jobs: Arc<dyn JobRepository>,
        settings: Arc<dyn SettingsRepository>,
        thumbnail_defaults: ThumbnailConfig,
    ) -> Self {
        Self {
            kvs,
            collections,
            cache_folders,
            jobs,
            settings,
            processor: ImageProcessor::new(),
            policy: ThumbnailPolicy,
            thumbnail_defaults,
            cached_settings: RwLock::new(None),
        }
    }

    // ------------------------------------------------------------------
    // Positional reads
    // ------------------------------------------------------------------

    /// Previous/next neighbours and 1-based position of `id` within a sorted
    /// view. O(log N) against the ordered set.
    pub async fn navigation(
        &self,
        id: CollectionId,
        field: SortField,
        direction: SortDirection,
    ) -> Result<NavigationInfo> {
        let key = keys::sorted_key(field, direction);
        let member = id.to_string();
        let rank = self
            .kvs
            .zrank(&key, &member)
            .await?
            .ok_or_else(|| {
                CoreError::NotFound(format!("collection {id} is not indexed"))
            })?;
        let total = self.kvs.zcard(&key).await?;

        let prev_id = if rank > 0 {
            self.member_at(&key, rank as i64 - 1).await?
        } else {
            None
        };
        let next_id = if rank + 1 < total {
            self.member_at(&key, rank as i64 + 1).await?
        } else {
            None
        };

        Ok(NavigationInfo {
            has_prev: prev_id.is_some(),
            has_next: next_id.is_some(),
            prev_id,
            next_id,
            current_position: rank + 1,
            total,
        })
    }

    /// The page of the sorted view containing `id`'s siblings.
    ///
    /// `page <= 1` substitutes the page that actually contains `id`; larger
    /// values request that explicit page. Sibling order is the ordered-set
    /// traversal order, never re-sorted.
    pub async fn siblings(
        &self,
        id: CollectionId,
        page: u64,
        size: u64,
        field: SortField,
        direction: SortDirection,
    ) -> Result<SiblingsPage> {
        if size == 0 {
            return Err(CoreError::Validation("page size must be positive".into()));
        }
        let key = keys::sorted_key(field, direction);
        let member = id.to_string();
        let rank = self
            .kvs
            .zrank(&key, &member)
            .await?
            .ok_or_else(|| {
                CoreError::NotFound(format!("collection {id} is not indexed"))
            })?;
        let total = self.kvs.zcard(&key).await?;

        let page = if page <= 1 { rank / size + 1 } else { page };
        let start = (page - 1) * size;
        let ids = self
            .kvs
            .zrange(&key, start as i64, (start + size - 1) as i64)
            .await?;
        let siblings = self.summaries_for(&ids).await?;

        Ok(SiblingsPage {
            siblings,
            current_position: rank + 1,
            current_page: page,
            total,
            total_pages: total_pages(total, size),
        })
    }

    pub async fn page(
        &self,
        page: u64,
        size: u64,
        field: SortField,
        direction: SortDirection,
    ) -> Result<CollectionPage> {
        let key = keys::sorted_key(field, direction);
        self.page_of(&key, page, size).await
    }

    pub async fn page_by_library(
        &self,
        library_id: Uuid,
        page: u64,
        size: u64,
        field: SortField,
        direction: SortDirection,
    ) -> Result<CollectionPage> {
        let key = keys::library_key(library_id, field, direction);
        self.page_of(&key, page, size).await
    }

    pub async fn page_by_type(
        &self,
        collection_type: CollectionType,
        page: u64,
        size: u64,
        field: SortField,
        direction: SortDirection,
    ) -> Result<CollectionPage> {
        let key = keys::type_key(collection_type, field, direction);
        self.page_of(&key, page, size).await
    }

    async fn page_of(&self, key: &str, page: u64, size: u64) -> Result<CollectionPage> {
        if size == 0 {
            return Err(CoreError::Validation("page size must be positive".into()));
        }
        let page = page.max(1);
        let total = self.kvs.zcard(key).await?;
        let start = (page - 1) * size;
        let ids = self
            .kvs
            .zrange(key, start as i64, (start + size - 1) as i64)
            .await?;
        let items = self.summaries_for(&ids).await?;
        Ok(CollectionPage {
            items,
            page,
            page_size: size,
            total,
            total_pages: total_pages(total, size),
        })
    }

    /// Case-insensitive substring search over name and path. Matching runs
    /// against the document store; summaries (with their inline thumbnails)
    /// are joined back in from the KVS where present.
    pub async fn search(
        &self,
        q: &str,
        page: u64,
        size: u64,
        field: SortField,
        direction: SortDirection,
    ) -> Result<CollectionPage> {
        if size == 0 {
            return Err(CoreError::Validation("page size must be positive".into()));
        }
        let page = page.max(1);
        let base = CollectionQuery {
            search: Some(q.to_string()),
            ..CollectionQuery::default()
        };
        let total = self.collections.count(&base).await?;
        let matched = self
            .collections
            .find(&CollectionQuery {
                sort: Some((field, direction)),
                skip: (page - 1) * size,
                limit: Some(size),
                ..base
            })
            .await?;

        let data_keys: Vec<String> =
            matched.iter().map(|c| keys::data_key(c.id)).collect();
        let cached = self.kvs.mget_strings(&data_keys).await.unwrap_or_else(|e| {
            warn!("Summary join failed, serving projections: {}", e);
            vec![None; matched.len()]
        });

        let items = matched
            .iter()
            .zip(cached)
            .map(|(collection, raw)| {
                raw.and_then(|json| serde_json::from_str(&json).ok())
                    .unwrap_or_else(|| CollectionSummary::from_collection(collection))
            })
            .collect();

        Ok(CollectionPage {
            items,
            page,
            page_size: size,
            total,
            total_pages: total_pages(total, size),
        })
    }

    async fn member_at(&self, key: &str, rank: i64) -> Result<Option<CollectionId>> {
        let members = self.kvs.zrange(key, rank, rank).await?;
        Ok(members
            .first()
            .and_then(|m| CollectionId::parse_str(m).ok()))
    }

    /// Summaries for an id window, in the id sequence's order. The ordered
    /// set is the authority: results are joined back into `ids` order, and
    /// ids with a missing or unparseable summary are skipped.
    async fn summaries_for(&self, ids: &[String]) -> Result<Vec<CollectionSummary>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let data_keys: Vec<String> = ids
            .iter()
            .map(|id| format!("{}{id}", keys::DATA_PREFIX))
            .collect();
        let raw = self.kvs.mget_strings(&data_keys).await?;

        let mut summaries = Vec::with_capacity(ids.len());
        for (id, payload) in ids.iter().zip(raw) {
            match payload {
                Some(json) => match serde_json::from_str(&json) {
                    Ok(summary) => summaries.push(summary),
                    Err(e) => {
                        warn!("Discarding malformed summary for {}: {}", id, e)
                    }
                },
                None => debug!("No summary payload for indexed id {}", id),
            }
        }
        Ok(summaries)
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Upsert a collection into every index it belongs to. KVS failures are
    /// logged and swallowed; derived state heals on the next rebuild/verify.
    pub async fn add_or_update(&self, collection: &Collection) {
        if let Err(e) = self.write_collection(collection, false).await {
            warn!(
                "Index write for collection {} failed (will heal on next rebuild): {}",
                collection.id, e
            );
        }
    }

    /// Remove a collection from every index. KVS failures are logged and
    /// swallowed, mirroring [`Self::add_or_update`].
    pub async fn remove(&self, id: CollectionId) {
        if let Err(e) = self.remove_entries(id).await {
            warn!(
                "Index removal for collection {} failed (verify will catch residue): {}",
                id, e
            );
        }
    }

    pub(crate) async fn write_collection(
        &self,
        collection: &Collection,
        skip_thumbnails: bool,
    ) -> Result<()> {
        let (summary, thumb_blob) =
            self.build_summary(collection, skip_thumbnails).await;
        let state =
            lumina_model::CollectionIndexState::for_collection(collection);
        let member = collection.id.to_string();

        let mut batch = KvsBatch::new();
        for field in SortField::ALL {
            for direction in SortDirection::ALL {
                let score = score::collection_score(collection, field, direction);
                batch.zadd(keys::sorted_key(field, direction), &member, score);
                if let Some(library_id) = collection.library_id {
                    batch.zadd(
                        keys::library_key(library_id, field, direction),
                        &member,
                        score,
                    );
                }
                batch.zadd(
                    keys::type_key(collection.collection_type, field, direction),
                    &member,
                    score,
                );
            }
        }
        batch.set_string(
            keys::data_key(collection.id),
            serde_json::to_string(&summary)?,
            None,
        );
        batch.set_string(
            keys::state_key(collection.id),
            serde_json::to_string(&state)?,
            None,
        );
        if let Some(blob) = thumb_blob {
            batch.set_bytes(
                keys::thumb_key(collection.id),
                blob,
                Some(keys::THUMB_TTL),
            );
        }
        self.kvs.apply_batch(batch).await
    }

    pub(crate) async fn remove_entries(&self, id: CollectionId) -> Result<()> {
        // The cached summary tells us which secondary indexes the id lives
        // in; when it is already gone only the primary sets are cleaned and
        // verify catches any residue.
        let summary = self.read_summary(id).await?;
        let member = id.to_string();

        let mut batch = KvsBatch::new();
        for field in SortField::ALL {
            for direction in SortDirection::ALL {
                batch.zrem(keys::sorted_key(field, direction), &member);
                if let Some(summary) = &summary {
                    if let Some(library_id) = summary.library_id {
                        batch.zrem(
                            keys::library_key(library_id, field, direction),
                            &member,
                        );
                    }
                    batch.zrem(
                        keys::type_key(summary.collection_type, field, direction),
                        &member,
                    );
                }
            }
        }
        batch.delete(keys::data_key(id));
        batch.delete(keys::state_key(id));
        // thumb:{id} is intentionally left to its TTL.
        self.kvs.apply_batch(batch).await
    }

    pub(crate) async fn read_summary(
        &self,
        id: CollectionId,
    ) -> Result<Option<CollectionSummary>> {
        let raw = self.kvs.get_string(&keys::data_key(id)).await?;
        Ok(raw.and_then(|json| serde_json::from_str(&json).ok()))
    }

    pub(crate) async fn read_state(
        &self,
        id: CollectionId,
    ) -> Result<Option<lumina_model::CollectionIndexState>> {
        let raw = self.kvs.get_string(&keys::state_key(id)).await?;
        Ok(raw.and_then(|json| serde_json::from_str(&json).ok()))
    }

    // ------------------------------------------------------------------
    // Summary construction and thumbnail inlining
    // ------------------------------------------------------------------

    async fn build_summary(
        &self,
        collection: &Collection,
        skip_thumbnails: bool,
    ) -> (CollectionSummary, Option<Vec<u8>>) {
        let mut summary = CollectionSummary::from_collection(collection);
        if skip_thumbnails {
            return (summary, None);
        }
        match self.inline_thumbnail(collection).await {
            Some((data_url, blob)) => {
                summary.thumbnail_base64 = Some(data_url);
                (summary, Some(blob))
            }
            None => (summary, None),
        }
    }

    /// Inline payload for the collection's first thumbnail, re-encoded at
    /// most once per summary write when the policy demands it.
    async fn inline_thumbnail(
        &self,
        collection: &Collection,
    ) -> Option<(String, Vec<u8>)> {
        let thumbnail = collection.first_thumbnail()?;
        let path = thumbnail.thumbnail_path.as_deref()?;
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(
                    "Thumbnail file {} for collection {} unreadable: {}",
                    path, collection.id, e
                );
                return None;
            }
        };

        if self.policy.needs_reencode_for(thumbnail) {
            let settings = self.thumbnail_settings().await;
            match self.processor.process(
                &bytes,
                settings.width,
                settings.height,
                settings.format,
                settings.quality,
            ) {
                Ok(processed) => {
                    let url = to_data_url(
                        processed.format.extension(),
                        &processed.data,
                    );
                    Some((url, processed.data))
                }
                Err(e) => {
                    warn!(
                        "Thumbnail re-encode for collection {} failed: {}",
                        collection.id, e
                    );
                    None
                }
            }
        } else {
            let url = to_data_url(&thumbnail.format, &bytes);
            Some((url, bytes))
        }
    }

    /// Effective thumbnail parameters, read from system settings with a
    /// short-lived cache and config defaults for anything unset.
    pub async fn thumbnail_settings(&self) -> ThumbnailSettings {
        if let Some(cached) = self.cached_settings.read().await.as_ref() {
            if cached.fetched_at.elapsed() < SETTINGS_CACHE_TTL {
                return cached.settings;
            }
        }

        let defaults = &self.thumbnail_defaults;
        let mut resolved = ThumbnailSettings {
            width: defaults.width,
            height: defaults.height,
            format: EncodeFormat::parse(&defaults.format)
                .unwrap_or(EncodeFormat::Jpeg),
            quality: defaults.quality,
        };

        match self.settings.get(settings::keys::THUMBNAIL_SIZE).await {
            Ok(Some(setting)) => {
                if let Ok(size) = setting.value.parse::<u32>() {
                    resolved.width = size;
                    resolved.height = size;
                }
            }
            Ok(None) => {}
            Err(e) => debug!("Thumbnail size setting unavailable: {}", e),
        }
        if let Ok(Some(setting)) =
            self.settings.get(settings::keys::THUMBNAIL_FORMAT).await
        {
            if let Some(format) = EncodeFormat::parse(&setting.value) {
                resolved.format = format;
            }
        }
        if let Ok(Some(setting)) =
            self.settings.get(settings::keys::THUMBNAIL_QUALITY).await
        {
            if let Ok(quality) = setting.value.parse::<u8>() {
                resolved.quality = quality.clamp(1, 100);
            }
        }

        *self.cached_settings.write().await = Some(CachedSettings {
            fetched_at: Instant::now(),
            settings: resolved,
        });
        resolved
    }

    // ------------------------------------------------------------------
    // Thumbnail blob cache
    // ------------------------------------------------------------------

    pub async fn cached_thumbnail(&self, id: CollectionId) -> Result<Option<Vec<u8>>> {
        self.kvs.get_bytes(&keys::thumb_key(id)).await
    }

    pub async fn cache_thumbnail(&self, id: CollectionId, bytes: &[u8]) -> Result<()> {
        self.kvs
            .set_bytes(&keys::thumb_key(id), bytes, Some(keys::THUMB_TTL))
            .await
    }

    /// Write-wins batch cache of thumbnail blobs.
    pub async fn cache_thumbnails_batch(
        &self,
        thumbnails: Vec<(CollectionId, Vec<u8>)>,
    ) -> Result<()> {
        if thumbnails.is_empty() {
            return Ok(());
        }
        let mut batch = KvsBatch::new();
        for (id, bytes) in thumbnails {
            batch.set_bytes(keys::thumb_key(id), bytes, Some(keys::THUMB_TTL));
        }
        self.kvs.apply_batch(batch).await
    }

    pub(crate) fn kvs(&self) -> &Arc<dyn Kvs> {
        &self.kvs
    }

    pub(crate) fn collections(&self) -> &Arc<dyn CollectionRepository> {
        &self.collections
    }

    pub(crate) fn cache_folders(&self) -> &Arc<dyn CacheFolderRepository> {
        &self.cache_folders
    }

    pub(crate) fn jobs(&self) -> &Arc<dyn JobRepository> {
        &self.jobs
    }
}
