//! Primary document store: repository ports and their Postgres and
//! in-memory implementations.
//!
//! Collections are exclusively owned by this store; everything the index
//! engine keeps in the KVS is a projection that can be rebuilt from here.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use lumina_model::{
    BackgroundJob, CacheFolder, Collection, CollectionId, CollectionType,
    JobStatus, Library, RefreshToken, SortDirection, SortField, SystemSetting,
    User,
};

use crate::error::Result;

/// Filters for collection listings and counting.
#[derive(Debug, Clone, Default)]
pub struct CollectionQuery {
    pub include_deleted: bool,
    pub library_id: Option<Uuid>,
    pub collection_type: Option<CollectionType>,
    /// Case-insensitive substring match against `name` or `path`.
    pub search: Option<String>,
    pub sort: Option<(SortField, SortDirection)>,
    pub skip: u64,
    pub limit: Option<u64>,
}

impl CollectionQuery {
    pub fn active() -> Self {
        Self::default()
    }

    pub fn searching(q: impl Into<String>) -> Self {
        Self {
            search: Some(q.into()),
            ..Self::default()
        }
    }
}

#[async_trait]
pub trait CollectionRepository: Send + Sync {
    async fn count(&self, query: &CollectionQuery) -> Result<u64>;
    async fn find(&self, query: &CollectionQuery) -> Result<Vec<Collection>>;
    async fn get(&self, id: CollectionId) -> Result<Option<Collection>>;
    async fn upsert(&self, collection: &Collection) -> Result<()>;
    async fn set_deleted(&self, id: CollectionId, deleted: bool) -> Result<()>;
    /// Id-ordered keyset batch: collections with id strictly greater than
    /// `after`, ascending, at most `limit`. The rebuild and verify loops
    /// stream the whole store through this without ever loading it at once.
    async fn batch_after(
        &self,
        after: Option<CollectionId>,
        limit: u64,
        include_deleted: bool,
    ) -> Result<Vec<Collection>>;
}

#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn insert(&self, job: &BackgroundJob) -> Result<()>;
    async fn get(&self, id: Uuid) -> Result<Option<BackgroundJob>>;
    async fn list_recent(&self, limit: u64) -> Result<Vec<BackgroundJob>>;
    async fn find_pending(&self, limit: u64) -> Result<Vec<BackgroundJob>>;
    /// Compare-and-set Pending → Running. Returns false when the job was
    /// already taken; the supervisor and the queue consumer race for pickup
    /// and exactly one of them wins.
    async fn try_mark_running(
        &self,
        id: Uuid,
        started_at: DateTime<Utc>,
    ) -> Result<bool>;
    async fn complete(&self, id: Uuid, result_message: &str) -> Result<()>;
    async fn fail(&self, id: Uuid, error_message: &str) -> Result<()>;
    async fn cancel(&self, id: Uuid) -> Result<bool>;
    async fn update_progress(&self, id: Uuid, current: u64, total: u64) -> Result<()>;
    async fn count_by_status(&self, status: JobStatus) -> Result<u64>;
}

#[async_trait]
pub trait CacheFolderRepository: Send + Sync {
    /// Active folders, highest priority first.
    async fn list_active(&self) -> Result<Vec<CacheFolder>>;
    async fn list_all(&self) -> Result<Vec<CacheFolder>>;
    async fn upsert(&self, folder: &CacheFolder) -> Result<()>;
    async fn record_usage(
        &self,
        id: Uuid,
        bytes_delta: i64,
        files_delta: i64,
    ) -> Result<()>;
    async fn add_cached_collection(
        &self,
        id: Uuid,
        collection_id: CollectionId,
    ) -> Result<()>;
}

#[async_trait]
pub trait SettingsRepository: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<SystemSetting>>;
    async fn set(&self, key: &str, value: &str, category: &str) -> Result<()>;
}

#[async_trait]
pub trait LibraryRepository: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<Library>>;
    async fn list_active(&self) -> Result<Vec<Library>>;
    async fn upsert(&self, library: &Library) -> Result<()>;
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<User>>;
    async fn find_by_username(&self, username: &str) -> Result<Option<User>>;
    async fn insert(&self, user: &User) -> Result<()>;
    async fn update(&self, user: &User) -> Result<()>;
}

#[async_trait]
pub trait RefreshTokenRepository: Send + Sync {
    async fn insert(&self, token: &RefreshToken) -> Result<()>;
    /// Token by value, only if unexpired and unrevoked.
    async fn find_valid(&self, token: &str) -> Result<Option<RefreshToken>>;
    async fn revoke(&self, token: &str) -> Result<()>;
    async fn purge_expired(&self) -> Result<u64>;
}
