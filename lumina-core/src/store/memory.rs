//! In-memory repository implementations used by the integration suites and
//! by development setups without a database.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use lumina_model::{
    BackgroundJob, CacheFolder, Collection, CollectionId, JobStatus, Library,
    RefreshToken, SortDirection, SortField, SystemSetting, User,
};

use crate::error::{CoreError, Result};

use super::{
    CacheFolderRepository, CollectionQuery, CollectionRepository,
    JobRepository, LibraryRepository, RefreshTokenRepository,
    SettingsRepository, UserRepository,
};

#[derive(Debug, Default)]
pub struct MemoryCollectionRepository {
    collections: Mutex<HashMap<CollectionId, Collection>>,
}

impl MemoryCollectionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn matches(query: &CollectionQuery, c: &Collection) -> bool {
        if !query.include_deleted && c.is_deleted {
            return false;
        }
        if let Some(library_id) = query.library_id {
            if c.library_id != Some(library_id) {
                return false;
            }
        }
        if let Some(ctype) = query.collection_type {
            if c.collection_type != ctype {
                return false;
            }
        }
        if let Some(search) = &query.search {
            let needle = search.to_lowercase();
            if !c.name.to_lowercase().contains(&needle)
                && !c.path.to_lowercase().contains(&needle)
            {
                return false;
            }
        }
        true
    }

    fn sort(items: &mut [Collection], sort: Option<(SortField, SortDirection)>) {
        let Some((field, direction)) = sort else {
            return;
        };
        items.sort_by(|a, b| {
            let ord = match field {
                SortField::UpdatedAt => a.updated_at.cmp(&b.updated_at),
                SortField::CreatedAt => a.created_at.cmp(&b.created_at),
                SortField::Name => {
                    a.name.to_lowercase().cmp(&b.name.to_lowercase())
                }
                SortField::ImageCount => {
                    a.images.len().cmp(&b.images.len())
                }
                SortField::TotalSize => {
                    a.statistics.total_size.cmp(&b.statistics.total_size)
                }
            };
            let ord = ord.then_with(|| a.id.cmp(&b.id));
            match direction {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            }
        });
    }
}

#[async_trait]
impl CollectionRepository for MemoryCollectionRepository {
    async fn count(&self, query: &CollectionQuery) -> Result<u64> {
        let collections = self.collections.lock();
        Ok(collections
            .values()
            .filter(|c| Self::matches(query, c))
            .count() as u64)
    }

    async fn find(&self, query: &CollectionQuery) -> Result<Vec<Collection>> {
        let mut items: Vec<Collection> = {
            let collections = self.collections.lock();
            collections
                .values()
                .filter(|c| Self::matches(query, c))
                .cloned()
                .collect()
        };
        Self::sort(&mut items, query.sort);
        let skipped = items.into_iter().skip(query.skip as usize);
        Ok(match query.limit {
            Some(limit) => skipped.take(limit as usize).collect(),
            None => skipped.collect(),
        })
    }

    async fn get(&self, id: CollectionId) -> Result<Option<Collection>> {
        Ok(self.collections.lock().get(&id).cloned())
    }

    async fn upsert(&self, collection: &Collection) -> Result<()> {
        self.collections
            .lock()
            .insert(collection.id, collection.clone());
        Ok(())
    }

    async fn set_deleted(&self, id: CollectionId, deleted: bool) -> Result<()> {
        let mut collections = self.collections.lock();
        let collection = collections.get_mut(&id).ok_or_else(|| {
            CoreError::NotFound(format!("collection {id} does not exist"))
        })?;
        collection.is_deleted = deleted;
        collection.updated_at = Utc::now();
        Ok(())
    }

    async fn batch_after(
        &self,
        after: Option<CollectionId>,
        limit: u64,
        include_deleted: bool,
    ) -> Result<Vec<Collection>> {
        let collections = self.collections.lock();
        let mut batch: Vec<Collection> = collections
            .values()
            .filter(|c| include_deleted || !c.is_deleted)
            .filter(|c| after.is_none_or(|after| c.id > after))
            .cloned()
            .collect();
        batch.sort_by_key(|c| c.id);
        batch.truncate(limit as usize);
        Ok(batch)
    }
}

#[derive(Debug, Default)]
pub struct MemoryJobRepository {
    jobs: Mutex<HashMap<Uuid, BackgroundJob>>,
}

impl MemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl JobRepository for MemoryJobRepository {
    async fn insert(&self, job: &BackgroundJob) -> Result<()> {
        self.jobs.lock().insert(job.id, job.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<BackgroundJob>> {
        Ok(self.jobs.lock().get(&id).cloned())
    }

    async fn list_recent(&self, limit: u64) -> Result<Vec<BackgroundJob>> {
        let jobs = self.jobs.lock();
        let mut items: Vec<BackgroundJob> = jobs.values().cloned().collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        items.truncate(limit as usize);
        Ok(items)
    }

    async fn find_pending(&self, limit: u64) -> Result<Vec<BackgroundJob>> {
        let jobs = self.jobs.lock();
        let mut items: Vec<BackgroundJob> = jobs
            .values()
            .filter(|j| j.status == JobStatus::Pending)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        items.truncate(limit as usize);
        Ok(items)
    }

    async fn try_mark_running(
        &self,
        id: Uuid,
        started_at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut jobs = self.jobs.lock();
        let Some(job) = jobs.get_mut(&id) else {
            return Ok(false);
        };
        if job.status != JobStatus::Pending {
            return Ok(false);
        }
        job.status = JobStatus::Running;
        job.started_at = Some(started_at);
        Ok(true)
    }

    async fn complete(&self, id: Uuid, result_message: &str) -> Result<()> {
        let mut jobs = self.jobs.lock();
        let job = jobs
            .get_mut(&id)
            .ok_or_else(|| CoreError::NotFound(format!("job {id}")))?;
        job.status = JobStatus::Completed;
        job.result_message = Some(result_message.to_string());
        job.completed_at = Some(Utc::now());
        Ok(())
    }

    async fn fail(&self, id: Uuid, error_message: &str) -> Result<()> {
        let mut jobs = self.jobs.lock();
        let job = jobs
            .get_mut(&id)
            .ok_or_else(|| CoreError::NotFound(format!("job {id}")))?;
        job.status = JobStatus::Failed;
        job.error_message = Some(error_message.to_string());
        job.completed_at = Some(Utc::now());
        Ok(())
    }

    async fn cancel(&self, id: Uuid) -> Result<bool> {
        let mut jobs = self.jobs.lock();
        let Some(job) = jobs.get_mut(&id) else {
            return Ok(false);
        };
        if job.status != JobStatus::Pending {
            return Ok(false);
        }
        job.status = JobStatus::Cancelled;
        job.completed_at = Some(Utc::now());
        Ok(true)
    }

    async fn update_progress(
        &self,
        id: Uuid,
        current: u64,
        total: u64,
    ) -> Result<()> {
        let mut jobs = self.jobs.lock();
        let job = jobs
            .get_mut(&id)
            .ok_or_else(|| CoreError::NotFound(format!("job {id}")))?;
        job.progress_current = current;
        job.progress_total = total;
        Ok(())
    }

    async fn count_by_status(&self, status: JobStatus) -> Result<u64> {
        let jobs = self.jobs.lock();
        Ok(jobs.values().filter(|j| j.status == status).count() as u64)
    }
}

#[derive(Debug, Default)]
pub struct MemoryCacheFolderRepository {
    folders: Mutex<HashMap<Uuid, CacheFolder>>,
}

impl MemoryCacheFolderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl CacheFolderRepository for MemoryCacheFolderRepository {
    async fn list_active(&self) -> Result<Vec<CacheFolder>> {
        let folders = self.folders.lock();
        let mut items: Vec<CacheFolder> = folders
            .values()
            .filter(|f| f.is_active)
            .cloned()
            .collect();
        items.sort_by(|a, b| b.priority.cmp(&a.priority));
        Ok(items)
    }

    async fn list_all(&self) -> Result<Vec<CacheFolder>> {
        let folders = self.folders.lock();
        let mut items: Vec<CacheFolder> = folders.values().cloned().collect();
        items.sort_by(|a, b| b.priority.cmp(&a.priority));
        Ok(items)
    }

    async fn upsert(&self, folder: &CacheFolder) -> Result<()> {
        self.folders.lock().insert(folder.id, folder.clone());
        Ok(())
    }

    async fn record_usage(
        &self,
        id: Uuid,
        bytes_delta: i64,
        files_delta: i64,
    ) -> Result<()> {
        let mut folders = self.folders.lock();
        let folder = folders
            .get_mut(&id)
            .ok_or_else(|| CoreError::NotFound(format!("cache folder {id}")))?;
        folder.current_size_bytes =
            folder.current_size_bytes.saturating_add_signed(bytes_delta);
        folder.total_files =
            folder.total_files.saturating_add_signed(files_delta);
        Ok(())
    }

    async fn add_cached_collection(
        &self,
        id: Uuid,
        collection_id: CollectionId,
    ) -> Result<()> {
        let mut folders = self.folders.lock();
        let folder = folders
            .get_mut(&id)
            .ok_or_else(|| CoreError::NotFound(format!("cache folder {id}")))?;
        if !folder.cached_collection_ids.contains(&collection_id) {
            folder.cached_collection_ids.push(collection_id);
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemorySettingsRepository {
    settings: Mutex<HashMap<String, SystemSetting>>,
}

impl MemorySettingsRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl SettingsRepository for MemorySettingsRepository {
    async fn get(&self, key: &str) -> Result<Option<SystemSetting>> {
        Ok(self.settings.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str, category: &str) -> Result<()> {
        let mut settings = self.settings.lock();
        match settings.get_mut(key) {
            Some(setting) => {
                setting.value = value.to_string();
                setting.category = category.to_string();
                setting.updated_at = Utc::now();
            }
            None => {
                settings.insert(
                    key.to_string(),
                    SystemSetting {
                        id: Uuid::new_v4(),
                        setting_key: key.to_string(),
                        value: value.to_string(),
                        category: category.to_string(),
                        updated_at: Utc::now(),
                    },
                );
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryLibraryRepository {
    libraries: Mutex<HashMap<Uuid, Library>>,
}

impl MemoryLibraryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl LibraryRepository for MemoryLibraryRepository {
    async fn get(&self, id: Uuid) -> Result<Option<Library>> {
        Ok(self.libraries.lock().get(&id).cloned())
    }

    async fn list_active(&self) -> Result<Vec<Library>> {
        Ok(self
            .libraries
            .lock()
            .values()
            .filter(|l| l.is_active && !l.is_deleted)
            .cloned()
            .collect())
    }

    async fn upsert(&self, library: &Library) -> Result<()> {
        self.libraries.lock().insert(library.id, library.clone());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryUserRepository {
    users: Mutex<HashMap<Uuid, User>>,
}

impl MemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn get(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.users.lock().get(&id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        Ok(self
            .users
            .lock()
            .values()
            .find(|u| u.username == username && !u.is_deleted)
            .cloned())
    }

    async fn insert(&self, user: &User) -> Result<()> {
        let mut users = self.users.lock();
        if users.values().any(|u| u.username == user.username) {
            return Err(CoreError::Validation(format!(
                "username {} is already taken",
                user.username
            )));
        }
        users.insert(user.id, user.clone());
        Ok(())
    }

    async fn update(&self, user: &User) -> Result<()> {
        self.users.lock().insert(user.id, user.clone());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryRefreshTokenRepository {
    tokens: Mutex<Vec<RefreshToken>>,
}

impl MemoryRefreshTokenRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

#[async_trait]
impl RefreshTokenRepository for MemoryRefreshTokenRepository {
    async fn insert(&self, token: &RefreshToken) -> Result<()> {
        self.tokens.lock().push(token.clone());
        Ok(())
    }

    async fn find_valid(&self, token: &str) -> Result<Option<RefreshToken>> {
        let now = Utc::now();
        Ok(self
            .tokens
            .lock()
            .iter()
            .find(|t| {
                t.token == token && t.revoked_at.is_none() && t.expires_at > now
            })
            .cloned())
    }

    async fn revoke(&self, token: &str) -> Result<()> {
        let mut tokens = self.tokens.lock();
        for t in tokens.iter_mut().filter(|t| t.token == token) {
            t.revoked_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn purge_expired(&self) -> Result<u64> {
        let now = Utc::now();
        let mut tokens = self.tokens.lock();
        let before = tokens.len();
        tokens.retain(|t| t.expires_at > now);
        Ok((before - tokens.len()) as u64)
    }
}
