use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use lumina_model::{CacheFolder, CollectionId, Library, SystemSetting};

use crate::error::{CoreError, Result};
use crate::store::{
    CacheFolderRepository, LibraryRepository, SettingsRepository,
};

#[derive(Clone, Debug)]
pub struct PostgresCacheFolderRepository {
    pool: PgPool,
}

impl PostgresCacheFolderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct CacheFolderRow {
    id: Uuid,
    name: String,
    path: String,
    current_size_bytes: i64,
    max_size_bytes: i64,
    total_files: i64,
    cached_collection_ids: Vec<String>,
    is_active: bool,
    priority: i32,
}

impl CacheFolderRow {
    fn into_folder(self) -> Result<CacheFolder> {
        let cached_collection_ids = self
            .cached_collection_ids
            .iter()
            .map(|s| {
                CollectionId::parse_str(s).map_err(|e| {
                    CoreError::Internal(format!("bad cached collection id: {e}"))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(CacheFolder {
            id: self.id,
            name: self.name,
            path: self.path,
            current_size_bytes: self.current_size_bytes.max(0) as u64,
            max_size_bytes: self.max_size_bytes.max(0) as u64,
            total_files: self.total_files.max(0) as u64,
            cached_collection_ids,
            is_active: self.is_active,
            priority: self.priority,
        })
    }
}

const CACHE_FOLDER_COLUMNS: &str = "id, name, path, current_size_bytes, \
     max_size_bytes, total_files, cached_collection_ids, is_active, priority";

#[async_trait]
impl CacheFolderRepository for PostgresCacheFolderRepository {
    async fn list_active(&self) -> Result<Vec<CacheFolder>> {
        let rows: Vec<CacheFolderRow> = sqlx::query_as(&format!(
            "SELECT {CACHE_FOLDER_COLUMNS} FROM cache_folders \
             WHERE is_active ORDER BY priority DESC"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(CacheFolderRow::into_folder).collect()
    }

    async fn list_all(&self) -> Result<Vec<CacheFolder>> {
        let rows: Vec<CacheFolderRow> = sqlx::query_as(&format!(
            "SELECT {CACHE_FOLDER_COLUMNS} FROM cache_folders \
             ORDER BY priority DESC"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(CacheFolderRow::into_folder).collect()
    }

    async fn upsert(&self, folder: &CacheFolder) -> Result<()> {
        let ids: Vec<String> = folder
            .cached_collection_ids
            .iter()
            .map(|id| id.to_string())
            .collect();
        sqlx::query(
            r#"
            INSERT INTO cache_folders (
                id, name, path, current_size_bytes, max_size_bytes,
                total_files, cached_collection_ids, is_active, priority
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO UPDATE SET
                name                  = EXCLUDED.name,
                path                  = EXCLUDED.path,
                current_size_bytes    = EXCLUDED.current_size_bytes,
                max_size_bytes        = EXCLUDED.max_size_bytes,
                total_files           = EXCLUDED.total_files,
                cached_collection_ids = EXCLUDED.cached_collection_ids,
                is_active             = EXCLUDED.is_active,
                priority              = EXCLUDED.priority
            "#,
        )
        .bind(folder.id)
        .bind(&folder.name)
        .bind(&folder.path)
        .bind(folder.current_size_bytes as i64)
        .bind(folder.max_size_bytes as i64)
        .bind(folder.total_files as i64)
        .bind(&ids)
        .bind(folder.is_active)
        .bind(folder.priority)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_usage(
        &self,
        id: Uuid,
        bytes_delta: i64,
        files_delta: i64,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE cache_folders \
             SET current_size_bytes = GREATEST(current_size_bytes + $2, 0), \
                 total_files = GREATEST(total_files + $3, 0) \
             WHERE id = $1",
        )
        .bind(id)
        .bind(bytes_delta)
        .bind(files_delta)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn add_cached_collection(
        &self,
        id: Uuid,
        collection_id: CollectionId,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE cache_folders \
             SET cached_collection_ids = array_append(cached_collection_ids, $2) \
             WHERE id = $1 AND NOT cached_collection_ids @> ARRAY[$2]",
        )
        .bind(id)
        .bind(collection_id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct PostgresSettingsRepository {
    pool: PgPool,
}

impl PostgresSettingsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct SettingRow {
    id: Uuid,
    setting_key: String,
    value: String,
    category: String,
    updated_at: DateTime<Utc>,
}

#[async_trait]
impl SettingsRepository for PostgresSettingsRepository {
    async fn get(&self, key: &str) -> Result<Option<SystemSetting>> {
        let row: Option<SettingRow> = sqlx::query_as(
            "SELECT id, setting_key, value, category, updated_at \
             FROM system_settings WHERE setting_key = $1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| SystemSetting {
            id: r.id,
            setting_key: r.setting_key,
            value: r.value,
            category: r.category,
            updated_at: r.updated_at,
        }))
    }

    async fn set(&self, key: &str, value: &str, category: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO system_settings (id, setting_key, value, category, updated_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (setting_key) DO UPDATE SET
                value = EXCLUDED.value,
                category = EXCLUDED.category,
                updated_at = NOW()
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(key)
        .bind(value)
        .bind(category)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct PostgresLibraryRepository {
    pool: PgPool,
}

impl PostgresLibraryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct LibraryRow {
    id: Uuid,
    owner_id: Uuid,
    name: String,
    path: String,
    is_public: bool,
    is_active: bool,
    is_deleted: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<LibraryRow> for Library {
    fn from(r: LibraryRow) -> Self {
        Library {
            id: r.id,
            owner_id: r.owner_id,
            name: r.name,
            path: r.path,
            is_public: r.is_public,
            is_active: r.is_active,
            is_deleted: r.is_deleted,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

const LIBRARY_COLUMNS: &str = "id, owner_id, name, path, is_public, \
     is_active, is_deleted, created_at, updated_at";

#[async_trait]
impl LibraryRepository for PostgresLibraryRepository {
    async fn get(&self, id: Uuid) -> Result<Option<Library>> {
        let row: Option<LibraryRow> = sqlx::query_as(&format!(
            "SELECT {LIBRARY_COLUMNS} FROM libraries WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Into::into))
    }

    async fn list_active(&self) -> Result<Vec<Library>> {
        let rows: Vec<LibraryRow> = sqlx::query_as(&format!(
            "SELECT {LIBRARY_COLUMNS} FROM libraries \
             WHERE is_active AND NOT is_deleted ORDER BY name"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn upsert(&self, library: &Library) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO libraries (
                id, owner_id, name, path, is_public,
                is_active, is_deleted, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO UPDATE SET
                owner_id   = EXCLUDED.owner_id,
                name       = EXCLUDED.name,
                path       = EXCLUDED.path,
                is_public  = EXCLUDED.is_public,
                is_active  = EXCLUDED.is_active,
                is_deleted = EXCLUDED.is_deleted,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(library.id)
        .bind(library.owner_id)
        .bind(&library.name)
        .bind(&library.path)
        .bind(library.is_public)
        .bind(library.is_active)
        .bind(library.is_deleted)
        .bind(library.created_at)
        .bind(library.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
