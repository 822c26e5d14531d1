use sqlx::PgPool;
use tracing::info;

use crate::error::Result;

/// Create every table and secondary index the system relies on.
///
/// All statements are `IF NOT EXISTS`, so startup is idempotent against a
/// populated database. Postgres has no row-TTL; expired refresh tokens are
/// purged by [`super::PostgresRefreshTokenRepository::purge_expired`], which
/// runs at startup and from the cache cleanup job.
pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    for statement in SCHEMA_STATEMENTS {
        sqlx::query(statement).execute(pool).await?;
    }
    info!("Schema bootstrap complete ({} statements)", SCHEMA_STATEMENTS.len());
    Ok(())
}

const SCHEMA_STATEMENTS: &[&str] = &[
    // collections
    r#"
    CREATE TABLE IF NOT EXISTS collections (
        id              TEXT PRIMARY KEY,
        library_id      UUID,
        name            TEXT NOT NULL,
        description     TEXT,
        path            TEXT NOT NULL,
        collection_type TEXT NOT NULL,
        is_active       BOOLEAN NOT NULL DEFAULT TRUE,
        is_deleted      BOOLEAN NOT NULL DEFAULT FALSE,
        created_at      TIMESTAMPTZ NOT NULL,
        updated_at      TIMESTAMPTZ NOT NULL,
        image_count     BIGINT NOT NULL DEFAULT 0,
        total_size      BIGINT NOT NULL DEFAULT 0,
        doc             JSONB NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_collections_library
        ON collections (library_id, is_deleted)",
    "CREATE UNIQUE INDEX IF NOT EXISTS uq_collections_path
        ON collections (path) WHERE NOT is_deleted",
    "CREATE INDEX IF NOT EXISTS idx_collections_active
        ON collections (is_active, is_deleted)",
    "CREATE INDEX IF NOT EXISTS idx_collections_type
        ON collections (collection_type, is_deleted)",
    r#"
    CREATE INDEX IF NOT EXISTS idx_collections_text
        ON collections USING GIN ((
            setweight(to_tsvector('simple', coalesce(name, '')), 'A') ||
            setweight(to_tsvector('simple', coalesce(doc->>'tags', '')), 'B') ||
            setweight(to_tsvector('simple', coalesce(doc#>>'{searchIndex,keywords}', '')), 'C') ||
            setweight(to_tsvector('simple', coalesce(description, '')), 'D')
        ))
    "#,
    "CREATE INDEX IF NOT EXISTS idx_collections_created
        ON collections (created_at DESC, is_deleted)",
    "CREATE INDEX IF NOT EXISTS idx_collections_updated
        ON collections (updated_at DESC, is_deleted)",
    "CREATE INDEX IF NOT EXISTS idx_collections_images
        ON collections USING GIN ((doc->'images') jsonb_path_ops)
        WHERE jsonb_array_length(doc->'images') > 0",
    "CREATE INDEX IF NOT EXISTS idx_collections_cache_images
        ON collections USING GIN ((doc->'cacheImages') jsonb_path_ops)
        WHERE jsonb_array_length(doc->'cacheImages') > 0",

    // users
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id            UUID PRIMARY KEY,
        username      TEXT NOT NULL,
        email         TEXT NOT NULL,
        password_hash TEXT NOT NULL,
        role          TEXT NOT NULL,
        is_active     BOOLEAN NOT NULL DEFAULT TRUE,
        is_deleted    BOOLEAN NOT NULL DEFAULT FALSE,
        created_at    TIMESTAMPTZ NOT NULL,
        updated_at    TIMESTAMPTZ NOT NULL
    )
    "#,
    "CREATE UNIQUE INDEX IF NOT EXISTS uq_users_username ON users (username)",
    "CREATE UNIQUE INDEX IF NOT EXISTS uq_users_email ON users (email)",
    "CREATE INDEX IF NOT EXISTS idx_users_active ON users (is_active, is_deleted)",
    "CREATE INDEX IF NOT EXISTS idx_users_role ON users (role, is_active)",

    // libraries
    r#"
    CREATE TABLE IF NOT EXISTS libraries (
        id         UUID PRIMARY KEY,
        owner_id   UUID NOT NULL,
        name       TEXT NOT NULL,
        path       TEXT NOT NULL,
        is_public  BOOLEAN NOT NULL DEFAULT FALSE,
        is_active  BOOLEAN NOT NULL DEFAULT TRUE,
        is_deleted BOOLEAN NOT NULL DEFAULT FALSE,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_libraries_owner
        ON libraries (owner_id, is_deleted)",
    "CREATE UNIQUE INDEX IF NOT EXISTS uq_libraries_path
        ON libraries (path) WHERE NOT is_deleted",
    "CREATE INDEX IF NOT EXISTS idx_libraries_active
        ON libraries (is_active, is_deleted)",
    "CREATE INDEX IF NOT EXISTS idx_libraries_public
        ON libraries (is_public, is_active, is_deleted)",

    // cache_folders
    r#"
    CREATE TABLE IF NOT EXISTS cache_folders (
        id                    UUID PRIMARY KEY,
        name                  TEXT NOT NULL,
        path                  TEXT NOT NULL,
        current_size_bytes    BIGINT NOT NULL DEFAULT 0,
        max_size_bytes        BIGINT NOT NULL DEFAULT 0,
        total_files           BIGINT NOT NULL DEFAULT 0,
        cached_collection_ids TEXT[] NOT NULL DEFAULT '{}',
        is_active             BOOLEAN NOT NULL DEFAULT TRUE,
        priority              INT NOT NULL DEFAULT 0
    )
    "#,
    "CREATE UNIQUE INDEX IF NOT EXISTS uq_cache_folders_path
        ON cache_folders (path)",
    "CREATE INDEX IF NOT EXISTS idx_cache_folders_priority
        ON cache_folders (is_active, priority)",
    "CREATE INDEX IF NOT EXISTS idx_cache_folders_collections
        ON cache_folders USING GIN (cached_collection_ids)
        WHERE cardinality(cached_collection_ids) > 0",

    // scheduled_jobs (consumed by the external scheduler; bootstrapped here
    // because index creation is this adapter's responsibility)
    r#"
    CREATE TABLE IF NOT EXISTS scheduled_jobs (
        id              UUID PRIMARY KEY,
        job_type        TEXT NOT NULL,
        library_id      UUID,
        cron_expression TEXT,
        is_enabled      BOOLEAN NOT NULL DEFAULT TRUE,
        next_run_at     TIMESTAMPTZ,
        external_job_id TEXT,
        created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_scheduled_jobs_type
        ON scheduled_jobs (job_type, is_enabled)",
    "CREATE INDEX IF NOT EXISTS idx_scheduled_jobs_library
        ON scheduled_jobs (library_id, is_enabled) WHERE library_id IS NOT NULL",
    "CREATE INDEX IF NOT EXISTS idx_scheduled_jobs_next_run
        ON scheduled_jobs (next_run_at, is_enabled) WHERE next_run_at IS NOT NULL",
    "CREATE INDEX IF NOT EXISTS idx_scheduled_jobs_external
        ON scheduled_jobs (external_job_id) WHERE external_job_id IS NOT NULL",

    // background_jobs
    r#"
    CREATE TABLE IF NOT EXISTS background_jobs (
        id               UUID PRIMARY KEY,
        job_type         TEXT NOT NULL,
        status           TEXT NOT NULL,
        parameters       JSONB NOT NULL DEFAULT '{}',
        progress_current BIGINT NOT NULL DEFAULT 0,
        progress_total   BIGINT NOT NULL DEFAULT 0,
        result_message   TEXT,
        error_message    TEXT,
        created_at       TIMESTAMPTZ NOT NULL,
        started_at       TIMESTAMPTZ,
        completed_at     TIMESTAMPTZ
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_background_jobs_status
        ON background_jobs (status, job_type)",
    "CREATE INDEX IF NOT EXISTS idx_background_jobs_created
        ON background_jobs (created_at DESC)",
    "CREATE INDEX IF NOT EXISTS idx_background_jobs_started
        ON background_jobs (started_at DESC) WHERE started_at IS NOT NULL",

    // refresh_tokens
    r#"
    CREATE TABLE IF NOT EXISTS refresh_tokens (
        id         UUID PRIMARY KEY,
        user_id    UUID NOT NULL,
        token      TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        expires_at TIMESTAMPTZ NOT NULL,
        revoked_at TIMESTAMPTZ
    )
    "#,
    "CREATE UNIQUE INDEX IF NOT EXISTS uq_refresh_tokens_token
        ON refresh_tokens (token)",
    "CREATE INDEX IF NOT EXISTS idx_refresh_tokens_user
        ON refresh_tokens (user_id, expires_at)",

    // system_settings
    r#"
    CREATE TABLE IF NOT EXISTS system_settings (
        id          UUID PRIMARY KEY,
        setting_key TEXT NOT NULL,
        value       TEXT NOT NULL,
        category    TEXT NOT NULL,
        updated_at  TIMESTAMPTZ NOT NULL
    )
    "#,
    "CREATE UNIQUE INDEX IF NOT EXISTS uq_system_settings_key
        ON system_settings (setting_key)",
    "CREATE INDEX IF NOT EXISTS idx_system_settings_category
        ON system_settings (category)",
];
