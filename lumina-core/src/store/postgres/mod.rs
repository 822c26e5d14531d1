//! Postgres-backed repositories.
//!
//! Documents are persisted whole as JSONB (`doc` column) next to the
//! extracted columns the secondary indexes need; reads deserialize the
//! document, writes refresh both.

mod catalog;
mod collections;
mod jobs;
mod schema;
mod users;

pub use catalog::{
    PostgresCacheFolderRepository, PostgresLibraryRepository,
    PostgresSettingsRepository,
};
pub use collections::PostgresCollectionRepository;
pub use jobs::PostgresJobRepository;
pub use schema::ensure_schema;
pub use users::{PostgresRefreshTokenRepository, PostgresUserRepository};

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

use crate::config::DatabaseConfig;
use crate::error::Result;

pub async fn connect(config: &DatabaseConfig) -> Result<PgPool> {
    info!("Connecting to Postgres");
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.url)
        .await?;
    Ok(pool)
}
