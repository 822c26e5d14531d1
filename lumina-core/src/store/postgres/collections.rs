use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};

use lumina_model::{
    Collection, CollectionId, SortDirection, SortField,
};

use crate::error::{CoreError, Result};
use crate::store::{CollectionQuery, CollectionRepository};

#[derive(Clone, Debug)]
pub struct PostgresCollectionRepository {
    pool: PgPool,
}

impl PostgresCollectionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &CollectionQuery) {
        if !query.include_deleted {
            builder.push(" AND NOT is_deleted");
        }
        if let Some(library_id) = query.library_id {
            builder.push(" AND library_id = ");
            builder.push_bind(library_id);
        }
        if let Some(ctype) = query.collection_type {
            builder.push(" AND collection_type = ");
            builder.push_bind(ctype.as_str());
        }
        if let Some(search) = &query.search {
            let pattern = format!("%{}%", escape_like(search));
            builder.push(" AND (name ILIKE ");
            builder.push_bind(pattern.clone());
            builder.push(" OR path ILIKE ");
            builder.push_bind(pattern);
            builder.push(")");
        }
    }

    fn order_clause(sort: Option<(SortField, SortDirection)>) -> String {
        let Some((field, direction)) = sort else {
            return " ORDER BY id".to_string();
        };
        let column = match field {
            SortField::UpdatedAt => "updated_at",
            SortField::CreatedAt => "created_at",
            SortField::Name => "lower(name)",
            SortField::ImageCount => "image_count",
            SortField::TotalSize => "total_size",
        };
        let dir = match direction {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        };
        format!(" ORDER BY {column} {dir}, id {dir}")
    }

    fn decode(doc: serde_json::Value) -> Result<Collection> {
        serde_json::from_value(doc).map_err(|e| {
            CoreError::Internal(format!("malformed collection document: {e}"))
        })
    }
}

fn escape_like(needle: &str) -> String {
    needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

#[async_trait]
impl CollectionRepository for PostgresCollectionRepository {
    async fn count(&self, query: &CollectionQuery) -> Result<u64> {
        let mut builder = QueryBuilder::<Postgres>::new(
            "SELECT COUNT(*) FROM collections WHERE 1=1",
        );
        Self::push_filters(&mut builder, query);
        let count: i64 = builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    async fn find(&self, query: &CollectionQuery) -> Result<Vec<Collection>> {
        let mut builder = QueryBuilder::<Postgres>::new(
            "SELECT doc FROM collections WHERE 1=1",
        );
        Self::push_filters(&mut builder, query);
        builder.push(Self::order_clause(query.sort));
        if let Some(limit) = query.limit {
            builder.push(" LIMIT ");
            builder.push_bind(limit as i64);
        }
        if query.skip > 0 {
            builder.push(" OFFSET ");
            builder.push_bind(query.skip as i64);
        }

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.into_iter()
            .map(|row| Self::decode(row.get::<serde_json::Value, _>("doc")))
            .collect()
    }

    async fn get(&self, id: CollectionId) -> Result<Option<Collection>> {
        let row: Option<(serde_json::Value,)> =
            sqlx::query_as("SELECT doc FROM collections WHERE id = $1")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;
        row.map(|(doc,)| Self::decode(doc)).transpose()
    }

    async fn upsert(&self, collection: &Collection) -> Result<()> {
        let doc = serde_json::to_value(collection)?;
        sqlx::query(
            r#"
            INSERT INTO collections (
                id, library_id, name, description, path, collection_type,
                is_active, is_deleted, created_at, updated_at,
                image_count, total_size, doc
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (id) DO UPDATE SET
                library_id      = EXCLUDED.library_id,
                name            = EXCLUDED.name,
                description     = EXCLUDED.description,
                path            = EXCLUDED.path,
                collection_type = EXCLUDED.collection_type,
                is_active       = EXCLUDED.is_active,
                is_deleted      = EXCLUDED.is_deleted,
                created_at      = EXCLUDED.created_at,
                updated_at      = EXCLUDED.updated_at,
                image_count     = EXCLUDED.image_count,
                total_size      = EXCLUDED.total_size,
                doc             = EXCLUDED.doc
            "#,
        )
        .bind(collection.id.to_string())
        .bind(collection.library_id)
        .bind(&collection.name)
        .bind(&collection.description)
        .bind(&collection.path)
        .bind(collection.collection_type.as_str())
        .bind(collection.is_active)
        .bind(collection.is_deleted)
        .bind(collection.created_at)
        .bind(collection.updated_at)
        .bind(collection.images.len() as i64)
        .bind(collection.statistics.total_size as i64)
        .bind(doc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_deleted(&self, id: CollectionId, deleted: bool) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE collections
            SET is_deleted = $2,
                updated_at = NOW(),
                doc = jsonb_set(
                    jsonb_set(doc, '{isDeleted}', to_jsonb($2::boolean)),
                    '{updatedAt}', to_jsonb(NOW())
                )
            WHERE id = $1
            "#,
        )
        .bind(id.to_string())
        .bind(deleted)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!(
                "collection {id} does not exist"
            )));
        }
        Ok(())
    }

    async fn batch_after(
        &self,
        after: Option<CollectionId>,
        limit: u64,
        include_deleted: bool,
    ) -> Result<Vec<Collection>> {
        let mut builder = QueryBuilder::<Postgres>::new(
            "SELECT doc FROM collections WHERE 1=1",
        );
        if !include_deleted {
            builder.push(" AND NOT is_deleted");
        }
        if let Some(after) = after {
            builder.push(" AND id > ");
            builder.push_bind(after.to_string());
        }
        builder.push(" ORDER BY id LIMIT ");
        builder.push_bind(limit as i64);

        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.into_iter()
            .map(|row| Self::decode(row.get::<serde_json::Value, _>("doc")))
            .collect()
    }
}
