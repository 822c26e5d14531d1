use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use lumina_model::{BackgroundJob, JobKind, JobStatus};

use crate::error::{CoreError, Result};
use crate::store::JobRepository;

#[derive(Clone, Debug)]
pub struct PostgresJobRepository {
    pool: PgPool,
}

impl PostgresJobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    job_type: String,
    status: String,
    parameters: serde_json::Value,
    progress_current: i64,
    progress_total: i64,
    result_message: Option<String>,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl JobRow {
    fn into_job(self) -> Result<BackgroundJob> {
        let job_type = JobKind::parse(&self.job_type).ok_or_else(|| {
            CoreError::Internal(format!("unknown stored job type {}", self.job_type))
        })?;
        let status = JobStatus::parse(&self.status).ok_or_else(|| {
            CoreError::Internal(format!("unknown stored job status {}", self.status))
        })?;
        Ok(BackgroundJob {
            id: self.id,
            job_type,
            parameters: self.parameters,
            status,
            progress_current: self.progress_current.max(0) as u64,
            progress_total: self.progress_total.max(0) as u64,
            result_message: self.result_message,
            error_message: self.error_message,
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
        })
    }
}

const JOB_COLUMNS: &str = "id, job_type, status, parameters, \
     progress_current, progress_total, result_message, error_message, \
     created_at, started_at, completed_at";

#[async_trait]
impl JobRepository for PostgresJobRepository {
    async fn insert(&self, job: &BackgroundJob) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO background_jobs (
                id, job_type, status, parameters,
                progress_current, progress_total, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(job.id)
        .bind(job.job_type.as_str())
        .bind(job.status.as_str())
        .bind(&job.parameters)
        .bind(job.progress_current as i64)
        .bind(job.progress_total as i64)
        .bind(job.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<BackgroundJob>> {
        let row: Option<JobRow> = sqlx::query_as(&format!(
            "SELECT {JOB_COLUMNS} FROM background_jobs WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(JobRow::into_job).transpose()
    }

    async fn list_recent(&self, limit: u64) -> Result<Vec<BackgroundJob>> {
        let rows: Vec<JobRow> = sqlx::query_as(&format!(
            "SELECT {JOB_COLUMNS} FROM background_jobs \
             ORDER BY created_at DESC LIMIT $1"
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(JobRow::into_job).collect()
    }

    async fn find_pending(&self, limit: u64) -> Result<Vec<BackgroundJob>> {
        let rows: Vec<JobRow> = sqlx::query_as(&format!(
            "SELECT {JOB_COLUMNS} FROM background_jobs \
             WHERE status = 'pending' ORDER BY created_at ASC LIMIT $1"
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(JobRow::into_job).collect()
    }

    async fn try_mark_running(
        &self,
        id: Uuid,
        started_at: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE background_jobs \
             SET status = 'running', started_at = $2 \
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .bind(started_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn complete(&self, id: Uuid, result_message: &str) -> Result<()> {
        sqlx::query(
            "UPDATE background_jobs \
             SET status = 'completed', result_message = $2, completed_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(result_message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn fail(&self, id: Uuid, error_message: &str) -> Result<()> {
        sqlx::query(
            "UPDATE background_jobs \
             SET status = 'failed', error_message = $2, completed_at = NOW() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(error_message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn cancel(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE background_jobs \
             SET status = 'cancelled', completed_at = NOW() \
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_progress(
        &self,
        id: Uuid,
        current: u64,
        total: u64,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE background_jobs \
             SET progress_current = $2, progress_total = $3 \
             WHERE id = $1",
        )
        .bind(id)
        .bind(current as i64)
        .bind(total as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn count_by_status(&self, status: JobStatus) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM background_jobs WHERE status = $1",
        )
        .bind(status.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u64)
    }
}
