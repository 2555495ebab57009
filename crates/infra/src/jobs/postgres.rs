//! Postgres-backed job store.
//!
//! Claim exclusivity comes from a single `UPDATE … FROM (SELECT … FOR UPDATE SKIP
//! LOCKED)` statement: concurrent claimers skip rows another transaction has
//! locked, so a row is handed to at most one worker. Every later write is
//! conditional on `(status = 'processing', claim_token)`.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use courseforge_core::{CourseId, GenerationInputId, JobId, OutlineLessonId, TenantId, UserId};

use super::store::{worker_lost_message, JobFilter, JobStats, JobStore, JobStoreError};
use super::types::{FailureKind, GenerationJob, JobStatus};

/// Postgres job store.
#[derive(Debug, Clone)]
pub struct PostgresJobStore {
    pool: Arc<PgPool>,
}

impl PostgresJobStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch(&self, tenant_id: TenantId, job_id: JobId) -> Result<Option<GenerationJob>, JobStoreError> {
        let row = sqlx::query("SELECT * FROM generation_jobs WHERE id = $1 AND tenant_id = $2")
            .bind(*job_id.as_uuid())
            .bind(*tenant_id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("get_job", e))?;

        row.map(|r| JobRow::decode(&r).map(GenerationJob::from))
            .transpose()
            .map_err(|e| map_sqlx_error("get_job", e))
    }
}

#[async_trait]
impl JobStore for PostgresJobStore {
    #[instrument(
        skip(self, job),
        fields(tenant_id = %job.tenant_id, job_id = %job.id, job_type = %job.job_type),
        err
    )]
    async fn create(&self, job: GenerationJob) -> Result<JobId, JobStoreError> {
        job.validate()?;

        sqlx::query(
            r#"
            INSERT INTO generation_jobs (
                id, tenant_id, requested_by, job_type, course_id, outline_lesson_id,
                generation_input_id, status, stage, progress, progress_message, tokens_used,
                max_retries, retry_count, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NULL, $9, $10, $11, $12, $13, $14, $14)
            "#,
        )
        .bind(*job.id.as_uuid())
        .bind(*job.tenant_id.as_uuid())
        .bind(*job.requested_by.as_uuid())
        .bind(job.job_type.as_str())
        .bind(job.course_id.map(|c| *c.as_uuid()))
        .bind(job.outline_lesson_id.map(|l| *l.as_uuid()))
        .bind(job.generation_input_id.map(|i| *i.as_uuid()))
        .bind(job.status.as_str())
        .bind(i16::from(job.progress))
        .bind(job.progress_message.as_deref())
        .bind(to_i64(job.tokens_used))
        .bind(to_i32(job.max_retries))
        .bind(to_i32(job.retry_count))
        .bind(job.created_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                JobStoreError::AlreadyExists(job.id)
            } else {
                map_sqlx_error("create_job", e)
            }
        })?;

        Ok(job.id)
    }

    #[instrument(skip(self), fields(worker = %worker_id), err)]
    async fn claim_next(
        &self,
        worker_id: &str,
        stale_before: DateTime<Utc>,
        tenant_id: Option<TenantId>,
    ) -> Result<Option<GenerationJob>, JobStoreError> {
        let now = Utc::now();

        // SET expressions see the pre-update row, so `j.status = 'processing'`
        // identifies a stale reclaim.
        let row = sqlx::query(
            r#"
            UPDATE generation_jobs AS j
            SET status = 'processing',
                stage = NULL,
                retry_count = CASE WHEN j.status = 'processing' THEN j.retry_count + 1 ELSE j.retry_count END,
                started_at = COALESCE(j.started_at, $1),
                heartbeat_at = $1,
                updated_at = $1,
                claimed_by = $2,
                claim_token = $3,
                progress_message = 'Claimed by ' || $2
            FROM (
                SELECT id
                FROM generation_jobs
                WHERE (
                        status = 'queued'
                        OR (status = 'processing'
                            AND COALESCE(heartbeat_at, started_at) < $4
                            AND retry_count < max_retries)
                      )
                  AND ($5::uuid IS NULL OR tenant_id = $5)
                ORDER BY created_at, id
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            ) AS next
            WHERE j.id = next.id
            RETURNING j.*
            "#,
        )
        .bind(now)
        .bind(worker_id)
        .bind(Uuid::new_v4())
        .bind(stale_before)
        .bind(tenant_id.map(|t| *t.as_uuid()))
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("claim_next", e))?;

        row.map(|r| JobRow::decode(&r).map(GenerationJob::from))
            .transpose()
            .map_err(|e| map_sqlx_error("claim_next", e))
    }

    #[instrument(
        skip(self, job),
        fields(tenant_id = %job.tenant_id, job_id = %job.id, status = %job.status, progress = job.progress),
        err
    )]
    async fn update(&self, job: &GenerationJob) -> Result<(), JobStoreError> {
        let Some(token) = job.claim_token else {
            return Err(JobStoreError::ClaimLost(job.id));
        };

        let result = sqlx::query(
            r#"
            UPDATE generation_jobs
            SET status = $4,
                stage = $5,
                progress = $6,
                progress_message = $7,
                tokens_used = $8,
                error = $9,
                failure_kind = $10,
                completed_at = $11,
                heartbeat_at = $12,
                updated_at = $13
            WHERE id = $1
              AND tenant_id = $2
              AND status = 'processing'
              AND claim_token = $3
            "#,
        )
        .bind(*job.id.as_uuid())
        .bind(*job.tenant_id.as_uuid())
        .bind(token)
        .bind(job.status.as_str())
        .bind(job.stage.map(|s| s.as_str()))
        .bind(i16::from(job.progress))
        .bind(job.progress_message.as_deref())
        .bind(to_i64(job.tokens_used))
        .bind(job.error.as_deref())
        .bind(job.failure_kind.map(|k| k.as_str()))
        .bind(job.completed_at)
        .bind(job.heartbeat_at)
        .bind(job.updated_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("update_job", e))?;

        if result.rows_affected() == 0 {
            return match self.fetch(job.tenant_id, job.id).await? {
                Some(_) => Err(JobStoreError::ClaimLost(job.id)),
                None => Err(JobStoreError::NotFound(job.id)),
            };
        }
        Ok(())
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, job_id = %job_id), err)]
    async fn get(
        &self,
        tenant_id: TenantId,
        job_id: JobId,
    ) -> Result<Option<GenerationJob>, JobStoreError> {
        self.fetch(tenant_id, job_id).await
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id), err)]
    async fn list(
        &self,
        tenant_id: TenantId,
        filter: &JobFilter,
    ) -> Result<Vec<GenerationJob>, JobStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT *
            FROM generation_jobs
            WHERE tenant_id = $1
              AND ($2::text IS NULL OR status = $2)
              AND ($3::text IS NULL OR job_type = $3)
              AND ($4::uuid IS NULL OR course_id = $4)
            ORDER BY created_at DESC, id DESC
            LIMIT $5
            "#,
        )
        .bind(*tenant_id.as_uuid())
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.job_type.map(|t| t.as_str()))
        .bind(filter.course_id.map(|c| *c.as_uuid()))
        .bind(i64::try_from(filter.limit).unwrap_or(i64::MAX))
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_jobs", e))?;

        rows.iter()
            .map(|r| JobRow::decode(r).map(GenerationJob::from))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| map_sqlx_error("list_jobs", e))
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, job_id = %job_id), err)]
    async fn cancel(
        &self,
        tenant_id: TenantId,
        job_id: JobId,
    ) -> Result<GenerationJob, JobStoreError> {
        let now = Utc::now();
        let row = sqlx::query(
            r#"
            UPDATE generation_jobs
            SET status = 'cancelled',
                progress_message = 'Cancelled',
                completed_at = $3,
                updated_at = $3
            WHERE id = $1
              AND tenant_id = $2
              AND status IN ('queued', 'processing')
            RETURNING *
            "#,
        )
        .bind(*job_id.as_uuid())
        .bind(*tenant_id.as_uuid())
        .bind(now)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("cancel_job", e))?;

        match row {
            Some(r) => JobRow::decode(&r)
                .map(GenerationJob::from)
                .map_err(|e| map_sqlx_error("cancel_job", e)),
            None => match self.fetch(tenant_id, job_id).await? {
                Some(job) => Err(JobStoreError::InvalidTransition {
                    job_id,
                    from: job.status,
                    action: "cancel",
                }),
                None => Err(JobStoreError::NotFound(job_id)),
            },
        }
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, job_id = %job_id), err)]
    async fn retry(
        &self,
        tenant_id: TenantId,
        job_id: JobId,
    ) -> Result<GenerationJob, JobStoreError> {
        let now = Utc::now();
        let row = sqlx::query(
            r#"
            UPDATE generation_jobs
            SET status = 'queued',
                retry_count = retry_count + 1,
                stage = NULL,
                error = NULL,
                failure_kind = NULL,
                completed_at = NULL,
                heartbeat_at = NULL,
                claimed_by = NULL,
                claim_token = NULL,
                progress_message = 'Queued for retry',
                updated_at = $3
            WHERE id = $1
              AND tenant_id = $2
              AND status = 'failed'
              AND retry_count < max_retries
            RETURNING *
            "#,
        )
        .bind(*job_id.as_uuid())
        .bind(*tenant_id.as_uuid())
        .bind(now)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("retry_job", e))?;

        if let Some(r) = row {
            return JobRow::decode(&r)
                .map(GenerationJob::from)
                .map_err(|e| map_sqlx_error("retry_job", e));
        }

        // Report why the conditional update matched nothing.
        let mut job = self
            .fetch(tenant_id, job_id)
            .await?
            .ok_or(JobStoreError::NotFound(job_id))?;
        job.requeue_for_retry()?;
        Err(JobStoreError::Storage(format!(
            "job {job_id} changed concurrently during retry"
        )))
    }

    #[instrument(skip(self), err)]
    async fn expire_stale(
        &self,
        stale_before: DateTime<Utc>,
    ) -> Result<Vec<GenerationJob>, JobStoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("expire_stale", e))?;

        let rows = sqlx::query(
            r#"
            SELECT *
            FROM generation_jobs
            WHERE status = 'processing'
              AND COALESCE(heartbeat_at, started_at) < $1
              AND retry_count >= max_retries
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(stale_before)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("expire_stale", e))?;

        let mut expired = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut job = JobRow::decode(row)
                .map(GenerationJob::from)
                .map_err(|e| map_sqlx_error("expire_stale", e))?;
            let message = worker_lost_message(&job);
            job.fail(FailureKind::WorkerLost, message);

            sqlx::query(
                r#"
                UPDATE generation_jobs
                SET status = 'failed',
                    error = $2,
                    failure_kind = $3,
                    progress_message = $4,
                    completed_at = $5,
                    updated_at = $5
                WHERE id = $1
                "#,
            )
            .bind(*job.id.as_uuid())
            .bind(job.error.as_deref())
            .bind(FailureKind::WorkerLost.as_str())
            .bind(job.progress_message.as_deref())
            .bind(job.completed_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("expire_stale", e))?;

            expired.push(job);
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("expire_stale", e))?;

        Ok(expired)
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id), err)]
    async fn stats(&self, tenant_id: TenantId) -> Result<JobStats, JobStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT status, COUNT(*) AS count
            FROM generation_jobs
            WHERE tenant_id = $1
            GROUP BY status
            "#,
        )
        .bind(*tenant_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("job_stats", e))?;

        let mut stats = JobStats::default();
        for row in rows {
            let status: String = row.try_get("status").map_err(|e| map_sqlx_error("job_stats", e))?;
            let count: i64 = row.try_get("count").map_err(|e| map_sqlx_error("job_stats", e))?;
            let status = decode_enum::<JobStatus>("status", status)
                .map_err(|e| map_sqlx_error("job_stats", e))?;
            stats.record(status, usize::try_from(count).unwrap_or(0));
        }
        Ok(stats)
    }
}

/// Raw `generation_jobs` row.
struct JobRow(GenerationJob);

impl JobRow {
    fn decode(row: &PgRow) -> Result<Self, sqlx::Error> {
        let status: String = row.try_get("status")?;
        let job_type: String = row.try_get("job_type")?;
        let stage: Option<String> = row.try_get("stage")?;
        let failure_kind: Option<String> = row.try_get("failure_kind")?;
        let progress: i16 = row.try_get("progress")?;
        let tokens_used: i64 = row.try_get("tokens_used")?;
        let max_retries: i32 = row.try_get("max_retries")?;
        let retry_count: i32 = row.try_get("retry_count")?;

        Ok(Self(GenerationJob {
            id: JobId::from_uuid(row.try_get("id")?),
            tenant_id: TenantId::from_uuid(row.try_get("tenant_id")?),
            requested_by: UserId::from_uuid(row.try_get("requested_by")?),
            job_type: decode_enum("job_type", job_type)?,
            course_id: row.try_get::<Option<Uuid>, _>("course_id")?.map(CourseId::from_uuid),
            outline_lesson_id: row
                .try_get::<Option<Uuid>, _>("outline_lesson_id")?
                .map(OutlineLessonId::from_uuid),
            generation_input_id: row
                .try_get::<Option<Uuid>, _>("generation_input_id")?
                .map(GenerationInputId::from_uuid),
            status: decode_enum("status", status)?,
            stage: stage.map(|s| decode_enum("stage", s)).transpose()?,
            progress: u8::try_from(progress.clamp(0, 100)).unwrap_or(0),
            progress_message: row.try_get("progress_message")?,
            tokens_used: u64::try_from(tokens_used).unwrap_or(0),
            error: row.try_get("error")?,
            failure_kind: failure_kind.map(|k| decode_enum("failure_kind", k)).transpose()?,
            max_retries: u32::try_from(max_retries).unwrap_or(0),
            retry_count: u32::try_from(retry_count).unwrap_or(0),
            created_at: row.try_get("created_at")?,
            started_at: row.try_get("started_at")?,
            completed_at: row.try_get("completed_at")?,
            updated_at: row.try_get("updated_at")?,
            heartbeat_at: row.try_get("heartbeat_at")?,
            claimed_by: row.try_get("claimed_by")?,
            claim_token: row.try_get("claim_token")?,
        }))
    }
}

impl From<JobRow> for GenerationJob {
    fn from(row: JobRow) -> Self {
        row.0
    }
}

/// Parse a text column into one of the closed enumerations.
pub(crate) fn decode_enum<T>(column: &str, value: String) -> Result<T, sqlx::Error>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value.parse::<T>().map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn to_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> JobStoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                // Check constraint violation
                Some("23514") => JobStoreError::Validation(msg),
                _ => JobStoreError::Storage(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            JobStoreError::Storage(format!("connection pool closed in {}", operation))
        }
        _ => JobStoreError::Storage(format!("sqlx error in {}: {}", operation, err)),
    }
}

/// Check if an error is a unique constraint violation.
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some("23505"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    //! Run with `DATABASE_URL=postgres://… cargo test -- --ignored`.

    use super::*;
    use crate::db;
    use chrono::Duration;

    async fn store() -> PostgresJobStore {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let pool = db::connect(&url, 8).await.unwrap();
        db::apply_schema(&pool).await.unwrap();
        PostgresJobStore::new(Arc::new(pool))
    }

    fn not_stale() -> DateTime<Utc> {
        Utc::now() - Duration::minutes(10)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[ignore = "requires a Postgres DATABASE_URL"]
    async fn concurrent_claims_never_share_a_job() {
        let store = store().await;
        let tenant = TenantId::new();
        let job_id = store
            .create(GenerationJob::new_outline(
                tenant,
                UserId::new(),
                CourseId::new(),
                GenerationInputId::new(),
            ))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .claim_next(&format!("w{i}"), not_stale(), Some(tenant))
                    .await
                    .unwrap()
            }));
        }

        let mut winners = Vec::new();
        for handle in handles {
            if let Some(job) = handle.await.unwrap() {
                winners.push(job.id);
            }
        }
        assert_eq!(winners, vec![job_id]);
    }

    #[tokio::test]
    #[ignore = "requires a Postgres DATABASE_URL"]
    async fn conditional_update_and_cancel() {
        let store = store().await;
        let tenant = TenantId::new();
        store
            .create(GenerationJob::new_outline(
                tenant,
                UserId::new(),
                CourseId::new(),
                GenerationInputId::new(),
            ))
            .await
            .unwrap();

        let mut job = store
            .claim_next("w1", not_stale(), Some(tenant))
            .await
            .unwrap()
            .unwrap();
        job.progress = 40;
        store.update(&job).await.unwrap();

        let cancelled = store.cancel(tenant, job.id).await.unwrap();
        assert_eq!(cancelled.status, JobStatus::Cancelled);

        job.progress = 70;
        assert!(matches!(store.update(&job).await, Err(JobStoreError::ClaimLost(_))));
        assert!(matches!(
            store.cancel(tenant, job.id).await,
            Err(JobStoreError::InvalidTransition { .. })
        ));
    }
}
