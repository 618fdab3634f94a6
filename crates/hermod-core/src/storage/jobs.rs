//! Repository for the durable `communication_jobs` queue.
//!
//! The claim primitive is the concurrency-critical piece: a single
//! transaction selects claimable rows with `FOR UPDATE SKIP LOCKED` and
//! flips them to `processing`, so two workers polling at the same moment
//! never receive the same row.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::debug;

use crate::{
    error::{CoreError, Result},
    models::{InsertOutcome, Job, JobId, JobStatus, JobType, NewJob, TenantId},
    ports::JobStore,
};

const JOB_COLUMNS: &str = "id, tenant_id, job_type, payload, status, retry_count, max_retries, \
     last_error, process_after, source_reference, created_at, updated_at, completed_at";

/// Repository for job queue operations.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Returns a reference to the database pool.
    pub fn pool(&self) -> Arc<PgPool> {
        self.pool.clone()
    }

    /// Finds a job by id.
    pub async fn find(&self, id: JobId) -> Result<Option<Job>> {
        let job = sqlx::query_as::<_, Job>(&format!(
            "SELECT {JOB_COLUMNS} FROM communication_jobs WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(job)
    }

    /// Whether a non-terminal row already holds this reference.
    ///
    /// Checks both the dedicated column and the payload mirror kept for
    /// rows written before the column existed.
    pub async fn reference_exists(
        &self,
        tenant: &TenantId,
        job_type: JobType,
        reference: &str,
    ) -> Result<bool> {
        let exists: (bool,) = sqlx::query_as(
            r"
            SELECT EXISTS(
                SELECT 1
                FROM communication_jobs
                WHERE tenant_id = $1
                  AND job_type = $2
                  AND (source_reference = $3 OR payload ->> 'source_reference' = $3)
                  AND status IN ('pending', 'processing', 'complete')
            )
            ",
        )
        .bind(tenant)
        .bind(job_type)
        .bind(reference)
        .fetch_one(&*self.pool)
        .await?;

        Ok(exists.0)
    }
}

#[async_trait]
impl JobStore for Repository {
    async fn claim_pending(&self, limit: usize) -> Result<Vec<Job>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut tx = self.pool.begin().await?;

        let ids: Vec<i64> = sqlx::query_scalar(
            r"
            SELECT id
            FROM communication_jobs
            WHERE status = 'pending'
              AND (process_after IS NULL OR process_after <= NOW())
            ORDER BY created_at ASC, id ASC
            FOR UPDATE SKIP LOCKED
            LIMIT $1
            ",
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&mut *tx)
        .await?;

        if ids.is_empty() {
            tx.rollback().await?;
            return Ok(Vec::new());
        }

        let mut jobs = sqlx::query_as::<_, Job>(&format!(
            r"
            UPDATE communication_jobs
            SET status = 'processing', updated_at = NOW()
            WHERE id = ANY($1)
            RETURNING {JOB_COLUMNS}
            "
        ))
        .bind(&ids)
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        // RETURNING does not preserve the selection order.
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));

        debug!(claimed = jobs.len(), "claimed pending jobs");
        Ok(jobs)
    }

    async fn mark_complete(&self, id: JobId, note: Option<&str>) -> Result<()> {
        sqlx::query(
            r"
            UPDATE communication_jobs
            SET status = 'complete', completed_at = NOW(), updated_at = NOW(), last_error = $1
            WHERE id = $2
            ",
        )
        .bind(note)
        .bind(id)
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    async fn reschedule(
        &self,
        id: JobId,
        retry_count: i32,
        process_after: DateTime<Utc>,
        last_error: &str,
        status: JobStatus,
    ) -> Result<()> {
        sqlx::query(
            r"
            UPDATE communication_jobs
            SET status = $1, retry_count = $2, process_after = $3, last_error = $4,
                updated_at = NOW()
            WHERE id = $5
            ",
        )
        .bind(status)
        .bind(retry_count)
        .bind(process_after)
        .bind(last_error)
        .bind(id)
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    async fn mark_failed(&self, id: JobId, last_error: &str, status: JobStatus) -> Result<()> {
        sqlx::query(
            r"
            UPDATE communication_jobs
            SET status = $1, last_error = $2, updated_at = NOW()
            WHERE id = $3
            ",
        )
        .bind(status)
        .bind(last_error)
        .bind(id)
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    async fn insert_job(&self, job: NewJob) -> Result<InsertOutcome> {
        let mut payload = job.payload;

        let reference = job.source_reference.clone().or_else(|| {
            payload.get("source_reference").and_then(|v| v.as_str()).map(str::to_string)
        });

        if let Some(ref reference) = reference {
            if let Some(map) = payload.as_object_mut() {
                map.insert(
                    "source_reference".to_string(),
                    serde_json::Value::String(reference.clone()),
                );
            }

            if self.reference_exists(&job.tenant_id, job.job_type, reference).await? {
                debug!(
                    tenant_id = %job.tenant_id,
                    job_type = %job.job_type,
                    reference,
                    "skipping duplicate job"
                );
                return Ok(InsertOutcome::Skipped);
            }
        }

        let inserted = sqlx::query_scalar::<_, i64>(
            r"
            INSERT INTO communication_jobs
                (tenant_id, job_type, payload, status, retry_count, process_after,
                 source_reference, created_at, updated_at)
            VALUES ($1, $2, $3, 'pending', 0, COALESCE($4, NOW()), $5, NOW(), NOW())
            RETURNING id
            ",
        )
        .bind(&job.tenant_id)
        .bind(job.job_type)
        .bind(sqlx::types::Json(&payload))
        .bind(job.process_after)
        .bind(&reference)
        .fetch_one(&*self.pool)
        .await;

        match inserted {
            Ok(id) => Ok(InsertOutcome::Inserted(JobId(id))),
            // The partial unique index closes the race between the
            // existence check and the insert.
            Err(err) => match CoreError::from(err) {
                CoreError::ConstraintViolation(_) => Ok(InsertOutcome::Skipped),
                other => Err(other),
            },
        }
    }
}
