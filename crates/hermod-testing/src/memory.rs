//! In-memory job store honouring the full queue contract.
//!
//! Mirrors the Postgres repository's semantics: claim visibility via
//! `process_after`, FIFO ordering by `(created_at, id)`, single-owner
//! claiming, and reference deduplication against non-terminal rows. The
//! mutex makes every operation atomic, which is exactly the guarantee the
//! transactional claim gives the real store.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hermod_core::{
    Clock, CoreError, InsertOutcome, Job, JobId, JobStatus, JobStore, NewJob, Result,
};

struct Inner {
    jobs: Vec<Job>,
    next_id: i64,
}

/// In-memory [`JobStore`] for engine and scheduler tests.
pub struct MemoryJobStore {
    inner: Mutex<Inner>,
    clock: Arc<dyn Clock>,
    default_max_retries: i32,
}

impl MemoryJobStore {
    /// Creates an empty store reading time from the given clock.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { inner: Mutex::new(Inner { jobs: Vec::new(), next_id: 1 }), clock, default_max_retries: 3 }
    }

    /// Overrides the `max_retries` column default for inserted rows.
    #[must_use]
    pub fn with_default_max_retries(mut self, max_retries: i32) -> Self {
        self.default_max_retries = max_retries;
        self
    }

    /// Snapshot of every row.
    pub fn jobs(&self) -> Vec<Job> {
        self.inner.lock().expect("store lock poisoned").jobs.clone()
    }

    /// Snapshot of one row.
    pub fn job(&self, id: JobId) -> Option<Job> {
        self.inner.lock().expect("store lock poisoned").jobs.iter().find(|j| j.id == id).cloned()
    }

    /// Rows currently in the given status.
    pub fn jobs_with_status(&self, status: JobStatus) -> Vec<Job> {
        self.jobs().into_iter().filter(|j| j.status == status).collect()
    }

    fn with_job<R>(&self, id: JobId, f: impl FnOnce(&mut Job) -> R) -> Result<R> {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        let job = inner
            .jobs
            .iter_mut()
            .find(|j| j.id == id)
            .ok_or_else(|| CoreError::not_found(format!("job {id} not found")))?;
        Ok(f(job))
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn claim_pending(&self, limit: usize) -> Result<Vec<Job>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let now = self.clock.now();
        let mut inner = self.inner.lock().expect("store lock poisoned");

        let mut claimable: Vec<usize> = inner
            .jobs
            .iter()
            .enumerate()
            .filter(|(_, j)| {
                j.status == JobStatus::Pending && j.process_after.is_none_or(|at| at <= now)
            })
            .map(|(i, _)| i)
            .collect();
        claimable.sort_by_key(|&i| (inner.jobs[i].created_at, inner.jobs[i].id));
        claimable.truncate(limit);

        let mut claimed = Vec::with_capacity(claimable.len());
        for index in claimable {
            let job = &mut inner.jobs[index];
            job.status = JobStatus::Processing;
            job.updated_at = now;
            claimed.push(job.clone());
        }

        Ok(claimed)
    }

    async fn mark_complete(&self, id: JobId, note: Option<&str>) -> Result<()> {
        let now = self.clock.now();
        self.with_job(id, |job| {
            job.status = JobStatus::Complete;
            job.completed_at = Some(now);
            job.updated_at = now;
            job.last_error = note.map(str::to_string);
        })
    }

    async fn reschedule(
        &self,
        id: JobId,
        retry_count: i32,
        process_after: DateTime<Utc>,
        last_error: &str,
        status: JobStatus,
    ) -> Result<()> {
        let now = self.clock.now();
        self.with_job(id, |job| {
            job.status = status;
            job.retry_count = retry_count;
            job.process_after = Some(process_after);
            job.last_error = Some(last_error.to_string());
            job.updated_at = now;
        })
    }

    async fn mark_failed(&self, id: JobId, last_error: &str, status: JobStatus) -> Result<()> {
        let now = self.clock.now();
        self.with_job(id, |job| {
            job.status = status;
            job.last_error = Some(last_error.to_string());
            job.updated_at = now;
        })
    }

    async fn insert_job(&self, job: NewJob) -> Result<InsertOutcome> {
        let now = self.clock.now();
        let mut payload = job.payload;

        let reference = job.source_reference.clone().or_else(|| {
            payload.get("source_reference").and_then(|v| v.as_str()).map(str::to_string)
        });

        let mut inner = self.inner.lock().expect("store lock poisoned");

        if let Some(ref reference) = reference {
            if let Some(map) = payload.as_object_mut() {
                map.insert(
                    "source_reference".to_string(),
                    serde_json::Value::String(reference.clone()),
                );
            }

            let duplicate = inner.jobs.iter().any(|j| {
                j.tenant_id == job.tenant_id
                    && j.job_type == job.job_type
                    && j.status.holds_reference()
                    && (j.source_reference.as_deref() == Some(reference.as_str())
                        || j.payload.0.get("source_reference").and_then(|v| v.as_str())
                            == Some(reference.as_str()))
            });
            if duplicate {
                return Ok(InsertOutcome::Skipped);
            }
        }

        let id = JobId(inner.next_id);
        inner.next_id += 1;

        inner.jobs.push(Job {
            id,
            tenant_id: job.tenant_id,
            job_type: job.job_type,
            payload: sqlx::types::Json(payload),
            status: JobStatus::Pending,
            retry_count: 0,
            max_retries: self.default_max_retries,
            last_error: None,
            process_after: job.process_after,
            source_reference: reference,
            created_at: now,
            updated_at: now,
            completed_at: None,
        });

        Ok(InsertOutcome::Inserted(id))
    }
}
