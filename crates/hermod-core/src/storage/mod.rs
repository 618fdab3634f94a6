//! Central-store access layer implementing the repository pattern.
//!
//! The central database owns the durable job queue, tenant configuration,
//! and message templates. All SQL against it lives in these repositories;
//! the engine and scheduler only see the port traits.

use std::sync::Arc;

use sqlx::PgPool;

pub mod jobs;
pub mod templates;
pub mod tenants;

use crate::error::Result;

/// Container for the central-store repositories.
#[derive(Clone)]
pub struct CentralStore {
    /// Repository for the `communication_jobs` queue.
    pub jobs: Arc<jobs::Repository>,

    /// Repository for `tenant_configs`.
    pub tenants: Arc<tenants::Repository>,

    /// Repository for `message_templates`.
    pub templates: Arc<templates::Repository>,
}

impl CentralStore {
    /// Creates a store sharing the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        let pool = Arc::new(pool);

        Self {
            jobs: Arc::new(jobs::Repository::new(pool.clone())),
            tenants: Arc::new(tenants::Repository::new(pool.clone())),
            templates: Arc::new(templates::Repository::new(pool)),
        }
    }

    /// Verifies database connectivity with a trivial query.
    pub async fn health_check(&self) -> Result<()> {
        let _: (i32,) = sqlx::query_as("SELECT 1").fetch_one(&*self.jobs.pool()).await?;
        Ok(())
    }
}

/// Creates the central-store tables and indexes when absent.
///
/// Idempotent; runs at startup so a fresh database is usable without a
/// separate migration step.
pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS communication_jobs (
            id BIGSERIAL PRIMARY KEY,
            tenant_id TEXT NOT NULL,
            job_type TEXT NOT NULL,
            payload JSONB NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            retry_count INTEGER NOT NULL DEFAULT 0,
            max_retries INTEGER NOT NULL DEFAULT 3,
            last_error TEXT,
            process_after TIMESTAMPTZ,
            source_reference TEXT,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            completed_at TIMESTAMPTZ
        )
        ",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r"
        CREATE INDEX IF NOT EXISTS idx_communication_jobs_claimable
        ON communication_jobs (status, process_after)
        WHERE status = 'pending'
        ",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_communication_jobs_reference
        ON communication_jobs (tenant_id, job_type, source_reference)
        WHERE source_reference IS NOT NULL
          AND status IN ('pending', 'processing', 'complete')
        ",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS tenant_configs (
            tenant_id TEXT PRIMARY KEY,
            twilio_sid TEXT,
            twilio_auth_token TEXT,
            twilio_from_number TEXT,
            sendgrid_key TEXT,
            sendgrid_from TEXT,
            email_provider TEXT,
            resend_key TEXT,
            resend_from TEXT,
            quiet_hours_start TEXT,
            quiet_hours_end TEXT,
            api_base_url TEXT,
            company_name TEXT,
            dms_connection_string TEXT
        )
        ",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS message_templates (
            id BIGSERIAL PRIMARY KEY,
            tenant_id TEXT,
            event_type TEXT NOT NULL,
            communication_type TEXT NOT NULL DEFAULT 'email',
            subject_template TEXT NOT NULL DEFAULT '',
            body_text_template TEXT NOT NULL DEFAULT '',
            body_html_template TEXT,
            is_active BOOLEAN NOT NULL DEFAULT TRUE,
            UNIQUE (tenant_id, event_type, communication_type)
        )
        ",
    )
    .execute(pool)
    .await?;

    Ok(())
}
