//! Repository for `tenant_configs`.

use std::sync::Arc;

use sqlx::PgPool;

use crate::{
    error::Result,
    models::{TenantConfig, TenantId},
};

const CONFIG_COLUMNS: &str = "tenant_id, twilio_sid, twilio_auth_token, twilio_from_number, \
     sendgrid_key, sendgrid_from, email_provider, resend_key, resend_from, \
     quiet_hours_start, quiet_hours_end, api_base_url, company_name, dms_connection_string";

/// Repository for tenant configuration rows.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Finds the configuration row for a tenant.
    pub async fn find(&self, tenant: &TenantId) -> Result<Option<TenantConfig>> {
        let config = sqlx::query_as::<_, TenantConfig>(&format!(
            "SELECT {CONFIG_COLUMNS} FROM tenant_configs WHERE tenant_id = $1"
        ))
        .bind(tenant)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(config)
    }

    /// Lists all configured tenant ids.
    pub async fn list_ids(&self) -> Result<Vec<TenantId>> {
        let ids = sqlx::query_scalar::<_, TenantId>(
            "SELECT tenant_id FROM tenant_configs ORDER BY tenant_id",
        )
        .fetch_all(&*self.pool)
        .await?;

        Ok(ids)
    }

    /// Upserts a configuration row. Used by provisioning and tests.
    pub async fn upsert(&self, config: &TenantConfig) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO tenant_configs
                (tenant_id, twilio_sid, twilio_auth_token, twilio_from_number,
                 sendgrid_key, sendgrid_from, email_provider, resend_key, resend_from,
                 quiet_hours_start, quiet_hours_end, api_base_url, company_name,
                 dms_connection_string)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (tenant_id) DO UPDATE SET
                twilio_sid = EXCLUDED.twilio_sid,
                twilio_auth_token = EXCLUDED.twilio_auth_token,
                twilio_from_number = EXCLUDED.twilio_from_number,
                sendgrid_key = EXCLUDED.sendgrid_key,
                sendgrid_from = EXCLUDED.sendgrid_from,
                email_provider = EXCLUDED.email_provider,
                resend_key = EXCLUDED.resend_key,
                resend_from = EXCLUDED.resend_from,
                quiet_hours_start = EXCLUDED.quiet_hours_start,
                quiet_hours_end = EXCLUDED.quiet_hours_end,
                api_base_url = EXCLUDED.api_base_url,
                company_name = EXCLUDED.company_name,
                dms_connection_string = EXCLUDED.dms_connection_string
            ",
        )
        .bind(&config.tenant_id)
        .bind(&config.twilio_sid)
        .bind(&config.twilio_auth_token)
        .bind(&config.twilio_from_number)
        .bind(&config.sendgrid_key)
        .bind(&config.sendgrid_from)
        .bind(&config.email_provider)
        .bind(&config.resend_key)
        .bind(&config.resend_from)
        .bind(&config.quiet_hours_start)
        .bind(&config.quiet_hours_end)
        .bind(&config.api_base_url)
        .bind(&config.company_name)
        .bind(&config.dms_connection_string)
        .execute(&*self.pool)
        .await?;

        Ok(())
    }
}
