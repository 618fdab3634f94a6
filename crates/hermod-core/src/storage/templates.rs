//! Repository for `message_templates`.
//!
//! Lookup tries the tenant-specific row first and falls back to the global
//! default (`tenant_id IS NULL`). Inactive templates are invisible.

use std::sync::Arc;

use sqlx::PgPool;

use crate::{
    error::Result,
    models::{MessageTemplate, TenantId},
};

const TEMPLATE_COLUMNS: &str = "id, tenant_id, event_type, communication_type, subject_template, \
     body_text_template, body_html_template, is_active";

/// Repository for message template rows.
pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    /// Creates a new repository instance.
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Finds the active template for an event, tenant row first, then the
    /// global default.
    pub async fn find(
        &self,
        tenant: &TenantId,
        event_type: &str,
        communication_type: &str,
    ) -> Result<Option<MessageTemplate>> {
        let tenant_row = sqlx::query_as::<_, MessageTemplate>(&format!(
            r"
            SELECT {TEMPLATE_COLUMNS}
            FROM message_templates
            WHERE tenant_id = $1
              AND event_type = $2
              AND communication_type = $3
              AND is_active
            LIMIT 1
            "
        ))
        .bind(tenant)
        .bind(event_type)
        .bind(communication_type)
        .fetch_optional(&*self.pool)
        .await?;

        if tenant_row.is_some() {
            return Ok(tenant_row);
        }

        let global_row = sqlx::query_as::<_, MessageTemplate>(&format!(
            r"
            SELECT {TEMPLATE_COLUMNS}
            FROM message_templates
            WHERE tenant_id IS NULL
              AND event_type = $1
              AND communication_type = $2
              AND is_active
            LIMIT 1
            "
        ))
        .bind(event_type)
        .bind(communication_type)
        .fetch_optional(&*self.pool)
        .await?;

        Ok(global_row)
    }
}
