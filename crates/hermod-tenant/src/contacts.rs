//! Customer contact lookups against tenant DMS databases.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hermod_core::{ContactPreference, CustomerContact, CustomerDirectory, Result, TenantId};
use sqlx::Row;

use crate::gateway::TenantGateway;

#[async_trait]
impl CustomerDirectory for TenantGateway {
    async fn customer_contact(
        &self,
        tenant: &TenantId,
        customer_id: i64,
    ) -> Result<Option<CustomerContact>> {
        let pool = self.pool(tenant).await?;

        let row = sqlx::query(
            r"
            SELECT id,
                   email,
                   phone_mobile AS phone,
                   contact_preference,
                   do_not_disturb_until
            FROM customers
            WHERE id = $1
            ",
        )
        .bind(customer_id)
        .fetch_optional(&pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let preference: Option<String> = row.try_get("contact_preference")?;
        let do_not_disturb_until: Option<DateTime<Utc>> = row.try_get("do_not_disturb_until")?;

        Ok(Some(CustomerContact {
            customer_id: row.try_get("id")?,
            email: row.try_get("email")?,
            phone: row.try_get("phone")?,
            contact_preference: preference.as_deref().and_then(ContactPreference::parse),
            do_not_disturb_until,
        }))
    }
}
