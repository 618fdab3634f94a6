//! Candidate finder queries for the proactive sweeps.
//!
//! All three are read-only parameterised queries over tenant DMS data; the
//! time windows live in SQL so the database's clock is authoritative.

use async_trait::async_trait;
use hermod_core::{
    AppointmentCandidate, CandidateSource, PastDueInvoice, Result, ServiceReminderCandidate,
    TenantId,
};

use crate::gateway::TenantGateway;

#[async_trait]
impl CandidateSource for TenantGateway {
    async fn service_reminder_candidates(
        &self,
        tenant: &TenantId,
    ) -> Result<Vec<ServiceReminderCandidate>> {
        let pool = self.pool(tenant).await?;

        let rows = sqlx::query_as::<_, ServiceReminderCandidate>(
            r"
            SELECT c.id AS customer_id,
                   c.email,
                   c.first_name,
                   c.last_name,
                   s.model,
                   s.serial_number
            FROM sales s
            INNER JOIN customers c ON c.id = s.customer_id
            WHERE s.purchase_date BETWEEN NOW() - INTERVAL '25 months'
                                      AND NOW() - INTERVAL '23 months'
              AND c.email IS NOT NULL
            ",
        )
        .fetch_all(&pool)
        .await?;

        Ok(rows)
    }

    async fn appointments_in_confirmation_window(
        &self,
        tenant: &TenantId,
    ) -> Result<Vec<AppointmentCandidate>> {
        let pool = self.pool(tenant).await?;

        let rows = sqlx::query_as::<_, AppointmentCandidate>(
            r"
            SELECT a.id AS appointment_id,
                   a.customer_id,
                   a.scheduled_start,
                   c.phone_mobile AS phone,
                   c.first_name
            FROM appointments a
            INNER JOIN customers c ON c.id = a.customer_id
            WHERE a.scheduled_start BETWEEN NOW() + INTERVAL '24 hours'
                                        AND NOW() + INTERVAL '25 hours'
            ",
        )
        .fetch_all(&pool)
        .await?;

        Ok(rows)
    }

    async fn past_due_invoices(&self, tenant: &TenantId) -> Result<Vec<PastDueInvoice>> {
        let pool = self.pool(tenant).await?;

        let rows = sqlx::query_as::<_, PastDueInvoice>(
            r"
            SELECT i.id AS invoice_id,
                   i.customer_id,
                   i.due_date,
                   i.balance::double precision AS balance,
                   c.email,
                   c.first_name
            FROM invoices i
            INNER JOIN customers c ON c.id = i.customer_id
            WHERE i.due_date <= NOW() - INTERVAL '30 days'
              AND i.balance > 0
            ",
        )
        .fetch_all(&pool)
        .await?;

        Ok(rows)
    }
}
