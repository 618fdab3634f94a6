//! The three core sweeps and their job synthesis.

use std::{collections::HashMap, sync::Arc};

use hermod_core::{
    CandidateSource, Channel, Clock, InsertOutcome, JobStore, JobType, NewJob, Result,
    TemplateRenderer, TenantDirectory, TenantId,
};
use tracing::{info, warn};

/// Outcome counters for a single sweep run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Jobs inserted this run.
    pub enqueued: usize,
    /// Candidates rejected by the store's dedup check.
    pub deduplicated: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SweepKind {
    ServiceReminders,
    AppointmentConfirmations,
    InvoiceReminders,
}

impl SweepKind {
    pub(crate) fn name(self) -> &'static str {
        match self {
            Self::ServiceReminders => "service-reminders",
            Self::AppointmentConfirmations => "appointment-confirmations",
            Self::InvoiceReminders => "invoice-reminders",
        }
    }
}

pub(crate) struct SweepContext {
    pub(crate) store: Arc<dyn JobStore>,
    pub(crate) tenants: Arc<dyn TenantDirectory>,
    pub(crate) candidates: Arc<dyn CandidateSource>,
    pub(crate) renderer: Arc<dyn TemplateRenderer>,
    pub(crate) clock: Arc<dyn Clock>,
}

impl SweepContext {
    pub(crate) async fn run_sweep(&self, kind: SweepKind) -> Result<SweepReport> {
        let tenants = self.tenants.list_tenants().await?;
        let mut report = SweepReport::default();

        for tenant in tenants {
            let tenant_report = match kind {
                SweepKind::ServiceReminders => self.sweep_service_reminders(&tenant).await,
                SweepKind::AppointmentConfirmations => {
                    self.sweep_appointment_confirmations(&tenant).await
                },
                SweepKind::InvoiceReminders => self.sweep_invoice_reminders(&tenant).await,
            };

            match tenant_report {
                Ok(tenant_report) => {
                    report.enqueued += tenant_report.enqueued;
                    report.deduplicated += tenant_report.deduplicated;
                },
                Err(error) => {
                    // One tenant's broken config or DMS must not starve
                    // the rest of the sweep.
                    warn!(task = kind.name(), tenant_id = %tenant, error = %error, "skipping tenant");
                },
            }
        }

        info!(
            task = kind.name(),
            enqueued = report.enqueued,
            deduplicated = report.deduplicated,
            "sweep completed"
        );
        Ok(report)
    }

    async fn sweep_service_reminders(&self, tenant: &TenantId) -> Result<SweepReport> {
        let candidates = self.candidates.service_reminder_candidates(tenant).await?;
        let mut report = SweepReport::default();

        for candidate in candidates {
            let Some(email) = candidate.email.clone().filter(|v| !v.is_empty()) else {
                continue;
            };

            let full_name = [candidate.first_name.as_deref(), candidate.last_name.as_deref()]
                .into_iter()
                .flatten()
                .filter(|part| !part.is_empty())
                .collect::<Vec<_>>()
                .join(" ");

            let mut vars = HashMap::new();
            vars.insert(
                "full_name".to_string(),
                if full_name.is_empty() { "there".to_string() } else { full_name },
            );
            vars.insert(
                "model".to_string(),
                candidate.model.clone().unwrap_or_else(|| "equipment".to_string()),
            );
            if let Some(serial) = candidate.serial_number.clone() {
                vars.insert("serial_number".to_string(), serial);
            }

            let rendered =
                match self.renderer.render("service_reminder", tenant, Channel::Email, &vars).await
                {
                    Ok(rendered) => rendered,
                    Err(error) => {
                        warn!(tenant_id = %tenant, error = %error, "template render failed");
                        continue;
                    },
                };

            let mut payload = serde_json::json!({
                "to": email,
                "subject": rendered.subject,
                "body": rendered.body,
                "customer_id": candidate.customer_id,
            });
            if let Some(html) = rendered.html_body {
                payload["html_body"] = serde_json::Value::String(html);
            }

            let reference = format!("service_reminder_{}_{}", tenant, candidate.customer_id);
            self.enqueue(tenant, JobType::SendEmail, payload, reference, &mut report).await;
        }

        Ok(report)
    }

    async fn sweep_appointment_confirmations(&self, tenant: &TenantId) -> Result<SweepReport> {
        let appointments = self.candidates.appointments_in_confirmation_window(tenant).await?;
        let mut report = SweepReport::default();

        for appointment in appointments {
            let Some(phone) = appointment.phone.clone().filter(|v| !v.is_empty()) else {
                continue;
            };

            let when = appointment
                .scheduled_start
                .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_else(|| "soon".to_string());

            let mut vars = HashMap::new();
            vars.insert(
                "first_name".to_string(),
                appointment.first_name.clone().unwrap_or_default(),
            );
            vars.insert("appointment_time".to_string(), when);

            let rendered = match self
                .renderer
                .render("appointment_confirmation", tenant, Channel::Sms, &vars)
                .await
            {
                Ok(rendered) => rendered,
                Err(error) => {
                    warn!(tenant_id = %tenant, error = %error, "template render failed");
                    continue;
                },
            };

            let payload = serde_json::json!({
                "to": phone,
                "body": rendered.body,
                "customer_id": appointment.customer_id,
            });

            let reference = format!("appointment_{}_{}", tenant, appointment.appointment_id);
            self.enqueue(tenant, JobType::SendSms, payload, reference, &mut report).await;
        }

        Ok(report)
    }

    async fn sweep_invoice_reminders(&self, tenant: &TenantId) -> Result<SweepReport> {
        let invoices = self.candidates.past_due_invoices(tenant).await?;
        let mut report = SweepReport::default();
        let now = self.clock.now();

        for invoice in invoices {
            let Some(email) = invoice.email.clone().filter(|v| !v.is_empty()) else {
                continue;
            };

            let days_past_due = invoice
                .due_date
                .map(|due| {
                    ((now - due).num_seconds() as f64 / 86_400.0).ceil().max(0.0) as i64
                })
                .unwrap_or(0);

            let mut vars = HashMap::new();
            vars.insert(
                "first_name".to_string(),
                invoice.first_name.clone().unwrap_or_else(|| "there".to_string()),
            );
            vars.insert("invoice_id".to_string(), invoice.invoice_id.to_string());
            vars.insert("days_past_due".to_string(), days_past_due.to_string());
            vars.insert("balance".to_string(), format!("{:.2}", invoice.balance));

            let rendered =
                match self.renderer.render("invoice_reminder", tenant, Channel::Email, &vars).await
                {
                    Ok(rendered) => rendered,
                    Err(error) => {
                        warn!(tenant_id = %tenant, error = %error, "template render failed");
                        continue;
                    },
                };

            let payload = serde_json::json!({
                "to": email,
                "subject": rendered.subject,
                "body": rendered.body,
                "customer_id": invoice.customer_id,
            });

            let reference = format!("invoice_{}_{}", tenant, invoice.invoice_id);
            self.enqueue(tenant, JobType::SendEmail, payload, reference, &mut report).await;
        }

        Ok(report)
    }

    async fn enqueue(
        &self,
        tenant: &TenantId,
        job_type: JobType,
        payload: serde_json::Value,
        reference: String,
        report: &mut SweepReport,
    ) {
        let job = NewJob::new(tenant.clone(), job_type, payload).with_reference(reference);

        match self.store.insert_job(job).await {
            Ok(InsertOutcome::Inserted(_)) => report.enqueued += 1,
            Ok(InsertOutcome::Skipped) => report.deduplicated += 1,
            Err(error) => warn!(tenant_id = %tenant, error = %error, "failed to enqueue job"),
        }
    }
}
