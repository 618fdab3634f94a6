//! Capability ports consumed by the engine and scheduler.
//!
//! Each port is a small trait: the job store, the read surfaces of the
//! tenant gateway, the channel messengers, the template renderer, and the
//! attachment fetcher. Production implementations live in the storage,
//! tenant, and provider crates; tests substitute in-memory versions.

use std::{collections::HashMap, fmt, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    error::Result,
    models::{
        AppointmentCandidate, InsertOutcome, Job, JobId, JobStatus, NewJob, PastDueInvoice,
        ServiceReminderCandidate, TenantConfig, TenantId,
    },
};

/// Transactional primitives over the `communication_jobs` queue.
///
/// The claim primitive must be safe across concurrent callers: two workers
/// polling simultaneously never receive the same row.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Atomically claims up to `limit` claimable jobs, FIFO by
    /// `(created_at, id)`, transitioning them to `processing`.
    ///
    /// `limit == 0` returns empty without touching the store.
    async fn claim_pending(&self, limit: usize) -> Result<Vec<Job>>;

    /// Marks a job complete, recording the skip reason if any.
    async fn mark_complete(&self, id: JobId, note: Option<&str>) -> Result<()>;

    /// Reschedules a job; used for both retry and quiet-hour deferral.
    async fn reschedule(
        &self,
        id: JobId,
        retry_count: i32,
        process_after: DateTime<Utc>,
        last_error: &str,
        status: JobStatus,
    ) -> Result<()>;

    /// Terminal transition. `status` is `failed`, or
    /// `failed_fallback_email` when a companion job was created.
    async fn mark_failed(&self, id: JobId, last_error: &str, status: JobStatus) -> Result<()>;

    /// Inserts a new job, short-circuiting to [`InsertOutcome::Skipped`]
    /// when a non-terminal row already holds the same
    /// `(tenant, job_type, source_reference)`.
    async fn insert_job(&self, job: NewJob) -> Result<InsertOutcome>;
}

/// How a customer has asked to be contacted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactPreference {
    /// Prefers email.
    Email,
    /// Prefers SMS.
    Sms,
    /// Prefers phone; routed to the SMS channel.
    Phone,
    /// Authoritative opt-out. Handlers skip the job.
    DoNotContact,
}

impl ContactPreference {
    /// Parses the DMS column value. Unknown values are treated as unset.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "email" => Some(Self::Email),
            "sms" => Some(Self::Sms),
            "phone" => Some(Self::Phone),
            "do_not_contact" => Some(Self::DoNotContact),
            _ => None,
        }
    }
}

/// Contact data for one DMS customer.
#[derive(Debug, Clone, Default)]
pub struct CustomerContact {
    /// DMS customer id.
    pub customer_id: i64,
    /// Email address, if on file.
    pub email: Option<String>,
    /// Mobile phone, if on file.
    pub phone: Option<String>,
    /// Explicit channel preference.
    pub contact_preference: Option<ContactPreference>,
    /// Customer-requested contact embargo.
    pub do_not_disturb_until: Option<DateTime<Utc>>,
}

/// Customer contact lookups against a tenant's DMS.
#[async_trait]
pub trait CustomerDirectory: Send + Sync {
    /// Fetches contact data for a customer, or `None` if unknown.
    async fn customer_contact(
        &self,
        tenant: &TenantId,
        customer_id: i64,
    ) -> Result<Option<CustomerContact>>;

    /// The customer's explicit contact preference. `DoNotContact` is
    /// authoritative.
    async fn contact_preference(
        &self,
        tenant: &TenantId,
        customer_id: i64,
    ) -> Result<Option<ContactPreference>> {
        Ok(self.customer_contact(tenant, customer_id).await?.and_then(|c| c.contact_preference))
    }

    /// The email to fall back to when SMS delivery exhausts its retries.
    async fn fallback_email(
        &self,
        tenant: &TenantId,
        customer_id: i64,
    ) -> Result<Option<String>> {
        Ok(self.customer_contact(tenant, customer_id).await?.and_then(|c| c.email))
    }
}

/// Cached access to per-tenant configuration.
#[async_trait]
pub trait TenantConfigSource: Send + Sync {
    /// Loads the tenant's configuration; unknown tenants are an error.
    async fn config(&self, tenant: &TenantId) -> Result<Arc<TenantConfig>>;
}

/// Enumeration of configured tenants.
#[async_trait]
pub trait TenantDirectory: Send + Sync {
    /// Lists all tenant ids from the central config table.
    async fn list_tenants(&self) -> Result<Vec<TenantId>>;
}

/// The candidate finder queries the scheduler sweeps over.
///
/// Finders are read-only and re-computed each sweep; deduplication happens
/// entirely in [`JobStore::insert_job`].
#[async_trait]
pub trait CandidateSource: Send + Sync {
    /// Sales 23–25 months old whose customer has an email on file.
    async fn service_reminder_candidates(
        &self,
        tenant: &TenantId,
    ) -> Result<Vec<ServiceReminderCandidate>>;

    /// Appointments starting 24–25 hours from now.
    async fn appointments_in_confirmation_window(
        &self,
        tenant: &TenantId,
    ) -> Result<Vec<AppointmentCandidate>>;

    /// Invoices 30+ days past due with an open balance.
    async fn past_due_invoices(&self, tenant: &TenantId) -> Result<Vec<PastDueInvoice>>;
}

/// An email ready for a provider adapter.
#[derive(Debug, Clone, Default)]
pub struct EmailMessage {
    /// Recipient address.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// Plain-text body.
    pub body: String,
    /// Optional HTML body.
    pub html_body: Option<String>,
    /// Sender override; adapters fall back to the tenant default.
    pub from: Option<String>,
    /// Carbon-copy recipients.
    pub cc: Vec<String>,
    /// Blind-carbon-copy recipients.
    pub bcc: Vec<String>,
    /// Reply-to address.
    pub reply_to: Option<String>,
    /// Resolved attachments.
    pub attachments: Vec<EmailAttachment>,
}

/// A fully resolved attachment handed to the email messenger.
#[derive(Debug, Clone)]
pub struct EmailAttachment {
    /// File name shown to the recipient.
    pub filename: String,
    /// MIME type.
    pub content_type: String,
    /// Raw content bytes.
    pub content: Bytes,
}

/// An SMS ready for a provider adapter.
#[derive(Debug, Clone, Default)]
pub struct SmsMessage {
    /// Recipient phone number.
    pub to: String,
    /// Message body.
    pub body: String,
    /// Sender override; adapters fall back to the tenant default number.
    pub from: Option<String>,
}

/// Delivery outcome returned by messenger adapters.
#[derive(Debug, Clone, Default)]
pub struct SendOutcome {
    /// Provider-assigned message id, when the provider reports one.
    pub message_id: Option<String>,
}

/// Email channel adapter.
#[async_trait]
pub trait EmailMessenger: Send + Sync {
    /// Sends an email using the tenant's credentials.
    async fn send(&self, message: &EmailMessage, config: &TenantConfig) -> Result<SendOutcome>;
}

/// SMS channel adapter.
#[async_trait]
pub trait SmsMessenger: Send + Sync {
    /// Sends an SMS using the tenant's credentials.
    async fn send(&self, message: &SmsMessage, config: &TenantConfig) -> Result<SendOutcome>;
}

/// Outbound channel discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Email delivery.
    Email,
    /// SMS delivery.
    Sms,
}

impl Channel {
    /// Parses a payload channel hint. `phone` maps to SMS.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "email" => Some(Self::Email),
            "sms" | "phone" => Some(Self::Sms),
            _ => None,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Email => write!(f, "email"),
            Self::Sms => write!(f, "sms"),
        }
    }
}

/// Rendered message content produced by the template port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedMessage {
    /// Subject line; empty for SMS.
    pub subject: String,
    /// Plain-text body.
    pub body: String,
    /// Optional HTML body.
    pub html_body: Option<String>,
}

/// Source of rendered subject/body keyed by event type.
#[async_trait]
pub trait TemplateRenderer: Send + Sync {
    /// Renders the template for `event_type` with the given variables,
    /// preferring a tenant-specific template over the global default.
    async fn render(
        &self,
        event_type: &str,
        tenant: &TenantId,
        channel: Channel,
        vars: &HashMap<String, String>,
    ) -> Result<RenderedMessage>;
}

/// Reference to a document served by the tenant's service API.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DocumentRef {
    /// Sales invoice / receipt PDF.
    Invoice {
        /// Invoice or receipt id.
        id: String,
    },
    /// Work order PDF.
    WorkOrder {
        /// Work order id.
        id: String,
    },
}

/// Bytes-producing port for attachment documents.
///
/// Consumed by the email handler before the job is handed to the
/// messenger. A missing document (`Ok(None)`) is not an error; the
/// attachment is simply dropped.
#[async_trait]
pub trait AttachmentFetcher: Send + Sync {
    /// Fetches the referenced document, or `None` when it does not exist.
    async fn fetch(&self, config: &TenantConfig, reference: &DocumentRef) -> Result<Option<Bytes>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contact_preference_parses_known_values() {
        assert_eq!(ContactPreference::parse("email"), Some(ContactPreference::Email));
        assert_eq!(ContactPreference::parse("sms"), Some(ContactPreference::Sms));
        assert_eq!(ContactPreference::parse("phone"), Some(ContactPreference::Phone));
        assert_eq!(
            ContactPreference::parse("do_not_contact"),
            Some(ContactPreference::DoNotContact)
        );
        assert_eq!(ContactPreference::parse("carrier pigeon"), None);
    }

    #[test]
    fn channel_hint_maps_phone_to_sms() {
        assert_eq!(Channel::parse("phone"), Some(Channel::Sms));
        assert_eq!(Channel::parse("sms"), Some(Channel::Sms));
        assert_eq!(Channel::parse("email"), Some(Channel::Email));
        assert_eq!(Channel::parse("fax"), None);
    }

    #[test]
    fn document_ref_serializes_with_kind_tag() {
        let doc = DocumentRef::Invoice { id: "R-1001".to_string() };
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json, serde_json::json!({"kind": "invoice", "id": "R-1001"}));
    }
}
