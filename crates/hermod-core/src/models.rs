//! Domain models and strongly-typed identifiers.
//!
//! Defines the durable communication job, tenant configuration, message
//! templates, and the DMS candidate records produced by the tenant gateway.
//! Newtype ID wrappers carry their database serialization so the rest of
//! the system never handles raw column values.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

type PgDb = sqlx::Postgres;
type PgValueRef<'r> = sqlx::postgres::PgValueRef<'r>;
type PgTypeInfo = sqlx::postgres::PgTypeInfo;
type PgArgumentBuffer = sqlx::postgres::PgArgumentBuffer;
type EncodeResult =
    Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync + 'static>>;
type BoxDynError = sqlx::error::BoxDynError;

/// Strongly-typed job identifier.
///
/// Wraps the `communication_jobs` BIGSERIAL identity. Monotone within a
/// deployment; fallback jobs reference their originating job through it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(pub i64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for JobId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl sqlx::Type<PgDb> for JobId {
    fn type_info() -> PgTypeInfo {
        <i64 as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for JobId {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let id = <i64 as sqlx::Decode<PgDb>>::decode(value)?;
        Ok(Self(id))
    }
}

impl sqlx::Encode<'_, PgDb> for JobId {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <i64 as sqlx::Encode<PgDb>>::encode_by_ref(&self.0, buf)
    }
}

/// Strongly-typed tenant identifier.
///
/// Tenant IDs are opaque strings assigned by the central database. Every
/// job, config row, and DMS pool is scoped by one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TenantId(pub String);

impl TenantId {
    /// Creates a tenant ID from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TenantId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for TenantId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl sqlx::Type<PgDb> for TenantId {
    fn type_info() -> PgTypeInfo {
        <String as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for TenantId {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let id = <String as sqlx::Decode<PgDb>>::decode(value)?;
        Ok(Self(id))
    }
}

impl sqlx::Encode<'_, PgDb> for TenantId {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <String as sqlx::Encode<PgDb>>::encode_by_ref(&self.0, buf)
    }
}

/// The closed set of job types the engine dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Deliver an email through the tenant's email provider.
    SendEmail,
    /// Deliver an SMS through the tenant's SMS provider.
    SendSms,
    /// Resolve the customer's preferred channel, then deliver.
    NotifyCustomer,
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SendEmail => write!(f, "send_email"),
            Self::SendSms => write!(f, "send_sms"),
            Self::NotifyCustomer => write!(f, "notify_customer"),
        }
    }
}

impl sqlx::Type<PgDb> for JobType {
    fn type_info() -> PgTypeInfo {
        <&str as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for JobType {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let s = <&str as sqlx::Decode<PgDb>>::decode(value)?;
        match s {
            "send_email" => Ok(Self::SendEmail),
            "send_sms" => Ok(Self::SendSms),
            "notify_customer" => Ok(Self::NotifyCustomer),
            _ => Err(format!("invalid job type: {s}").into()),
        }
    }
}

impl sqlx::Encode<'_, PgDb> for JobType {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <String as sqlx::Encode<PgDb>>::encode_by_ref(&self.to_string(), buf)
    }
}

/// Job lifecycle status.
///
/// ```text
/// pending -> processing -> complete
///                       -> pending                 (retry / quiet-hour defer)
///                       -> failed
///                       -> failed_fallback_email   (SMS with email companion)
/// ```
///
/// `cancelled` is set administratively, never by the engine. Terminal
/// states have no outgoing transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting to be claimed once `process_after` has passed.
    Pending,
    /// Claimed by exactly one worker.
    Processing,
    /// Delivered, or skipped with a recorded reason.
    Complete,
    /// Retries exhausted.
    Failed,
    /// Withdrawn by an operator.
    Cancelled,
    /// SMS retries exhausted but an email companion job was created.
    FailedFallbackEmail,
}

impl JobStatus {
    /// Whether this status has no outgoing transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed | Self::Cancelled | Self::FailedFallbackEmail)
    }

    /// Whether a row in this status blocks re-enqueue of its
    /// `source_reference`.
    pub fn holds_reference(self) -> bool {
        matches!(self, Self::Pending | Self::Processing | Self::Complete)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Processing => write!(f, "processing"),
            Self::Complete => write!(f, "complete"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::FailedFallbackEmail => write!(f, "failed_fallback_email"),
        }
    }
}

impl sqlx::Type<PgDb> for JobStatus {
    fn type_info() -> PgTypeInfo {
        <&str as sqlx::Type<PgDb>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, PgDb> for JobStatus {
    fn decode(value: PgValueRef<'r>) -> Result<Self, BoxDynError> {
        let s = <&str as sqlx::Decode<PgDb>>::decode(value)?;
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "complete" => Ok(Self::Complete),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            "failed_fallback_email" => Ok(Self::FailedFallbackEmail),
            _ => Err(format!("invalid job status: {s}").into()),
        }
    }
}

impl sqlx::Encode<'_, PgDb> for JobStatus {
    fn encode_by_ref(&self, buf: &mut PgArgumentBuffer) -> EncodeResult {
        <String as sqlx::Encode<PgDb>>::encode_by_ref(&self.to_string(), buf)
    }
}

/// A durable unit of outbound work, one row in `communication_jobs`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Job {
    /// Unique identifier.
    pub id: JobId,

    /// Tenant that owns this job.
    pub tenant_id: TenantId,

    /// Handler to dispatch to.
    pub job_type: JobType,

    /// Structured payload; shape depends on `job_type`.
    pub payload: sqlx::types::Json<serde_json::Value>,

    /// Current lifecycle status.
    pub status: JobStatus,

    /// Failed attempts so far. Quiet-hour deferral does not touch this.
    pub retry_count: i32,

    /// Attempt bound for this row.
    pub max_retries: i32,

    /// Most recent diagnostic, or the completion note.
    pub last_error: Option<String>,

    /// The job is invisible to the claim primitive until this instant.
    /// NULL means immediately claimable.
    pub process_after: Option<DateTime<Utc>>,

    /// Idempotency key scoped by `(tenant_id, job_type)`.
    pub source_reference: Option<String>,

    /// When the row was inserted.
    pub created_at: DateTime<Utc>,

    /// When the row last changed.
    pub updated_at: DateTime<Utc>,

    /// When the job reached `complete`.
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// The payload as a JSON value.
    pub fn payload(&self) -> &serde_json::Value {
        &self.payload.0
    }

    /// Whether the payload bypasses the quiet-hour gate.
    pub fn is_urgent(&self) -> bool {
        self.payload.0.get("urgent").and_then(serde_json::Value::as_bool).unwrap_or(false)
    }

    /// The `customer_id` carried in the payload, if any.
    pub fn payload_customer_id(&self) -> Option<i64> {
        self.payload.0.get("customer_id").and_then(serde_json::Value::as_i64)
    }
}

/// A job to be inserted into the queue.
#[derive(Debug, Clone)]
pub struct NewJob {
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Handler to dispatch to.
    pub job_type: JobType,
    /// Structured payload.
    pub payload: serde_json::Value,
    /// Earliest claimable instant; `None` means immediately.
    pub process_after: Option<DateTime<Utc>>,
    /// Idempotency key. Also mirrored into the payload on insert.
    pub source_reference: Option<String>,
}

impl NewJob {
    /// Creates a job with an empty schedule and no idempotency key.
    pub fn new(tenant_id: impl Into<TenantId>, job_type: JobType, payload: serde_json::Value) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            job_type,
            payload,
            process_after: None,
            source_reference: None,
        }
    }

    /// Sets the idempotency key.
    #[must_use]
    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.source_reference = Some(reference.into());
        self
    }

    /// Defers the job until the given instant.
    #[must_use]
    pub fn with_process_after(mut self, at: DateTime<Utc>) -> Self {
        self.process_after = Some(at);
        self
    }
}

/// Outcome of [`crate::ports::JobStore::insert_job`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new row was created.
    Inserted(JobId),
    /// A non-terminal row already holds the same
    /// `(tenant, job_type, source_reference)`.
    Skipped,
}

impl InsertOutcome {
    /// The created job id, if a row was inserted.
    pub fn job_id(self) -> Option<JobId> {
        match self {
            Self::Inserted(id) => Some(id),
            Self::Skipped => None,
        }
    }
}

/// Per-tenant configuration loaded from `tenant_configs`.
///
/// Credentials are optional at the type level; the adapters validate the
/// fields they need and surface a configuration error otherwise.
#[derive(Debug, Clone, Default, Serialize, Deserialize, sqlx::FromRow)]
pub struct TenantConfig {
    /// Owning tenant.
    pub tenant_id: TenantId,

    /// Twilio account SID.
    pub twilio_sid: Option<String>,
    /// Twilio auth token.
    pub twilio_auth_token: Option<String>,
    /// Default SMS sender number.
    pub twilio_from_number: Option<String>,

    /// SendGrid API key.
    pub sendgrid_key: Option<String>,
    /// Default email sender for SendGrid.
    pub sendgrid_from: Option<String>,

    /// Email provider selector: `sendgrid` (default) or `resend`.
    pub email_provider: Option<String>,
    /// Resend API key.
    pub resend_key: Option<String>,
    /// Default email sender for Resend.
    pub resend_from: Option<String>,

    /// Start of the quiet-hour window, `HH:MM`.
    pub quiet_hours_start: Option<String>,
    /// End of the quiet-hour window, `HH:MM`. May wrap past midnight.
    pub quiet_hours_end: Option<String>,

    /// Base URL of the tenant's service API (attachment fetching).
    pub api_base_url: Option<String>,
    /// Display name used in message templates.
    pub company_name: Option<String>,

    /// Connection string of the tenant's DMS database.
    pub dms_connection_string: Option<String>,
}

/// A message template row from `message_templates`.
///
/// Rows with a NULL `tenant_id` are global defaults; tenant-specific rows
/// shadow them.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MessageTemplate {
    /// Row identifier.
    pub id: i64,
    /// Owning tenant, or `None` for the global default.
    pub tenant_id: Option<TenantId>,
    /// Event type this template renders, e.g. `service_reminder`.
    pub event_type: String,
    /// Channel the template targets: `email` or `sms`.
    pub communication_type: String,
    /// Subject line with `{{variable}}` placeholders.
    pub subject_template: String,
    /// Plain-text body with `{{variable}}` placeholders.
    pub body_text_template: String,
    /// Optional HTML body.
    pub body_html_template: Option<String>,
    /// Inactive templates are ignored by the renderer.
    pub is_active: bool,
}

/// A customer due for a two-year service reminder.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ServiceReminderCandidate {
    /// DMS customer id.
    pub customer_id: i64,
    /// Customer email; the finder only returns rows where one exists.
    pub email: Option<String>,
    /// Customer first name.
    pub first_name: Option<String>,
    /// Customer last name.
    pub last_name: Option<String>,
    /// Equipment model from the sale.
    pub model: Option<String>,
    /// Equipment serial number.
    pub serial_number: Option<String>,
}

/// An appointment entering the 24–25 hour confirmation window.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AppointmentCandidate {
    /// DMS appointment id.
    pub appointment_id: i64,
    /// DMS customer id.
    pub customer_id: i64,
    /// Scheduled start of the appointment.
    pub scheduled_start: Option<DateTime<Utc>>,
    /// Customer mobile phone.
    pub phone: Option<String>,
    /// Customer first name.
    pub first_name: Option<String>,
}

/// An invoice at least 30 days past due with an open balance.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PastDueInvoice {
    /// DMS invoice id.
    pub invoice_id: i64,
    /// DMS customer id.
    pub customer_id: i64,
    /// Invoice due date.
    pub due_date: Option<DateTime<Utc>>,
    /// Open balance in dollars.
    pub balance: f64,
    /// Customer email.
    pub email: Option<String>,
    /// Customer first name.
    pub first_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_status_display_matches_database_values() {
        assert_eq!(JobStatus::Pending.to_string(), "pending");
        assert_eq!(JobStatus::Processing.to_string(), "processing");
        assert_eq!(JobStatus::Complete.to_string(), "complete");
        assert_eq!(JobStatus::Failed.to_string(), "failed");
        assert_eq!(JobStatus::Cancelled.to_string(), "cancelled");
        assert_eq!(JobStatus::FailedFallbackEmail.to_string(), "failed_fallback_email");
    }

    #[test]
    fn terminal_statuses_do_not_hold_references() {
        for status in [JobStatus::Failed, JobStatus::Cancelled, JobStatus::FailedFallbackEmail] {
            assert!(status.is_terminal());
            assert!(!status.holds_reference());
        }
        // Complete is terminal yet still blocks re-enqueue of its reference.
        assert!(JobStatus::Complete.is_terminal());
        assert!(JobStatus::Complete.holds_reference());
    }

    #[test]
    fn urgent_flag_read_from_payload() {
        let payload = serde_json::json!({"to": "+15550100", "body": "x", "urgent": true});
        let job = sample_job(payload);
        assert!(job.is_urgent());

        let job = sample_job(serde_json::json!({"to": "+15550100", "body": "x"}));
        assert!(!job.is_urgent());
    }

    fn sample_job(payload: serde_json::Value) -> Job {
        let now = Utc::now();
        Job {
            id: JobId(1),
            tenant_id: TenantId::new("t1"),
            job_type: JobType::SendSms,
            payload: sqlx::types::Json(payload),
            status: JobStatus::Pending,
            retry_count: 0,
            max_retries: 3,
            last_error: None,
            process_after: None,
            source_reference: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }
}
