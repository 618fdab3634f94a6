//! Typed views over job payloads.
//!
//! Payloads are stored as JSON; each handler deserializes the shape it
//! needs and validates required fields itself so diagnostics name the
//! missing key instead of surfacing a serde parse trace.

use hermod_core::{CoreError, DocumentRef, Job, Result};
use serde::Deserialize;

/// Payload of a `send_email` job.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EmailPayload {
    /// Recipient address.
    pub to: Option<String>,
    /// Subject line.
    pub subject: Option<String>,
    /// Plain-text body.
    pub body: Option<String>,
    /// Optional HTML body.
    pub html_body: Option<String>,
    /// Sender override.
    pub from: Option<String>,
    /// Carbon-copy recipients.
    #[serde(default)]
    pub cc: Vec<String>,
    /// Blind-carbon-copy recipients.
    #[serde(default)]
    pub bcc: Vec<String>,
    /// Reply-to address.
    pub reply_to: Option<String>,
    /// Attachment specifications.
    #[serde(default)]
    pub attachments: Vec<AttachmentSpec>,
    /// DMS customer the message concerns.
    pub customer_id: Option<i64>,
    /// Originating job for fallback companions.
    pub source_job_id: Option<i64>,
    /// Idempotency key mirror.
    pub source_reference: Option<String>,
    /// Quiet-hour bypass.
    #[serde(default)]
    pub urgent: bool,
}

/// One attachment in a `send_email` payload.
///
/// Either inline base64 `bytes` or a `document` reference resolved through
/// the attachment fetcher before the messenger is called.
#[derive(Debug, Clone, Deserialize)]
pub struct AttachmentSpec {
    /// File name shown to the recipient.
    pub filename: String,
    /// MIME type; defaults depend on the content source.
    pub content_type: Option<String>,
    /// Inline content, base64-encoded.
    pub bytes: Option<String>,
    /// Document reference for the attachment fetcher.
    pub document: Option<DocumentRef>,
}

/// Payload of a `send_sms` job.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SmsPayload {
    /// Recipient phone number.
    pub to: Option<String>,
    /// Message body.
    pub body: Option<String>,
    /// Sender number override.
    pub from: Option<String>,
    /// DMS customer the message concerns; enables the email fallback.
    pub customer_id: Option<i64>,
    /// Subject carried over to a fallback email.
    pub subject: Option<String>,
    /// Idempotency key mirror.
    pub source_reference: Option<String>,
    /// Quiet-hour bypass.
    #[serde(default)]
    pub urgent: bool,
}

/// Payload of a `notify_customer` job.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotifyPayload {
    /// DMS customer to notify.
    pub customer_id: Option<i64>,
    /// Message body.
    pub body: Option<String>,
    /// Subject used when the email channel is chosen.
    pub subject: Option<String>,
    /// Caller channel hint, consulted after the DMS preference.
    pub preferred_channel: Option<String>,
    /// Last-resort channel when nothing else resolves.
    pub fallback_channel: Option<String>,
    /// Quiet-hour bypass.
    #[serde(default)]
    pub urgent: bool,
}

/// Deserializes a job payload into a typed view.
pub fn parse<T: serde::de::DeserializeOwned>(job: &Job) -> Result<T> {
    serde_json::from_value(job.payload().clone())
        .map_err(|e| CoreError::invalid_payload(format!("{} payload: {e}", job.job_type)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_payload_accepts_full_shape() {
        let value = serde_json::json!({
            "to": "a@b",
            "subject": "Hi",
            "body": "x",
            "html_body": "<p>x</p>",
            "cc": ["c@d"],
            "reply_to": "r@s",
            "attachments": [
                {"filename": "receipt.pdf", "bytes": "JVBERi0=", "content_type": "application/pdf"},
                {"filename": "wo.pdf", "document": {"kind": "work_order", "id": "77"}}
            ],
            "customer_id": 42,
            "urgent": true
        });

        let payload: EmailPayload = serde_json::from_value(value).unwrap();
        assert_eq!(payload.to.as_deref(), Some("a@b"));
        assert_eq!(payload.cc, vec!["c@d".to_string()]);
        assert_eq!(payload.attachments.len(), 2);
        assert!(payload.attachments[0].bytes.is_some());
        assert_eq!(
            payload.attachments[1].document,
            Some(DocumentRef::WorkOrder { id: "77".to_string() })
        );
        assert!(payload.urgent);
    }

    #[test]
    fn sms_payload_tolerates_extra_keys() {
        let value = serde_json::json!({
            "to": "+15550123",
            "body": "hello",
            "source_reference": "appointment_t1_9",
            "campaign": "ignored"
        });

        let payload: SmsPayload = serde_json::from_value(value).unwrap();
        assert_eq!(payload.to.as_deref(), Some("+15550123"));
        assert!(!payload.urgent);
    }
}
