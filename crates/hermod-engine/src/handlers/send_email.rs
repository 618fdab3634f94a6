//! Handler for `send_email` jobs.
//!
//! Attachments are resolved before the messenger is called: inline base64
//! content is decoded, document references go through the attachment
//! fetcher. A document that no longer exists drops the attachment rather
//! than failing the job.

use base64::Engine as _;
use bytes::Bytes;
use hermod_core::{CoreError, EmailAttachment, EmailMessage, Job, Result};
use tracing::warn;

use crate::payloads::{self, AttachmentSpec, EmailPayload};

use super::{HandlerContext, HandlerOutcome};

pub(super) async fn handle(job: &Job, ctx: &HandlerContext<'_>) -> Result<HandlerOutcome> {
    let payload: EmailPayload = payloads::parse(job)?;

    let to = payload
        .to
        .filter(|v| !v.is_empty())
        .ok_or_else(|| CoreError::invalid_payload("email payload missing \"to\""))?;
    let subject = payload
        .subject
        .filter(|v| !v.is_empty())
        .ok_or_else(|| CoreError::invalid_payload("email payload missing \"subject\""))?;
    let body = payload
        .body
        .filter(|v| !v.is_empty())
        .ok_or_else(|| CoreError::invalid_payload("email payload missing \"body\""))?;

    let attachments = resolve_attachments(job, &payload.attachments, ctx).await?;

    let message = EmailMessage {
        to,
        subject,
        body,
        html_body: payload.html_body,
        from: payload.from,
        cc: payload.cc,
        bcc: payload.bcc,
        reply_to: payload.reply_to,
        attachments,
    };

    let outcome = ctx.email.send(&message, ctx.tenant_config).await?;

    Ok(HandlerOutcome::Delivered { message_id: outcome.message_id })
}

async fn resolve_attachments(
    job: &Job,
    specs: &[AttachmentSpec],
    ctx: &HandlerContext<'_>,
) -> Result<Vec<EmailAttachment>> {
    let mut resolved = Vec::with_capacity(specs.len());

    for spec in specs {
        if let Some(encoded) = &spec.bytes {
            let content = base64::engine::general_purpose::STANDARD
                .decode(encoded)
                .map_err(|e| {
                    CoreError::invalid_payload(format!(
                        "attachment {} has invalid base64 content: {e}",
                        spec.filename
                    ))
                })?;

            resolved.push(EmailAttachment {
                filename: spec.filename.clone(),
                content_type: spec
                    .content_type
                    .clone()
                    .unwrap_or_else(|| "application/octet-stream".to_string()),
                content: Bytes::from(content),
            });
            continue;
        }

        if let Some(document) = &spec.document {
            match ctx.attachments.fetch(ctx.tenant_config, document).await? {
                Some(content) => resolved.push(EmailAttachment {
                    filename: spec.filename.clone(),
                    content_type: spec
                        .content_type
                        .clone()
                        .unwrap_or_else(|| "application/pdf".to_string()),
                    content,
                }),
                None => warn!(
                    job_id = %job.id,
                    filename = %spec.filename,
                    "attachment document not found, sending without it"
                ),
            }
            continue;
        }

        return Err(CoreError::invalid_payload(format!(
            "attachment {} has neither content nor a document reference",
            spec.filename
        )));
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use hermod_core::{DocumentRef, JobType};
    use hermod_testing::{
        tenant_config, NullAttachmentFetcher, ScriptedEmailMessenger, ScriptedSmsMessenger,
        StaticAttachmentFetcher, StaticDirectory,
    };

    use super::*;
    use crate::handlers::test_support::job;

    #[tokio::test]
    async fn sends_simple_email() {
        let email = ScriptedEmailMessenger::new();
        let sms = ScriptedSmsMessenger::new();
        let directory = StaticDirectory::new();
        let config = tenant_config("t1");
        let ctx = HandlerContext {
            tenant_config: &config,
            directory: &directory,
            email: &email,
            sms: &sms,
            attachments: &NullAttachmentFetcher,
        };

        let job = job(
            JobType::SendEmail,
            serde_json::json!({"to": "a@b", "subject": "Hi", "body": "x"}),
        );
        let outcome = handle(&job, &ctx).await.unwrap();

        assert!(matches!(outcome, HandlerOutcome::Delivered { .. }));
        assert_eq!(email.sent().len(), 1);
        assert_eq!(email.sent()[0].subject, "Hi");
    }

    #[tokio::test]
    async fn missing_subject_is_an_invalid_payload() {
        let email = ScriptedEmailMessenger::new();
        let sms = ScriptedSmsMessenger::new();
        let directory = StaticDirectory::new();
        let config = tenant_config("t1");
        let ctx = HandlerContext {
            tenant_config: &config,
            directory: &directory,
            email: &email,
            sms: &sms,
            attachments: &NullAttachmentFetcher,
        };

        let job = job(JobType::SendEmail, serde_json::json!({"to": "a@b", "body": "x"}));
        let err = handle(&job, &ctx).await.unwrap_err();

        assert!(err.to_string().contains("missing \"subject\""));
    }

    #[tokio::test]
    async fn decodes_inline_attachment_and_fetches_documents() {
        let email = ScriptedEmailMessenger::new();
        let sms = ScriptedSmsMessenger::new();
        let directory = StaticDirectory::new();
        let fetcher = StaticAttachmentFetcher::new();
        fetcher.insert(DocumentRef::Invoice { id: "R-9".to_string() }, &b"%PDF-1.7 fake"[..]);
        let config = tenant_config("t1");
        let ctx = HandlerContext {
            tenant_config: &config,
            directory: &directory,
            email: &email,
            sms: &sms,
            attachments: &fetcher,
        };

        let job = job(
            JobType::SendEmail,
            serde_json::json!({
                "to": "a@b", "subject": "Receipt", "body": "attached",
                "attachments": [
                    {"filename": "note.txt", "bytes": "aGVsbG8=", "content_type": "text/plain"},
                    {"filename": "receipt.pdf", "document": {"kind": "invoice", "id": "R-9"}},
                    {"filename": "gone.pdf", "document": {"kind": "invoice", "id": "R-404"}}
                ]
            }),
        );
        handle(&job, &ctx).await.unwrap();

        let sent = email.sent();
        assert_eq!(sent[0].attachments.len(), 2, "missing document is dropped");
        assert_eq!(sent[0].attachments[0].content.as_ref(), b"hello");
        assert_eq!(sent[0].attachments[1].content_type, "application/pdf");
    }

    #[tokio::test]
    async fn attachment_without_content_or_reference_fails() {
        let email = ScriptedEmailMessenger::new();
        let sms = ScriptedSmsMessenger::new();
        let directory = StaticDirectory::new();
        let config = tenant_config("t1");
        let ctx = HandlerContext {
            tenant_config: &config,
            directory: &directory,
            email: &email,
            sms: &sms,
            attachments: &NullAttachmentFetcher,
        };

        let job = job(
            JobType::SendEmail,
            serde_json::json!({
                "to": "a@b", "subject": "Hi", "body": "x",
                "attachments": [{"filename": "empty.bin"}]
            }),
        );
        let err = handle(&job, &ctx).await.unwrap_err();

        assert!(err.to_string().contains("neither content nor a document reference"));
    }
}
