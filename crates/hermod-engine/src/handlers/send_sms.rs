//! Handler for `send_sms` jobs.

use hermod_core::{CoreError, Job, Result, SmsMessage};

use crate::payloads::{self, SmsPayload};

use super::{HandlerContext, HandlerOutcome};

pub(super) async fn handle(job: &Job, ctx: &HandlerContext<'_>) -> Result<HandlerOutcome> {
    let payload: SmsPayload = payloads::parse(job)?;

    let to = payload
        .to
        .filter(|v| !v.is_empty())
        .ok_or_else(|| CoreError::invalid_payload("SMS payload missing \"to\""))?;
    let body = payload
        .body
        .filter(|v| !v.is_empty())
        .ok_or_else(|| CoreError::invalid_payload("SMS payload missing \"body\""))?;

    let from = payload
        .from
        .or_else(|| ctx.tenant_config.twilio_from_number.clone())
        .ok_or_else(|| {
            CoreError::missing_contact(
                "SMS payload missing \"from\" and tenant has no default number",
            )
        })?;

    let message = SmsMessage { to, body, from: Some(from) };
    let outcome = ctx.sms.send(&message, ctx.tenant_config).await?;

    Ok(HandlerOutcome::Delivered { message_id: outcome.message_id })
}

#[cfg(test)]
mod tests {
    use hermod_core::JobType;
    use hermod_testing::{
        tenant_config, NullAttachmentFetcher, ScriptedEmailMessenger, ScriptedSmsMessenger,
        StaticDirectory,
    };

    use super::*;
    use crate::handlers::test_support::job;

    #[tokio::test]
    async fn sends_with_tenant_default_from_number() {
        let sms = ScriptedSmsMessenger::new();
        let email = ScriptedEmailMessenger::new();
        let directory = StaticDirectory::new();
        let config = tenant_config("t1");
        let ctx = HandlerContext {
            tenant_config: &config,
            directory: &directory,
            email: &email,
            sms: &sms,
            attachments: &NullAttachmentFetcher,
        };

        let job = job(JobType::SendSms, serde_json::json!({"to": "+15550123", "body": "hi"}));
        let outcome = handle(&job, &ctx).await.unwrap();

        assert!(matches!(outcome, HandlerOutcome::Delivered { .. }));
        let sent = sms.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].from.as_deref(), Some("+15550100"));
    }

    #[tokio::test]
    async fn missing_to_is_an_invalid_payload() {
        let sms = ScriptedSmsMessenger::new();
        let email = ScriptedEmailMessenger::new();
        let directory = StaticDirectory::new();
        let config = tenant_config("t1");
        let ctx = HandlerContext {
            tenant_config: &config,
            directory: &directory,
            email: &email,
            sms: &sms,
            attachments: &NullAttachmentFetcher,
        };

        let job = job(JobType::SendSms, serde_json::json!({"body": "hi"}));
        let err = handle(&job, &ctx).await.unwrap_err();

        assert!(err.to_string().contains("missing \"to\""));
        assert!(sms.sent().is_empty());
    }

    #[tokio::test]
    async fn missing_from_number_everywhere_is_an_error() {
        let sms = ScriptedSmsMessenger::new();
        let email = ScriptedEmailMessenger::new();
        let directory = StaticDirectory::new();
        let mut config = tenant_config("t1");
        config.twilio_from_number = None;
        let ctx = HandlerContext {
            tenant_config: &config,
            directory: &directory,
            email: &email,
            sms: &sms,
            attachments: &NullAttachmentFetcher,
        };

        let job = job(JobType::SendSms, serde_json::json!({"to": "+15550123", "body": "hi"}));
        let err = handle(&job, &ctx).await.unwrap_err();

        assert!(err.to_string().contains("no default number"));
    }
}
