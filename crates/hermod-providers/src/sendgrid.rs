//! SendGrid email adapter.

use async_trait::async_trait;
use base64::Engine as _;
use hermod_core::{CoreError, EmailMessage, EmailMessenger, Result, SendOutcome, TenantConfig};
use tracing::{debug, info_span, Instrument};
use uuid::Uuid;

use crate::{response_excerpt, PROVIDER_TIMEOUT};

const SENDGRID_API_BASE: &str = "https://api.sendgrid.com";

/// Fallback sender when neither the payload nor the tenant names one.
const DEFAULT_FROM: &str = "no-reply@example.com";

/// Email messenger backed by the SendGrid v3 mail API.
#[derive(Debug, Clone)]
pub struct SendGridMailer {
    client: reqwest::Client,
    base_url: String,
}

impl SendGridMailer {
    /// Creates the adapter with a pooled HTTP client.
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(PROVIDER_TIMEOUT)
            .build()
            .map_err(|e| CoreError::configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, base_url: SENDGRID_API_BASE.to_string() })
    }

    /// Points the adapter at a different API base. Used by tests.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn build_payload(message: &EmailMessage, from: &str) -> serde_json::Value {
        let mut personalization = serde_json::json!({
            "to": [{"email": message.to}],
        });
        if !message.cc.is_empty() {
            personalization["cc"] = message
                .cc
                .iter()
                .map(|email| serde_json::json!({"email": email}))
                .collect();
        }
        if !message.bcc.is_empty() {
            personalization["bcc"] = message
                .bcc
                .iter()
                .map(|email| serde_json::json!({"email": email}))
                .collect();
        }

        let mut content = vec![serde_json::json!({
            "type": "text/plain",
            "value": message.body,
        })];
        if let Some(html) = &message.html_body {
            content.push(serde_json::json!({"type": "text/html", "value": html}));
        }

        let mut payload = serde_json::json!({
            "personalizations": [personalization],
            "from": {"email": from},
            "subject": message.subject,
            "content": content,
        });

        if let Some(reply_to) = &message.reply_to {
            payload["reply_to"] = serde_json::json!({"email": reply_to});
        }

        if !message.attachments.is_empty() {
            payload["attachments"] = message
                .attachments
                .iter()
                .map(|attachment| {
                    serde_json::json!({
                        "content": base64::engine::general_purpose::STANDARD
                            .encode(&attachment.content),
                        "filename": attachment.filename,
                        "type": attachment.content_type,
                    })
                })
                .collect();
        }

        payload
    }
}

#[async_trait]
impl EmailMessenger for SendGridMailer {
    async fn send(&self, message: &EmailMessage, config: &TenantConfig) -> Result<SendOutcome> {
        let api_key = config
            .sendgrid_key
            .as_deref()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| CoreError::configuration("missing SendGrid API key"))?;

        let from = message
            .from
            .as_deref()
            .or(config.sendgrid_from.as_deref())
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_FROM);

        let span = info_span!(
            "sendgrid_send",
            delivery_id = %Uuid::new_v4(),
            tenant_id = %config.tenant_id,
            to = %message.to
        );

        async move {
            debug!("sending email via SendGrid");

            let response = self
                .client
                .post(format!("{}/v3/mail/send", self.base_url))
                .bearer_auth(api_key)
                .json(&Self::build_payload(message, from))
                .send()
                .await
                .map_err(|e| CoreError::provider(format!("failed to send email: {e}")))?;

            let status = response.status();
            let message_id = response
                .headers()
                .get("x-message-id")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            let body = response.text().await.unwrap_or_default();

            if !status.is_success() {
                return Err(CoreError::provider(format!(
                    "SendGrid returned status {status}: {}",
                    response_excerpt(&body)
                )));
            }

            Ok(SendOutcome { message_id })
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use hermod_core::{EmailAttachment, TenantId};
    use wiremock::{
        matchers::{body_partial_json, header, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;

    fn config() -> TenantConfig {
        TenantConfig {
            tenant_id: TenantId::new("t1"),
            sendgrid_key: Some("SG.key".to_string()),
            sendgrid_from: Some("service@dealer.example".to_string()),
            ..TenantConfig::default()
        }
    }

    #[tokio::test]
    async fn sends_personalized_payload_with_attachment() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v3/mail/send"))
            .and(header("authorization", "Bearer SG.key"))
            .and(body_partial_json(serde_json::json!({
                "from": {"email": "service@dealer.example"},
                "subject": "Receipt",
                "attachments": [{"filename": "receipt.pdf", "content": "JVBERg=="}],
            })))
            .respond_with(
                ResponseTemplate::new(202).insert_header("x-message-id", "sg-msg-1"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let adapter = SendGridMailer::new().unwrap().with_base_url(server.uri());
        let message = EmailMessage {
            to: "a@b".to_string(),
            subject: "Receipt".to_string(),
            body: "attached".to_string(),
            attachments: vec![EmailAttachment {
                filename: "receipt.pdf".to_string(),
                content_type: "application/pdf".to_string(),
                content: Bytes::from_static(b"%PDF"),
            }],
            ..EmailMessage::default()
        };
        let outcome = adapter.send(&message, &config()).await.unwrap();

        assert_eq!(outcome.message_id.as_deref(), Some("sg-msg-1"));
        server.verify().await;
    }

    #[tokio::test]
    async fn rejection_is_a_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let adapter = SendGridMailer::new().unwrap().with_base_url(server.uri());
        let message = EmailMessage {
            to: "a@b".to_string(),
            subject: "Hi".to_string(),
            body: "x".to_string(),
            ..EmailMessage::default()
        };
        let err = adapter.send(&message, &config()).await.unwrap_err();

        assert!(err.to_string().contains("401"));
    }

    #[tokio::test]
    async fn missing_key_fails_before_any_request() {
        let adapter =
            SendGridMailer::new().unwrap().with_base_url("http://127.0.0.1:1");
        let mut cfg = config();
        cfg.sendgrid_key = None;

        let message = EmailMessage {
            to: "a@b".to_string(),
            subject: "Hi".to_string(),
            body: "x".to_string(),
            ..EmailMessage::default()
        };
        let err = adapter.send(&message, &cfg).await.unwrap_err();

        assert!(err.to_string().contains("missing SendGrid API key"));
    }
}
