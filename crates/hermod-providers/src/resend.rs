//! Resend email adapter.

use async_trait::async_trait;
use base64::Engine as _;
use hermod_core::{CoreError, EmailMessage, EmailMessenger, Result, SendOutcome, TenantConfig};
use tracing::{debug, info_span, Instrument};
use uuid::Uuid;

use crate::{response_excerpt, PROVIDER_TIMEOUT};

const RESEND_API_BASE: &str = "https://api.resend.com";

const DEFAULT_FROM: &str = "no-reply@example.com";

/// Email messenger backed by the Resend API.
#[derive(Debug, Clone)]
pub struct ResendMailer {
    client: reqwest::Client,
    base_url: String,
}

impl ResendMailer {
    /// Creates the adapter with a pooled HTTP client.
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(PROVIDER_TIMEOUT)
            .build()
            .map_err(|e| CoreError::configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, base_url: RESEND_API_BASE.to_string() })
    }

    /// Points the adapter at a different API base. Used by tests.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn build_payload(message: &EmailMessage, from: &str) -> serde_json::Value {
        let mut payload = serde_json::json!({
            "from": from,
            "to": [message.to],
            "subject": message.subject,
            "text": message.body,
        });

        if let Some(html) = &message.html_body {
            payload["html"] = serde_json::Value::String(html.clone());
        }
        if !message.cc.is_empty() {
            payload["cc"] = serde_json::json!(message.cc);
        }
        if !message.bcc.is_empty() {
            payload["bcc"] = serde_json::json!(message.bcc);
        }
        if let Some(reply_to) = &message.reply_to {
            payload["reply_to"] = serde_json::Value::String(reply_to.clone());
        }
        if !message.attachments.is_empty() {
            payload["attachments"] = message
                .attachments
                .iter()
                .map(|attachment| {
                    serde_json::json!({
                        "filename": attachment.filename,
                        "content": base64::engine::general_purpose::STANDARD
                            .encode(&attachment.content),
                    })
                })
                .collect();
        }

        payload
    }
}

#[async_trait]
impl EmailMessenger for ResendMailer {
    async fn send(&self, message: &EmailMessage, config: &TenantConfig) -> Result<SendOutcome> {
        let api_key = config
            .resend_key
            .as_deref()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| CoreError::configuration("missing Resend API key"))?;

        let from = message
            .from
            .as_deref()
            .or(config.resend_from.as_deref())
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_FROM);

        let span = info_span!(
            "resend_send",
            delivery_id = %Uuid::new_v4(),
            tenant_id = %config.tenant_id,
            to = %message.to
        );

        async move {
            debug!("sending email via Resend");

            let response = self
                .client
                .post(format!("{}/emails", self.base_url))
                .bearer_auth(api_key)
                .json(&Self::build_payload(message, from))
                .send()
                .await
                .map_err(|e| CoreError::provider(format!("failed to send email: {e}")))?;

            let status = response.status();
            let body = response.text().await.unwrap_or_default();

            if !status.is_success() {
                let detail = serde_json::from_str::<serde_json::Value>(&body)
                    .ok()
                    .and_then(|v| {
                        v.get("message").and_then(|m| m.as_str()).map(str::to_string)
                    })
                    .unwrap_or_else(|| response_excerpt(&body).to_string());

                return Err(CoreError::provider(format!(
                    "Resend returned status {status}: {detail}"
                )));
            }

            let message_id = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| v.get("id").and_then(|id| id.as_str()).map(str::to_string));

            Ok(SendOutcome { message_id })
        }
        .instrument(span)
        .await
    }
}
