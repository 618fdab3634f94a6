//! Twilio SMS adapter.

use async_trait::async_trait;
use hermod_core::{CoreError, Result, SendOutcome, SmsMessage, SmsMessenger, TenantConfig};
use tracing::{debug, info_span, Instrument};
use uuid::Uuid;

use crate::{response_excerpt, PROVIDER_TIMEOUT};

const TWILIO_API_BASE: &str = "https://api.twilio.com";

/// SMS messenger backed by the Twilio Messages API.
#[derive(Debug, Clone)]
pub struct TwilioSms {
    client: reqwest::Client,
    base_url: String,
}

impl TwilioSms {
    /// Creates the adapter with a pooled HTTP client.
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(PROVIDER_TIMEOUT)
            .build()
            .map_err(|e| CoreError::configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, base_url: TWILIO_API_BASE.to_string() })
    }

    /// Points the adapter at a different API base. Used by tests.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl SmsMessenger for TwilioSms {
    async fn send(&self, message: &SmsMessage, config: &TenantConfig) -> Result<SendOutcome> {
        let sid = config
            .twilio_sid
            .as_deref()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| CoreError::configuration("missing Twilio credentials"))?;
        let token = config
            .twilio_auth_token
            .as_deref()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| CoreError::configuration("missing Twilio credentials"))?;

        if message.to.is_empty() {
            return Err(CoreError::missing_contact("SMS requires a destination phone number"));
        }

        let from = message
            .from
            .as_deref()
            .or(config.twilio_from_number.as_deref())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| CoreError::configuration("missing Twilio \"from\" number"))?;

        let span = info_span!(
            "twilio_send",
            delivery_id = %Uuid::new_v4(),
            tenant_id = %config.tenant_id,
            to = %message.to
        );

        async move {
            debug!("sending SMS via Twilio");

            let url = format!("{}/2010-04-01/Accounts/{sid}/Messages.json", self.base_url);
            let response = self
                .client
                .post(&url)
                .basic_auth(sid, Some(token))
                .form(&[("To", message.to.as_str()), ("From", from), ("Body", &message.body)])
                .send()
                .await
                .map_err(|e| CoreError::provider(format!("failed to send SMS: {e}")))?;

            let status = response.status();
            let body = response.text().await.unwrap_or_default();

            if !status.is_success() {
                return Err(CoreError::provider(format!(
                    "Twilio returned status {status}: {}",
                    response_excerpt(&body)
                )));
            }

            let message_id = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| v.get("sid").and_then(|s| s.as_str()).map(str::to_string));

            Ok(SendOutcome { message_id })
        }
        .instrument(span)
        .await
    }
}
