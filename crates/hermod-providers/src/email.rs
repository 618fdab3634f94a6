//! Per-tenant email provider selection.

use async_trait::async_trait;
use hermod_core::{EmailMessage, EmailMessenger, Result, SendOutcome, TenantConfig};

use crate::{resend::ResendMailer, sendgrid::SendGridMailer};

/// Routes each send to the provider the tenant's config names.
///
/// `email_provider = "resend"` goes to Resend; anything else, including an
/// unset field, goes to SendGrid.
pub struct EmailRouter {
    sendgrid: SendGridMailer,
    resend: ResendMailer,
}

impl EmailRouter {
    /// Creates the router with both adapters ready.
    pub fn new() -> Result<Self> {
        Ok(Self { sendgrid: SendGridMailer::new()?, resend: ResendMailer::new()? })
    }

    /// Creates a router over preconfigured adapters. Used by tests.
    pub fn with_adapters(sendgrid: SendGridMailer, resend: ResendMailer) -> Self {
        Self { sendgrid, resend }
    }
}

#[async_trait]
impl EmailMessenger for EmailRouter {
    async fn send(&self, message: &EmailMessage, config: &TenantConfig) -> Result<SendOutcome> {
        match config.email_provider.as_deref() {
            Some("resend") => self.resend.send(message, config).await,
            _ => self.sendgrid.send(message, config).await,
        }
    }
}
