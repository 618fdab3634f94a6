//! Concrete implementations of Hermod's external ports.
//!
//! Messenger adapters for Twilio, SendGrid, and Resend; the
//! database-backed template renderer with built-in defaults; and the
//! service-API attachment fetcher. Everything here is an HTTP client with
//! an injectable base URL so tests can point it at a mock server.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod attachments;
pub mod email;
pub mod sendgrid;
pub mod templates;
pub mod twilio;

mod resend;

pub use attachments::HttpAttachmentFetcher;
pub use email::EmailRouter;
pub use resend::ResendMailer;
pub use sendgrid::SendGridMailer;
pub use templates::{DbTemplateRenderer, DefaultTemplateRenderer};
pub use twilio::TwilioSms;

/// HTTP timeout shared by the provider clients.
pub(crate) const PROVIDER_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Truncates a provider response body for diagnostics.
pub(crate) fn response_excerpt(body: &str) -> &str {
    let cut = body
        .char_indices()
        .nth(200)
        .map_or(body.len(), |(index, _)| index);
    &body[..cut]
}
