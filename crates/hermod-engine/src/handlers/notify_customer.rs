//! Handler for `notify_customer` jobs.
//!
//! Resolves the delivery channel in priority order: the authoritative DMS
//! opt-out, the explicit DMS preference, the payload's preferred channel,
//! whatever contact data exists, and finally the payload's fallback
//! channel. The chosen channel's contact datum must be present.

use hermod_core::{
    Channel, ContactPreference, CoreError, CustomerContact, EmailMessage, Job, Result, SmsMessage,
};

use crate::payloads::{self, NotifyPayload};

use super::{HandlerContext, HandlerOutcome};

pub(super) async fn handle(job: &Job, ctx: &HandlerContext<'_>) -> Result<HandlerOutcome> {
    let payload: NotifyPayload = payloads::parse(job)?;

    let customer_id = payload
        .customer_id
        .ok_or_else(|| CoreError::invalid_payload("notify_customer job missing customer_id"))?;
    let body = payload
        .body
        .clone()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| CoreError::invalid_payload("notify_customer job missing body"))?;

    let customer = ctx
        .directory
        .customer_contact(&job.tenant_id, customer_id)
        .await?
        .ok_or_else(|| {
            CoreError::not_found(format!(
                "customer {customer_id} not found for tenant {}",
                job.tenant_id
            ))
        })?;

    let preference = ctx.directory.contact_preference(&job.tenant_id, customer_id).await?;

    if preference == Some(ContactPreference::DoNotContact) {
        return Ok(HandlerOutcome::Skipped {
            reason: "Customer opted out of communications".to_string(),
        });
    }

    let channel = resolve_channel(preference, &payload, &customer).ok_or_else(|| {
        CoreError::missing_contact(format!("customer {customer_id} has no usable contact channel"))
    })?;

    match channel {
        Channel::Sms => {
            let to = customer.phone.clone().ok_or_else(|| {
                CoreError::missing_contact("customer is missing a phone number")
            })?;
            let message = SmsMessage { to, body, from: None };
            let outcome = ctx.sms.send(&message, ctx.tenant_config).await?;
            Ok(HandlerOutcome::Delivered { message_id: outcome.message_id })
        },
        Channel::Email => {
            let to = customer.email.clone().ok_or_else(|| {
                CoreError::missing_contact("customer is missing an email address")
            })?;
            let message = EmailMessage {
                to,
                subject: payload.subject.unwrap_or_else(|| "Notification".to_string()),
                body,
                ..EmailMessage::default()
            };
            let outcome = ctx.email.send(&message, ctx.tenant_config).await?;
            Ok(HandlerOutcome::Delivered { message_id: outcome.message_id })
        },
    }
}

fn resolve_channel(
    preference: Option<ContactPreference>,
    payload: &NotifyPayload,
    customer: &CustomerContact,
) -> Option<Channel> {
    match preference {
        Some(ContactPreference::Email) => return Some(Channel::Email),
        Some(ContactPreference::Sms | ContactPreference::Phone) => return Some(Channel::Sms),
        Some(ContactPreference::DoNotContact) | None => {},
    }

    if let Some(channel) = payload.preferred_channel.as_deref().and_then(Channel::parse) {
        return Some(channel);
    }

    if customer.phone.is_some() {
        return Some(Channel::Sms);
    }
    if customer.email.is_some() {
        return Some(Channel::Email);
    }

    payload.fallback_channel.as_deref().and_then(Channel::parse)
}
