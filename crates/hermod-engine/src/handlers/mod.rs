//! Job handlers, dispatched by job type.
//!
//! Handlers are stateless: they read the payload, talk to the ports in the
//! context, and return an outcome. The engine owns every state transition;
//! a handler never touches the store.

mod notify_customer;
mod send_email;
mod send_sms;

use hermod_core::{
    AttachmentFetcher, CustomerDirectory, EmailMessenger, Job, JobType, Result, SmsMessenger,
    TenantConfig,
};

/// Collaborators available to a handler for one job execution.
pub struct HandlerContext<'a> {
    /// Resolved configuration of the job's tenant.
    pub tenant_config: &'a TenantConfig,
    /// Customer contact lookups.
    pub directory: &'a dyn CustomerDirectory,
    /// Email channel port.
    pub email: &'a dyn EmailMessenger,
    /// SMS channel port.
    pub sms: &'a dyn SmsMessenger,
    /// Attachment document port.
    pub attachments: &'a dyn AttachmentFetcher,
}

/// What a handler did with the job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// The message went out.
    Delivered {
        /// Provider-assigned message id, when reported.
        message_id: Option<String>,
    },
    /// The job was intentionally not delivered; it still completes with
    /// the reason recorded.
    Skipped {
        /// Why delivery was skipped, e.g. a customer opt-out.
        reason: String,
    },
}

/// Dispatches a job to the handler registered for its type.
pub async fn dispatch(job: &Job, ctx: &HandlerContext<'_>) -> Result<HandlerOutcome> {
    match job.job_type {
        JobType::SendEmail => send_email::handle(job, ctx).await,
        JobType::SendSms => send_sms::handle(job, ctx).await,
        JobType::NotifyCustomer => notify_customer::handle(job, ctx).await,
    }
}
