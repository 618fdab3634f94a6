//! Core domain types for the Hermod communication worker.
//!
//! Provides strongly-typed job and tenant models, the error taxonomy, the
//! clock abstraction, the port traits consumed by the engine and scheduler,
//! and the central-store repositories. All other crates depend on these
//! foundational types.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod models;
pub mod ports;
pub mod storage;
pub mod time;

pub use error::{CoreError, Result};
pub use models::{
    AppointmentCandidate, InsertOutcome, Job, JobId, JobStatus, JobType, MessageTemplate, NewJob,
    PastDueInvoice, ServiceReminderCandidate, TenantConfig, TenantId,
};
pub use ports::{
    AttachmentFetcher, CandidateSource, Channel, ContactPreference, CustomerContact,
    CustomerDirectory, DocumentRef, EmailAttachment, EmailMessage, EmailMessenger, JobStore,
    RenderedMessage, SendOutcome, SmsMessage, SmsMessenger, TemplateRenderer, TenantConfigSource,
    TenantDirectory,
};
pub use time::{Clock, SystemClock};
