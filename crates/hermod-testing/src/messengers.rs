//! Scripted messenger ports recording what they were asked to send.

use std::{
    collections::{HashMap, VecDeque},
    sync::Mutex,
};

use async_trait::async_trait;
use bytes::Bytes;
use hermod_core::{
    AttachmentFetcher, CoreError, DocumentRef, EmailMessage, EmailMessenger, Result, SendOutcome,
    SmsMessage, SmsMessenger, TenantConfig,
};

enum Script {
    Succeed,
    Fail(String),
}

/// Email messenger driven by a script of outcomes.
///
/// Outcomes are consumed front-to-back; once the script is empty every
/// further send succeeds. Sent messages are recorded for assertions.
#[derive(Default)]
pub struct ScriptedEmailMessenger {
    script: Mutex<VecDeque<Script>>,
    sent: Mutex<Vec<EmailMessage>>,
}

impl ScriptedEmailMessenger {
    /// Creates a messenger that always succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a successful outcome to the script.
    pub fn push_success(&self) {
        self.script.lock().expect("script lock").push_back(Script::Succeed);
    }

    /// Appends a failing outcome to the script.
    pub fn push_failure(&self, error: impl Into<String>) {
        self.script.lock().expect("script lock").push_back(Script::Fail(error.into()));
    }

    /// Messages sent so far (successful or not).
    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().expect("sent lock").clone()
    }
}

#[async_trait]
impl EmailMessenger for ScriptedEmailMessenger {
    async fn send(&self, message: &EmailMessage, _config: &TenantConfig) -> Result<SendOutcome> {
        self.sent.lock().expect("sent lock").push(message.clone());
        match self.script.lock().expect("script lock").pop_front() {
            Some(Script::Fail(error)) => Err(CoreError::provider(error)),
            _ => Ok(SendOutcome { message_id: Some("em_test".to_string()) }),
        }
    }
}

/// SMS messenger driven by a script of outcomes.
#[derive(Default)]
pub struct ScriptedSmsMessenger {
    script: Mutex<VecDeque<Script>>,
    fail_always: Mutex<bool>,
    sent: Mutex<Vec<SmsMessage>>,
}

impl ScriptedSmsMessenger {
    /// Creates a messenger that always succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every send fail with the same error.
    pub fn fail_always(&self, error: impl Into<String>) {
        let error = error.into();
        *self.fail_always.lock().expect("flag lock") = true;
        self.script.lock().expect("script lock").push_back(Script::Fail(error));
    }

    /// Appends a failing outcome to the script.
    pub fn push_failure(&self, error: impl Into<String>) {
        self.script.lock().expect("script lock").push_back(Script::Fail(error.into()));
    }

    /// Messages sent so far (successful or not).
    pub fn sent(&self) -> Vec<SmsMessage> {
        self.sent.lock().expect("sent lock").clone()
    }
}

#[async_trait]
impl SmsMessenger for ScriptedSmsMessenger {
    async fn send(&self, message: &SmsMessage, _config: &TenantConfig) -> Result<SendOutcome> {
        self.sent.lock().expect("sent lock").push(message.clone());

        let mut script = self.script.lock().expect("script lock");
        if *self.fail_always.lock().expect("flag lock") {
            if let Some(Script::Fail(error)) = script.front() {
                return Err(CoreError::provider(error.clone()));
            }
        }

        match script.pop_front() {
            Some(Script::Fail(error)) => Err(CoreError::provider(error)),
            _ => Ok(SendOutcome { message_id: Some("sm_test".to_string()) }),
        }
    }
}

/// Attachment fetcher that never finds a document.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAttachmentFetcher;

#[async_trait]
impl AttachmentFetcher for NullAttachmentFetcher {
    async fn fetch(
        &self,
        _config: &TenantConfig,
        _reference: &DocumentRef,
    ) -> Result<Option<Bytes>> {
        Ok(None)
    }
}

/// Attachment fetcher backed by a fixed map of documents.
#[derive(Default)]
pub struct StaticAttachmentFetcher {
    documents: Mutex<HashMap<DocumentRef, Bytes>>,
}

impl StaticAttachmentFetcher {
    /// Creates an empty fetcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers document content for a reference.
    pub fn insert(&self, reference: DocumentRef, content: impl Into<Bytes>) {
        self.documents.lock().expect("documents lock").insert(reference, content.into());
    }
}

#[async_trait]
impl AttachmentFetcher for StaticAttachmentFetcher {
    async fn fetch(
        &self,
        _config: &TenantConfig,
        reference: &DocumentRef,
    ) -> Result<Option<Bytes>> {
        Ok(self.documents.lock().expect("documents lock").get(reference).cloned())
    }
}
