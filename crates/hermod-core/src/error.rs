//! Error taxonomy for Hermod operations.
//!
//! One structured error type covers the core: storage failures, tenant
//! configuration problems, provider send failures, and malformed job
//! payloads. Job handlers never let these escape the polling loop; the
//! engine folds them into the job row's `last_error` diagnostic.

use thiserror::Error;

/// Result type alias using [`CoreError`].
pub type Result<T> = std::result::Result<T, CoreError>;

/// Error type shared by the core crates.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Entity not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Unique or foreign-key constraint violation.
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// Tenant is unknown or its credentials are missing.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A required contact datum (to/from/email/phone) is missing.
    #[error("missing contact: {0}")]
    MissingContact(String),

    /// An external provider rejected or failed the send.
    #[error("provider error: {0}")]
    Provider(String),

    /// Job payload is missing required fields or has the wrong shape.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

impl CoreError {
    /// Creates a database error from a message.
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database(message.into())
    }

    /// Creates a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Creates a missing-contact error.
    pub fn missing_contact(message: impl Into<String>) -> Self {
        Self::MissingContact(message.into())
    }

    /// Creates a provider error.
    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider(message.into())
    }

    /// Creates an invalid-payload error.
    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Self::InvalidPayload(message.into())
    }
}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound("requested entity not found".to_string()),
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
                Self::ConstraintViolation(format!("unique constraint violation: {db_err}"))
            },
            sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation() => {
                Self::ConstraintViolation(format!("foreign key constraint violation: {db_err}"))
            },
            _ => Self::Database(err.to_string()),
        }
    }
}
