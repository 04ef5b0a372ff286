//! # Errors
//!
//! Error kinds raised by the credential service. Messages are plain text
//! and preserve the causing error where one exists; callers are expected
//! to match on the variant, not parse the message.

use std::fmt::Display;

use thiserror::Error;

/// Errors returned by credential service operations.
#[derive(Error, Debug)]
pub enum Error {
    /// The request is malformed: conflicting status flags, a subject/id
    /// mismatch, or an unparseable field.
    #[error("{0}")]
    InvalidRequest(String),

    /// A referenced credential or schema does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The built credential does not comply with its JSON Schema.
    #[error("{0}")]
    SchemaMismatch(String),

    /// Evidence is not a list of objects carrying `id` and `type`.
    #[error("{0}")]
    Evidence(String),

    /// The signing key is missing, has the wrong controller, or is revoked.
    #[error("{0}")]
    Key(String),

    /// A status update asserts a purpose the credential was not created
    /// with.
    #[error("{0}")]
    StatusPurpose(String),

    /// A status update was requested for a credential without a
    /// `credentialStatus` field.
    #[error("{0}")]
    NoStatusField(String),

    /// An optimistic-concurrency transaction exhausted its retry budget.
    #[error("{0}")]
    Conflict(String),

    /// The storage engine failed; the message carries the operation
    /// context and the engine's error.
    #[error("{0}")]
    Storage(String),

    /// Credential building, encoding, or signing failed.
    #[error("{0}")]
    Server(String),
}

impl Error {
    /// Wraps a storage engine failure with operation context.
    pub fn storage(context: impl Display, cause: impl Display) -> Self {
        Self::Storage(format!("{context}: {cause}"))
    }
}
