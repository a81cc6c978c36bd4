//! Error taxonomy.
//!
//! Each error kind has a fixed blast radius:
//!
//! | error | effect |
//! |---|---|
//! | [`AuthError`] | upgrade rejected, nothing registered |
//! | [`HandlerError::Decode`] | one frame dropped |
//! | [`HandlerError::Precondition`] | one frame dropped, no event |
//! | [`HandlerError::Persistence`] | one frame dropped, no event |
//! | [`DeliveryError::Transport`] | that connection torn down |
//! | [`DeliveryError::Backpressure`] | the lagging connection torn down |
//!
//! Nothing is retried by the server.

use thiserror::Error;

/// Why an upgrade request was refused.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    /// No session credential was supplied.
    #[error("session credential missing")]
    MissingCredential,

    /// The credential is unknown or has been revoked.
    #[error("session invalid")]
    InvalidSession,

    /// The credential exists but is past its expiry.
    #[error("session expired")]
    SessionExpired,

    /// The account service could not answer.
    #[error("session lookup failed: {0}")]
    Lookup(String),
}

impl AuthError {
    /// Machine-readable code for the HTTP error body.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingCredential => "MISSING_CREDENTIAL",
            Self::InvalidSession => "INVALID_SESSION",
            Self::SessionExpired => "SESSION_EXPIRED",
            Self::Lookup(_) => "SESSION_LOOKUP_FAILED",
        }
    }
}

/// Errors surfaced by the persistence collaborators.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ServiceError {
    /// A uniqueness or state constraint rejected the write.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The row the operation targets does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The backend failed for reasons unrelated to business rules.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Why a handler dropped a frame.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum HandlerError {
    /// The frame or its typed payload could not be decoded.
    #[error("decode error: {0}")]
    Decode(String),

    /// A business rule rejected the request.
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// The write did not happen.
    #[error("persistence error: {0}")]
    Persistence(String),
}

impl HandlerError {
    /// Short label used for logs and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Decode(_) => "decode",
            Self::Precondition(_) => "precondition",
            Self::Persistence(_) => "persistence",
        }
    }

    /// Shorthand for a precondition failure.
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::Precondition(message.into())
    }
}

impl From<ServiceError> for HandlerError {
    fn from(err: ServiceError) -> Self {
        match err {
            // A constraint race lost against a concurrent writer, or a row
            // that vanished between check and write, is a business-rule
            // failure from the caller's point of view.
            ServiceError::Conflict(msg) | ServiceError::NotFound(msg) => Self::Precondition(msg),
            ServiceError::Backend(msg) => Self::Persistence(msg),
        }
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

/// Why a connection was torn down from the delivery side.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DeliveryError {
    /// The socket failed or the peer went away.
    #[error("transport error: {0}")]
    Transport(String),

    /// The outbound queue was full when the dispatcher tried to enqueue.
    #[error("outbound queue full")]
    Backpressure,
}
