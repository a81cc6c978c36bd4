//! Session gate: authenticates an upgrade request before any socket exists.

use std::collections::HashSet;
use std::sync::Arc;

use axum::Json;
use axum::http::header::ORIGIN;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use metrics::counter;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

use parley_core::{AccountService, AuthError, ChatService, RoomId, ServiceError, UserId};

use crate::metrics::WS_REJECTED_TOTAL;

/// Why an upgrade was refused.
#[derive(Debug, Error)]
pub enum GateError {
    /// The credential was missing, unknown, revoked or expired.
    #[error(transparent)]
    Unauthenticated(#[from] AuthError),

    /// The caller is authentic but their rooms could not be loaded.
    #[error("membership lookup failed: {0}")]
    Membership(ServiceError),

    /// A browser `Origin` outside the configured allowlist.
    #[error("origin {0:?} is not allowed")]
    OriginNotAllowed(String),
}

impl GateError {
    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthenticated(auth) => auth.code(),
            Self::Membership(_) => "MEMBERSHIP_LOOKUP_FAILED",
            Self::OriginNotAllowed(_) => "ORIGIN_NOT_ALLOWED",
        }
    }

    /// HTTP status for the rejection.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated(AuthError::Lookup(_)) | Self::Membership(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::OriginNotAllowed(_) => StatusCode::FORBIDDEN,
        }
    }
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        let body = json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        });
        (self.status(), Json(body)).into_response()
    }
}

/// An authenticated caller, ready to be upgraded.
#[derive(Clone, Debug)]
pub struct Admission {
    /// The identity the connection carries for its lifetime.
    pub user: UserId,
    /// Rooms the caller belonged to at admission.
    pub rooms: HashSet<RoomId>,
}

/// Authenticates upgrade requests against the account service.
pub struct SessionGate {
    accounts: Arc<dyn AccountService>,
    chat: Arc<dyn ChatService>,
    header: String,
    allowed_origins: Vec<String>,
}

impl SessionGate {
    pub fn new(
        accounts: Arc<dyn AccountService>,
        chat: Arc<dyn ChatService>,
        header: impl Into<String>,
    ) -> Self {
        Self {
            accounts,
            chat,
            header: header.into(),
            allowed_origins: Vec::new(),
        }
    }

    /// Refuse upgrades whose `Origin` is not listed. Requests without an
    /// `Origin` header (non-browser clients) are unaffected.
    #[must_use]
    pub fn with_allowed_origins(mut self, origins: Vec<String>) -> Self {
        self.allowed_origins = origins;
        self
    }

    /// Verify the session credential and snapshot the caller's rooms.
    pub fn admit(&self, headers: &HeaderMap) -> Result<Admission, GateError> {
        let result = self.try_admit(headers);
        if let Err(err) = &result {
            counter!(WS_REJECTED_TOTAL, "code" => err.code()).increment(1);
            warn!(code = err.code(), error = %err, "upgrade rejected");
        }
        result
    }

    fn check_origin(&self, headers: &HeaderMap) -> Result<(), GateError> {
        if self.allowed_origins.is_empty() {
            return Ok(());
        }
        let Some(origin) = headers.get(ORIGIN) else {
            return Ok(());
        };
        let origin = String::from_utf8_lossy(origin.as_bytes());
        if self.allowed_origins.iter().any(|allowed| allowed.as_str() == origin.as_ref()) {
            Ok(())
        } else {
            Err(GateError::OriginNotAllowed(origin.into_owned()))
        }
    }

    fn try_admit(&self, headers: &HeaderMap) -> Result<Admission, GateError> {
        self.check_origin(headers)?;
        let token = headers
            .get(self.header.as_str())
            .ok_or(AuthError::MissingCredential)?
            .to_str()
            .map_err(|_| AuthError::InvalidSession)?
            .trim();
        if token.is_empty() {
            return Err(AuthError::MissingCredential.into());
        }

        let user = self.accounts.verify_session(token)?;
        let rooms = self.chat.membership(user).map_err(GateError::Membership)?;
        debug!(user_id = %user, rooms = rooms.len(), "session admitted");
        Ok(Admission { user, rooms })
    }
}
