//! Gate rejection taxonomy and its wire form.
//!
//! Every stage of the pipeline fails with a [`GateError`]. The error is terminal
//! for the request and renders as
//! `{"success": false, "error": "...", "code": "...", "retryAfter": n}`.

use std::time::Duration;

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Stable machine-readable rejection codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    TokenRequired,
    InvalidToken,
    TokenExpired,
    InsufficientPermissions,
    InvalidAdminId,
    AdminNotFound,
    AccountDeactivated,
    TokenEmailMismatch,
    IdentityLookupFailed,
    RateLimitExceeded,
    BlockedContent,
    PayloadTooLarge,
    InvalidBody,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::TokenRequired => "TokenRequired",
            ErrorKind::InvalidToken => "InvalidToken",
            ErrorKind::TokenExpired => "TokenExpired",
            ErrorKind::InsufficientPermissions => "InsufficientPermissions",
            ErrorKind::InvalidAdminId => "InvalidAdminId",
            ErrorKind::AdminNotFound => "AdminNotFound",
            ErrorKind::AccountDeactivated => "AccountDeactivated",
            ErrorKind::TokenEmailMismatch => "TokenEmailMismatch",
            ErrorKind::IdentityLookupFailed => "IdentityLookupFailed",
            ErrorKind::RateLimitExceeded => "RateLimitExceeded",
            ErrorKind::BlockedContent => "BlockedContent",
            ErrorKind::PayloadTooLarge => "PayloadTooLarge",
            ErrorKind::InvalidBody => "InvalidBody",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A terminal rejection produced by one of the pipeline gates.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GateError {
    #[error("Access token is required")]
    TokenRequired,

    #[error("Invalid access token")]
    InvalidToken,

    #[error("Access token has expired")]
    TokenExpired,

    #[error("Admin privileges required")]
    InsufficientPermissions,

    #[error("Malformed admin identifier")]
    InvalidAdminId,

    #[error("Admin account not found")]
    AdminNotFound,

    #[error("Admin account is deactivated")]
    AccountDeactivated,

    #[error("Token no longer matches the admin account")]
    TokenEmailMismatch,

    #[error("Identity service unavailable")]
    IdentityLookupFailed,

    #[error("Too many requests, please try again later")]
    RateLimitExceeded { retry_after: Duration },

    #[error("Request blocked by content security policy")]
    BlockedContent { pattern: String },

    #[error("Request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("Request body could not be read")]
    InvalidBody,
}

impl GateError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GateError::TokenRequired => ErrorKind::TokenRequired,
            GateError::InvalidToken => ErrorKind::InvalidToken,
            GateError::TokenExpired => ErrorKind::TokenExpired,
            GateError::InsufficientPermissions => ErrorKind::InsufficientPermissions,
            GateError::InvalidAdminId => ErrorKind::InvalidAdminId,
            GateError::AdminNotFound => ErrorKind::AdminNotFound,
            GateError::AccountDeactivated => ErrorKind::AccountDeactivated,
            GateError::TokenEmailMismatch => ErrorKind::TokenEmailMismatch,
            GateError::IdentityLookupFailed => ErrorKind::IdentityLookupFailed,
            GateError::RateLimitExceeded { .. } => ErrorKind::RateLimitExceeded,
            GateError::BlockedContent { .. } => ErrorKind::BlockedContent,
            GateError::PayloadTooLarge { .. } => ErrorKind::PayloadTooLarge,
            GateError::InvalidBody => ErrorKind::InvalidBody,
        }
    }

    /// HTTP status: 401 authentication, 403 authorization, 400 content, 429 rate limit.
    pub fn status(&self) -> StatusCode {
        match self {
            GateError::TokenRequired
            | GateError::InvalidToken
            | GateError::TokenExpired
            | GateError::InvalidAdminId
            | GateError::AdminNotFound => StatusCode::UNAUTHORIZED,
            GateError::InsufficientPermissions
            | GateError::AccountDeactivated
            | GateError::TokenEmailMismatch => StatusCode::FORBIDDEN,
            GateError::IdentityLookupFailed => StatusCode::SERVICE_UNAVAILABLE,
            GateError::RateLimitExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
            GateError::BlockedContent { .. } | GateError::InvalidBody => StatusCode::BAD_REQUEST,
            GateError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            GateError::RateLimitExceeded { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}

/// Whole seconds, rounded up so a client never retries early.
pub fn retry_after_secs(retry_after: Duration) -> u64 {
    let secs = retry_after.as_secs();
    if retry_after.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs.max(1)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub success: bool,
    pub error: String,
    pub code: ErrorKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl From<&GateError> for ErrorBody {
    fn from(err: &GateError) -> Self {
        Self {
            success: false,
            error: err.to_string(),
            code: err.kind(),
            retry_after: err.retry_after().map(retry_after_secs),
        }
    }
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        crate::observability::metrics::record_gate_rejection(self.kind().as_str());

        let body = ErrorBody::from(&self);
        let retry_after = body.retry_after;
        let mut response = (self.status(), Json(body)).into_response();
        if let Some(secs) = retry_after {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}
