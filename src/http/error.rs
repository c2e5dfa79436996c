//! Central error-to-response mapping.
//!
//! Every component error funnels into [`ApiError`], which is mapped once
//! to an HTTP status and a `{success:false, message}` body. Internal
//! detail is logged here and never echoed to the caller.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

use crate::db::StoreError;
use crate::token::TokenError;
use crate::twilio::GatewayError;

/// Authentication failure sub-cases. Each carries its own message so the
/// client can distinguish "fix your header" from "log in again".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    MissingHeader,
    MalformedHeader,
    Invalid,
    Expired,
}

impl AuthFailure {
    fn message(&self) -> &'static str {
        match self {
            AuthFailure::MissingHeader => "Authorization header is required",
            AuthFailure::MalformedHeader => {
                "Invalid authorization header format. Expected: Bearer <token>"
            }
            AuthFailure::Invalid => "Invalid session token",
            AuthFailure::Expired => "Session has expired. Please log in again",
        }
    }
}

/// Closed set of error conditions the HTTP surface can produce.
#[derive(Debug)]
pub enum ApiError {
    /// Malformed client input; the message names the violated rule.
    Validation(String),
    RateLimited { retry_after_secs: u64 },
    Auth(AuthFailure),
    NotFound(&'static str),
    AlreadyExists,
    /// Provider rejected the request; message comes from the fixed
    /// code-to-message table.
    Upstream(String),
    Misconfigured,
    Internal(anyhow::Error),
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none", rename = "retryAfter")]
    retry_after: Option<u64>,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::AlreadyExists | ApiError::Upstream(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Auth(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Misconfigured | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Validation(msg) => msg.clone(),
            ApiError::RateLimited { retry_after_secs } => format!(
                "Too many OTP requests. Please try again in {} seconds",
                retry_after_secs
            ),
            ApiError::Auth(failure) => failure.message().to_string(),
            ApiError::NotFound(what) => format!("{} not found", what),
            ApiError::AlreadyExists => {
                "An account with this phone number already exists".to_string()
            }
            ApiError::Upstream(msg) => msg.clone(),
            ApiError::Misconfigured | ApiError::Internal(_) => {
                "Internal server error".to_string()
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            ApiError::Internal(err) => error!("internal error: {err:#}"),
            ApiError::Misconfigured => error!("service misconfigured"),
            _ => {}
        }

        let status = self.status();
        let retry_after = match &self {
            ApiError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        };

        let mut response = (
            status,
            Json(ErrorBody {
                success: false,
                message: self.message(),
                retry_after,
            }),
        )
            .into_response();

        if let Some(secs) = retry_after {
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }

        response
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Misconfigured => ApiError::Misconfigured,
            GatewayError::Rejected { message, .. } => ApiError::Upstream(message),
            GatewayError::Transport(e) => ApiError::Internal(e.into()),
        }
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Expired => ApiError::Auth(AuthFailure::Expired),
            TokenError::Invalid => ApiError::Auth(AuthFailure::Invalid),
            TokenError::Signing => ApiError::Misconfigured,
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate => ApiError::AlreadyExists,
            StoreError::NotFound => ApiError::NotFound("Member"),
            StoreError::Backend(e) => ApiError::Internal(e),
        }
    }
}
