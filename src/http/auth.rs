//! Bearer token extractor.
//!
//! Handlers that require authentication take a [`Bearer`] argument; the
//! extractor verifies the `Authorization: Bearer <token>` header against
//! the token service and yields the embedded claims. Missing header,
//! malformed header, invalid token and expired token are reported as
//! distinct 401 responses.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use super::error::{ApiError, AuthFailure};
use super::AppState;
use crate::token::Claims;

pub struct Bearer(pub Claims);

impl FromRequestParts<AppState> for Bearer {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or(ApiError::Auth(AuthFailure::MissingHeader))?
            .to_str()
            .map_err(|_| ApiError::Auth(AuthFailure::MalformedHeader))?;

        let token = header
            .strip_prefix("Bearer ")
            .filter(|t| !t.is_empty())
            .ok_or(ApiError::Auth(AuthFailure::MalformedHeader))?;

        let claims = state.tokens.verify(token)?;
        Ok(Bearer(claims))
    }
}
