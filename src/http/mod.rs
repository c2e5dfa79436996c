//! HTTP surface: application state and route wiring.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;

use crate::db::MemberStore;
use crate::token::TokenService;
use crate::twilio::rate_limit::RateLimiter;
use crate::twilio::VerificationGateway;

pub mod auth;
pub mod error;
pub mod handlers;
pub mod json;

/// Shared handles injected into every handler.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<VerificationGateway>,
    pub limiter: Arc<RateLimiter>,
    pub tokens: Arc<TokenService>,
    pub store: Arc<dyn MemberStore>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/auth/send-code", post(handlers::send_code))
        .route("/api/auth/verify-code", post(handlers::verify_code))
        .route("/api/auth/register", post(handlers::register))
        .route(
            "/api/members/me",
            get(handlers::current_member).put(handlers::update_member),
        )
        .route("/api/members", get(handlers::list_members))
        .route("/health", get(handlers::health))
        .with_state(state)
}

#[cfg(test)]
pub(crate) fn test_state() -> AppState {
    use crate::db::memory::MemoryStore;
    use crate::twilio::rate_limit::RateLimitConfig;
    use crate::twilio::{GatewayMode, TwilioConfig};

    let gateway = VerificationGateway::new(TwilioConfig {
        mode: GatewayMode::Test,
        account_sid: None,
        auth_token: None,
        verify_service_sid: None,
        request_timeout_secs: 10,
    })
    .unwrap();

    AppState {
        gateway: Arc::new(gateway),
        limiter: Arc::new(RateLimiter::new(RateLimitConfig::default())),
        tokens: Arc::new(TokenService::new("test-secret", 7)),
        store: Arc::new(MemoryStore::new()),
    }
}
