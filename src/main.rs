//! Member Registration Service
//!
//! Entry point for the phone-number authentication and member registry
//! backend. The service issues one-time passcodes through Twilio Verify,
//! exchanges a verified phone number for a JWT session token, and stores
//! member profiles in DynamoDB.
//!
//! # Flow
//! 1. Client requests an OTP for a phone number (rate limited per number)
//! 2. Client submits the received code for verification
//! 3. Known members get a session token; unknown phones are told to
//!    register
//! 4. Registration creates the profile and issues the first token
//! 5. Profile endpoints authenticate via `Authorization: Bearer <token>`

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, Level};
use tracing_subscriber::fmt;

use member_registration::config::Settings;
use member_registration::db::dynamodb::{DynamoDbConfig, DynamoDbStore};
use member_registration::http::{self, AppState};
use member_registration::token::TokenService;
use member_registration::twilio::rate_limit::{RateLimitConfig, RateLimiter};
use member_registration::twilio::{TwilioConfig, VerificationGateway};

/// Initializes structured logging with timestamps and log levels using
/// the tracing framework.
fn setup_logging() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    fmt()
        .with_max_level(Level::INFO)
        .with_file(true)
        .with_line_number(true)
        .with_thread_ids(true)
        .with_target(false)
        .with_level(true)
        .with_ansi(true)
        .with_writer(std::io::stdout)
        .try_init()
        .map_err(|e| e.into())
}

/// Builds all service dependencies and serves the HTTP API until a
/// shutdown signal arrives.
async fn setup_services(settings: Settings) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!(
        table = %settings.dynamodb.table_name,
        region = %settings.dynamodb.region,
        "Initializing DynamoDB member store"
    );
    let store = Arc::new(
        DynamoDbStore::new(DynamoDbConfig {
            table_name: settings.dynamodb.table_name.clone(),
            region: settings.dynamodb.region.clone(),
            endpoint: settings.dynamodb.endpoint.clone(),
        })
        .await,
    );

    info!(mode = ?settings.twilio.mode, "Initializing verification gateway");
    let gateway = Arc::new(VerificationGateway::new(TwilioConfig {
        mode: settings.twilio.mode,
        account_sid: settings.twilio.account_sid.clone(),
        auth_token: settings.twilio.auth_token.clone(),
        verify_service_sid: settings.twilio.verify_service_sid.clone(),
        request_timeout_secs: settings.twilio.request_timeout_secs,
    })?);

    let limiter = Arc::new(RateLimiter::new(RateLimitConfig {
        max_attempts: settings.rate_limit.max_attempts,
        window_secs: settings.rate_limit.window_secs,
        block_secs: settings.rate_limit.block_secs,
    }));

    let tokens = Arc::new(TokenService::new(
        &settings.auth.jwt_secret,
        settings.auth.token_ttl_days,
    ));

    // Background sweep keeps the rate-limit map bounded; requests never
    // wait on it.
    let sweep_limiter = Arc::clone(&limiter);
    let sweep_interval = Duration::from_secs(settings.rate_limit.sweep_interval_secs);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            sweep_limiter.sweep().await;
        }
    });

    let state = AppState {
        gateway,
        limiter,
        tokens,
        store,
    };

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, http::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    setup_logging()?;
    info!("Member Registration Service starting up...");

    info!("Loading configuration...");
    let settings = Settings::new()?;
    info!("Configuration loaded successfully");

    setup_services(settings).await?;

    Ok(())
}
