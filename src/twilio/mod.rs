//! Twilio Verify gateway.
//!
//! Wraps the Twilio Verify v2 REST API behind a small result shape. The
//! gateway runs in one of two modes chosen at construction: `Live` calls
//! Twilio, `Test` simulates delivery and accepts any well-formed six-digit
//! code without touching the network. Callers see the same result shape in
//! both modes.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info};

use crate::phone;

pub mod rate_limit;

/// Operating mode, fixed when the gateway is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayMode {
    Live,
    Test,
}

#[derive(Debug, Clone)]
pub struct TwilioConfig {
    pub mode: GatewayMode,
    pub account_sid: Option<String>,
    pub auth_token: Option<String>,
    pub verify_service_sid: Option<String>,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Credentials or the Verify service id are missing or rejected by
    /// Twilio. Never conflated with a provider rejection of the request.
    #[error("verification service is not configured")]
    Misconfigured,
    /// Twilio rejected the request (bad phone, attempt caps, ...).
    #[error("{message}")]
    Rejected { code: Option<u64>, message: String },
    #[error("verification request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Result of asking Twilio to deliver a code.
#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub status: String,
}

impl SendOutcome {
    pub fn is_pending(&self) -> bool {
        self.status == "pending"
    }
}

/// Result of checking a submitted code.
#[derive(Debug, Clone)]
pub struct CheckOutcome {
    pub status: String,
    pub valid: bool,
}

impl CheckOutcome {
    pub fn approved(&self) -> bool {
        self.valid && self.status == "approved"
    }
}

#[derive(Debug, Serialize)]
struct VerificationRequest<'a> {
    #[serde(rename = "To")]
    to: &'a str,
    #[serde(rename = "Channel")]
    channel: &'a str,
}

#[derive(Debug, Deserialize)]
struct VerificationResponse {
    sid: String,
    status: String,
}

#[derive(Debug, Serialize)]
struct VerificationCheckRequest<'a> {
    #[serde(rename = "To")]
    to: &'a str,
    #[serde(rename = "Code")]
    code: &'a str,
}

#[derive(Debug, Deserialize)]
struct VerificationCheckResponse {
    status: String,
    valid: bool,
}

#[derive(Debug, Deserialize, Default)]
struct TwilioErrorBody {
    code: Option<u64>,
    message: Option<String>,
}

#[derive(Debug, Clone)]
struct LiveCredentials {
    account_sid: String,
    auth_token: String,
    base_url: String,
}

/// Client for the Twilio Verify API, or its offline simulation.
pub struct VerificationGateway {
    mode: GatewayMode,
    client: Client,
    live: Option<LiveCredentials>,
}

impl VerificationGateway {
    pub fn new(config: TwilioConfig) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        let live = match (
            config.account_sid,
            config.auth_token,
            config.verify_service_sid,
        ) {
            (Some(account_sid), Some(auth_token), Some(service_sid)) => Some(LiveCredentials {
                account_sid,
                auth_token,
                base_url: format!("https://verify.twilio.com/v2/Services/{}/", service_sid),
            }),
            _ => None,
        };

        Ok(Self {
            mode: config.mode,
            client,
            live,
        })
    }

    /// Asks the provider to deliver a one-time code over SMS.
    pub async fn send_code(&self, phone_number: &str) -> Result<SendOutcome, GatewayError> {
        if self.mode == GatewayMode::Test {
            info!(phone_number, "test mode: simulating OTP delivery");
            return Ok(SendOutcome {
                status: "pending".to_string(),
            });
        }

        let creds = self.credentials()?;
        let url = format!("{}Verifications", creds.base_url);
        let request = VerificationRequest {
            to: phone_number,
            channel: "sms",
        };

        let response = self
            .client
            .post(&url)
            .basic_auth(&creds.account_sid, Some(&creds.auth_token))
            .form(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.rejection(response).await);
        }

        let verification: VerificationResponse = response.json().await?;
        info!(
            phone_number,
            sid = %verification.sid,
            status = %verification.status,
            "started verification"
        );

        Ok(SendOutcome {
            status: verification.status,
        })
    }

    /// Checks a submitted code against the provider.
    pub async fn check_code(
        &self,
        phone_number: &str,
        code: &str,
    ) -> Result<CheckOutcome, GatewayError> {
        if self.mode == GatewayMode::Test {
            let valid = phone::is_valid_code(code);
            return Ok(CheckOutcome {
                status: if valid { "approved" } else { "pending" }.to_string(),
                valid,
            });
        }

        let creds = self.credentials()?;
        let url = format!("{}VerificationCheck", creds.base_url);
        let request = VerificationCheckRequest {
            to: phone_number,
            code,
        };

        let response = self
            .client
            .post(&url)
            .basic_auth(&creds.account_sid, Some(&creds.auth_token))
            .form(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(self.rejection(response).await);
        }

        let check: VerificationCheckResponse = response.json().await?;
        info!(
            phone_number,
            status = %check.status,
            valid = check.valid,
            "checked verification"
        );

        Ok(CheckOutcome {
            status: check.status,
            valid: check.valid,
        })
    }

    fn credentials(&self) -> Result<&LiveCredentials, GatewayError> {
        self.live.as_ref().ok_or_else(|| {
            error!("Twilio credentials or verify service sid missing");
            GatewayError::Misconfigured
        })
    }

    async fn rejection(&self, response: reqwest::Response) -> GatewayError {
        let status = response.status();
        let body: TwilioErrorBody = response.json().await.unwrap_or_default();
        error!(
            http_status = %status,
            twilio_code = ?body.code,
            "Twilio rejected request: {}",
            body.message.as_deref().unwrap_or("<no message>")
        );
        map_provider_error(body.code, body.message)
    }
}

/// Translates a Twilio error body into a user-facing gateway error.
///
/// Account-level failures (bad credentials, unknown Verify service) are a
/// deployment problem, not a request problem, and map to `Misconfigured`.
fn map_provider_error(code: Option<u64>, message: Option<String>) -> GatewayError {
    match code {
        Some(20003) | Some(20404) => GatewayError::Misconfigured,
        Some(code) => GatewayError::Rejected {
            code: Some(code),
            message: describe_error_code(code)
                .map(str::to_string)
                .or(message)
                .unwrap_or_else(|| "Verification request was rejected".to_string()),
        },
        None => GatewayError::Rejected {
            code: None,
            message: message
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| "Verification request was rejected".to_string()),
        },
    }
}

fn describe_error_code(code: u64) -> Option<&'static str> {
    match code {
        60200 => Some("Invalid phone number format"),
        60202 => Some("Maximum check attempts reached. Please request a new code"),
        60203 => Some("Maximum send attempts reached. Please try again later"),
        60212 => Some("Too many concurrent requests for this phone number"),
        60223 => Some("Verification delivery channel is disabled"),
        _ => None,
    }
}
