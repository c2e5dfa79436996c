//! Request handlers: the OTP authentication flows and the member
//! registry endpoints.
//!
//! Flow shapes:
//! - send-code: normalize -> rate limit -> gateway send
//! - verify-code: validate -> gateway check -> existing member? token :
//!   `isNewUser` (a verified phone with no profile gets no credential;
//!   the client must register immediately or re-verify)
//! - register: normalize -> validate -> uniqueness -> create -> token

use axum::extract::State;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::auth::Bearer;
use super::error::ApiError;
use super::json::Json;
use super::AppState;
use crate::db::{MemberProfile, ProfileUpdate};
use crate::phone;
use crate::twilio::rate_limit::RateLimitDecision;

const MIN_NAME_LEN: usize = 2;

fn normalize_phone(raw: &str) -> Result<String, ApiError> {
    phone::normalize(raw).ok_or_else(|| {
        ApiError::Validation(
            "Invalid phone number. Expected an Indian mobile number".to_string(),
        )
    })
}

fn validate_name(raw: &str) -> Result<String, ApiError> {
    let name = raw.trim();
    if name.chars().count() < MIN_NAME_LEN {
        return Err(ApiError::Validation(format!(
            "Name must be at least {} characters",
            MIN_NAME_LEN
        )));
    }
    Ok(name.to_string())
}

fn validate_email(raw: &str) -> Result<(), ApiError> {
    if raw.contains('@') {
        Ok(())
    } else {
        Err(ApiError::Validation("Invalid email address".to_string()))
    }
}

// ---------------------------------------------------------------------------
// send-code

#[derive(Debug, Deserialize)]
pub struct SendCodeRequest {
    pub phone: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

pub async fn send_code(
    State(state): State<AppState>,
    Json(req): Json<SendCodeRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let phone_number = normalize_phone(&req.phone)?;

    // The bucket key ignores formatting so "+91 98765..." and
    // "9198765..." count against the same limit.
    match state.limiter.check(&phone::digits_only(&phone_number)).await {
        RateLimitDecision::Blocked { retry_after_secs } => {
            return Err(ApiError::RateLimited { retry_after_secs });
        }
        RateLimitDecision::Allowed => {}
    }

    let outcome = state.gateway.send_code(&phone_number).await?;
    if !outcome.is_pending() {
        return Err(ApiError::Upstream(
            "Failed to send verification code".to_string(),
        ));
    }

    info!(phone = %phone_number, "OTP dispatched");
    Ok(Json(MessageResponse {
        success: true,
        message: "OTP sent successfully".to_string(),
    }))
}

// ---------------------------------------------------------------------------
// verify-code

#[derive(Debug, Deserialize)]
pub struct VerifyCodeRequest {
    pub phone: String,
    pub code: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyCodeResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub is_new_user: bool,
}

pub async fn verify_code(
    State(state): State<AppState>,
    Json(req): Json<VerifyCodeRequest>,
) -> Result<Json<VerifyCodeResponse>, ApiError> {
    let phone_number = normalize_phone(&req.phone)?;
    if !phone::is_valid_code(&req.code) {
        return Err(ApiError::Validation(
            "Invalid OTP. Expected a 6-digit code".to_string(),
        ));
    }

    let outcome = state.gateway.check_code(&phone_number, &req.code).await?;
    if !outcome.approved() {
        return Err(ApiError::Validation("Invalid OTP".to_string()));
    }

    match state.store.find_by_phone(&phone_number).await? {
        Some(member) => {
            let token = state.tokens.issue(&member.id, &member.phone)?;
            info!(member_id = %member.id, "member logged in");
            Ok(Json(VerifyCodeResponse {
                success: true,
                token: Some(token),
                is_new_user: false,
            }))
        }
        // Verified phone, no profile. No credential is issued; the
        // caller must register while the verification is fresh.
        None => {
            debug!(phone = %phone_number, "verified phone without profile");
            Ok(Json(VerifyCodeResponse {
                success: true,
                token: None,
                is_new_user: true,
            }))
        }
    }
}

// ---------------------------------------------------------------------------
// register

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub phone: String,
    pub name: String,
    pub email: Option<String>,
    pub gender: Option<String>,
    pub date_of_birth: Option<String>,
    pub bio: Option<String>,
    pub avatar_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub success: bool,
    pub token: String,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    let phone_number = normalize_phone(&req.phone)?;
    let name = validate_name(&req.name)?;
    if let Some(email) = &req.email {
        validate_email(email)?;
    }

    if state.store.find_by_phone(&phone_number).await?.is_some() {
        return Err(ApiError::AlreadyExists);
    }

    let mut profile = MemberProfile::new(phone_number, name);
    profile.email = req.email;
    profile.gender = req.gender;
    profile.date_of_birth = req.date_of_birth;
    profile.bio = req.bio;
    profile.avatar_url = req.avatar_url;

    // A concurrent register between the check above and this write loses
    // the conditional put and surfaces as Duplicate -> AlreadyExists.
    let member = state.store.create(profile).await?;
    let token = state.tokens.issue(&member.id, &member.phone)?;

    info!(member_id = %member.id, "member registered");
    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            success: true,
            token,
        }),
    ))
}

// ---------------------------------------------------------------------------
// member profile

#[derive(Debug, Serialize)]
pub struct MemberResponse {
    pub success: bool,
    pub user: MemberProfile,
}

pub async fn current_member(
    State(state): State<AppState>,
    Bearer(claims): Bearer,
) -> Result<Json<MemberResponse>, ApiError> {
    let member = state
        .store
        .find_by_id(&claims.sub)
        .await?
        .ok_or(ApiError::NotFound("Member"))?;

    Ok(Json(MemberResponse {
        success: true,
        user: member,
    }))
}

pub async fn update_member(
    State(state): State<AppState>,
    Bearer(claims): Bearer,
    Json(mut update): Json<ProfileUpdate>,
) -> Result<Json<MemberResponse>, ApiError> {
    // ProfileUpdate is the allow-list: phone, id and timestamps never
    // deserialize into it, so a body containing only those is empty here.
    if update.is_empty() {
        return Err(ApiError::Validation("No fields to update".to_string()));
    }
    if let Some(name) = &update.name {
        update.name = Some(validate_name(name)?);
    }
    if let Some(email) = &update.email {
        validate_email(email)?;
    }

    let member = state.store.update(&claims.sub, update).await?;
    Ok(Json(MemberResponse {
        success: true,
        user: member,
    }))
}

#[derive(Debug, Serialize)]
pub struct MemberListResponse {
    pub success: bool,
    pub users: Vec<MemberProfile>,
    pub total: usize,
}

pub async fn list_members(
    State(state): State<AppState>,
    Bearer(_claims): Bearer,
) -> Result<Json<MemberListResponse>, ApiError> {
    let users = state.store.list().await?;
    let total = users.len();
    Ok(Json(MemberListResponse {
        success: true,
        users,
        total,
    }))
}

// ---------------------------------------------------------------------------
// health

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub success: bool,
    pub server: &'static str,
    pub database: &'static str,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let database = if state.store.ping().await {
        "connected"
    } else {
        "disconnected"
    };
    Json(HealthResponse {
        success: true,
        server: "ok",
        database,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{router, test_state};
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use axum::Router;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app() -> Router {
        router(test_state())
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    async fn register_member(app: &Router, phone: &str, name: &str) -> String {
        let (status, body) = send(
            app,
            "POST",
            "/api/auth/register",
            None,
            Some(json!({"phone": phone, "name": name})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {body}");
        body["token"].as_str().unwrap().to_string()
    }

    #[tokio::test]
    async fn send_code_accepts_valid_phone() {
        let app = app();
        let (status, body) = send(
            &app,
            "POST",
            "/api/auth/send-code",
            None,
            Some(json!({"phone": "9876543210"})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
    }

    #[tokio::test]
    async fn send_code_rejects_invalid_phone() {
        let app = app();
        for phone in ["12345", "5876543210", "not-a-phone"] {
            let (status, body) = send(
                &app,
                "POST",
                "/api/auth/send-code",
                None,
                Some(json!({"phone": phone})),
            )
            .await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "phone {:?}", phone);
            assert_eq!(body["success"], false);
        }
    }

    #[tokio::test]
    async fn send_code_rate_limits_after_three_attempts() {
        let app = app();

        for _ in 0..3 {
            let (status, _) = send(
                &app,
                "POST",
                "/api/auth/send-code",
                None,
                Some(json!({"phone": "+919876543210"})),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
        }

        // Formatting variants share the bucket, so this counts as the
        // fourth attempt.
        let (status, body) = send(
            &app,
            "POST",
            "/api/auth/send-code",
            None,
            Some(json!({"phone": "98765 43210"})),
        )
        .await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert!(body["retryAfter"].as_u64().unwrap() > 0);
    }

    #[tokio::test]
    async fn missing_body_field_is_a_validation_error() {
        let app = app();
        let (status, body) =
            send(&app, "POST", "/api/auth/send-code", None, Some(json!({}))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert!(
            body["message"].as_str().unwrap().contains("phone"),
            "message should name the missing field: {body}"
        );
    }

    #[tokio::test]
    async fn malformed_json_body_is_a_validation_error() {
        let app = app();
        let request = Request::builder()
            .method("POST")
            .uri("/api/auth/send-code")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn verify_code_for_unknown_phone_signals_new_user() {
        let app = app();
        let (status, body) = send(
            &app,
            "POST",
            "/api/auth/verify-code",
            None,
            Some(json!({"phone": "+919876543210", "code": "123456"})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["isNewUser"], true);
        assert!(body.get("token").is_none());
    }

    #[tokio::test]
    async fn verify_code_rejects_malformed_codes() {
        let app = app();
        for code in ["12345", "12a456", ""] {
            let (status, _) = send(
                &app,
                "POST",
                "/api/auth/verify-code",
                None,
                Some(json!({"phone": "+919876543210", "code": code})),
            )
            .await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "code {:?}", code);
        }
    }

    #[tokio::test]
    async fn verify_code_for_registered_member_issues_token() {
        let app = app();
        register_member(&app, "+919876543210", "Asha").await;

        let (status, body) = send(
            &app,
            "POST",
            "/api/auth/verify-code",
            None,
            Some(json!({"phone": "9876543210", "code": "123456"})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["isNewUser"], false);
        assert!(body["token"].is_string());
    }

    #[tokio::test]
    async fn register_then_fetch_profile() {
        let app = app();
        let token = register_member(&app, "+919876543210", "Asha").await;

        let (status, body) =
            send(&app, "GET", "/api/members/me", Some(&token), None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["name"], "Asha");
        assert_eq!(body["user"]["phone"], "+919876543210");
        assert_eq!(body["user"]["profileComplete"], true);
    }

    #[tokio::test]
    async fn register_duplicate_phone_is_rejected() {
        let app = app();
        register_member(&app, "+919876543210", "Asha").await;

        let (status, body) = send(
            &app,
            "POST",
            "/api/auth/register",
            None,
            Some(json!({"phone": "9876543210", "name": "Someone Else"})),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["message"],
            "An account with this phone number already exists"
        );
    }

    #[tokio::test]
    async fn register_validates_name_and_email() {
        let app = app();

        let (status, _) = send(
            &app,
            "POST",
            "/api/auth/register",
            None,
            Some(json!({"phone": "+919876543210", "name": " a "})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            "POST",
            "/api/auth/register",
            None,
            Some(json!({"phone": "+919876543210", "name": "Asha", "email": "nope"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn update_profile_applies_allowed_fields() {
        let app = app();
        let token = register_member(&app, "+919876543210", "Asha").await;

        let (status, body) = send(
            &app,
            "PUT",
            "/api/members/me",
            Some(&token),
            Some(json!({"bio": "hello", "phone": "+910000000000"})),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["bio"], "hello");
        // phone is not a mutable field and stays untouched
        assert_eq!(body["user"]["phone"], "+919876543210");
    }

    #[tokio::test]
    async fn update_with_only_forbidden_fields_is_a_noop_error() {
        let app = app();
        let token = register_member(&app, "+919876543210", "Asha").await;

        let (status, body) = send(
            &app,
            "PUT",
            "/api/members/me",
            Some(&token),
            Some(json!({"phone": "+910000000000"})),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "No fields to update");
    }

    #[tokio::test]
    async fn profile_endpoints_require_token() {
        let app = app();

        let (status, _) = send(&app, "GET", "/api/members/me", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(&app, "GET", "/api/members", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn list_members_returns_total() {
        let app = app();
        let token = register_member(&app, "+919876543210", "Asha").await;
        register_member(&app, "+918765432109", "Ravi").await;

        let (status, body) = send(&app, "GET", "/api/members", Some(&token), None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 2);
        assert_eq!(body["users"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn health_reports_store_status() {
        let app = app();
        let (status, body) = send(&app, "GET", "/health", None, None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["server"], "ok");
        assert_eq!(body["database"], "connected");
    }

    #[tokio::test]
    async fn profile_for_vanished_member_is_not_found() {
        use crate::db::MockMemberStore;
        use std::sync::Arc;

        let mut store = MockMemberStore::new();
        store.expect_find_by_id().returning(|_| Ok(None));

        let mut state = test_state();
        let token = state.tokens.issue("ghost-id", "+919876543210").unwrap();
        state.store = Arc::new(store);
        let app = router(state);

        let (status, body) =
            send(&app, "GET", "/api/members/me", Some(&token), None).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Member not found");
    }

    #[tokio::test]
    async fn store_failure_maps_to_internal_error() {
        use crate::db::{MockMemberStore, StoreError};
        use std::sync::Arc;

        let mut store = MockMemberStore::new();
        store
            .expect_find_by_phone()
            .returning(|_| Err(StoreError::Backend(anyhow::anyhow!("boom"))));

        let mut state = test_state();
        state.store = Arc::new(store);
        let app = router(state);

        let (status, body) = send(
            &app,
            "POST",
            "/api/auth/verify-code",
            None,
            Some(json!({"phone": "+919876543210", "code": "123456"})),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "Internal server error");
    }
}
