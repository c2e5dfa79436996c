//! Session token issue and verification.
//!
//! Tokens are HS256 JWTs carrying the member id and phone number. The
//! signing secret and lifetime are process-wide configuration loaded once
//! at startup. Verification distinguishes an expired token from an
//! invalid one so the caller can tell the user to log in again rather
//! than showing a generic failure.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Claims embedded in a session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Member id.
    pub sub: String,
    /// Canonical phone number at issue time.
    pub phone: String,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("session has expired")]
    Expired,
    #[error("invalid session token")]
    Invalid,
    #[error("failed to sign session token")]
    Signing,
}

pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
}

impl TokenService {
    pub fn new(secret: &str, ttl_days: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::days(ttl_days),
        }
    }

    /// Signs a token for `member_id`/`phone` valid for the configured
    /// lifetime.
    pub fn issue(&self, member_id: &str, phone: &str) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = Claims {
            sub: member_id.to_string(),
            phone: phone.to_string(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding_key).map_err(|_| TokenError::Signing)
    }

    /// Verifies a token and returns its claims.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::default();
        validation.leeway = 0;

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::Expired,
                _ => TokenError::Invalid,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TokenService {
        TokenService::new("test-secret", 7)
    }

    #[test]
    fn issued_token_verifies_with_same_claims() {
        let tokens = service();
        let token = tokens.issue("member-1", "+919876543210").unwrap();

        let claims = tokens.verify(&token).unwrap();
        assert_eq!(claims.sub, "member-1");
        assert_eq!(claims.phone, "+919876543210");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn expired_token_reports_expired_not_invalid() {
        let tokens = service();
        let past = Utc::now() - Duration::days(8);
        let claims = Claims {
            sub: "member-1".to_string(),
            phone: "+919876543210".to_string(),
            iat: past.timestamp(),
            exp: (past + Duration::days(7)).timestamp(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();

        assert!(matches!(tokens.verify(&token), Err(TokenError::Expired)));
    }

    #[test]
    fn tampered_token_is_invalid() {
        let tokens = service();
        let token = tokens.issue("member-1", "+919876543210").unwrap();
        let tampered = format!("{}x", token);

        assert!(matches!(tokens.verify(&tampered), Err(TokenError::Invalid)));
    }

    #[test]
    fn token_signed_with_other_secret_is_invalid() {
        let token = TokenService::new("other-secret", 7)
            .issue("member-1", "+919876543210")
            .unwrap();

        assert!(matches!(service().verify(&token), Err(TokenError::Invalid)));
    }

    #[test]
    fn garbage_is_invalid() {
        assert!(matches!(
            service().verify("not-a-token"),
            Err(TokenError::Invalid)
        ));
    }
}
