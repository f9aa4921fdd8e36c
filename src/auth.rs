//! Authentication: password hashing, JWT issuance/verification, and the
//! extractor that turns a bearer token into the requesting user.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::server::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// User id.
    pub sub: String,
    pub email: String,
    pub iat: i64,
    pub exp: i64,
}

pub fn hash_password(password: &str) -> Result<String, AppError> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| AppError::Internal(anyhow::anyhow!("password hashing failed: {}", err)))?;
    Ok(hash.to_string())
}

pub fn verify_password(password: &str, stored_hash: &str) -> Result<bool, AppError> {
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|err| AppError::Internal(anyhow::anyhow!("stored hash malformed: {}", err)))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Issues a signed token for `user_id`, valid for `ttl_days`.
pub fn issue_token(
    user_id: &str,
    email: &str,
    secret: &str,
    ttl_days: i64,
) -> Result<String, AppError> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id.to_string(),
        email: email.to_string(),
        iat: now.timestamp(),
        exp: (now + Duration::days(ttl_days)).timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|err| AppError::Internal(anyhow::anyhow!("token signing failed: {}", err)))
}

/// Verifies signature and expiry; any failure maps to the same 401.
pub fn verify_token(token: &str, secret: &str) -> Result<Claims, AppError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| AppError::TokenInvalid)
}

/// Authenticated requester, resolved from the `Authorization: Bearer` header.
/// Token claims alone are not trusted; the user must still exist and be
/// active in the store.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
    pub full_name: String,
    pub role: String,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(AppError::TokenMissing)?;
        let token = header
            .strip_prefix("Bearer ")
            .ok_or(AppError::TokenMissing)?;

        let claims = verify_token(token, &state.config.auth.jwt_secret)?;
        let user = state
            .store
            .find_active_user(&claims.sub)
            .await?
            .ok_or(AppError::TokenInvalid)?;

        Ok(AuthUser {
            id: user.id,
            email: user.email,
            full_name: user.full_name,
            role: user.role,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_roundtrip() {
        let hash = hash_password("hunter2!").unwrap();
        assert_ne!(hash, "hunter2!");
        assert!(verify_password("hunter2!", &hash).unwrap());
        assert!(!verify_password("wrong", &hash).unwrap());
    }

    #[test]
    fn token_roundtrip() {
        let token = issue_token("u1", "a@example.com", "secret", 7).unwrap();
        let claims = verify_token(&token, "secret").unwrap();
        assert_eq!(claims.sub, "u1");
        assert_eq!(claims.email, "a@example.com");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = issue_token("u1", "a@example.com", "secret", 7).unwrap();
        assert!(matches!(
            verify_token(&token, "other"),
            Err(AppError::TokenInvalid)
        ));
    }

    #[test]
    fn expired_token_is_rejected() {
        let token = issue_token("u1", "a@example.com", "secret", -1).unwrap();
        assert!(matches!(
            verify_token(&token, "secret"),
            Err(AppError::TokenInvalid)
        ));
    }
}
