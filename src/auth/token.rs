//! Bearer token issuance and verification (HS256 JWT, subject = email).

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::auth::reset::generate_secure_token;
use crate::config::{AuthConfig, JWT_SECRET_ENV};
use crate::error::{AppError, AppResult};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // account email
    pub iat: i64,
    pub exp: i64,
}

pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    expiry: Duration,
}

impl TokenService {
    pub fn new(secret: &[u8], expiry_minutes: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            expiry: Duration::minutes(expiry_minutes),
        }
    }

    /// Falls back to a per-process random secret, which invalidates tokens on restart.
    pub fn from_config(config: &AuthConfig) -> Self {
        match config.jwt_secret.as_deref() {
            Some(secret) if !secret.is_empty() => {
                Self::new(secret.as_bytes(), config.token_expiry_minutes)
            }
            _ => {
                tracing::warn!(
                    "No JWT secret configured (auth.jwt_secret or {}); using an ephemeral one",
                    JWT_SECRET_ENV
                );
                Self::new(
                    generate_secure_token().as_bytes(),
                    config.token_expiry_minutes,
                )
            }
        }
    }

    pub fn issue(&self, email: &str) -> AppResult<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: email.to_string(),
            iat: now.timestamp(),
            exp: (now + self.expiry).timestamp(),
        };
        encode(&Header::default(), &claims, &self.encoding)
            .map_err(|e| AppError::Internal(format!("create JWT: {}", e)))
    }

    pub fn verify(&self, token: &str) -> AppResult<Claims> {
        let mut validation = Validation::default();
        validation.leeway = 0;

        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidEcdsaKey
                | ErrorKind::InvalidRsaKey(_)
                | ErrorKind::RsaFailedSigning
                | ErrorKind::InvalidKeyFormat
                | ErrorKind::Crypto(_) => AppError::Internal(format!("JWT verification: {}", e)),
                _ => AppError::Unauthorized,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_verifies_to_same_subject() {
        let service = TokenService::new(b"test-secret", 30);
        let token = service.issue("ada@example.com").unwrap();
        let claims = service.verify(&token).unwrap();
        assert_eq!(claims.sub, "ada@example.com");
        assert_eq!(claims.exp - claims.iat, 30 * 60);
    }

    #[test]
    fn expired_token_is_unauthorized() {
        let service = TokenService::new(b"test-secret", -5);
        let token = service.issue("ada@example.com").unwrap();
        assert!(matches!(service.verify(&token), Err(AppError::Unauthorized)));
    }

    #[test]
    fn token_from_other_secret_is_unauthorized() {
        let issuer = TokenService::new(b"secret-a", 30);
        let verifier = TokenService::new(b"secret-b", 30);
        let token = issuer.issue("ada@example.com").unwrap();
        assert!(matches!(verifier.verify(&token), Err(AppError::Unauthorized)));
    }

    #[test]
    fn garbage_is_unauthorized() {
        let service = TokenService::new(b"test-secret", 30);
        assert!(matches!(service.verify("not-a-jwt"), Err(AppError::Unauthorized)));
        assert!(matches!(service.verify(""), Err(AppError::Unauthorized)));
    }

    #[test]
    fn missing_secret_falls_back_to_ephemeral() {
        let config = AuthConfig::default();
        let service = TokenService::from_config(&config);
        let token = service.issue("ada@example.com").unwrap();
        assert!(service.verify(&token).is_ok());
    }
}
