//! Caller identity for callable functions.
//!
//! Callers present an ID token as `Authorization: Bearer <jwt>`. A verified
//! token becomes a [`CallerIdentity`], the capability handlers take as proof
//! that a uid is authenticated. Handlers never look at headers themselves.

use axum::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::{header, request::Parts};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;

use crate::config::AuthConfig;

/// Claims carried by a caller's ID token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallerClaims {
    /// Subject (uid)
    pub sub: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    #[serde(default)]
    pub iat: Option<i64>,
    #[serde(default)]
    pub email: Option<String>,
}

/// An authenticated end user.
#[derive(Debug, Clone)]
pub struct CallerIdentity {
    pub uid: String,
    pub claims: CallerClaims,
}

impl CallerIdentity {
    pub fn new(claims: CallerClaims) -> Self {
        Self {
            uid: claims.sub.clone(),
            claims,
        }
    }
}

/// Validates caller ID tokens.
#[derive(Clone)]
pub struct CallerVerifier {
    decoding_key: Option<DecodingKey>,
    validation: Validation,
}

impl CallerVerifier {
    pub fn new(config: &AuthConfig) -> Self {
        let decoding_key = config
            .jwt_secret
            .as_ref()
            .map(|secret| DecodingKey::from_secret(secret.expose_secret().as_bytes()));

        let mut validation = Validation::new(Algorithm::HS256);
        if let Some(issuer) = &config.issuer {
            validation.set_issuer(&[issuer]);
        }
        match &config.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        if decoding_key.is_none() {
            tracing::warn!("AUTH_JWT_SECRET not configured - all callable requests will be rejected");
        }

        Self {
            decoding_key,
            validation,
        }
    }

    pub fn verify(&self, token: &str) -> Result<CallerIdentity, AppError> {
        let key = self.decoding_key.as_ref().ok_or(AppError::Unauthenticated)?;

        let data = decode::<CallerClaims>(token, key, &self.validation).map_err(|e| {
            tracing::debug!(error = %e, "Rejected caller token");
            AppError::Unauthenticated
        })?;

        if data.claims.sub.is_empty() {
            return Err(AppError::Unauthenticated);
        }

        Ok(CallerIdentity::new(data.claims))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for CallerIdentity
where
    CallerVerifier: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(AppError::Unauthenticated)?;

        let identity = CallerVerifier::from_ref(state).verify(token)?;

        tracing::Span::current().record("uid", identity.uid.as_str());

        Ok(identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use secrecy::Secret;

    const SECRET: &str = "caller-test-secret";

    fn auth_config() -> AuthConfig {
        AuthConfig {
            jwt_secret: Some(Secret::new(SECRET.to_string())),
            issuer: None,
            audience: None,
            trigger_token: None,
        }
    }

    fn token(sub: &str, exp_offset: i64, secret: &str) -> String {
        let claims = CallerClaims {
            sub: sub.to_string(),
            exp: chrono::Utc::now().timestamp() + exp_offset,
            iat: None,
            email: Some("u1@example.com".into()),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn valid_token_yields_identity() {
        let verifier = CallerVerifier::new(&auth_config());
        let identity = verifier.verify(&token("u1", 3600, SECRET)).unwrap();
        assert_eq!(identity.uid, "u1");
        assert_eq!(identity.claims.email.as_deref(), Some("u1@example.com"));
    }

    #[test]
    fn token_signed_with_other_key_is_rejected() {
        let verifier = CallerVerifier::new(&auth_config());
        let result = verifier.verify(&token("u1", 3600, "someone-else"));
        assert!(matches!(result, Err(AppError::Unauthenticated)));
    }

    #[test]
    fn expired_token_is_rejected() {
        let verifier = CallerVerifier::new(&auth_config());
        let result = verifier.verify(&token("u1", -3600, SECRET));
        assert!(matches!(result, Err(AppError::Unauthenticated)));
    }

    #[test]
    fn missing_secret_rejects_everything() {
        let verifier = CallerVerifier::new(&AuthConfig {
            jwt_secret: None,
            ..auth_config()
        });
        let result = verifier.verify(&token("u1", 3600, SECRET));
        assert!(matches!(result, Err(AppError::Unauthenticated)));
    }

    #[test]
    fn issuer_is_enforced_when_configured() {
        let verifier = CallerVerifier::new(&AuthConfig {
            issuer: Some("https://issuer.example".into()),
            ..auth_config()
        });
        let result = verifier.verify(&token("u1", 3600, SECRET));
        assert!(matches!(result, Err(AppError::Unauthenticated)));
    }
}
