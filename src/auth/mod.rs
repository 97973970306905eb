//! Bearer token authorization for the order API.
//!
//! Tokens are HS256 JWTs carrying a user id and role. The signing key is
//! injected through `AuthConfig`; nothing here reads process globals.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::AuthConfig;

/// JWT claims carried by order API tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: String,
    pub role: String,
    pub exp: i64,
    pub iss: String,
}

/// Errors from issuing or checking tokens.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Authorization header required")]
    MissingHeader,

    #[error("Bearer token required")]
    NotBearer,

    #[error("Invalid token: {0}")]
    InvalidToken(#[source] jsonwebtoken::errors::Error),

    #[error("Failed to sign token: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),
}

impl AuthError {
    /// Message safe to return to a client.
    pub fn public_message(&self) -> &'static str {
        match self {
            AuthError::MissingHeader => "Authorization header required",
            AuthError::NotBearer => "Bearer token required",
            AuthError::InvalidToken(_) => "Invalid token",
            AuthError::Signing(_) => "Token signing failed",
        }
    }
}

/// Issues and verifies HS256 tokens for one issuer.
#[derive(Clone)]
pub struct JwtAuth {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    ttl: Duration,
}

impl JwtAuth {
    pub fn new(secret: &[u8], issuer: impl Into<String>, ttl: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            issuer: issuer.into(),
            ttl,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(
            config.signing_key.as_bytes(),
            &config.issuer,
            Duration::from_secs(config.token_ttl_secs),
        )
    }

    /// Sign a token for `user_id` with `role`, valid for the configured TTL.
    pub fn issue_token(&self, user_id: &str, role: &str) -> Result<String, AuthError> {
        let exp = chrono::Utc::now() + chrono::Duration::seconds(self.ttl.as_secs() as i64);
        let claims = Claims {
            user_id: user_id.to_string(),
            role: role.to_string(),
            exp: exp.timestamp(),
            iss: self.issuer.clone(),
        };

        encode(&Header::default(), &claims, &self.encoding_key).map_err(AuthError::Signing)
    }

    /// Verify signature, expiry and issuer; return the claims.
    pub fn verify_token(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::default();
        validation.set_issuer(&[&self.issuer]);

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(AuthError::InvalidToken)
    }

    /// Check an `Authorization` header value of the form `Bearer <token>`.
    pub fn authorize(&self, header_value: Option<&str>) -> Result<Claims, AuthError> {
        let value = header_value.ok_or(AuthError::MissingHeader)?;
        let token = value.strip_prefix("Bearer ").ok_or(AuthError::NotBearer)?;
        self.verify_token(token.trim())
    }
}

/// Middleware rejecting requests without a valid bearer token.
///
/// On success the `Claims` are added to the request extensions.
pub async fn require_bearer(
    State(auth): State<Arc<JwtAuth>>,
    mut request: Request,
    next: Next,
) -> Response {
    let header_value = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    match auth.authorize(header_value) {
        Ok(claims) => {
            debug!(user_id = %claims.user_id, role = %claims.role, "Request authorized");
            request.extensions_mut().insert(claims);
            next.run(request).await
        }
        Err(e) => {
            debug!(error = %e, "Request rejected");
            (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({ "error": e.public_message() })),
            )
                .into_response()
        }
    }
}
