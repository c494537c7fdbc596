use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
};
use axum_extra::{
    TypedHeader,
    extract::cookie::CookieJar,
    headers::{Authorization, authorization::Bearer},
};
use jsonwebtoken::{DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tracing::debug;
use uuid::Uuid;

use crate::config::config_loader;

pub const SESSION_COOKIE: &str = "session-token";

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub objective: Option<String>,
    pub exp: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SessionUser {
    pub user_id: Uuid,
    pub name: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub objective: Option<String>,
}

#[derive(Debug)]
pub struct AuthError(anyhow::Error);

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        AuthError(err)
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub fn validate_session_jwt(token: &str, secret: &str) -> Result<SessionUser, AuthError> {
    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    let validation = Validation::new(jsonwebtoken::Algorithm::HS256);

    let token_data = decode::<SessionClaims>(token, &decoding_key, &validation)
        .map_err(|e| anyhow::anyhow!("JWT validation failed: {}", e))?;
    let claims = token_data.claims;

    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| anyhow::anyhow!("Invalid user ID in token"))?;

    Ok(SessionUser {
        user_id,
        name: claims.name,
        email: claims.email,
        role: claims.role,
        objective: claims.objective,
    })
}

/// Optional session. Never rejects: a missing, expired or forged token is
/// `MaybeSession(None)` and the handler decides where to send the visitor.
#[derive(Debug, Clone)]
pub struct MaybeSession(pub Option<SessionUser>);

#[async_trait]
impl<S> FromRequestParts<S> for MaybeSession
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        // 1. Cookie set by the login flow, then a bearer header for API clients
        let jar = CookieJar::from_request_parts(parts, state).await?;
        let token = match jar.get(SESSION_COOKIE) {
            Some(cookie) => Some(cookie.value().to_string()),
            None => TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .ok()
                .map(|TypedHeader(auth)| auth.token().to_string()),
        };

        let Some(token) = token else {
            return Ok(MaybeSession(None));
        };

        // 2. Validate JWT
        let secret = match config_loader::get_session_secret() {
            Ok(session) => session.jwt_secret,
            Err(err) => {
                debug!(error = %err, "auth: session secret unavailable");
                return Ok(MaybeSession(None));
            }
        };

        match validate_session_jwt(&token, &secret) {
            Ok(user) => Ok(MaybeSession(Some(user))),
            Err(err) => {
                debug!(error = %err, "auth: rejected session token");
                Ok(MaybeSession(None))
            }
        }
    }
}

#[cfg(test)]
mod tests;
