use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::warn;

use super::jwt::JwtKeys;
use crate::{error::AppError, state::AppState, store::User, users::lookup::get_user};

fn authorization_header<'a>(parts: &'a Parts, scheme: &str) -> Result<&'a str, AppError> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("authorization header is missing".into()))?;

    let (given, value) = header
        .split_once(' ')
        .ok_or_else(|| AppError::Unauthorized("authorization header is malformed".into()))?;
    if !given.eq_ignore_ascii_case(scheme) || value.trim().is_empty() {
        return Err(AppError::Unauthorized(
            "authorization header is malformed".into(),
        ));
    }
    Ok(value.trim())
}

/// The caller behind a valid bearer token, resolved through the user cache.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = authorization_header(parts, "Bearer")?;

        let claims = JwtKeys::from_ref(state).validate_token(token).map_err(|e| {
            warn!(error = %e, "invalid or expired token");
            AppError::Unauthorized("invalid or expired token".into())
        })?;

        let user_id: i64 = claims
            .sub
            .parse()
            .map_err(|_| AppError::Unauthorized("invalid token subject".into()))?;

        match get_user(state, user_id).await {
            Ok(user) => Ok(AuthUser(user)),
            Err(AppError::NotFound) => {
                warn!(user_id, "token subject no longer exists");
                Err(AppError::Unauthorized("unknown user".into()))
            }
            Err(e) => Err(e),
        }
    }
}

/// Proof that the request carried the configured basic credentials.
#[derive(Debug, Clone, Copy)]
pub struct BasicAuth;

#[async_trait]
impl FromRequestParts<AppState> for BasicAuth {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let encoded = authorization_header(parts, "Basic")?;
        let decoded = STANDARD
            .decode(encoded)
            .ok()
            .and_then(|raw| String::from_utf8(raw).ok())
            .ok_or_else(|| AppError::Unauthorized("authorization header is malformed".into()))?;

        let expected = &state.config.basic;
        match decoded.split_once(':') {
            Some((user, pass)) if user == expected.username && pass == expected.password => {
                Ok(BasicAuth)
            }
            _ => {
                warn!("basic auth rejected");
                Err(AppError::Unauthorized("invalid credentials".into()))
            }
        }
    }
}
