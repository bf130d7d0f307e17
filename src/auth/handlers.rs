use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{post, put},
    Json, Router,
};
use tracing::instrument;
use validator::Validate;

use super::{
    dto::{CreateTokenPayload, RegisterUserPayload, TokenResponse, UserWithToken},
    services,
};
use crate::{
    error::AppError,
    extract::{AppJson, Valid},
    state::AppState,
};

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/authentication/user", post(register))
        .route("/authentication/token", post(create_token))
        .route("/users/activate/:token", put(activate))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    AppJson(mut payload): AppJson<RegisterUserPayload>,
) -> Result<(StatusCode, Json<UserWithToken>), AppError> {
    payload.normalize();
    payload.validate()?;

    let created = services::register_user(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[instrument(skip(state, payload))]
pub async fn create_token(
    State(state): State<AppState>,
    Valid(mut payload): Valid<CreateTokenPayload>,
) -> Result<(StatusCode, Json<TokenResponse>), AppError> {
    payload.email = payload.email.trim().to_lowercase();

    let token = services::issue_token(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(TokenResponse { token })))
}

#[instrument(skip_all)]
pub async fn activate(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<StatusCode, AppError> {
    services::activate_user(&state, &token).await?;
    Ok(StatusCode::NO_CONTENT)
}
