use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, put},
    Json, Router,
};
use tracing::{info, instrument};

use super::lookup::get_user;
use crate::{
    auth::AuthUser,
    error::AppError,
    extract::ValidQuery,
    state::AppState,
    store::{FeedItem, FeedQuery, User},
};

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users/:id", get(get_user_handler))
        .route("/users/:id/follow", put(follow))
        .route("/users/:id/unfollow", put(unfollow))
        .route("/feed", get(feed))
}

#[instrument(skip(state, _caller))]
pub async fn get_user_handler(
    State(state): State<AppState>,
    _caller: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<User>, AppError> {
    Ok(Json(get_user(&state, id).await?))
}

#[instrument(skip(state, caller), fields(follower_id = caller.id))]
pub async fn follow(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    if caller.id == id {
        return Err(AppError::BadRequest("cannot follow yourself".into()));
    }
    state.store.followers.follow(caller.id, id).await?;
    info!(followed_id = id, "user followed");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, caller), fields(follower_id = caller.id))]
pub async fn unfollow(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    state.store.followers.unfollow(caller.id, id).await?;
    info!(followed_id = id, "user unfollowed");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, caller), fields(user_id = caller.id))]
pub async fn feed(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    ValidQuery(query): ValidQuery<FeedQuery>,
) -> Result<Json<Vec<FeedItem>>, AppError> {
    let items = state.store.posts.user_feed(caller.id, &query).await?;
    Ok(Json(items))
}
