use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{info, instrument};

use super::dto::{CreateCommentPayload, CreatePostPayload, UpdatePostPayload};
use crate::{
    auth::AuthUser,
    authz::ensure_owner_or_role,
    error::AppError,
    extract::Valid,
    state::AppState,
    store::{Comment, NewComment, NewPost, Post, PostChanges},
};

/// Role that may edit posts of other users.
pub const EDIT_ROLE: &str = "moderator";
/// Role that may delete posts of other users.
pub const DELETE_ROLE: &str = "admin";

pub fn post_routes() -> Router<AppState> {
    Router::new()
        .route("/posts", post(create_post))
        .route(
            "/posts/:id",
            get(get_post).patch(update_post).delete(delete_post),
        )
        .route("/posts/:id/comments", post(create_comment))
}

#[instrument(skip(state, caller, payload), fields(user_id = caller.id))]
pub async fn create_post(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Valid(payload): Valid<CreatePostPayload>,
) -> Result<(StatusCode, Json<Post>), AppError> {
    let post = state
        .store
        .posts
        .create(NewPost {
            user_id: caller.id,
            title: payload.title,
            content: payload.content,
            tags: payload.tags,
        })
        .await?;
    info!(post_id = post.id, "post created");
    Ok((StatusCode::CREATED, Json(post)))
}

#[instrument(skip(state, _caller))]
pub async fn get_post(
    State(state): State<AppState>,
    _caller: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<Post>, AppError> {
    let mut post = state.store.posts.get_by_id(id).await?;
    post.comments = state.store.comments.list_by_post(id).await?;
    Ok(Json(post))
}

#[instrument(skip(state, caller, payload), fields(user_id = caller.id))]
pub async fn update_post(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(id): Path<i64>,
    Valid(payload): Valid<UpdatePostPayload>,
) -> Result<Json<Post>, AppError> {
    let post = state.store.posts.get_by_id(id).await?;
    ensure_owner_or_role(&*state.store.roles, &caller, post.user_id, EDIT_ROLE).await?;

    let updated = state
        .store
        .posts
        .update(
            id,
            PostChanges {
                title: payload.title,
                content: payload.content,
            },
        )
        .await?;
    info!(post_id = id, "post updated");
    Ok(Json(updated))
}

#[instrument(skip(state, caller), fields(user_id = caller.id))]
pub async fn delete_post(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    let post = state.store.posts.get_by_id(id).await?;
    ensure_owner_or_role(&*state.store.roles, &caller, post.user_id, DELETE_ROLE).await?;

    state.store.posts.delete(id).await?;
    info!(post_id = id, "post deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, caller, payload), fields(user_id = caller.id))]
pub async fn create_comment(
    State(state): State<AppState>,
    AuthUser(caller): AuthUser,
    Path(id): Path<i64>,
    Valid(payload): Valid<CreateCommentPayload>,
) -> Result<(StatusCode, Json<Comment>), AppError> {
    let comment = state
        .store
        .comments
        .create(NewComment {
            post_id: id,
            user_id: caller.id,
            content: payload.content,
        })
        .await?;
    info!(post_id = id, comment_id = comment.id, "comment created");
    Ok((StatusCode::CREATED, Json(comment)))
}
