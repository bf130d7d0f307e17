//! Relational repositories, one trait per entity.
//!
//! Every call runs under [`Deadline`]: the query future is dropped when the
//! per-call timeout elapses, and also when the request that started it goes
//! away, so no store work outlives its request.

use std::{future::Future, sync::Arc, time::Duration};

use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use time::OffsetDateTime;

pub mod comments;
pub mod followers;
#[cfg(test)]
pub mod memory;
pub mod pagination;
pub mod posts;
pub mod roles;
pub mod users;

pub use comments::{Comment, NewComment};
pub use pagination::{FeedQuery, SortOrder};
pub use posts::{FeedItem, NewPost, Post, PostChanges};
pub use roles::Role;
pub use users::{NewUser, User};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("resource not found")]
    NotFound,

    #[error("duplicate email")]
    DuplicateEmail,

    #[error("duplicate username")]
    DuplicateUsername,

    #[error("resource already exists")]
    Conflict,

    #[error("store call timed out")]
    Timeout,

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Per-call deadline for store operations.
#[derive(Debug, Clone, Copy)]
pub struct Deadline(pub Duration);

impl Deadline {
    pub async fn run<T, E, F>(self, fut: F) -> StoreResult<T>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<StoreError>,
    {
        match tokio::time::timeout(self.0, fut).await {
            Ok(res) => res.map_err(Into::into),
            Err(_) => Err(StoreError::Timeout),
        }
    }
}

/// Name of the unique constraint a database error violated, if any.
pub(crate) fn violated_unique_constraint(err: &sqlx::Error) -> Option<String> {
    let db_err = err.as_database_error()?;
    if !db_err.is_unique_violation() {
        return None;
    }
    Some(db_err.constraint().unwrap_or_default().to_string())
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Inserts the user and its invitation in one transaction.
    async fn create_and_invite(
        &self,
        user: NewUser,
        token_hash: &str,
        expires_at: OffsetDateTime,
    ) -> StoreResult<User>;

    async fn get_by_id(&self, id: i64) -> StoreResult<User>;

    /// Only active users are returned.
    async fn get_by_email(&self, email: &str) -> StoreResult<User>;

    /// Redeems an unexpired invitation; unknown and expired tokens are both `NotFound`.
    async fn activate(&self, token_hash: &str) -> StoreResult<()>;

    async fn delete(&self, id: i64) -> StoreResult<()>;
}

#[async_trait]
pub trait PostRepository: Send + Sync {
    async fn create(&self, post: NewPost) -> StoreResult<Post>;
    async fn get_by_id(&self, id: i64) -> StoreResult<Post>;
    async fn update(&self, id: i64, changes: PostChanges) -> StoreResult<Post>;
    async fn delete(&self, id: i64) -> StoreResult<()>;
    async fn user_feed(&self, user_id: i64, query: &FeedQuery) -> StoreResult<Vec<FeedItem>>;
}

#[async_trait]
pub trait CommentRepository: Send + Sync {
    async fn create(&self, comment: NewComment) -> StoreResult<Comment>;
    async fn list_by_post(&self, post_id: i64) -> StoreResult<Vec<Comment>>;
}

#[async_trait]
pub trait FollowerRepository: Send + Sync {
    async fn follow(&self, follower_id: i64, followed_id: i64) -> StoreResult<()>;
    async fn unfollow(&self, follower_id: i64, followed_id: i64) -> StoreResult<()>;
}

#[async_trait]
pub trait RoleRepository: Send + Sync {
    async fn get_by_name(&self, name: &str) -> StoreResult<Role>;
}

/// All repositories behind trait objects, shared by every request.
#[derive(Clone)]
pub struct Storage {
    pub users: Arc<dyn UserRepository>,
    pub posts: Arc<dyn PostRepository>,
    pub comments: Arc<dyn CommentRepository>,
    pub followers: Arc<dyn FollowerRepository>,
    pub roles: Arc<dyn RoleRepository>,
}

impl Storage {
    pub fn postgres(db: PgPool, query_timeout: Duration) -> Self {
        let deadline = Deadline(query_timeout);
        Self {
            users: Arc::new(users::PgUserRepository::new(db.clone(), deadline)),
            posts: Arc::new(posts::PgPostRepository::new(db.clone(), deadline)),
            comments: Arc::new(comments::PgCommentRepository::new(db.clone(), deadline)),
            followers: Arc::new(followers::PgFollowerRepository::new(db.clone(), deadline)),
            roles: Arc::new(roles::PgRoleRepository::new(db, deadline)),
        }
    }
}
