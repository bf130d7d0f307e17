//! Read-through cache for users, keyed by id.
//!
//! The relational store stays authoritative: entries are written only as a
//! byproduct of store reads and simply expire after [`USER_TTL`].

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::store::User;

mod redis;

pub use self::redis::RedisUserCache;

/// Fixed lifetime of every cached user.
pub const USER_TTL: Duration = Duration::from_secs(2 * 60 * 60);

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache call timed out")]
    Timeout,

    #[error("cache backend error: {0}")]
    Backend(#[from] ::redis::RedisError),

    #[error("cached value is corrupt: {0}")]
    Codec(#[from] serde_json::Error),
}

pub fn user_key(id: i64) -> String {
    format!("user:{id}")
}

#[async_trait]
pub trait UserCache: Send + Sync {
    /// `Ok(None)` on a miss; `Err` only when the cache itself fails.
    async fn get(&self, id: i64) -> Result<Option<User>, CacheError>;

    /// Stores the user under [`user_key`] with [`USER_TTL`].
    async fn set(&self, user: &User) -> Result<(), CacheError>;
}
