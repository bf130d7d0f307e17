use std::time::Duration;

use async_trait::async_trait;
use redis::{
    aio::{ConnectionManager, ConnectionManagerConfig},
    AsyncCommands, Client,
};

use super::{user_key, CacheError, UserCache, USER_TTL};
use crate::store::User;

/// Redis-backed [`UserCache`] storing users as JSON strings.
#[derive(Clone)]
pub struct RedisUserCache {
    conn: ConnectionManager,
    timeout: Duration,
}

impl RedisUserCache {
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self, CacheError> {
        let config = ConnectionManagerConfig::new().set_number_of_retries(1);

        let client = Client::open(url)?;
        let conn = client.get_connection_manager_with_config(config).await?;
        tracing::info!(addr = %url.rsplit('@').next().unwrap_or(url), "redis connected");

        Ok(Self { conn, timeout })
    }
}

#[async_trait]
impl UserCache for RedisUserCache {
    async fn get(&self, id: i64) -> Result<Option<User>, CacheError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = tokio::time::timeout(self.timeout, conn.get(user_key(id)))
            .await
            .map_err(|_| CacheError::Timeout)??;

        match raw {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, user: &User) -> Result<(), CacheError> {
        let json = serde_json::to_string(user)?;
        let mut conn = self.conn.clone();
        tokio::time::timeout(
            self.timeout,
            conn.set_ex::<_, _, ()>(user_key(user.id), json, USER_TTL.as_secs()),
        )
        .await
        .map_err(|_| CacheError::Timeout)??;
        Ok(())
    }
}
