use async_trait::async_trait;
use sqlx::PgPool;

use super::{violated_unique_constraint, Deadline, FollowerRepository, StoreError, StoreResult};

pub struct PgFollowerRepository {
    db: PgPool,
    deadline: Deadline,
}

impl PgFollowerRepository {
    pub fn new(db: PgPool, deadline: Deadline) -> Self {
        Self { db, deadline }
    }
}

fn map_follow_error(err: sqlx::Error) -> StoreError {
    if violated_unique_constraint(&err).is_some() {
        return StoreError::Conflict;
    }
    match err.as_database_error() {
        Some(db) if db.is_foreign_key_violation() => StoreError::NotFound,
        _ => StoreError::Database(err),
    }
}

#[async_trait]
impl FollowerRepository for PgFollowerRepository {
    async fn follow(&self, follower_id: i64, followed_id: i64) -> StoreResult<()> {
        self.deadline
            .run(async {
                sqlx::query(
                    r#"
                    INSERT INTO followers (user_id, follower_id)
                    VALUES ($1, $2)
                    "#,
                )
                .bind(followed_id)
                .bind(follower_id)
                .execute(&self.db)
                .await
                .map_err(map_follow_error)?;
                Ok::<_, StoreError>(())
            })
            .await
    }

    async fn unfollow(&self, follower_id: i64, followed_id: i64) -> StoreResult<()> {
        self.deadline
            .run(
                sqlx::query(
                    r#"
                    DELETE FROM followers
                    WHERE user_id = $1 AND follower_id = $2
                    "#,
                )
                .bind(followed_id)
                .bind(follower_id)
                .execute(&self.db),
            )
            .await?;
        Ok(())
    }
}
