use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;

use super::{CommentRepository, Deadline, StoreError, StoreResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Comment {
    pub id: i64,
    pub post_id: i64,
    pub user_id: i64,
    pub username: String,
    pub content: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewComment {
    pub post_id: i64,
    pub user_id: i64,
    pub content: String,
}

pub struct PgCommentRepository {
    db: PgPool,
    deadline: Deadline,
}

impl PgCommentRepository {
    pub fn new(db: PgPool, deadline: Deadline) -> Self {
        Self { db, deadline }
    }
}

#[async_trait]
impl CommentRepository for PgCommentRepository {
    async fn create(&self, comment: NewComment) -> StoreResult<Comment> {
        let created = self
            .deadline
            .run(
                sqlx::query_as::<_, Comment>(
                    r#"
                    WITH inserted AS (
                        INSERT INTO comments (post_id, user_id, content)
                        VALUES ($1, $2, $3)
                        RETURNING id, post_id, user_id, content, created_at
                    )
                    SELECT i.id, i.post_id, i.user_id, u.username, i.content, i.created_at
                    FROM inserted i
                    JOIN users u ON u.id = i.user_id
                    "#,
                )
                .bind(comment.post_id)
                .bind(comment.user_id)
                .bind(&comment.content)
                .fetch_one(&self.db),
            )
            .await;

        match created {
            // the post vanished between lookup and insert
            Err(StoreError::Database(e))
                if e.as_database_error()
                    .is_some_and(|d| d.is_foreign_key_violation()) =>
            {
                Err(StoreError::NotFound)
            }
            other => other,
        }
    }

    async fn list_by_post(&self, post_id: i64) -> StoreResult<Vec<Comment>> {
        self.deadline
            .run(
                sqlx::query_as::<_, Comment>(
                    r#"
                    SELECT c.id, c.post_id, c.user_id, u.username, c.content, c.created_at
                    FROM comments c
                    JOIN users u ON u.id = c.user_id
                    WHERE c.post_id = $1
                    ORDER BY c.created_at DESC
                    "#,
                )
                .bind(post_id)
                .fetch_all(&self.db),
            )
            .await
    }
}
