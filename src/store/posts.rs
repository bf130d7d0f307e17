use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;

use super::{Comment, Deadline, FeedQuery, PostRepository, StoreError, StoreResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(default)]
    pub comments: Vec<Comment>,
}

#[derive(Debug, FromRow)]
struct PostRow {
    id: i64,
    user_id: i64,
    title: String,
    content: String,
    tags: Vec<String>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<PostRow> for Post {
    fn from(r: PostRow) -> Self {
        Self {
            id: r.id,
            user_id: r.user_id,
            title: r.title,
            content: r.content,
            tags: r.tags,
            created_at: r.created_at,
            updated_at: r.updated_at,
            comments: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub user_id: i64,
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
}

/// Partial update; `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct PostChanges {
    pub title: Option<String>,
    pub content: Option<String>,
}

/// Feed entry: a post with its author and comment count.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct FeedItem {
    pub id: i64,
    pub user_id: i64,
    pub username: String,
    pub title: String,
    pub content: String,
    pub tags: Vec<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    pub comments_count: i64,
}

pub struct PgPostRepository {
    db: PgPool,
    deadline: Deadline,
}

impl PgPostRepository {
    pub fn new(db: PgPool, deadline: Deadline) -> Self {
        Self { db, deadline }
    }
}

/// Makes `%`, `_` and `\` match literally inside an `ILIKE ... ESCAPE '\'`.
fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[async_trait]
impl PostRepository for PgPostRepository {
    async fn create(&self, post: NewPost) -> StoreResult<Post> {
        let row = self
            .deadline
            .run(
                sqlx::query_as::<_, PostRow>(
                    r#"
                    INSERT INTO posts (user_id, title, content, tags)
                    VALUES ($1, $2, $3, $4)
                    RETURNING id, user_id, title, content, tags, created_at, updated_at
                    "#,
                )
                .bind(post.user_id)
                .bind(&post.title)
                .bind(&post.content)
                .bind(&post.tags)
                .fetch_one(&self.db),
            )
            .await?;
        Ok(row.into())
    }

    async fn get_by_id(&self, id: i64) -> StoreResult<Post> {
        let row = self
            .deadline
            .run(
                sqlx::query_as::<_, PostRow>(
                    r#"
                    SELECT id, user_id, title, content, tags, created_at, updated_at
                    FROM posts
                    WHERE id = $1
                    "#,
                )
                .bind(id)
                .fetch_optional(&self.db),
            )
            .await?;
        row.map(Post::from).ok_or(StoreError::NotFound)
    }

    async fn update(&self, id: i64, changes: PostChanges) -> StoreResult<Post> {
        let row = self
            .deadline
            .run(
                sqlx::query_as::<_, PostRow>(
                    r#"
                    UPDATE posts
                    SET title = COALESCE($2, title),
                        content = COALESCE($3, content),
                        updated_at = now()
                    WHERE id = $1
                    RETURNING id, user_id, title, content, tags, created_at, updated_at
                    "#,
                )
                .bind(id)
                .bind(changes.title)
                .bind(changes.content)
                .fetch_optional(&self.db),
            )
            .await?;
        row.map(Post::from).ok_or(StoreError::NotFound)
    }

    async fn delete(&self, id: i64) -> StoreResult<()> {
        let done = self
            .deadline
            .run(
                sqlx::query("DELETE FROM posts WHERE id = $1")
                    .bind(id)
                    .execute(&self.db),
            )
            .await?;
        if done.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn user_feed(&self, user_id: i64, query: &FeedQuery) -> StoreResult<Vec<FeedItem>> {
        // sort comes from a closed enum, never from raw input
        let sql = format!(
            r#"
            SELECT p.id, p.user_id, u.username, p.title, p.content, p.tags,
                   p.created_at, p.updated_at, COUNT(c.id) AS comments_count
            FROM posts p
            JOIN users u ON u.id = p.user_id
            LEFT JOIN comments c ON c.post_id = p.id
            WHERE (p.user_id = $1
                   OR p.user_id IN (SELECT user_id FROM followers WHERE follower_id = $1))
              AND ($4::text IS NULL
                   OR p.title ILIKE '%' || $4 || '%' ESCAPE '\'
                   OR p.content ILIKE '%' || $4 || '%' ESCAPE '\')
              AND (cardinality($5::text[]) = 0 OR p.tags @> $5::text[])
            GROUP BY p.id, u.username
            ORDER BY p.created_at {}
            LIMIT $2 OFFSET $3
            "#,
            query.sort.as_sql()
        );

        self.deadline
            .run(
                sqlx::query_as::<_, FeedItem>(&sql)
                    .bind(user_id)
                    .bind(query.limit)
                    .bind(query.offset)
                    .bind(query.search.as_deref().map(escape_like))
                    .bind(&query.tags)
                    .fetch_all(&self.db),
            )
            .await
    }
}
