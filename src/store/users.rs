use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;

use super::{violated_unique_constraint, Deadline, Role, StoreError, StoreResult, UserRepository};

/// Role assigned to every newly registered account.
pub const DEFAULT_ROLE: &str = "user";

/// User record in the database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    /// Argon2 hash; never serialized, so cached copies carry an empty hash.
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub is_active: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub role: Role,
}

/// Fields supplied at registration; the store assigns the rest.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

#[derive(Debug, FromRow)]
struct UserRow {
    id: i64,
    username: String,
    email: String,
    password_hash: String,
    is_active: bool,
    created_at: OffsetDateTime,
    role_id: i64,
    role_name: String,
    role_level: i64,
    role_description: String,
}

impl From<UserRow> for User {
    fn from(r: UserRow) -> Self {
        Self {
            id: r.id,
            username: r.username,
            email: r.email,
            password_hash: r.password_hash,
            is_active: r.is_active,
            created_at: r.created_at,
            role: Role {
                id: r.role_id,
                name: r.role_name,
                level: r.role_level,
                description: r.role_description,
            },
        }
    }
}

const SELECT_USER: &str = r#"
    SELECT u.id, u.username, u.email, u.password_hash, u.is_active, u.created_at,
           r.id AS role_id, r.name AS role_name, r.level AS role_level,
           r.description AS role_description
    FROM users u
    JOIN roles r ON r.id = u.role_id
"#;

fn map_insert_error(err: sqlx::Error) -> StoreError {
    match violated_unique_constraint(&err).as_deref() {
        Some("users_email_key") => StoreError::DuplicateEmail,
        Some("users_username_key") => StoreError::DuplicateUsername,
        Some(_) => StoreError::Conflict,
        None => StoreError::Database(err),
    }
}

pub struct PgUserRepository {
    db: PgPool,
    deadline: Deadline,
}

impl PgUserRepository {
    pub fn new(db: PgPool, deadline: Deadline) -> Self {
        Self { db, deadline }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create_and_invite(
        &self,
        user: NewUser,
        token_hash: &str,
        expires_at: OffsetDateTime,
    ) -> StoreResult<User> {
        self.deadline
            .run(async {
                let mut tx = self.db.begin().await?;

                let row = sqlx::query_as::<_, UserRow>(
                    r#"
                    WITH inserted AS (
                        INSERT INTO users (username, email, password_hash, role_id)
                        VALUES ($1, $2, $3, (SELECT id FROM roles WHERE name = $4))
                        RETURNING id, username, email, password_hash, is_active, created_at, role_id
                    )
                    SELECT i.id, i.username, i.email, i.password_hash, i.is_active, i.created_at,
                           r.id AS role_id, r.name AS role_name, r.level AS role_level,
                           r.description AS role_description
                    FROM inserted i
                    JOIN roles r ON r.id = i.role_id
                    "#,
                )
                .bind(&user.username)
                .bind(&user.email)
                .bind(&user.password_hash)
                .bind(DEFAULT_ROLE)
                .fetch_one(&mut *tx)
                .await
                .map_err(map_insert_error)?;

                sqlx::query(
                    r#"
                    INSERT INTO user_invitations (token, user_id, expiry)
                    VALUES ($1, $2, $3)
                    "#,
                )
                .bind(token_hash)
                .bind(row.id)
                .bind(expires_at)
                .execute(&mut *tx)
                .await?;

                tx.commit().await?;
                Ok::<_, StoreError>(User::from(row))
            })
            .await
    }

    async fn get_by_id(&self, id: i64) -> StoreResult<User> {
        let row = self
            .deadline
            .run(
                sqlx::query_as::<_, UserRow>(&format!("{SELECT_USER} WHERE u.id = $1"))
                    .bind(id)
                    .fetch_optional(&self.db),
            )
            .await?;
        row.map(User::from).ok_or(StoreError::NotFound)
    }

    async fn get_by_email(&self, email: &str) -> StoreResult<User> {
        let row = self
            .deadline
            .run(
                sqlx::query_as::<_, UserRow>(&format!(
                    "{SELECT_USER} WHERE u.email = $1 AND u.is_active = TRUE"
                ))
                .bind(email)
                .fetch_optional(&self.db),
            )
            .await?;
        row.map(User::from).ok_or(StoreError::NotFound)
    }

    async fn activate(&self, token_hash: &str) -> StoreResult<()> {
        self.deadline
            .run(async {
                let mut tx = self.db.begin().await?;

                let user_id: i64 = sqlx::query_scalar(
                    r#"
                    SELECT u.id
                    FROM users u
                    JOIN user_invitations ui ON ui.user_id = u.id
                    WHERE ui.token = $1 AND ui.expiry > now()
                    "#,
                )
                .bind(token_hash)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(StoreError::NotFound)?;

                sqlx::query("UPDATE users SET is_active = TRUE WHERE id = $1")
                    .bind(user_id)
                    .execute(&mut *tx)
                    .await?;

                sqlx::query("DELETE FROM user_invitations WHERE user_id = $1")
                    .bind(user_id)
                    .execute(&mut *tx)
                    .await?;

                tx.commit().await?;
                Ok::<_, StoreError>(())
            })
            .await
    }

    async fn delete(&self, id: i64) -> StoreResult<()> {
        self.deadline
            .run(async {
                let mut tx = self.db.begin().await?;

                sqlx::query("DELETE FROM user_invitations WHERE user_id = $1")
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;

                let deleted = sqlx::query("DELETE FROM users WHERE id = $1")
                    .bind(id)
                    .execute(&mut *tx)
                    .await?
                    .rows_affected();
                if deleted == 0 {
                    return Err(StoreError::NotFound);
                }

                tx.commit().await?;
                Ok(())
            })
            .await
    }
}
