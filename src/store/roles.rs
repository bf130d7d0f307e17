use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};

use super::{Deadline, RoleRepository, StoreError, StoreResult};

/// Named privilege level; a lower `level` takes precedence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Role {
    pub id: i64,
    pub name: String,
    pub level: i64,
    pub description: String,
}

pub struct PgRoleRepository {
    db: PgPool,
    deadline: Deadline,
}

impl PgRoleRepository {
    pub fn new(db: PgPool, deadline: Deadline) -> Self {
        Self { db, deadline }
    }
}

#[async_trait]
impl RoleRepository for PgRoleRepository {
    async fn get_by_name(&self, name: &str) -> StoreResult<Role> {
        let role = self
            .deadline
            .run(
                sqlx::query_as::<_, Role>(
                    r#"
                    SELECT id, name, level, description
                    FROM roles
                    WHERE name = $1
                    "#,
                )
                .bind(name)
                .fetch_optional(&self.db),
            )
            .await?;
        role.ok_or(StoreError::NotFound)
    }
}
