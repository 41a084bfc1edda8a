use async_trait::async_trait;
use rotation_domain::entities::User;
use rotation_domain::repositories::UserDirectory;
use rotation_errors::RotationResult;
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::error_handling::{RepositoryErrorHelpers, RepositoryOperation};

/// 身份系统同步过来的用户目录
pub struct SqliteUserDirectory {
    pool: SqlitePool,
}

impl SqliteUserDirectory {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> RotationResult<User> {
        Ok(User {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            name: row.try_get("name")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

#[async_trait]
impl UserDirectory for SqliteUserDirectory {
    async fn lookup(&self, user_id: &str) -> RotationResult<Option<User>> {
        let row = sqlx::query("SELECT id, email, name, created_at FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                RepositoryErrorHelpers::database_error(
                    RepositoryOperation::Read,
                    &format!("用户 {user_id}"),
                    e,
                )
            })?;

        match row {
            Some(row) => Ok(Some(Self::row_to_user(&row)?)),
            None => Ok(None),
        }
    }

    async fn list(&self) -> RotationResult<Vec<User>> {
        let rows = sqlx::query("SELECT id, email, name, created_at FROM users ORDER BY name, id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                RepositoryErrorHelpers::database_error(RepositoryOperation::Query, "用户列表", e)
            })?;
        rows.iter().map(Self::row_to_user).collect()
    }

    async fn upsert(&self, user: &User) -> RotationResult<User> {
        let row = sqlx::query(
            r#"
            INSERT INTO users (id, email, name, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT(id) DO UPDATE SET email = excluded.email, name = excluded.name
            RETURNING id, email, name, created_at
            "#,
        )
        .bind(&user.id)
        .bind(&user.email)
        .bind(&user.name)
        .bind(user.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            RepositoryErrorHelpers::database_error(
                RepositoryOperation::Update,
                &format!("用户 {}", user.id),
                e,
            )
        })?;

        debug!("同步用户 {}", user.id);
        Self::row_to_user(&row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::sqlite::test_support::memory_pool;

    #[tokio::test]
    async fn test_upsert_then_lookup() {
        let directory = SqliteUserDirectory::new(memory_pool().await);
        let alice = User::new("alice", "alice@example.com", "Alice");
        let first = directory.upsert(&alice).await.unwrap();
        assert_eq!(first.email, "alice@example.com");

        let renamed = User::new("alice", "alice@corp.example.com", "Alice L.");
        let stored = directory.upsert(&renamed).await.unwrap();
        assert_eq!(stored.name, "Alice L.");
        assert_eq!(stored.created_at, first.created_at);

        let found = directory.lookup("alice").await.unwrap().unwrap();
        assert_eq!(found.email, "alice@corp.example.com");
        assert!(directory.lookup("nobody").await.unwrap().is_none());
        assert_eq!(directory.list().await.unwrap().len(), 1);
    }
}
