use async_trait::async_trait;
use rotation_domain::entities::Notification;
use rotation_domain::repositories::NotificationRepository;
use rotation_errors::{RotationError, RotationResult};
use sqlx::SqlitePool;

use super::{row_to_notification, NOTIFICATION_COLUMNS};
use crate::error_handling::{RepositoryErrorHelpers, RepositoryOperation};

pub struct SqliteNotificationRepository {
    pool: SqlitePool,
}

impl SqliteNotificationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationRepository for SqliteNotificationRepository {
    async fn get_by_id(&self, id: i64) -> RotationResult<Option<Notification>> {
        let row = sqlx::query(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            RepositoryErrorHelpers::database_error(
                RepositoryOperation::Read,
                &format!("通知 (ID: {id})"),
                e,
            )
        })?;

        match row {
            Some(row) => Ok(Some(row_to_notification(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_for_user(&self, user_id: &str) -> RotationResult<Vec<Notification>> {
        let rows = sqlx::query(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE user_id = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            RepositoryErrorHelpers::database_error(
                RepositoryOperation::Query,
                &format!("用户 {user_id} 的通知"),
                e,
            )
        })?;
        rows.iter().map(row_to_notification).collect()
    }

    async fn count_unread(&self, user_id: &str) -> RotationResult<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND read = 0")
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| {
                RepositoryErrorHelpers::database_error(
                    RepositoryOperation::Query,
                    &format!("用户 {user_id} 的未读通知数"),
                    e,
                )
            })
    }

    async fn mark_read(&self, id: i64) -> RotationResult<()> {
        let result = sqlx::query("UPDATE notifications SET read = 1 WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                RepositoryErrorHelpers::database_error(
                    RepositoryOperation::Update,
                    &format!("通知 (ID: {id})"),
                    e,
                )
            })?;

        if result.rows_affected() == 0 {
            return Err(RotationError::notification_not_found(id));
        }
        Ok(())
    }

    async fn mark_all_read(&self, user_id: &str) -> RotationResult<u64> {
        let result = sqlx::query("UPDATE notifications SET read = 1 WHERE user_id = $1 AND read = 0")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                RepositoryErrorHelpers::database_error(
                    RepositoryOperation::Update,
                    &format!("用户 {user_id} 的通知"),
                    e,
                )
            })?;
        Ok(result.rows_affected())
    }

    async fn delete(&self, id: i64) -> RotationResult<()> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                RepositoryErrorHelpers::database_error(
                    RepositoryOperation::Delete,
                    &format!("通知 (ID: {id})"),
                    e,
                )
            })?;

        if result.rows_affected() == 0 {
            return Err(RotationError::notification_not_found(id));
        }
        Ok(())
    }
}
