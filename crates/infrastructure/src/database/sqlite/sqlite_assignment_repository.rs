use async_trait::async_trait;
use rotation_domain::entities::{Assignment, Handoff, Notification};
use rotation_domain::repositories::AssignmentRepository;
use rotation_errors::{RotationError, RotationResult};
use sqlx::SqlitePool;
use tracing::{debug, instrument, warn};

use super::{insert_assignment, insert_notification, row_to_assignment, ASSIGNMENT_COLUMNS};
use crate::error_handling::{RepositoryErrorHelpers, RepositoryOperation};

pub struct SqliteAssignmentRepository {
    pool: SqlitePool,
}

impl SqliteAssignmentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn fetch_many(&self, sql: &str, bind: Option<&str>, entity: &str) -> RotationResult<Vec<Assignment>> {
        let mut query = sqlx::query(sql);
        if let Some(value) = bind {
            query = query.bind(value);
        }
        let rows = query.fetch_all(&self.pool).await.map_err(|e| {
            RepositoryErrorHelpers::database_error(RepositoryOperation::Query, entity, e)
        })?;
        rows.iter().map(row_to_assignment).collect()
    }
}

#[async_trait]
impl AssignmentRepository for SqliteAssignmentRepository {
    async fn get_by_id(&self, id: i64) -> RotationResult<Option<Assignment>> {
        let row = sqlx::query(&format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM task_assignments WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            RepositoryErrorHelpers::database_error(
                RepositoryOperation::Read,
                &format!("分配 (ID: {id})"),
                e,
            )
        })?;

        match row {
            Some(row) => Ok(Some(row_to_assignment(&row)?)),
            None => Ok(None),
        }
    }

    async fn find_open(&self, task_id: i64) -> RotationResult<Option<Assignment>> {
        let row = sqlx::query(&format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM task_assignments WHERE task_id = $1 AND completed = 0"
        ))
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            RepositoryErrorHelpers::database_error(
                RepositoryOperation::Read,
                &format!("任务 {task_id} 的进行中分配"),
                e,
            )
        })?;

        match row {
            Some(row) => Ok(Some(row_to_assignment(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_by_task(&self, task_id: i64) -> RotationResult<Vec<Assignment>> {
        let rows = sqlx::query(&format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM task_assignments WHERE task_id = $1 ORDER BY start_date DESC, id DESC"
        ))
        .bind(task_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            RepositoryErrorHelpers::database_error(
                RepositoryOperation::Query,
                &format!("任务 {task_id} 的分配历史"),
                e,
            )
        })?;
        rows.iter().map(row_to_assignment).collect()
    }

    async fn list_open_for_user(&self, user_id: &str) -> RotationResult<Vec<Assignment>> {
        self.fetch_many(
            &format!(
                "SELECT {ASSIGNMENT_COLUMNS} FROM task_assignments WHERE user_id = $1 AND completed = 0 ORDER BY due_date"
            ),
            Some(user_id),
            "用户的进行中分配",
        )
        .await
    }

    async fn find_reminder_candidates(&self) -> RotationResult<Vec<Assignment>> {
        self.fetch_many(
            &format!(
                "SELECT {ASSIGNMENT_COLUMNS} FROM task_assignments WHERE completed = 0 AND notification_sent = 0 ORDER BY due_date"
            ),
            None,
            "待提醒分配",
        )
        .await
    }

    /// 第一条语句是 completed 0 -> 1 的 CAS，未命中时整个事务回滚
    ///
    /// CAS 之后事务已持有写锁，此时再读一次轮值：与 `handoff.rotation` 不一致
    /// 说明继任者是按旧轮值算出的，同样回滚并返回冲突。
    #[instrument(skip(self, handoff), fields(
        task_id = handoff.task_id,
        assignment_id = handoff.completed_assignment_id,
        successor = %handoff.successor.user_id,
    ))]
    async fn complete_and_advance(&self, handoff: &Handoff) -> RotationResult<Assignment> {
        let op = RepositoryOperation::Complete;
        let entity = format!("任务 {} 的分配 {}", handoff.task_id, handoff.completed_assignment_id);
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepositoryErrorHelpers::database_error(op, &entity, e))?;

        let closed = sqlx::query(
            r#"
            UPDATE task_assignments
            SET completed = 1, completed_at = $2, completed_by = $3
            WHERE id = $1 AND task_id = $4 AND completed = 0
            "#,
        )
        .bind(handoff.completed_assignment_id)
        .bind(handoff.completed_at)
        .bind(&handoff.completed_by)
        .bind(handoff.task_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(op, &entity, e))?;

        if closed.rows_affected() == 0 {
            warn!("{}已不是进行中状态，放弃本次完成", entity);
            return Err(RotationError::conflict(
                handoff.task_id,
                handoff.completed_assignment_id,
            ));
        }

        let current_rotation: Vec<String> = sqlx::query_scalar(
            "SELECT user_id FROM task_rotation WHERE task_id = $1 ORDER BY position",
        )
        .bind(handoff.task_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(op, &entity, e))?;

        if current_rotation != handoff.rotation {
            warn!("任务 {} 的轮值在完成过程中被修改，放弃本次完成", handoff.task_id);
            return Err(RotationError::conflict(
                handoff.task_id,
                handoff.completed_assignment_id,
            ));
        }

        let successor = match insert_assignment(&mut *tx, &handoff.successor).await {
            Ok(successor) => successor,
            Err(e) if RepositoryErrorHelpers::is_unique_violation(&e) => {
                warn!("{}已存在进行中的分配，放弃本次完成", entity);
                return Err(RotationError::conflict(
                    handoff.task_id,
                    handoff.completed_assignment_id,
                ));
            }
            Err(e) => return Err(RepositoryErrorHelpers::database_error(op, &entity, e)),
        };

        insert_notification(&mut *tx, &handoff.notification)
            .await
            .map_err(|e| RepositoryErrorHelpers::database_error(op, "交接通知", e))?;

        tx.commit()
            .await
            .map_err(|e| RepositoryErrorHelpers::database_error(op, &entity, e))?;

        debug!("{}已完成，新分配ID: {}", entity, successor.id);
        Ok(successor)
    }

    #[instrument(skip(self, reminder), fields(user_id = %reminder.user_id))]
    async fn latch_reminder(
        &self,
        assignment_id: i64,
        reminder: &Notification,
    ) -> RotationResult<bool> {
        let op = RepositoryOperation::Latch;
        let entity = format!("分配 (ID: {assignment_id})");
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepositoryErrorHelpers::database_error(op, &entity, e))?;

        let latched = sqlx::query(
            r#"
            UPDATE task_assignments
            SET notification_sent = 1
            WHERE id = $1 AND completed = 0 AND notification_sent = 0
            "#,
        )
        .bind(assignment_id)
        .execute(&mut *tx)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(op, &entity, e))?;

        if latched.rows_affected() == 0 {
            debug!("{}已完成或已提醒，不记录通知", entity);
            return Ok(false);
        }

        insert_notification(&mut *tx, reminder)
            .await
            .map_err(|e| RepositoryErrorHelpers::database_error(op, "提醒通知", e))?;

        tx.commit()
            .await
            .map_err(|e| RepositoryErrorHelpers::database_error(op, &entity, e))?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::sqlite::test_support::memory_pool;
    use crate::database::sqlite::{SqliteRotationRepository, SqliteTaskRepository};
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use rotation_domain::entities::{NotificationKind, Task};
    use rotation_domain::repositories::{RotationRepository, TaskRepository};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    async fn seeded() -> (SqlitePool, SqliteAssignmentRepository, Assignment) {
        let pool = memory_pool().await;
        let task = Task::new("Dishes".into(), String::new(), 7, 2, "alice".into(), t0());
        let (_, first) = SqliteTaskRepository::new(pool.clone())
            .create_with_rotation(
                &task,
                &["alice".to_string(), "bob".to_string()],
                &Assignment::open(0, "alice".into(), t0(), 7).unwrap(),
            )
            .await
            .unwrap();
        (pool.clone(), SqliteAssignmentRepository::new(pool), first)
    }

    fn handoff_for(open: &Assignment, now: DateTime<Utc>) -> Handoff {
        Handoff {
            completed_assignment_id: open.id,
            task_id: open.task_id,
            completed_by: open.user_id.clone(),
            completed_at: now,
            successor: Assignment::open(open.task_id, "bob".into(), now, 7).unwrap(),
            notification: Notification::new(
                "bob".into(),
                open.task_id,
                "You are now responsible for \"Dishes\"".into(),
                NotificationKind::Handoff,
                now,
            ),
            rotation: vec!["alice".into(), "bob".into()],
        }
    }

    async fn count(pool: &SqlitePool, sql: &str) -> i64 {
        sqlx::query_scalar(sql).fetch_one(pool).await.unwrap()
    }

    #[tokio::test]
    async fn test_complete_and_advance_commits_all_writes() {
        let (pool, repo, first) = seeded().await;
        let now = t0() + Duration::days(3);

        let successor = repo.complete_and_advance(&handoff_for(&first, now)).await.unwrap();
        assert_eq!(successor.user_id, "bob");
        assert_eq!(successor.due_date, now + Duration::days(7));

        let closed = repo.get_by_id(first.id).await.unwrap().unwrap();
        assert!(closed.completed);
        assert_eq!(closed.completed_at, Some(now));
        assert_eq!(closed.completed_by.as_deref(), Some("alice"));

        let open = repo.find_open(first.task_id).await.unwrap().unwrap();
        assert_eq!(open.id, successor.id);
        assert_eq!(
            count(&pool, "SELECT COUNT(*) FROM notifications WHERE type = 'HANDOFF'").await,
            1
        );
        assert_eq!(repo.list_by_task(first.task_id).await.unwrap()[0].id, successor.id);
    }

    #[tokio::test]
    async fn test_complete_after_rotation_edit_conflicts_without_writes() {
        let (pool, repo, first) = seeded().await;
        let handoff = handoff_for(&first, t0() + Duration::days(1));

        SqliteRotationRepository::new(pool.clone())
            .replace_rotation(first.task_id, &["alice".to_string(), "carol".to_string()])
            .await
            .unwrap();

        let err = repo.complete_and_advance(&handoff).await.unwrap_err();
        assert_eq!(err, RotationError::conflict(first.task_id, first.id));

        let still_open = repo.find_open(first.task_id).await.unwrap().unwrap();
        assert_eq!(still_open.id, first.id);
        assert!(still_open.completed_by.is_none());
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM task_assignments").await, 1);
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM notifications").await, 0);
    }

    #[tokio::test]
    async fn test_complete_stale_assignment_conflicts_without_writes() {
        let (pool, repo, first) = seeded().await;
        let handoff = handoff_for(&first, t0() + Duration::days(1));
        repo.complete_and_advance(&handoff).await.unwrap();

        let err = repo.complete_and_advance(&handoff).await.unwrap_err();
        assert_eq!(err, RotationError::conflict(first.task_id, first.id));

        assert_eq!(count(&pool, "SELECT COUNT(*) FROM task_assignments").await, 2);
        assert_eq!(count(&pool, "SELECT COUNT(*) FROM notifications").await, 1);
    }

    #[tokio::test]
    async fn test_latch_reminder_once() {
        let (pool, repo, first) = seeded().await;
        let reminder = Notification::new(
            "alice".into(),
            first.task_id,
            "Reminder: \"Dishes\" is due in 1 days!".into(),
            NotificationKind::Reminder,
            t0() + Duration::days(6),
        );

        assert_eq!(repo.find_reminder_candidates().await.unwrap().len(), 1);
        assert!(repo.latch_reminder(first.id, &reminder).await.unwrap());
        assert!(!repo.latch_reminder(first.id, &reminder).await.unwrap());

        assert!(repo.find_reminder_candidates().await.unwrap().is_empty());
        assert_eq!(
            count(&pool, "SELECT COUNT(*) FROM notifications WHERE type = 'REMINDER'").await,
            1
        );
    }

    #[tokio::test]
    async fn test_latch_skips_completed_assignment() {
        let (_, repo, first) = seeded().await;
        let now = t0() + Duration::days(6);
        repo.complete_and_advance(&handoff_for(&first, now)).await.unwrap();

        let reminder = Notification::new(
            "alice".into(),
            first.task_id,
            "late".into(),
            NotificationKind::Reminder,
            now,
        );
        assert!(!repo.latch_reminder(first.id, &reminder).await.unwrap());
        assert!(!repo.get_by_id(first.id).await.unwrap().unwrap().notification_sent);
    }

    #[tokio::test]
    async fn test_open_assignments_for_user() {
        let (_, repo, first) = seeded().await;
        assert_eq!(repo.list_open_for_user("alice").await.unwrap().len(), 1);
        repo.complete_and_advance(&handoff_for(&first, t0())).await.unwrap();
        assert!(repo.list_open_for_user("alice").await.unwrap().is_empty());
        assert_eq!(repo.list_open_for_user("bob").await.unwrap().len(), 1);
    }
}
