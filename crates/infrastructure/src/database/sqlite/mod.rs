pub mod sqlite_assignment_repository;
pub mod sqlite_notification_repository;
pub mod sqlite_rotation_repository;
pub mod sqlite_task_repository;
pub mod sqlite_user_directory;

pub use sqlite_assignment_repository::SqliteAssignmentRepository;
pub use sqlite_notification_repository::SqliteNotificationRepository;
pub use sqlite_rotation_repository::SqliteRotationRepository;
pub use sqlite_task_repository::SqliteTaskRepository;
pub use sqlite_user_directory::SqliteUserDirectory;

use rotation_domain::entities::{Assignment, Notification, Task};
use rotation_errors::RotationResult;
use sqlx::Row;

pub(crate) const TASK_COLUMNS: &str =
    "id, title, description, cycle_interval, notify_lead_days, created_by, created_at, updated_at";

pub(crate) const ASSIGNMENT_COLUMNS: &str =
    "id, task_id, user_id, start_date, due_date, completed, notification_sent, completed_at, completed_by";

pub(crate) const NOTIFICATION_COLUMNS: &str =
    "id, user_id, task_id, message, type, read, created_at";

pub(crate) fn row_to_task(row: &sqlx::sqlite::SqliteRow) -> RotationResult<Task> {
    Ok(Task {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        cycle_interval: row.try_get("cycle_interval")?,
        notify_lead_days: row.try_get("notify_lead_days")?,
        created_by: row.try_get("created_by")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub(crate) fn row_to_assignment(row: &sqlx::sqlite::SqliteRow) -> RotationResult<Assignment> {
    Ok(Assignment {
        id: row.try_get("id")?,
        task_id: row.try_get("task_id")?,
        user_id: row.try_get("user_id")?,
        start_date: row.try_get("start_date")?,
        due_date: row.try_get("due_date")?,
        completed: row.try_get("completed")?,
        notification_sent: row.try_get("notification_sent")?,
        completed_at: row.try_get("completed_at")?,
        completed_by: row.try_get("completed_by")?,
    })
}

pub(crate) fn row_to_notification(row: &sqlx::sqlite::SqliteRow) -> RotationResult<Notification> {
    Ok(Notification {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        task_id: row.try_get("task_id")?,
        message: row.try_get("message")?,
        kind: row.try_get("type")?,
        read: row.try_get("read")?,
        created_at: row.try_get("created_at")?,
    })
}

/// 在事务内插入一条分配，返回带数据库ID的记录
pub(crate) async fn insert_assignment<'e, E>(
    executor: E,
    assignment: &Assignment,
) -> Result<Assignment, sqlx::Error>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let row = sqlx::query(
        r#"
        INSERT INTO task_assignments (task_id, user_id, start_date, due_date, completed, notification_sent)
        VALUES ($1, $2, $3, $4, 0, 0)
        RETURNING id
        "#,
    )
    .bind(assignment.task_id)
    .bind(&assignment.user_id)
    .bind(assignment.start_date)
    .bind(assignment.due_date)
    .fetch_one(executor)
    .await?;

    Ok(Assignment {
        id: row.try_get("id")?,
        completed: false,
        notification_sent: false,
        completed_at: None,
        completed_by: None,
        ..assignment.clone()
    })
}

pub(crate) async fn insert_notification<'e, E>(
    executor: E,
    notification: &Notification,
) -> Result<i64, sqlx::Error>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    let row = sqlx::query(
        r#"
        INSERT INTO notifications (user_id, task_id, message, type, read, created_at)
        VALUES ($1, $2, $3, $4, 0, $5)
        RETURNING id
        "#,
    )
    .bind(&notification.user_id)
    .bind(notification.task_id)
    .bind(&notification.message)
    .bind(notification.kind)
    .bind(notification.created_at)
    .fetch_one(executor)
    .await?;
    row.try_get("id")
}
