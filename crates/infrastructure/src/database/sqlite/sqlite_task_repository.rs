use async_trait::async_trait;
use rotation_domain::entities::{Assignment, Task};
use rotation_domain::repositories::TaskRepository;
use rotation_errors::{RotationError, RotationResult};
use sqlx::{Row, SqlitePool};
use tracing::{debug, instrument};

use super::{insert_assignment, row_to_task, TASK_COLUMNS};
use crate::error_handling::{RepositoryErrorHelpers, RepositoryOperation};

pub struct SqliteTaskRepository {
    pool: SqlitePool,
}

impl SqliteTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    #[instrument(skip(self, task, rotation, first_assignment), fields(
        title = %task.title,
        members = rotation.len(),
        first_assignee = %first_assignment.user_id,
    ))]
    async fn create_with_rotation(
        &self,
        task: &Task,
        rotation: &[String],
        first_assignment: &Assignment,
    ) -> RotationResult<(Task, Assignment)> {
        let op = RepositoryOperation::Create;
        let entity = task.entity_description();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepositoryErrorHelpers::database_error(op, &entity, e))?;

        let row = sqlx::query(
            r#"
            INSERT INTO tasks (title, description, cycle_interval, notify_lead_days, created_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.cycle_interval)
        .bind(task.notify_lead_days)
        .bind(&task.created_by)
        .bind(task.created_at)
        .bind(task.updated_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(op, &entity, e))?;

        let task_id: i64 = row.try_get("id")?;

        for (position, user_id) in rotation.iter().enumerate() {
            sqlx::query("INSERT INTO task_rotation (task_id, user_id, position) VALUES ($1, $2, $3)")
                .bind(task_id)
                .bind(user_id)
                .bind(position as i32)
                .execute(&mut *tx)
                .await
                .map_err(|e| RepositoryErrorHelpers::database_error(op, "轮值", e))?;
        }

        let assignment = insert_assignment(
            &mut *tx,
            &Assignment {
                task_id,
                ..first_assignment.clone()
            },
        )
        .await
        .map_err(|e| RepositoryErrorHelpers::database_error(op, "首个分配", e))?;

        tx.commit()
            .await
            .map_err(|e| RepositoryErrorHelpers::database_error(op, &entity, e))?;

        let created = Task {
            id: task_id,
            ..task.clone()
        };
        debug!("创建{}成功, 首个分配ID: {}", created.entity_description(), assignment.id);
        Ok((created, assignment))
    }

    async fn get_by_id(&self, id: i64) -> RotationResult<Option<Task>> {
        let row = sqlx::query(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                RepositoryErrorHelpers::database_error(
                    RepositoryOperation::Read,
                    &format!("任务 (ID: {id})"),
                    e,
                )
            })?;

        match row {
            Some(row) => Ok(Some(row_to_task(&row)?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self, task), fields(task_id = task.id))]
    async fn update(&self, task: &Task) -> RotationResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE tasks
            SET title = $2, description = $3, cycle_interval = $4, notify_lead_days = $5, updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(task.id)
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.cycle_interval)
        .bind(task.notify_lead_days)
        .bind(task.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            RepositoryErrorHelpers::database_error(
                RepositoryOperation::Update,
                &task.entity_description(),
                e,
            )
        })?;

        if result.rows_affected() == 0 {
            return Err(RotationError::task_not_found(task.id));
        }
        Ok(())
    }

    async fn list_for_member(&self, user_id: &str) -> RotationResult<Vec<Task>> {
        let rows = sqlx::query(
            r#"
            SELECT t.id, t.title, t.description, t.cycle_interval, t.notify_lead_days,
                   t.created_by, t.created_at, t.updated_at
            FROM tasks t
            JOIN task_rotation r ON r.task_id = t.id
            WHERE r.user_id = $1
            ORDER BY t.id
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            RepositoryErrorHelpers::database_error(
                RepositoryOperation::Query,
                &format!("用户 {user_id} 的任务"),
                e,
            )
        })?;

        rows.iter().map(row_to_task).collect()
    }
}
