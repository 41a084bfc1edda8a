use async_trait::async_trait;
use rotation_domain::entities::{Rotation, RotationMember};
use rotation_domain::repositories::RotationRepository;
use rotation_errors::RotationResult;
use sqlx::{Row, SqlitePool};
use tracing::{debug, instrument};

use crate::error_handling::{RepositoryErrorHelpers, RepositoryOperation};

pub struct SqliteRotationRepository {
    pool: SqlitePool,
}

impl SqliteRotationRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_member(row: &sqlx::sqlite::SqliteRow) -> RotationResult<RotationMember> {
        Ok(RotationMember {
            task_id: row.try_get("task_id")?,
            user_id: row.try_get("user_id")?,
            position: row.try_get("position")?,
        })
    }
}

#[async_trait]
impl RotationRepository for SqliteRotationRepository {
    async fn get_rotation(&self, task_id: i64) -> RotationResult<Rotation> {
        let rows = sqlx::query(
            "SELECT task_id, user_id, position FROM task_rotation WHERE task_id = $1 ORDER BY position",
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            RepositoryErrorHelpers::database_error(
                RepositoryOperation::Read,
                &format!("任务 {task_id} 的轮值"),
                e,
            )
        })?;

        let members = rows
            .iter()
            .map(Self::row_to_member)
            .collect::<RotationResult<Vec<_>>>()?;
        Ok(Rotation::from_members(task_id, members))
    }

    /// 删除旧轮值并按新顺序写入，位置从0开始连续编号
    #[instrument(skip(self, user_ids), fields(members = user_ids.len()))]
    async fn replace_rotation(&self, task_id: i64, user_ids: &[String]) -> RotationResult<Rotation> {
        let op = RepositoryOperation::Update;
        let entity = format!("任务 {task_id} 的轮值");
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepositoryErrorHelpers::database_error(op, &entity, e))?;

        sqlx::query("DELETE FROM task_rotation WHERE task_id = $1")
            .bind(task_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| RepositoryErrorHelpers::database_error(op, &entity, e))?;

        let rotation = Rotation::new(task_id, user_ids.to_vec());
        for member in rotation.to_members() {
            sqlx::query("INSERT INTO task_rotation (task_id, user_id, position) VALUES ($1, $2, $3)")
                .bind(member.task_id)
                .bind(&member.user_id)
                .bind(member.position)
                .execute(&mut *tx)
                .await
                .map_err(|e| RepositoryErrorHelpers::database_error(op, &entity, e))?;
        }

        tx.commit()
            .await
            .map_err(|e| RepositoryErrorHelpers::database_error(op, &entity, e))?;

        debug!("{}已替换为 {} 人", entity, rotation.len());
        Ok(rotation)
    }
}
