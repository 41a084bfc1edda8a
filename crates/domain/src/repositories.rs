//! 领域仓储抽象
//!
//! 定义数据访问的抽象接口，遵循依赖倒置原则

use async_trait::async_trait;
use rotation_errors::RotationResult;

use crate::entities::{Assignment, Handoff, Notification, Rotation, Task, User};

/// 任务仓储抽象
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// 在同一个事务内写入任务、轮值和首个分配
    async fn create_with_rotation(
        &self,
        task: &Task,
        rotation: &[String],
        first_assignment: &Assignment,
    ) -> RotationResult<(Task, Assignment)>;
    async fn get_by_id(&self, id: i64) -> RotationResult<Option<Task>>;
    async fn update(&self, task: &Task) -> RotationResult<()>;
    /// 轮值中包含该用户的全部任务
    async fn list_for_member(&self, user_id: &str) -> RotationResult<Vec<Task>>;
}

/// 轮值仓储抽象
#[async_trait]
pub trait RotationRepository: Send + Sync {
    /// 按位置排序；任务没有轮值时返回空列表
    async fn get_rotation(&self, task_id: i64) -> RotationResult<Rotation>;
    async fn replace_rotation(&self, task_id: i64, user_ids: &[String]) -> RotationResult<Rotation>;
}

/// 分配仓储抽象
#[async_trait]
pub trait AssignmentRepository: Send + Sync {
    async fn get_by_id(&self, id: i64) -> RotationResult<Option<Assignment>>;
    async fn find_open(&self, task_id: i64) -> RotationResult<Option<Assignment>>;
    /// 按开始时间倒序
    async fn list_by_task(&self, task_id: i64) -> RotationResult<Vec<Assignment>>;
    async fn list_open_for_user(&self, user_id: &str) -> RotationResult<Vec<Assignment>>;
    /// completed = false 且 notification_sent = false 的分配
    async fn find_reminder_candidates(&self) -> RotationResult<Vec<Assignment>>;
    /// 原子地关闭当前分配、开启下一轮分配并写入交接通知。
    /// 当前分配已不是进行中状态时返回 `RotationError::Conflict`，不做任何写入。
    async fn complete_and_advance(&self, handoff: &Handoff) -> RotationResult<Assignment>;
    /// 原子地锁存 notification_sent 并写入提醒通知。
    /// 分配已完成或已锁存时返回 false，不写入通知。
    async fn latch_reminder(
        &self,
        assignment_id: i64,
        reminder: &Notification,
    ) -> RotationResult<bool>;
}

/// 通知仓储抽象
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    async fn get_by_id(&self, id: i64) -> RotationResult<Option<Notification>>;
    /// 按创建时间倒序
    async fn list_for_user(&self, user_id: &str) -> RotationResult<Vec<Notification>>;
    async fn count_unread(&self, user_id: &str) -> RotationResult<i64>;
    async fn mark_read(&self, id: i64) -> RotationResult<()>;
    async fn mark_all_read(&self, user_id: &str) -> RotationResult<u64>;
    async fn delete(&self, id: i64) -> RotationResult<()>;
}

/// 用户目录抽象
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn lookup(&self, user_id: &str) -> RotationResult<Option<User>>;
    async fn list(&self) -> RotationResult<Vec<User>>;
    /// 身份系统同步用户时使用
    async fn upsert(&self, user: &User) -> RotationResult<User>;
}
