use chrono::{DateTime, Utc};
use rotation_domain::entities::{Assignment, DashboardSummary, Task, TaskOverview};
use rotation_errors::{RotationError, RotationResult};

use crate::Repositories;

/// 只读查询：任务视图、分配历史、仪表盘
pub struct TaskQueryService {
    repos: Repositories,
}

impl TaskQueryService {
    pub fn new(repos: Repositories) -> Self {
        Self { repos }
    }

    /// 轮值中包含该用户的任务
    pub async fn tasks_for_user(&self, user_id: &str) -> RotationResult<Vec<TaskOverview>> {
        let tasks = self.repos.tasks.list_for_member(user_id).await?;
        let mut overviews = Vec::with_capacity(tasks.len());
        for task in tasks {
            overviews.push(self.overview_of(task).await?);
        }
        Ok(overviews)
    }

    /// 当前由该用户负责的任务
    pub async fn assigned_to(&self, user_id: &str) -> RotationResult<Vec<TaskOverview>> {
        let open = self.repos.assignments.list_open_for_user(user_id).await?;
        let mut overviews = Vec::with_capacity(open.len());
        for assignment in open {
            if let Some(task) = self.repos.tasks.get_by_id(assignment.task_id).await? {
                let rotation = self.repos.rotations.get_rotation(task.id).await?;
                overviews.push(TaskOverview::new(task, rotation, Some(&assignment)));
            }
        }
        Ok(overviews)
    }

    pub async fn task_overview(&self, task_id: i64) -> RotationResult<TaskOverview> {
        let task = self.load_task(task_id).await?;
        self.overview_of(task).await
    }

    /// 全部分配，最新的在前
    pub async fn assignment_history(&self, task_id: i64) -> RotationResult<Vec<Assignment>> {
        self.load_task(task_id).await?;
        self.repos.assignments.list_by_task(task_id).await
    }

    pub async fn dashboard(&self, user_id: &str, now: DateTime<Utc>) -> RotationResult<DashboardSummary> {
        let total_tasks = self.repos.tasks.list_for_member(user_id).await?.len();
        let open = self.repos.assignments.list_open_for_user(user_id).await?;
        let unread_notifications = self.repos.notifications.count_unread(user_id).await?;

        Ok(DashboardSummary {
            total_tasks,
            assigned_to_me: open.len(),
            overdue: open.iter().filter(|a| a.is_overdue(now)).count(),
            unread_notifications,
        })
    }

    async fn overview_of(&self, task: Task) -> RotationResult<TaskOverview> {
        let rotation = self.repos.rotations.get_rotation(task.id).await?;
        let open = self.repos.assignments.find_open(task.id).await?;
        Ok(TaskOverview::new(task, rotation, open.as_ref()))
    }

    async fn load_task(&self, task_id: i64) -> RotationResult<Task> {
        self.repos
            .tasks
            .get_by_id(task_id)
            .await?
            .ok_or_else(|| RotationError::task_not_found(task_id))
    }
}
