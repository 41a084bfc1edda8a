use std::sync::Arc;

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use rotation_application::{NotificationService, ReminderScheduler, RotationEngine, TaskQueryService};
use rotation_domain::ports::TimeProvider;
use rotation_domain::repositories::UserDirectory;

use crate::handlers::{
    dashboard::get_dashboard,
    health::health_check,
    notifications::{dismiss_notification, list_notifications, mark_all_read, mark_read},
    reminders::{run_reminder_sweep, send_direct_notification},
    tasks::{
        assigned_tasks, assignment_history, complete_task, create_task, edit_rotation, get_task,
        list_tasks, update_task,
    },
    users::{list_users, upsert_user},
};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<RotationEngine>,
    pub scheduler: Arc<ReminderScheduler>,
    pub notifications: Arc<NotificationService>,
    pub queries: Arc<TaskQueryService>,
    pub users: Arc<dyn UserDirectory>,
    pub clock: Arc<dyn TimeProvider>,
    /// 完成任务后是否给新负责人发邮件
    pub email_on_handoff: bool,
}

pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        // 任务与轮值
        .route("/api/tasks", get(list_tasks).post(create_task))
        .route("/api/tasks/assigned", get(assigned_tasks))
        .route("/api/tasks/{id}", get(get_task).put(update_task))
        .route("/api/tasks/{id}/rotation", put(edit_rotation))
        .route("/api/tasks/{id}/complete", post(complete_task))
        .route("/api/tasks/{id}/assignments", get(assignment_history))
        // 站内通知
        .route("/api/notifications", get(list_notifications))
        .route("/api/notifications/read-all", post(mark_all_read))
        .route("/api/notifications/{id}/read", post(mark_read))
        .route("/api/notifications/{id}", delete(dismiss_notification))
        .route("/api/dashboard", get(get_dashboard))
        // 提醒
        .route("/api/reminders/sweep", post(run_reminder_sweep))
        .route("/api/notify", post(send_direct_notification))
        // 用户目录
        .route("/api/users", get(list_users))
        .route("/api/users/{id}", put(upsert_user))
        .with_state(state)
}
