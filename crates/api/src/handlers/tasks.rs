use axum::{
    extract::{rejection::JsonRejection, Path, State},
    response::IntoResponse,
    Json,
};
use rotation_domain::entities::{NewTask, TaskChanges};
use serde::Deserialize;
use tracing::warn;

use crate::{
    error::ApiResult,
    extractor::ActingUser,
    response::{created, success},
    routes::AppState,
};

/// 轮值编辑请求
#[derive(Debug, Deserialize)]
pub struct EditRotationRequest {
    pub rotation: Vec<String>,
}

/// 创建任务，创建者为当前用户
pub async fn create_task(
    State(state): State<AppState>,
    user: ActingUser,
    payload: Result<Json<NewTask>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = payload?;
    let created_task = state.engine.create_task(user.id(), request).await?;
    Ok(created(created_task))
}

/// 当前用户参与轮值的任务
pub async fn list_tasks(
    State(state): State<AppState>,
    user: ActingUser,
) -> ApiResult<impl IntoResponse> {
    let tasks = state.queries.tasks_for_user(user.id()).await?;
    Ok(success(tasks))
}

/// 当前由该用户负责的任务
pub async fn assigned_tasks(
    State(state): State<AppState>,
    user: ActingUser,
) -> ApiResult<impl IntoResponse> {
    let tasks = state.queries.assigned_to(user.id()).await?;
    Ok(success(tasks))
}

pub async fn get_task(
    State(state): State<AppState>,
    _user: ActingUser,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let overview = state.queries.task_overview(id).await?;
    Ok(success(overview))
}

pub async fn update_task(
    State(state): State<AppState>,
    _user: ActingUser,
    Path(id): Path<i64>,
    payload: Result<Json<TaskChanges>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(changes) = payload?;
    let task = state.engine.update_task(id, changes).await?;
    Ok(success(task))
}

pub async fn edit_rotation(
    State(state): State<AppState>,
    _user: ActingUser,
    Path(id): Path<i64>,
    payload: Result<Json<EditRotationRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = payload?;
    let rotation = state.engine.edit_rotation(id, request.rotation).await?;
    Ok(success(rotation))
}

/// 完成当前分配并交给下一位
///
/// 交接邮件发送失败只记录日志，不影响已提交的交接。
pub async fn complete_task(
    State(state): State<AppState>,
    user: ActingUser,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let successor = state.engine.complete_assignment(id, user.id()).await?;

    if state.email_on_handoff {
        if let Err(e) = state.scheduler.send_handoff_email(&successor).await {
            warn!(
                "任务 {} 交接邮件发送失败，新负责人 {}: {}",
                id, successor.user_id, e
            );
        }
    }

    Ok(success(successor))
}

/// 任务的全部分配记录，最新的在前
pub async fn assignment_history(
    State(state): State<AppState>,
    _user: ActingUser,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    let history = state.queries.assignment_history(id).await?;
    Ok(success(history))
}
