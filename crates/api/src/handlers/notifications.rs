use axum::{
    extract::{Path, State},
    response::IntoResponse,
};
use serde_json::json;

use crate::{
    error::ApiResult,
    extractor::ActingUser,
    response::{success, ApiResponse},
    routes::AppState,
};

/// 当前用户的通知，最新的在前
pub async fn list_notifications(
    State(state): State<AppState>,
    user: ActingUser,
) -> ApiResult<impl IntoResponse> {
    let notifications = state.notifications.list_for_user(user.id()).await?;
    Ok(success(notifications))
}

pub async fn mark_read(
    State(state): State<AppState>,
    user: ActingUser,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    state.notifications.mark_read(user.id(), id).await?;
    Ok(ApiResponse::success_empty_with_message(format!(
        "通知 {id} 已标记为已读"
    )))
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    user: ActingUser,
) -> ApiResult<impl IntoResponse> {
    let updated = state.notifications.mark_all_read(user.id()).await?;
    Ok(success(json!({ "updated": updated })))
}

pub async fn dismiss_notification(
    State(state): State<AppState>,
    user: ActingUser,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    state.notifications.dismiss(user.id(), id).await?;
    Ok(ApiResponse::success_empty_with_message(format!(
        "通知 {id} 已删除"
    )))
}
