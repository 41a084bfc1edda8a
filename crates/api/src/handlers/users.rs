use axum::{
    extract::{rejection::JsonRejection, Path, State},
    response::IntoResponse,
    Json,
};
use rotation_domain::entities::User;
use rotation_errors::RotationError;
use serde::Deserialize;

use crate::{error::ApiResult, response::success, routes::AppState};

#[derive(Debug, Deserialize)]
pub struct UpsertUserRequest {
    pub email: String,
    pub name: String,
}

pub async fn list_users(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let users = state.users.list().await?;
    Ok(success(users))
}

/// 新增或更新目录中的用户
pub async fn upsert_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<UpsertUserRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = payload?;
    if id.trim().is_empty() || request.email.trim().is_empty() || request.name.trim().is_empty() {
        return Err(RotationError::validation("用户ID、邮箱和姓名不能为空").into());
    }
    if !request.email.contains('@') {
        return Err(RotationError::validation(format!("邮箱格式无效: {}", request.email)).into());
    }

    let user = User::new(id.trim(), request.email.trim(), request.name.trim());
    let stored = state.users.upsert(&user).await?;
    Ok(success(stored))
}
