use axum::{extract::State, response::IntoResponse};

use crate::{error::ApiResult, extractor::ActingUser, response::success, routes::AppState};

/// 当前用户的概览数据
pub async fn get_dashboard(
    State(state): State<AppState>,
    user: ActingUser,
) -> ApiResult<impl IntoResponse> {
    let now = state.clock.now();
    let summary = state.queries.dashboard(user.id(), now).await?;
    Ok(success(summary))
}
