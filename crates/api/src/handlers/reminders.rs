use axum::{
    extract::{rejection::JsonRejection, Query, State},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use rotation_application::DirectNotification;
use serde::Deserialize;
use tracing::info;

use crate::{
    error::ApiResult,
    response::{success, ApiResponse},
    routes::AppState,
};

/// 手动触发提醒扫描的参数
#[derive(Debug, Default, Deserialize)]
pub struct SweepParams {
    /// 不指定时使用当前时间
    pub now: Option<DateTime<Utc>>,
}

/// 执行一次到期提醒扫描
pub async fn run_reminder_sweep(
    State(state): State<AppState>,
    Query(params): Query<SweepParams>,
) -> ApiResult<impl IntoResponse> {
    let now = params.now.unwrap_or_else(|| state.clock.now());
    info!("收到手动提醒扫描请求，时间点 {}", now);

    let report = state.scheduler.run_due_reminder_sweep(now).await?;
    Ok(success(report))
}

/// 直接发送通知邮件，不受到期窗口限制
pub async fn send_direct_notification(
    State(state): State<AppState>,
    payload: Result<Json<DirectNotification>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = payload?;
    let recipient = request.email.clone();
    state.scheduler.send_direct_notification(request).await?;

    Ok(ApiResponse::success_empty_with_message(format!(
        "通知已发送至 {recipient}"
    )))
}
