use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rotation_errors::{ErrorKind, RotationError};
use serde_json::json;
use tracing::error;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("轮值服务错误: {0}")]
    Rotation(#[from] RotationError),

    #[error("缺少用户身份")]
    Unauthorized,

    #[error("请求参数错误: {0}")]
    BadRequest(String),

    #[error("内部服务器错误: {0}")]
    Internal(String),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Rotation(err) => match err.kind() {
                ErrorKind::Validation => StatusCode::BAD_REQUEST,
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Conflict => StatusCode::CONFLICT,
                ErrorKind::Delivery => StatusCode::BAD_GATEWAY,
                ErrorKind::InconsistentState | ErrorKind::Infrastructure => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Rotation(err) => match err {
                RotationError::Validation(_) => "VALIDATION_ERROR",
                RotationError::TaskNotFound { .. } => "TASK_NOT_FOUND",
                RotationError::AssignmentNotFound { .. } => "ASSIGNMENT_NOT_FOUND",
                RotationError::NoOpenAssignment { .. } => "NO_OPEN_ASSIGNMENT",
                RotationError::UserNotFound { .. } => "USER_NOT_FOUND",
                RotationError::NotificationNotFound { .. } => "NOTIFICATION_NOT_FOUND",
                RotationError::Conflict { .. } => "CONFLICT",
                RotationError::InconsistentState { .. } => "INCONSISTENT_STATE",
                RotationError::Delivery { .. } => "DELIVERY_FAILED",
                _ => "INTERNAL_ERROR",
            },
            ApiError::Unauthorized => "UNAUTHORIZED",
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    fn message(&self) -> String {
        match self {
            // 基础设施错误不向调用方暴露细节
            ApiError::Rotation(err) if err.kind() == ErrorKind::Infrastructure => {
                err.user_message().to_string()
            }
            ApiError::Rotation(err) => err.to_string(),
            ApiError::Unauthorized => "请在请求头中提供 x-user-id".to_string(),
            ApiError::BadRequest(msg) => format!("请求参数错误: {msg}"),
            ApiError::Internal(_) => "系统内部错误".to_string(),
        }
    }

    /// 客户端原样重试是否可能成功
    pub fn retryable(&self) -> bool {
        match self {
            ApiError::Rotation(err) => err.is_retryable(),
            _ => false,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("请求处理失败: {}", self);
        }

        let body = Json(json!({
            "success": false,
            "error": {
                "code": self.code(),
                "message": self.message(),
                "retryable": self.retryable(),
            },
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }));

        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
