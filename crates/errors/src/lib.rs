use thiserror::Error;


/// 错误大类，供调用方决定如何处理
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    InconsistentState,
    Delivery,
    Infrastructure,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum RotationError {
    #[error("数据验证失败: {0}")]
    Validation(String),
    #[error("任务未找到: {id}")]
    TaskNotFound { id: i64 },
    #[error("任务分配记录未找到: {id}")]
    AssignmentNotFound { id: i64 },
    #[error("任务 {task_id} 没有进行中的分配")]
    NoOpenAssignment { task_id: i64 },
    #[error("用户未找到: {id}")]
    UserNotFound { id: String },
    #[error("通知未找到: {id}")]
    NotificationNotFound { id: i64 },
    #[error("并发冲突: 任务 {task_id} 的分配 {assignment_id} 已被其他请求完成")]
    Conflict { task_id: i64, assignment_id: i64 },
    #[error("数据不一致: 任务 {task_id} 的轮值中找不到用户 {user_id}")]
    InconsistentState { task_id: i64, user_id: String },
    #[error("消息投递失败: {address} - {message}")]
    Delivery { address: String, message: String },
    #[error("数据库操作错误: {0}")]
    Database(String),
    #[error("配置错误: {0}")]
    Configuration(String),
    #[error("序列化错误: {0}")]
    Serialization(String),
    #[error("内部错误: {0}")]
    Internal(String),
}

pub type RotationResult<T> = Result<T, RotationError>;

impl RotationError {
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }
    pub fn task_not_found(id: i64) -> Self {
        Self::TaskNotFound { id }
    }
    pub fn assignment_not_found(id: i64) -> Self {
        Self::AssignmentNotFound { id }
    }
    pub fn no_open_assignment(task_id: i64) -> Self {
        Self::NoOpenAssignment { task_id }
    }
    pub fn user_not_found<S: Into<String>>(id: S) -> Self {
        Self::UserNotFound { id: id.into() }
    }
    pub fn notification_not_found(id: i64) -> Self {
        Self::NotificationNotFound { id }
    }
    pub fn conflict(task_id: i64, assignment_id: i64) -> Self {
        Self::Conflict {
            task_id,
            assignment_id,
        }
    }
    pub fn inconsistent_state<S: Into<String>>(task_id: i64, user_id: S) -> Self {
        Self::InconsistentState {
            task_id,
            user_id: user_id.into(),
        }
    }
    pub fn delivery<A: Into<String>, M: Into<String>>(address: A, message: M) -> Self {
        Self::Delivery {
            address: address.into(),
            message: message.into(),
        }
    }
    pub fn database_error<S: Into<String>>(msg: S) -> Self {
        Self::Database(msg.into())
    }
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RotationError::Validation(_) => ErrorKind::Validation,
            RotationError::TaskNotFound { .. }
            | RotationError::AssignmentNotFound { .. }
            | RotationError::NoOpenAssignment { .. }
            | RotationError::UserNotFound { .. }
            | RotationError::NotificationNotFound { .. } => ErrorKind::NotFound,
            RotationError::Conflict { .. } => ErrorKind::Conflict,
            RotationError::InconsistentState { .. } => ErrorKind::InconsistentState,
            RotationError::Delivery { .. } => ErrorKind::Delivery,
            RotationError::Database(_)
            | RotationError::Configuration(_)
            | RotationError::Serialization(_)
            | RotationError::Internal(_) => ErrorKind::Infrastructure,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RotationError::Conflict { .. }
                | RotationError::Delivery { .. }
                | RotationError::Database(_)
        )
    }

    pub fn user_message(&self) -> &str {
        match self.kind() {
            ErrorKind::Validation => "输入数据验证失败",
            ErrorKind::NotFound => "请求的资源不存在",
            ErrorKind::Conflict => "任务已被其他人完成，请刷新后重试",
            ErrorKind::InconsistentState => "任务轮值数据不一致，请联系管理员",
            ErrorKind::Delivery => "通知发送失败，稍后将自动重试",
            ErrorKind::Infrastructure => "系统繁忙，请稍后重试",
        }
    }
}

impl From<sqlx::Error> for RotationError {
    fn from(err: sqlx::Error) -> Self {
        RotationError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for RotationError {
    fn from(err: serde_json::Error) -> Self {
        RotationError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for RotationError {
    fn from(err: anyhow::Error) -> Self {
        RotationError::Internal(err.to_string())
    }
}
