//! # Rotation API
//!
//! 共享职责任务轮值系统的REST API，基于Axum构建。
//!
//! ## API 端点
//!
//! ### 任务与轮值
//! - `POST /api/tasks` - 创建任务（创建者为当前用户）
//! - `GET /api/tasks` - 当前用户参与轮值的任务
//! - `GET /api/tasks/assigned` - 当前由我负责的任务
//! - `GET /api/tasks/{id}` - 任务详情
//! - `PUT /api/tasks/{id}` - 修改任务
//! - `PUT /api/tasks/{id}/rotation` - 替换轮值列表
//! - `POST /api/tasks/{id}/complete` - 完成当前分配并交接
//! - `GET /api/tasks/{id}/assignments` - 分配历史
//!
//! ### 通知
//! - `GET /api/notifications` - 我的通知
//! - `POST /api/notifications/{id}/read` - 标记已读
//! - `POST /api/notifications/read-all` - 全部标记已读
//! - `DELETE /api/notifications/{id}` - 删除通知
//! - `GET /api/dashboard` - 概览
//!
//! ### 提醒与用户目录
//! - `POST /api/reminders/sweep` - 手动执行到期提醒扫描
//! - `POST /api/notify` - 直接发送通知邮件
//! - `GET /api/users` - 用户列表
//! - `PUT /api/users/{id}` - 新增或更新用户
//!
//! 除 `/health`、提醒和用户目录外，所有接口都需要 `x-user-id` 请求头。
//!
//! ```bash
//! curl -X POST http://localhost:8080/api/tasks \
//!   -H "Content-Type: application/json" \
//!   -H "x-user-id: alice" \
//!   -d '{"title":"倒垃圾","cycle_interval":7,"notify_lead_days":2,"rotation":["alice","bob"]}'
//!
//! curl -X POST http://localhost:8080/api/tasks/1/complete -H "x-user-id: alice"
//! ```

pub mod error;
pub mod extractor;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod routes;

use std::time::Duration;

use axum::Router;
use rotation_config::ApiConfig;
use tower::ServiceBuilder;
use tower_http::timeout::TimeoutLayer;

pub use error::{ApiError, ApiResult};
pub use extractor::{ActingUser, USER_HEADER};
use middleware::{cors_layer, request_logging, trace_layer};
pub use routes::{create_routes, AppState};

/// 创建完整的API应用
pub fn create_app(state: AppState, api_config: &ApiConfig) -> Router {
    let router = create_routes(state).layer(
        ServiceBuilder::new()
            .layer(trace_layer())
            .layer(TimeoutLayer::new(Duration::from_secs(
                api_config.request_timeout_seconds,
            )))
            .layer(axum::middleware::from_fn(request_logging)),
    );

    if api_config.cors_enabled {
        router.layer(cors_layer(&api_config.cors_origins))
    } else {
        router
    }
}
