pub mod notification_service;
pub mod reminder_scheduler;
pub mod rotation_engine;
pub mod task_query_service;

pub use notification_service::NotificationService;
pub use reminder_scheduler::{DirectNotification, ReminderScheduler, SweepFailure, SweepReport};
pub use rotation_engine::RotationEngine;
pub use task_query_service::TaskQueryService;
