use std::sync::Arc;

use rotation_domain::repositories::{
    AssignmentRepository, NotificationRepository, RotationRepository, TaskRepository,
    UserDirectory,
};

/// 应用服务使用的全部仓储
#[derive(Clone)]
pub struct Repositories {
    pub tasks: Arc<dyn TaskRepository>,
    pub rotations: Arc<dyn RotationRepository>,
    pub assignments: Arc<dyn AssignmentRepository>,
    pub notifications: Arc<dyn NotificationRepository>,
    pub users: Arc<dyn UserDirectory>,
}

impl Repositories {
    /// 一个对象同时实现所有仓储接口时使用（内存存储）
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: TaskRepository
            + RotationRepository
            + AssignmentRepository
            + NotificationRepository
            + UserDirectory
            + 'static,
    {
        Self {
            tasks: store.clone(),
            rotations: store.clone(),
            assignments: store.clone(),
            notifications: store.clone(),
            users: store,
        }
    }

    pub fn with_rotations(mut self, rotations: Arc<dyn RotationRepository>) -> Self {
        self.rotations = rotations;
        self
    }

    pub fn with_assignments(mut self, assignments: Arc<dyn AssignmentRepository>) -> Self {
        self.assignments = assignments;
        self
    }
}
