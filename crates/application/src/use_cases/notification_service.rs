use std::sync::Arc;

use rotation_domain::entities::Notification;
use rotation_domain::repositories::NotificationRepository;
use rotation_errors::{RotationError, RotationResult};
use tracing::debug;

/// 站内通知收件箱
pub struct NotificationService {
    notifications: Arc<dyn NotificationRepository>,
}

impl NotificationService {
    pub fn new(notifications: Arc<dyn NotificationRepository>) -> Self {
        Self { notifications }
    }

    pub async fn list_for_user(&self, user_id: &str) -> RotationResult<Vec<Notification>> {
        self.notifications.list_for_user(user_id).await
    }

    pub async fn unread_count(&self, user_id: &str) -> RotationResult<i64> {
        self.notifications.count_unread(user_id).await
    }

    pub async fn mark_read(&self, user_id: &str, notification_id: i64) -> RotationResult<()> {
        self.owned(user_id, notification_id).await?;
        self.notifications.mark_read(notification_id).await
    }

    pub async fn mark_all_read(&self, user_id: &str) -> RotationResult<u64> {
        let updated = self.notifications.mark_all_read(user_id).await?;
        debug!("用户 {} 的 {} 条通知标记为已读", user_id, updated);
        Ok(updated)
    }

    pub async fn dismiss(&self, user_id: &str, notification_id: i64) -> RotationResult<()> {
        self.owned(user_id, notification_id).await?;
        self.notifications.delete(notification_id).await
    }

    /// 不属于该用户的通知按不存在处理
    async fn owned(&self, user_id: &str, notification_id: i64) -> RotationResult<Notification> {
        match self.notifications.get_by_id(notification_id).await? {
            Some(notification) if notification.user_id == user_id => Ok(notification),
            _ => Err(RotationError::notification_not_found(notification_id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rotation_domain::entities::{Assignment, Handoff, NotificationKind};
    use rotation_domain::repositories::{AssignmentRepository, TaskRepository};
    use rotation_testing_utils::{test_time, user_ids, InMemoryRotationStore, TaskBuilder};

    async fn store_with_handoff() -> (Arc<InMemoryRotationStore>, i64) {
        let store = Arc::new(InMemoryRotationStore::new());
        let (task, first) = store
            .create_with_rotation(
                &TaskBuilder::new().build(),
                &user_ids(&["alice", "bob"]),
                &Assignment::open(0, "alice".into(), test_time(), 7).unwrap(),
            )
            .await
            .unwrap();
        store
            .complete_and_advance(&Handoff {
                completed_assignment_id: first.id,
                task_id: task.id,
                completed_by: "alice".into(),
                completed_at: test_time(),
                successor: Assignment::open(task.id, "bob".into(), test_time(), 7).unwrap(),
                notification: Notification::new(
                    "bob".into(),
                    task.id,
                    "You are now responsible for \"Take out the trash\"".into(),
                    NotificationKind::Handoff,
                    test_time(),
                ),
                rotation: user_ids(&["alice", "bob"]),
            })
            .await
            .unwrap();
        let id = store.all_notifications()[0].id;
        (store, id)
    }

    #[tokio::test]
    async fn test_owner_can_read_and_dismiss() {
        let (store, id) = store_with_handoff().await;
        let service = NotificationService::new(store.clone());

        assert_eq!(service.unread_count("bob").await.unwrap(), 1);
        service.mark_read("bob", id).await.unwrap();
        assert_eq!(service.unread_count("bob").await.unwrap(), 0);

        service.dismiss("bob", id).await.unwrap();
        assert!(service.list_for_user("bob").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_other_users_cannot_touch_notification() {
        let (store, id) = store_with_handoff().await;
        let service = NotificationService::new(store.clone());

        assert_eq!(
            service.mark_read("alice", id).await.unwrap_err(),
            RotationError::notification_not_found(id)
        );
        assert_eq!(
            service.dismiss("alice", id).await.unwrap_err(),
            RotationError::notification_not_found(id)
        );
        assert_eq!(service.unread_count("bob").await.unwrap(), 1);
        assert_eq!(service.mark_all_read("alice").await.unwrap(), 0);
        assert_eq!(service.mark_all_read("bob").await.unwrap(), 1);
    }
}
