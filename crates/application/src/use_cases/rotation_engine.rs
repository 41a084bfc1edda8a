use std::sync::Arc;

use metrics::counter;
use rotation_domain::entities::{
    Assignment, CreatedTask, Handoff, Notification, NotificationKind, Rotation, Task,
    TaskChanges, NewTask,
};
use rotation_domain::ports::TimeProvider;
use rotation_domain::services::RotationPolicy;
use rotation_domain::value_objects::{validate_rotation, validate_title, CycleSettings};
use rotation_errors::{RotationError, RotationResult};
use tracing::{debug, info, instrument, warn};

use crate::messages;
use crate::Repositories;

/// 轮值引擎：创建任务、完成并交接、编辑轮值
///
/// 引擎只做决定，所有需要原子生效的写入都交给仓储的组合方法一次提交。
pub struct RotationEngine {
    repos: Repositories,
    clock: Arc<dyn TimeProvider>,
}

impl RotationEngine {
    pub fn new(repos: Repositories, clock: Arc<dyn TimeProvider>) -> Self {
        Self { repos, clock }
    }

    /// 创建任务、轮值和第一轮分配（负责人为轮值第一位）
    #[instrument(skip(self, request), fields(title = %request.title, members = request.rotation.len()))]
    pub async fn create_task(&self, creator: &str, request: NewTask) -> RotationResult<CreatedTask> {
        validate_title(&request.title)?;
        let settings = CycleSettings::new(request.cycle_interval, request.notify_lead_days)?;
        validate_rotation(&request.rotation)?;
        self.ensure_users_exist(&request.rotation).await?;

        let now = self.clock.now();
        let task = Task::new(
            request.title.trim().to_string(),
            request.description,
            settings.cycle_interval,
            settings.notify_lead_days,
            creator.to_string(),
            now,
        );
        // validate_rotation 保证非空
        let first_assignee = request.rotation[0].clone();
        let first = Assignment::open(0, first_assignee, now, settings.cycle_interval)?;

        let (task, assignment) = self
            .repos
            .tasks
            .create_with_rotation(&task, &request.rotation, &first)
            .await?;

        info!(
            "创建{}，轮值 {} 人，首位负责人 {}，到期 {}",
            task.entity_description(),
            request.rotation.len(),
            assignment.user_id,
            assignment.due_date
        );

        Ok(CreatedTask {
            rotation: Rotation::new(task.id, request.rotation),
            task,
            assignment,
        })
    }

    /// 完成当前分配并交给轮值中的下一位
    ///
    /// 并发完成同一分配时只有一个成功，其余返回 `RotationError::Conflict`。
    /// 读取轮值之后、提交之前轮值被修改时同样返回 `Conflict`，不写入任何数据。
    #[instrument(skip(self))]
    pub async fn complete_assignment(
        &self,
        task_id: i64,
        acting_user: &str,
    ) -> RotationResult<Assignment> {
        let task = self.load_task(task_id).await?;
        let current = self
            .repos
            .assignments
            .find_open(task_id)
            .await?
            .ok_or_else(|| RotationError::no_open_assignment(task_id))?;

        let rotation = self.repos.rotations.get_rotation(task_id).await?;
        let (position, next_user) = RotationPolicy::successor(&rotation, &current.user_id)
            .ok_or_else(|| {
                warn!(
                    "{}的负责人 {} 已不在轮值中，拒绝完成",
                    task.entity_description(),
                    current.user_id
                );
                RotationError::inconsistent_state(task_id, current.user_id.clone())
            })?;

        let now = self.clock.now();
        let successor = Assignment::open(task_id, next_user.to_string(), now, task.cycle_interval)?;
        let handoff = Handoff {
            completed_assignment_id: current.id,
            task_id,
            completed_by: acting_user.to_string(),
            completed_at: now,
            successor,
            notification: Notification::new(
                next_user.to_string(),
                task_id,
                messages::handoff_message(&task.title),
                NotificationKind::Handoff,
                now,
            ),
            rotation: rotation.members.clone(),
        };

        match self.repos.assignments.complete_and_advance(&handoff).await {
            Ok(successor) => {
                counter!("rotation_assignments_completed_total").increment(1);
                info!(
                    "{} 由 {} 完成，交给轮值第 {} 位 {}，到期 {}",
                    task.entity_description(),
                    acting_user,
                    position,
                    successor.user_id,
                    successor.due_date
                );
                Ok(successor)
            }
            Err(err @ RotationError::Conflict { .. }) => {
                counter!("rotation_completion_conflicts_total").increment(1);
                warn!("{} 的完成请求与其他请求冲突", task.entity_description());
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// 替换轮值列表，不改变进行中分配的负责人
    #[instrument(skip(self, user_ids), fields(members = user_ids.len()))]
    pub async fn edit_rotation(&self, task_id: i64, user_ids: Vec<String>) -> RotationResult<Rotation> {
        validate_rotation(&user_ids)?;
        let task = self.load_task(task_id).await?;
        self.ensure_users_exist(&user_ids).await?;

        let rotation = self.repos.rotations.replace_rotation(task_id, &user_ids).await?;

        if let Some(open) = self.repos.assignments.find_open(task_id).await? {
            if !rotation.contains(&open.user_id) {
                warn!(
                    "{} 的当前负责人 {} 不在新轮值中，完成该分配时将报告数据不一致",
                    task.entity_description(),
                    open.user_id
                );
            }
        }

        info!("{} 的轮值已更新: {:?}", task.entity_description(), rotation.members);
        Ok(rotation)
    }

    /// 修改任务设置；只影响之后创建的分配，进行中分配的到期时间不变
    #[instrument(skip(self, changes))]
    pub async fn update_task(&self, task_id: i64, changes: TaskChanges) -> RotationResult<Task> {
        if changes.is_empty() {
            return Err(RotationError::validation("没有需要修改的字段"));
        }

        let task = self.load_task(task_id).await?;
        let mut updated = changes.apply_to(&task, self.clock.now());
        updated.title = updated.title.trim().to_string();

        validate_title(&updated.title)?;
        CycleSettings::new(updated.cycle_interval, updated.notify_lead_days)?;

        self.repos.tasks.update(&updated).await?;
        debug!("{} 已更新", updated.entity_description());
        Ok(updated)
    }

    async fn load_task(&self, task_id: i64) -> RotationResult<Task> {
        self.repos
            .tasks
            .get_by_id(task_id)
            .await?
            .ok_or_else(|| RotationError::task_not_found(task_id))
    }

    async fn ensure_users_exist(&self, user_ids: &[String]) -> RotationResult<()> {
        for user_id in user_ids {
            if self.repos.users.lookup(user_id).await?.is_none() {
                return Err(RotationError::validation(format!(
                    "轮值中的用户不存在: {user_id}"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rotation_testing_utils::{
        test_time, user_ids, users, FixedTimeProvider, GatedAssignments, GatedRotations,
        InMemoryRotationStore, NewTaskBuilder,
    };

    struct Fixture {
        store: Arc<InMemoryRotationStore>,
        clock: FixedTimeProvider,
        engine: RotationEngine,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryRotationStore::with_users(users(&[
            "alice", "bob", "carol", "dave",
        ])));
        let clock = FixedTimeProvider::new(test_time());
        let engine = RotationEngine::new(
            Repositories::from_store(store.clone()),
            Arc::new(clock.clone()),
        );
        Fixture {
            store,
            clock,
            engine,
        }
    }

    #[tokio::test]
    async fn test_create_task_assigns_first_member() {
        let f = fixture();
        let created = f
            .engine
            .create_task("alice", NewTaskBuilder::new(&["alice", "bob", "carol"]).build())
            .await
            .unwrap();

        assert_eq!(created.assignment.user_id, "alice");
        assert_eq!(created.assignment.start_date, test_time());
        assert_eq!(created.assignment.due_date, test_time() + Duration::days(7));
        assert!(!created.assignment.completed);
        assert!(!created.assignment.notification_sent);
        assert_eq!(created.rotation.members, vec!["alice", "bob", "carol"]);
        assert_eq!(f.store.open_assignments(created.task.id).len(), 1);
    }

    #[tokio::test]
    async fn test_create_task_validation() {
        let f = fixture();
        let cases = vec![
            NewTaskBuilder::new(&[]).build(),
            NewTaskBuilder::new(&["alice", "alice"]).build(),
            NewTaskBuilder::new(&["alice"]).with_cycle(0, 0).build(),
            NewTaskBuilder::new(&["alice"]).with_cycle(7, 8).build(),
            NewTaskBuilder::new(&["alice"]).with_cycle(7, -1).build(),
            NewTaskBuilder::new(&["alice"]).with_title("  ").build(),
            NewTaskBuilder::new(&["alice", "mallory"]).build(),
        ];

        for request in cases {
            let err = f.engine.create_task("alice", request).await.unwrap_err();
            assert!(matches!(err, RotationError::Validation(_)), "{err:?}");
        }
        assert_eq!(f.store.task_count(), 0);
    }

    #[tokio::test]
    async fn test_complete_hands_off_to_next_member() {
        let f = fixture();
        let created = f
            .engine
            .create_task("alice", NewTaskBuilder::new(&["alice", "bob", "carol"]).build())
            .await
            .unwrap();

        f.clock.advance(Duration::days(3));
        let next = f
            .engine
            .complete_assignment(created.task.id, "alice")
            .await
            .unwrap();

        assert_eq!(next.user_id, "bob");
        assert_eq!(next.start_date, test_time() + Duration::days(3));
        assert_eq!(next.due_date, test_time() + Duration::days(10));

        let closed = f
            .store
            .all_assignments()
            .into_iter()
            .find(|a| a.id == created.assignment.id)
            .unwrap();
        assert!(closed.completed);
        assert_eq!(closed.completed_by.as_deref(), Some("alice"));

        let notifications = f.store.all_notifications();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].user_id, "bob");
        assert_eq!(notifications[0].kind, NotificationKind::Handoff);
        assert_eq!(
            notifications[0].message,
            "You are now responsible for \"Take out the trash\""
        );
    }

    #[tokio::test]
    async fn test_rotation_wraps_and_single_member_self_cycles() {
        let f = fixture();
        let pair = f
            .engine
            .create_task("alice", NewTaskBuilder::new(&["alice", "bob"]).build())
            .await
            .unwrap();
        f.engine.complete_assignment(pair.task.id, "alice").await.unwrap();
        let back = f.engine.complete_assignment(pair.task.id, "bob").await.unwrap();
        assert_eq!(back.user_id, "alice");

        let solo = f
            .engine
            .create_task("dave", NewTaskBuilder::new(&["dave"]).build())
            .await
            .unwrap();
        let again = f.engine.complete_assignment(solo.task.id, "dave").await.unwrap();
        assert_eq!(again.user_id, "dave");
        assert_ne!(again.id, solo.assignment.id);
        assert_eq!(f.store.open_assignments(solo.task.id).len(), 1);
    }

    #[tokio::test]
    async fn test_complete_unknown_task_or_missing_open_assignment() {
        let f = fixture();
        assert_eq!(
            f.engine.complete_assignment(99, "alice").await.unwrap_err(),
            RotationError::task_not_found(99)
        );

        let created = f
            .engine
            .create_task("alice", NewTaskBuilder::new(&["alice"]).build())
            .await
            .unwrap();
        let mut closed = created.assignment.clone();
        closed.completed = true;
        f.store.overwrite_assignment(closed);

        assert_eq!(
            f.engine
                .complete_assignment(created.task.id, "alice")
                .await
                .unwrap_err(),
            RotationError::no_open_assignment(created.task.id)
        );
    }

    #[tokio::test]
    async fn test_assignee_removed_from_rotation_is_inconsistent() {
        let f = fixture();
        let created = f
            .engine
            .create_task("alice", NewTaskBuilder::new(&["alice", "bob"]).build())
            .await
            .unwrap();
        f.engine
            .edit_rotation(created.task.id, user_ids(&["bob", "carol"]))
            .await
            .unwrap();

        let err = f
            .engine
            .complete_assignment(created.task.id, "alice")
            .await
            .unwrap_err();
        assert_eq!(err, RotationError::inconsistent_state(created.task.id, "alice"));

        // 未写入任何数据
        assert_eq!(f.store.all_assignments().len(), 1);
        assert!(f.store.all_notifications().is_empty());
    }

    #[tokio::test]
    async fn test_edit_rotation_keeps_current_assignee() {
        let f = fixture();
        let created = f
            .engine
            .create_task("alice", NewTaskBuilder::new(&["alice", "bob"]).build())
            .await
            .unwrap();

        let rotation = f
            .engine
            .edit_rotation(created.task.id, user_ids(&["carol", "alice", "bob"]))
            .await
            .unwrap();
        assert_eq!(rotation.members, vec!["carol", "alice", "bob"]);

        let open = f.store.open_assignments(created.task.id);
        assert_eq!(open[0].user_id, "alice");

        let next = f
            .engine
            .complete_assignment(created.task.id, "alice")
            .await
            .unwrap();
        assert_eq!(next.user_id, "bob");
    }

    #[tokio::test]
    async fn test_edit_rotation_validation() {
        let f = fixture();
        let created = f
            .engine
            .create_task("alice", NewTaskBuilder::new(&["alice"]).build())
            .await
            .unwrap();

        assert!(matches!(
            f.engine.edit_rotation(created.task.id, vec![]).await,
            Err(RotationError::Validation(_))
        ));
        assert!(matches!(
            f.engine
                .edit_rotation(created.task.id, user_ids(&["bob", "bob"]))
                .await,
            Err(RotationError::Validation(_))
        ));
        assert!(matches!(
            f.engine
                .edit_rotation(created.task.id, user_ids(&["ghost"]))
                .await,
            Err(RotationError::Validation(_))
        ));
        assert_eq!(
            f.engine.edit_rotation(404, user_ids(&["bob"])).await.unwrap_err(),
            RotationError::task_not_found(404)
        );
    }

    #[tokio::test]
    async fn test_update_task_does_not_move_open_due_date() {
        let f = fixture();
        let created = f
            .engine
            .create_task("alice", NewTaskBuilder::new(&["alice", "bob"]).build())
            .await
            .unwrap();

        let updated = f
            .engine
            .update_task(
                created.task.id,
                TaskChanges {
                    cycle_interval: Some(14),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.cycle_interval, 14);

        let open = &f.store.open_assignments(created.task.id)[0];
        assert_eq!(open.due_date, test_time() + Duration::days(7));

        let next = f
            .engine
            .complete_assignment(created.task.id, "alice")
            .await
            .unwrap();
        assert_eq!(next.due_date, test_time() + Duration::days(14));
    }

    #[tokio::test]
    async fn test_update_task_validation() {
        let f = fixture();
        let created = f
            .engine
            .create_task("alice", NewTaskBuilder::new(&["alice"]).build())
            .await
            .unwrap();

        assert!(f
            .engine
            .update_task(created.task.id, TaskChanges::default())
            .await
            .is_err());
        assert!(f
            .engine
            .update_task(
                created.task.id,
                TaskChanges {
                    notify_lead_days: Some(30),
                    ..Default::default()
                }
            )
            .await
            .is_err());
        assert_eq!(
            f.engine
                .update_task(
                    77,
                    TaskChanges {
                        title: Some("x".into()),
                        ..Default::default()
                    }
                )
                .await
                .unwrap_err(),
            RotationError::task_not_found(77)
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_simultaneous_completions_single_winner() {
        let store = Arc::new(InMemoryRotationStore::with_users(users(&["a", "b", "c"])));
        let clock: Arc<dyn TimeProvider> = Arc::new(FixedTimeProvider::new(test_time()));
        let setup = RotationEngine::new(Repositories::from_store(store.clone()), clock.clone());
        let created = setup
            .create_task("a", NewTaskBuilder::new(&["a", "b", "c"]).build())
            .await
            .unwrap();

        // 两个请求都读到同一个进行中分配后才继续
        let gated = Arc::new(GatedAssignments::new(store.as_ref().clone(), 2));
        let engine = Arc::new(RotationEngine::new(
            Repositories::from_store(store.clone()).with_assignments(gated),
            clock,
        ));

        let first = {
            let engine = engine.clone();
            let task_id = created.task.id;
            tokio::spawn(async move { engine.complete_assignment(task_id, "a").await })
        };
        let second = {
            let engine = engine.clone();
            let task_id = created.task.id;
            tokio::spawn(async move { engine.complete_assignment(task_id, "a").await })
        };

        let results = vec![first.await.unwrap(), second.await.unwrap()];
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(RotationError::Conflict { .. }))));

        let open = store.open_assignments(created.task.id);
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].user_id, "b");
        assert_eq!(store.all_notifications().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_rotation_edit_during_completion_conflicts() {
        let f = fixture();
        let created = f
            .engine
            .create_task("alice", NewTaskBuilder::new(&["alice", "bob", "carol"]).build())
            .await
            .unwrap();

        let gated = Arc::new(GatedRotations::new(f.store.as_ref().clone()));
        let engine = Arc::new(RotationEngine::new(
            Repositories::from_store(f.store.clone()).with_rotations(gated.clone()),
            Arc::new(f.clock.clone()),
        ));
        let completion = {
            let engine = engine.clone();
            let task_id = created.task.id;
            tokio::spawn(async move { engine.complete_assignment(task_id, "alice").await })
        };

        // 完成请求已读到 [alice, bob, carol]，此时把 bob 移出轮值
        gated.wait_for_read().await;
        f.engine
            .edit_rotation(created.task.id, user_ids(&["alice", "carol"]))
            .await
            .unwrap();
        gated.release().await;

        let err = completion.await.unwrap().unwrap_err();
        assert!(matches!(err, RotationError::Conflict { .. }), "{err:?}");

        let open = f.store.open_assignments(created.task.id);
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].user_id, "alice");
        assert!(f.store.all_notifications().is_empty());

        // 重试按新轮值交接
        let next = f
            .engine
            .complete_assignment(created.task.id, "alice")
            .await
            .unwrap();
        assert_eq!(next.user_id, "carol");
    }

    #[tokio::test]
    async fn test_oversized_cycle_interval_is_validation_error() {
        let f = fixture();
        let err = f
            .engine
            .create_task(
                "alice",
                NewTaskBuilder::new(&["alice"]).with_cycle(i32::MAX, 0).build(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RotationError::Validation(_)));
        assert_eq!(f.store.task_count(), 0);

        let created = f
            .engine
            .create_task("alice", NewTaskBuilder::new(&["alice", "bob"]).build())
            .await
            .unwrap();
        let err = f
            .engine
            .update_task(
                created.task.id,
                TaskChanges {
                    cycle_interval: Some(i32::MAX),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RotationError::Validation(_)));

        let next = f
            .engine
            .complete_assignment(created.task.id, "alice")
            .await
            .unwrap();
        assert_eq!(next.due_date, test_time() + Duration::days(7));
    }
}
