use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use metrics::counter;
use rotation_domain::entities::{Assignment, Notification, NotificationKind};
use rotation_domain::ports::{Mailer, OutgoingMail};
use rotation_domain::services::{ReminderDecision, ReminderPolicy};
use rotation_errors::{RotationError, RotationResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::messages;
use crate::Repositories;

/// 单个分配在本次扫描中的失败记录，下次扫描会重试
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SweepFailure {
    pub assignment_id: i64,
    pub task_id: i64,
    pub user_id: String,
    pub error: String,
    /// false 表示需要人工修复数据，重试不会自行恢复
    pub retryable: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SweepReport {
    /// 扫描开始时的候选分配数
    pub scanned: usize,
    /// 进入提醒窗口的分配数
    pub due: usize,
    pub sent: usize,
    /// 处理过程中已完成或已被其他扫描锁存
    pub skipped: usize,
    pub failures: Vec<SweepFailure>,
}

/// 直接通知请求，不受到期窗口限制
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct DirectNotification {
    pub user_id: String,
    pub task_id: i64,
    pub message: String,
    pub email: String,
}

impl DirectNotification {
    pub fn validate(&self) -> RotationResult<()> {
        if self.user_id.trim().is_empty()
            || self.task_id <= 0
            || self.message.trim().is_empty()
            || self.email.trim().is_empty()
        {
            return Err(RotationError::validation(
                "缺少必填字段: userId, taskId, message, email",
            ));
        }
        Ok(())
    }
}

enum CandidateOutcome {
    NotDue,
    Sent,
    Skipped { due: bool },
    Failed { due: bool, error: RotationError },
}

/// 到期提醒调度器
pub struct ReminderScheduler {
    repos: Repositories,
    mailer: Arc<dyn Mailer>,
    max_concurrent: usize,
}

impl ReminderScheduler {
    pub fn new(repos: Repositories, mailer: Arc<dyn Mailer>, max_concurrent: usize) -> Self {
        Self {
            repos,
            mailer,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// 扫描所有未完成且未提醒的分配，对进入窗口的发送提醒
    ///
    /// 只有投递成功才锁存 notification_sent，因此同一 `now` 重复扫描不会重复提醒，
    /// 投递失败的分配会在下次扫描时重试。
    pub async fn run_due_reminder_sweep(&self, now: DateTime<Utc>) -> RotationResult<SweepReport> {
        let span = info_span!("reminder_sweep", now = %now);
        async move {
            let candidates = self.repos.assignments.find_reminder_candidates().await?;
            let mut report = SweepReport {
                scanned: candidates.len(),
                ..Default::default()
            };
            debug!("发现 {} 个待提醒候选分配", report.scanned);

            let outcomes: Vec<(Assignment, CandidateOutcome)> = stream::iter(candidates)
                .map(|candidate| async move {
                    let outcome = self.process_candidate(&candidate, now).await;
                    (candidate, outcome)
                })
                .buffer_unordered(self.max_concurrent)
                .collect()
                .await;

            for (candidate, outcome) in outcomes {
                match outcome {
                    CandidateOutcome::NotDue => {}
                    CandidateOutcome::Sent => {
                        report.due += 1;
                        report.sent += 1;
                    }
                    CandidateOutcome::Skipped { due } => {
                        report.due += usize::from(due);
                        report.skipped += 1;
                    }
                    CandidateOutcome::Failed { due, error } => {
                        report.due += usize::from(due);
                        counter!("rotation_reminder_failures_total").increment(1);
                        report.failures.push(SweepFailure {
                            assignment_id: candidate.id,
                            task_id: candidate.task_id,
                            user_id: candidate.user_id,
                            error: error.to_string(),
                            retryable: error.is_retryable(),
                        });
                    }
                }
            }

            info!(
                "提醒扫描完成: 候选 {} 个，到期 {} 个，已发送 {} 个，跳过 {} 个，失败 {} 个",
                report.scanned,
                report.due,
                report.sent,
                report.skipped,
                report.failures.len()
            );
            Ok(report)
        }
        .instrument(span)
        .await
    }

    async fn process_candidate(&self, candidate: &Assignment, now: DateTime<Utc>) -> CandidateOutcome {
        let task = match self.repos.tasks.get_by_id(candidate.task_id).await {
            Ok(Some(task)) => task,
            Ok(None) => {
                warn!("分配 {} 对应的任务 {} 不存在", candidate.id, candidate.task_id);
                return CandidateOutcome::Failed {
                    due: false,
                    error: RotationError::task_not_found(candidate.task_id),
                };
            }
            Err(error) => return CandidateOutcome::Failed { due: false, error },
        };

        let days_remaining = match ReminderPolicy::evaluate(&task, candidate, now) {
            ReminderDecision::Due { days_remaining } => days_remaining,
            ReminderDecision::NotYet {
                days_remaining,
                window_days,
            } => {
                debug!(
                    "{} 剩余 {} 天，未进入 {} 天的提醒窗口",
                    candidate.entity_description(),
                    days_remaining,
                    window_days
                );
                return CandidateOutcome::NotDue;
            }
            ReminderDecision::NotApplicable => return CandidateOutcome::Skipped { due: false },
        };

        // 快照之后分配可能已被完成或被并发扫描锁存
        match self.repos.assignments.get_by_id(candidate.id).await {
            Ok(Some(fresh)) if fresh.awaits_reminder() => {}
            Ok(_) => {
                debug!("{} 已完成或已提醒，跳过", candidate.entity_description());
                return CandidateOutcome::Skipped { due: true };
            }
            Err(error) => return CandidateOutcome::Failed { due: true, error },
        }

        let user = match self.repos.users.lookup(&candidate.user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                warn!("提醒对象 {} 不在用户目录中", candidate.user_id);
                return CandidateOutcome::Failed {
                    due: true,
                    error: RotationError::user_not_found(candidate.user_id.clone()),
                };
            }
            Err(error) => return CandidateOutcome::Failed { due: true, error },
        };

        let mail = OutgoingMail::new(
            user.email.clone(),
            messages::reminder_subject(&task.title, days_remaining),
            messages::reminder_body(&user.name, &task.title, days_remaining, candidate.due_date),
        );
        if let Err(error) = self.mailer.send(&mail).await {
            warn!(
                "{} 的提醒投递失败，下次扫描重试: {}",
                candidate.entity_description(),
                error
            );
            return CandidateOutcome::Failed { due: true, error };
        }

        let reminder = Notification::new(
            candidate.user_id.clone(),
            task.id,
            messages::reminder_message(&task.title, days_remaining),
            NotificationKind::Reminder,
            now,
        );
        match self.repos.assignments.latch_reminder(candidate.id, &reminder).await {
            Ok(true) => {
                counter!("rotation_reminders_sent_total").increment(1);
                info!(
                    "已提醒 {}: {} 剩余 {} 天",
                    candidate.user_id,
                    task.entity_description(),
                    days_remaining
                );
                CandidateOutcome::Sent
            }
            Ok(false) => {
                debug!(
                    "{} 在发送期间已完成或已锁存，不记录提醒",
                    candidate.entity_description()
                );
                CandidateOutcome::Skipped { due: true }
            }
            Err(error) => CandidateOutcome::Failed { due: true, error },
        }
    }

    /// 立即发送一封通知邮件，不检查也不修改 notification_sent
    pub async fn send_direct_notification(&self, request: DirectNotification) -> RotationResult<()> {
        request.validate()?;

        let mail = OutgoingMail::new(
            request.email.trim(),
            messages::DIRECT_NOTIFICATION_SUBJECT,
            request.message.clone(),
        );
        self.mailer.send(&mail).await?;

        info!(
            "已向 {} 发送任务 {} 的直接通知",
            request.user_id, request.task_id
        );
        Ok(())
    }

    /// 交接后给新负责人发邮件，内容与站内交接通知一致
    pub async fn send_handoff_email(&self, successor: &Assignment) -> RotationResult<()> {
        let task = self
            .repos
            .tasks
            .get_by_id(successor.task_id)
            .await?
            .ok_or_else(|| RotationError::task_not_found(successor.task_id))?;
        let user = self
            .repos
            .users
            .lookup(&successor.user_id)
            .await?
            .ok_or_else(|| RotationError::user_not_found(successor.user_id.clone()))?;

        self.send_direct_notification(DirectNotification {
            user_id: user.id,
            task_id: task.id,
            message: messages::handoff_message(&task.title),
            email: user.email,
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Duration;
    use mockall::mock;
    use rotation_domain::entities::Task;
    use rotation_domain::repositories::{AssignmentRepository, TaskRepository};
    use rotation_testing_utils::{
        test_time, user_ids, users, InMemoryRotationStore, RecordingMailer, TaskBuilder,
    };

    mock! {
        pub Outbox {}

        #[async_trait]
        impl Mailer for Outbox {
            async fn send(&self, mail: &OutgoingMail) -> RotationResult<()>;
        }
    }

    struct Fixture {
        store: Arc<InMemoryRotationStore>,
        mailer: RecordingMailer,
        scheduler: ReminderScheduler,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryRotationStore::with_users(users(&["alice", "bob"])));
        let mailer = RecordingMailer::new();
        let scheduler = ReminderScheduler::new(
            Repositories::from_store(store.clone()),
            Arc::new(mailer.clone()),
            4,
        );
        Fixture {
            store,
            mailer,
            scheduler,
        }
    }

    async fn latched(store: &InMemoryRotationStore, assignment_id: i64) -> bool {
        AssignmentRepository::get_by_id(store, assignment_id)
            .await
            .unwrap()
            .unwrap()
            .notification_sent
    }

    /// 7天周期、提前2天：剩余 <= 5 天时提醒
    async fn seed_task(store: &InMemoryRotationStore, rotation: &[&str]) -> (Task, Assignment) {
        let task = TaskBuilder::new().with_title("Dishes").with_cycle(7, 2).build();
        let first = Assignment::open(0, rotation[0].to_string(), test_time(), 7).unwrap();
        store
            .create_with_rotation(&task, &user_ids(rotation), &first)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_sweep_fires_inside_window() {
        let f = fixture();
        let (_, assignment) = seed_task(&f.store, &["bob", "alice"]).await;
        let now = assignment.due_date - Duration::days(1);

        let report = f.scheduler.run_due_reminder_sweep(now).await.unwrap();
        assert_eq!(report.scanned, 1);
        assert_eq!(report.due, 1);
        assert_eq!(report.sent, 1);
        assert!(report.failures.is_empty());

        let sent = f.mailer.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "bob@example.com");
        assert_eq!(sent[0].subject, "Reminder: Dishes due in 1 days");
        assert!(sent[0].body.contains("Hi Bob"));

        assert!(latched(&f.store, assignment.id).await);

        let notifications = f.store.all_notifications();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].kind, NotificationKind::Reminder);
        assert_eq!(notifications[0].message, "Reminder: \"Dishes\" is due in 1 days!");
    }

    #[tokio::test]
    async fn test_sweep_waits_outside_window() {
        let f = fixture();
        let (_, assignment) = seed_task(&f.store, &["bob"]).await;
        let now = assignment.due_date - Duration::days(6);

        let report = f.scheduler.run_due_reminder_sweep(now).await.unwrap();
        assert_eq!(report.scanned, 1);
        assert_eq!(report.due, 0);
        assert_eq!(report.sent, 0);
        assert!(f.mailer.sent().is_empty());
        assert!(!latched(&f.store, assignment.id).await);
    }

    #[tokio::test]
    async fn test_sweep_is_idempotent_for_same_now() {
        let f = fixture();
        let (_, assignment) = seed_task(&f.store, &["alice"]).await;
        let now = assignment.due_date - Duration::hours(30);

        let first = f.scheduler.run_due_reminder_sweep(now).await.unwrap();
        let second = f.scheduler.run_due_reminder_sweep(now).await.unwrap();
        assert_eq!(first.sent, 1);
        assert_eq!(second.scanned, 0);
        assert_eq!(second.sent, 0);
        assert_eq!(f.mailer.sent().len(), 1);
        assert_eq!(f.store.all_notifications().len(), 1);
    }

    #[tokio::test]
    async fn test_delivery_failure_leaves_latch_and_retries() {
        let f = fixture();
        let (_, assignment) = seed_task(&f.store, &["bob"]).await;
        let now = assignment.due_date - Duration::days(2);

        f.mailer.fail_for("bob@example.com");
        let report = f.scheduler.run_due_reminder_sweep(now).await.unwrap();
        assert_eq!(report.sent, 0);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].assignment_id, assignment.id);
        assert_eq!(report.failures[0].user_id, "bob");
        assert!(report.failures[0].retryable);
        assert!(!latched(&f.store, assignment.id).await);
        assert!(f.store.all_notifications().is_empty());

        f.mailer.recover("bob@example.com");
        let retry = f.scheduler.run_due_reminder_sweep(now).await.unwrap();
        assert_eq!(retry.sent, 1);
        assert!(latched(&f.store, assignment.id).await);
    }

    #[tokio::test]
    async fn test_one_failure_does_not_block_others() {
        let f = fixture();
        let (_, bobs) = seed_task(&f.store, &["bob"]).await;
        let (_, alices) = seed_task(&f.store, &["alice"]).await;
        let now = bobs.due_date - Duration::days(1);

        f.mailer.fail_for("bob@example.com");
        let report = f.scheduler.run_due_reminder_sweep(now).await.unwrap();
        assert_eq!(report.due, 2);
        assert_eq!(report.sent, 1);
        assert_eq!(report.failures.len(), 1);
        assert!(latched(&f.store, alices.id).await);
    }

    #[tokio::test]
    async fn test_unknown_assignee_is_per_assignment_failure() {
        let f = fixture();
        let (_, assignment) = seed_task(&f.store, &["ghost"]).await;
        let now = assignment.due_date;

        let report = f.scheduler.run_due_reminder_sweep(now).await.unwrap();
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].error.contains("ghost"));
        assert!(!report.failures[0].retryable);
        assert!(!latched(&f.store, assignment.id).await);
    }

    #[tokio::test]
    async fn test_overdue_assignment_still_reminded() {
        let f = fixture();
        let (_, assignment) = seed_task(&f.store, &["alice"]).await;
        let now = assignment.due_date + Duration::days(3);

        let report = f.scheduler.run_due_reminder_sweep(now).await.unwrap();
        assert_eq!(report.sent, 1);
        assert_eq!(f.mailer.sent()[0].subject, "Reminder: Dishes due in -3 days");
    }

    #[tokio::test]
    async fn test_completed_between_snapshot_and_send_is_skipped() {
        let store = Arc::new(InMemoryRotationStore::with_users(users(&["alice"])));
        let (_, assignment) = seed_task(&store, &["alice"]).await;

        // 投递时分配被并发完成：邮件已发出但不记录提醒
        let mut outbox = MockOutbox::new();
        let racing_store = store.clone();
        let completed = Assignment {
            completed: true,
            ..assignment.clone()
        };
        outbox.expect_send().times(1).returning(move |_| {
            racing_store.overwrite_assignment(completed.clone());
            Ok(())
        });

        let scheduler =
            ReminderScheduler::new(Repositories::from_store(store.clone()), Arc::new(outbox), 1);
        let report = scheduler
            .run_due_reminder_sweep(assignment.due_date)
            .await
            .unwrap();

        assert_eq!(report.sent, 0);
        assert_eq!(report.skipped, 1);
        assert!(store.all_notifications().is_empty());
        assert!(!latched(&store, assignment.id).await);
    }

    #[tokio::test]
    async fn test_direct_notification_sends_without_latching() {
        let f = fixture();
        let (task, assignment) = seed_task(&f.store, &["alice"]).await;

        f.scheduler
            .send_direct_notification(DirectNotification {
                user_id: "alice".into(),
                task_id: task.id,
                message: "Please water the plants".into(),
                email: "alice@example.com".into(),
            })
            .await
            .unwrap();

        let sent = f.mailer.sent();
        assert_eq!(sent[0].subject, "Task Notification");
        assert_eq!(sent[0].body, "Please water the plants");
        assert!(!latched(&f.store, assignment.id).await);
        assert!(f.store.all_notifications().is_empty());
    }

    #[tokio::test]
    async fn test_direct_notification_validation_and_delivery_error() {
        let mut outbox = MockOutbox::new();
        outbox
            .expect_send()
            .times(1)
            .returning(|mail| Err(RotationError::delivery(&mail.to, "connection refused")));
        let scheduler = ReminderScheduler::new(
            Repositories::from_store(Arc::new(InMemoryRotationStore::new())),
            Arc::new(outbox),
            1,
        );

        let missing = DirectNotification {
            user_id: "alice".into(),
            task_id: 1,
            message: String::new(),
            email: "alice@example.com".into(),
        };
        assert!(matches!(
            scheduler.send_direct_notification(missing).await,
            Err(RotationError::Validation(_))
        ));

        let request = DirectNotification {
            user_id: "alice".into(),
            task_id: 1,
            message: "hi".into(),
            email: "alice@example.com".into(),
        };
        assert!(matches!(
            scheduler.send_direct_notification(request).await,
            Err(RotationError::Delivery { .. })
        ));
    }

    #[tokio::test]
    async fn test_handoff_email() {
        let f = fixture();
        let (_, assignment) = seed_task(&f.store, &["bob"]).await;
        f.scheduler.send_handoff_email(&assignment).await.unwrap();

        let sent = f.mailer.sent_to("bob@example.com");
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].body, "You are now responsible for \"Dishes\"");
    }

    #[test]
    fn test_direct_notification_deserializes_camel_case() {
        let request: DirectNotification = serde_json::from_str(
            r#"{"userId":"bob","taskId":3,"message":"hi","email":"bob@example.com"}"#,
        )
        .unwrap();
        assert_eq!(request.task_id, 3);
        assert!(request.validate().is_ok());

        let partial: DirectNotification = serde_json::from_str(r#"{"userId":"bob"}"#).unwrap();
        assert!(partial.validate().is_err());
    }
}
