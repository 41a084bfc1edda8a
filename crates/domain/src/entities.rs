use chrono::{DateTime, Duration, Utc};
use rotation_errors::{RotationError, RotationResult};
use serde::{Deserialize, Serialize};

/// 用户目录中的用户（由身份系统维护，核心逻辑只读）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn new(id: impl Into<String>, email: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            name: name.into(),
            created_at: Utc::now(),
        }
    }
}

/// 周期性任务
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub cycle_interval: i32,   // 轮换周期（天）
    pub notify_lead_days: i32, // 提醒提前量（天），不超过 cycle_interval
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn new(
        title: String,
        description: String,
        cycle_interval: i32,
        notify_lead_days: i32,
        created_by: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: 0, // 将由数据库生成
            title,
            description,
            cycle_interval,
            notify_lead_days,
            created_by,
            created_at: now,
            updated_at: now,
        }
    }

    /// 剩余天数小于等于该值时触发提醒
    pub fn reminder_window_days(&self) -> i64 {
        i64::from(self.cycle_interval - self.notify_lead_days)
    }

    pub fn entity_description(&self) -> String {
        format!("任务 '{}' (ID: {})", self.title, self.id)
    }
}

/// 轮值表中的一行：(任务, 用户, 位置)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RotationMember {
    pub task_id: i64,
    pub user_id: String,
    pub position: i32,
}

/// 按位置排序的轮值列表
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Rotation {
    pub task_id: i64,
    pub members: Vec<String>,
}

impl Rotation {
    pub fn new(task_id: i64, members: Vec<String>) -> Self {
        Self { task_id, members }
    }

    /// 从数据库行构建，行顺序不作要求
    pub fn from_members(task_id: i64, mut rows: Vec<RotationMember>) -> Self {
        rows.sort_by_key(|m| m.position);
        Self {
            task_id,
            members: rows.into_iter().map(|m| m.user_id).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn first(&self) -> Option<&str> {
        self.members.first().map(String::as_str)
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.members.iter().any(|m| m == user_id)
    }

    pub fn position_of(&self, user_id: &str) -> Option<usize> {
        self.members.iter().position(|m| m == user_id)
    }

    pub fn to_members(&self) -> Vec<RotationMember> {
        self.members
            .iter()
            .enumerate()
            .map(|(position, user_id)| RotationMember {
                task_id: self.task_id,
                user_id: user_id.clone(),
                position: position as i32,
            })
            .collect()
    }
}

/// 某一轮的责任记录：谁负责、何时到期
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Assignment {
    pub id: i64,
    pub task_id: i64,
    pub user_id: String,
    pub start_date: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
    pub completed: bool,
    pub notification_sent: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub completed_by: Option<String>,
}

impl Assignment {
    /// 新一轮分配，两个标志位都从 false 开始
    ///
    /// 到期时间超出可表示的日期范围时返回校验错误。
    pub fn open(
        task_id: i64,
        user_id: String,
        start: DateTime<Utc>,
        cycle_interval: i32,
    ) -> RotationResult<Self> {
        let due_date = Duration::try_days(i64::from(cycle_interval))
            .and_then(|cycle| start.checked_add_signed(cycle))
            .ok_or_else(|| {
                RotationError::validation(format!("轮换周期超出日期范围: {cycle_interval}"))
            })?;

        Ok(Self {
            id: 0,
            task_id,
            user_id,
            start_date: start,
            due_date,
            completed: false,
            notification_sent: false,
            completed_at: None,
            completed_by: None,
        })
    }

    pub fn is_open(&self) -> bool {
        !self.completed
    }

    pub fn awaits_reminder(&self) -> bool {
        !self.completed && !self.notification_sent
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.is_open() && self.due_date < now
    }

    pub fn entity_description(&self) -> String {
        format!(
            "分配 (ID: {}, 任务: {}, 负责人: {})",
            self.id, self.task_id, self.user_id
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    /// 轮到下一位负责人
    #[serde(rename = "HANDOFF")]
    Handoff,
    /// 到期提醒
    #[serde(rename = "REMINDER")]
    Reminder,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Handoff => "HANDOFF",
            NotificationKind::Reminder => "REMINDER",
        }
    }
}

impl sqlx::Type<sqlx::Sqlite> for NotificationKind {
    fn type_info() -> sqlx::sqlite::SqliteTypeInfo {
        <str as sqlx::Type<sqlx::Sqlite>>::type_info()
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Sqlite> for NotificationKind {
    fn decode(value: sqlx::sqlite::SqliteValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Sqlite>>::decode(value)?;
        match s {
            "HANDOFF" => Ok(NotificationKind::Handoff),
            "REMINDER" => Ok(NotificationKind::Reminder),
            _ => Err(format!("Invalid notification kind: {s}").into()),
        }
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Sqlite> for NotificationKind {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<sqlx::sqlite::SqliteArgumentValue<'q>>,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Sqlite>>::encode(self.as_str(), buf)
    }
}

/// 站内通知
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notification {
    pub id: i64,
    pub user_id: String,
    pub task_id: i64,
    pub message: String,
    pub kind: NotificationKind,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        user_id: String,
        task_id: i64,
        message: String,
        kind: NotificationKind,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: 0,
            user_id,
            task_id,
            message,
            kind,
            read: false,
            created_at: now,
        }
    }
}

/// 完成一轮分配时需要原子提交的全部写入
#[derive(Debug, Clone)]
pub struct Handoff {
    pub completed_assignment_id: i64,
    pub task_id: i64,
    pub completed_by: String,
    pub completed_at: DateTime<Utc>,
    pub successor: Assignment,
    pub notification: Notification,
    /// 计算继任者时读到的轮值顺序，提交时轮值已变化则放弃
    pub rotation: Vec<String>,
}

/// 创建任务的输入
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub cycle_interval: i32,
    pub notify_lead_days: i32,
    pub rotation: Vec<String>,
}

/// 任务编辑，None 表示不修改
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub cycle_interval: Option<i32>,
    pub notify_lead_days: Option<i32>,
}

impl TaskChanges {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.cycle_interval.is_none()
            && self.notify_lead_days.is_none()
    }

    pub fn apply_to(&self, task: &Task, now: DateTime<Utc>) -> Task {
        let mut updated = task.clone();
        if let Some(title) = &self.title {
            updated.title = title.clone();
        }
        if let Some(description) = &self.description {
            updated.description = description.clone();
        }
        if let Some(cycle_interval) = self.cycle_interval {
            updated.cycle_interval = cycle_interval;
        }
        if let Some(lead) = self.notify_lead_days {
            updated.notify_lead_days = lead;
        }
        updated.updated_at = now;
        updated
    }
}

/// 新建任务的完整结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedTask {
    pub task: Task,
    pub rotation: Rotation,
    pub assignment: Assignment,
}

/// 面向用户的任务视图：任务 + 轮值 + 当前分配
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskOverview {
    pub task: Task,
    pub rotation: Vec<String>,
    pub current_assignee: Option<String>,
    pub next_due: Option<DateTime<Utc>>,
    pub notification_sent: bool,
}

impl TaskOverview {
    pub fn new(task: Task, rotation: Rotation, open: Option<&Assignment>) -> Self {
        Self {
            task,
            rotation: rotation.members,
            current_assignee: open.map(|a| a.user_id.clone()),
            next_due: open.map(|a| a.due_date),
            notification_sent: open.map(|a| a.notification_sent).unwrap_or(false),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DashboardSummary {
    pub total_tasks: usize,
    pub assigned_to_me: usize,
    pub overdue: usize,
    pub unread_notifications: i64,
}
