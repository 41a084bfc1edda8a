//! # 领域服务模块
//!
//! 轮值推进与到期提醒的纯规则，不做任何 I/O。
//! 应用层的 `RotationEngine` 与 `ReminderScheduler` 负责读取数据并提交结果。

use chrono::{DateTime, Utc};

use crate::entities::{Assignment, Rotation, Task};

const MILLIS_PER_DAY: i64 = 86_400_000;

/// 距离到期的天数，向上取整（已逾期时为负数或0）
pub fn days_remaining(due_date: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let millis = (due_date - now).num_milliseconds();
    if millis >= 0 {
        (millis + MILLIS_PER_DAY - 1) / MILLIS_PER_DAY
    } else {
        // 整数除法向零截断，负数时即为向上取整
        millis / MILLIS_PER_DAY
    }
}

/// 轮值的推进规则
pub struct RotationPolicy;

impl RotationPolicy {
    /// 返回下一位负责人的 (位置, 用户ID)；当前负责人不在轮值中时返回 None
    pub fn successor<'a>(rotation: &'a Rotation, current_user: &str) -> Option<(usize, &'a str)> {
        let position = rotation.position_of(current_user)?;
        let next = (position + 1) % rotation.len();
        rotation.members.get(next).map(|user| (next, user.as_str()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderDecision {
    /// 已进入提醒窗口
    Due { days_remaining: i64 },
    /// 尚未进入窗口
    NotYet { days_remaining: i64, window_days: i64 },
    /// 已完成或已提醒过
    NotApplicable,
}

/// 到期提醒的判定规则
pub struct ReminderPolicy;

impl ReminderPolicy {
    /// 剩余天数 <= cycle_interval - notify_lead_days 时触发
    pub fn evaluate(task: &Task, assignment: &Assignment, now: DateTime<Utc>) -> ReminderDecision {
        if !assignment.awaits_reminder() {
            return ReminderDecision::NotApplicable;
        }

        let remaining = days_remaining(assignment.due_date, now);
        let window_days = task.reminder_window_days();
        if remaining <= window_days {
            ReminderDecision::Due {
                days_remaining: remaining,
            }
        } else {
            ReminderDecision::NotYet {
                days_remaining: remaining,
                window_days,
            }
        }
    }
}
