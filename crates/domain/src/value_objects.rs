use std::collections::HashSet;

use rotation_errors::{RotationError, RotationResult};
use serde::{Deserialize, Serialize};

pub const MAX_TITLE_LEN: usize = 200;
/// 一百年
pub const MAX_CYCLE_INTERVAL_DAYS: i32 = 36_500;

/// 任务的周期设置
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CycleSettings {
    pub cycle_interval: i32,
    pub notify_lead_days: i32,
}

impl CycleSettings {
    pub fn new(cycle_interval: i32, notify_lead_days: i32) -> RotationResult<Self> {
        let settings = Self {
            cycle_interval,
            notify_lead_days,
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> RotationResult<()> {
        if self.cycle_interval <= 0 {
            return Err(RotationError::validation(format!(
                "轮换周期必须大于0天: {}",
                self.cycle_interval
            )));
        }
        if self.cycle_interval > MAX_CYCLE_INTERVAL_DAYS {
            return Err(RotationError::validation(format!(
                "轮换周期不能超过{MAX_CYCLE_INTERVAL_DAYS}天: {}",
                self.cycle_interval
            )));
        }
        if self.notify_lead_days < 0 {
            return Err(RotationError::validation(format!(
                "提醒提前天数不能为负数: {}",
                self.notify_lead_days
            )));
        }
        if self.notify_lead_days > self.cycle_interval {
            return Err(RotationError::validation(format!(
                "提醒提前天数({})不能超过轮换周期({})",
                self.notify_lead_days, self.cycle_interval
            )));
        }
        Ok(())
    }
}

pub fn validate_title(title: &str) -> RotationResult<()> {
    let trimmed = title.trim();
    if trimmed.is_empty() {
        return Err(RotationError::validation("任务标题不能为空"));
    }
    if trimmed.chars().count() > MAX_TITLE_LEN {
        return Err(RotationError::validation(format!(
            "任务标题不能超过{MAX_TITLE_LEN}个字符"
        )));
    }
    Ok(())
}

/// 轮值列表必须非空、无重复、无空白ID
pub fn validate_rotation(user_ids: &[String]) -> RotationResult<()> {
    if user_ids.is_empty() {
        return Err(RotationError::validation("轮值列表至少需要一个用户"));
    }
    let mut seen = HashSet::with_capacity(user_ids.len());
    for user_id in user_ids {
        if user_id.trim().is_empty() {
            return Err(RotationError::validation("轮值列表包含空的用户ID"));
        }
        if !seen.insert(user_id.as_str()) {
            return Err(RotationError::validation(format!(
                "轮值列表中用户重复: {user_id}"
            )));
        }
    }
    Ok(())
}
