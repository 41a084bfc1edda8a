use crate::validation::{ConfigValidator, ValidationUtils};
use serde::{Deserialize, Serialize};

/// 到期提醒扫描器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReminderSchedulerConfig {
    pub enabled: bool,
    pub sweep_interval_seconds: u64,
    /// 单次扫描中同时投递的提醒上限
    pub max_concurrent_reminders: usize,
    pub run_on_startup: bool,
}

impl Default for ReminderSchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sweep_interval_seconds: 3600,
            max_concurrent_reminders: 8,
            run_on_startup: true,
        }
    }
}

impl ConfigValidator for ReminderSchedulerConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        ValidationUtils::validate_timeout_seconds(
            self.sweep_interval_seconds,
            "scheduler.sweep_interval_seconds",
        )?;
        ValidationUtils::validate_count(
            self.max_concurrent_reminders,
            "scheduler.max_concurrent_reminders",
        )?;
        Ok(())
    }
}
