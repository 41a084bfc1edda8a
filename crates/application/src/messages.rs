//! 面向用户的通知和邮件文案

use chrono::{DateTime, Utc};

pub const DIRECT_NOTIFICATION_SUBJECT: &str = "Task Notification";

pub fn handoff_message(title: &str) -> String {
    format!("You are now responsible for \"{title}\"")
}

pub fn reminder_subject(title: &str, days_remaining: i64) -> String {
    format!("Reminder: {title} due in {days_remaining} days")
}

pub fn reminder_message(title: &str, days_remaining: i64) -> String {
    format!("Reminder: \"{title}\" is due in {days_remaining} days!")
}

pub fn reminder_body(
    name: &str,
    title: &str,
    days_remaining: i64,
    due_date: DateTime<Utc>,
) -> String {
    format!(
        "Hi {name},\n\n\
         This is a reminder that \"{title}\" is due in {days_remaining} days \
         (due {}).\n\n\
         Please mark it complete once it is done so the next person in the rotation takes over.\n",
        due_date.format("%Y-%m-%d")
    )
}
