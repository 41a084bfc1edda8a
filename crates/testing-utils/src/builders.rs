//! Test data builders for creating test entities
//!
//! Timestamps default to a fixed instant so tests stay deterministic.

use chrono::{DateTime, TimeZone, Utc};
use rotation_domain::entities::{NewTask, Task, User};

/// 2024-05-01 09:00:00 UTC
pub fn test_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()
}

/// Users `id` with email `id@example.com` and a capitalised display name
pub fn users(ids: &[&str]) -> Vec<User> {
    ids.iter().map(|id| UserBuilder::new(id).build()).collect()
}

pub fn user_ids(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|id| id.to_string()).collect()
}

/// Builder for creating test Task entities
pub struct TaskBuilder {
    task: Task,
}

impl TaskBuilder {
    pub fn new() -> Self {
        Self {
            task: Task::new(
                "Take out the trash".to_string(),
                String::new(),
                7,
                2,
                "alice".to_string(),
                test_time(),
            ),
        }
    }

    pub fn with_id(mut self, id: i64) -> Self {
        self.task.id = id;
        self
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.task.title = title.to_string();
        self
    }

    pub fn with_cycle(mut self, cycle_interval: i32, notify_lead_days: i32) -> Self {
        self.task.cycle_interval = cycle_interval;
        self.task.notify_lead_days = notify_lead_days;
        self
    }

    pub fn created_by(mut self, user_id: &str) -> Self {
        self.task.created_by = user_id.to_string();
        self
    }

    pub fn build(self) -> Task {
        self.task
    }
}

impl Default for TaskBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `NewTask` requests
pub struct NewTaskBuilder {
    request: NewTask,
}

impl NewTaskBuilder {
    pub fn new(rotation: &[&str]) -> Self {
        Self {
            request: NewTask {
                title: "Take out the trash".to_string(),
                description: String::new(),
                cycle_interval: 7,
                notify_lead_days: 2,
                rotation: user_ids(rotation),
            },
        }
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.request.title = title.to_string();
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.request.description = description.to_string();
        self
    }

    pub fn with_cycle(mut self, cycle_interval: i32, notify_lead_days: i32) -> Self {
        self.request.cycle_interval = cycle_interval;
        self.request.notify_lead_days = notify_lead_days;
        self
    }

    pub fn build(self) -> NewTask {
        self.request
    }
}

pub struct UserBuilder {
    user: User,
}

impl UserBuilder {
    pub fn new(id: &str) -> Self {
        let mut name = id.to_string();
        if let Some(first) = name.get_mut(0..1) {
            first.make_ascii_uppercase();
        }
        let mut user = User::new(id, format!("{id}@example.com"), name);
        user.created_at = test_time();
        Self { user }
    }

    pub fn with_email(mut self, email: &str) -> Self {
        self.user.email = email.to_string();
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.user.name = name.to_string();
        self
    }

    pub fn build(self) -> User {
        self.user
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_builder_defaults() {
        let user = UserBuilder::new("bob").build();
        assert_eq!(user.email, "bob@example.com");
        assert_eq!(user.name, "Bob");
    }

    #[test]
    fn test_new_task_builder() {
        let request = NewTaskBuilder::new(&["a", "b"]).with_cycle(14, 3).build();
        assert_eq!(request.rotation, vec!["a", "b"]);
        assert_eq!(request.cycle_interval, 14);
    }
}
