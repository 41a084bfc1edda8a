pub mod dashboard;
pub mod health;
pub mod notifications;
pub mod reminders;
pub mod tasks;
pub mod users;
