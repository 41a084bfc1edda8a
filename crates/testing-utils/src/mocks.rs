//! In-memory implementations of the repository and port traits
//!
//! Every repository trait is implemented by the single `InMemoryRotationStore`
//! so that compound writes (`complete_and_advance`, `latch_reminder`) can see
//! tasks, assignments and notifications under one lock, the same way the
//! SQLite implementation sees them inside one transaction.

use async_trait::async_trait;
use rotation_domain::entities::{Assignment, Handoff, Notification, Rotation, Task, User};
use rotation_domain::ports::{Mailer, OutgoingMail};
use rotation_domain::repositories::{
    AssignmentRepository, NotificationRepository, RotationRepository, TaskRepository,
    UserDirectory,
};
use rotation_errors::{RotationError, RotationResult};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct StoreState {
    tasks: BTreeMap<i64, Task>,
    rotations: HashMap<i64, Vec<String>>,
    assignments: BTreeMap<i64, Assignment>,
    notifications: BTreeMap<i64, Notification>,
    users: BTreeMap<String, User>,
    next_task_id: i64,
    next_assignment_id: i64,
    next_notification_id: i64,
}

impl StoreState {
    fn allocate_assignment(&mut self, assignment: &Assignment) -> Assignment {
        self.next_assignment_id += 1;
        let stored = Assignment {
            id: self.next_assignment_id,
            ..assignment.clone()
        };
        self.assignments.insert(stored.id, stored.clone());
        stored
    }

    fn allocate_notification(&mut self, notification: &Notification) -> Notification {
        self.next_notification_id += 1;
        let stored = Notification {
            id: self.next_notification_id,
            ..notification.clone()
        };
        self.notifications.insert(stored.id, stored.clone());
        stored
    }

    fn has_open_assignment(&self, task_id: i64) -> bool {
        self.assignments
            .values()
            .any(|a| a.task_id == task_id && !a.completed)
    }
}

/// In-memory record store for unit tests
#[derive(Debug, Clone, Default)]
pub struct InMemoryRotationStore {
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryRotationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_users(users: Vec<User>) -> Self {
        let store = Self::new();
        {
            let mut state = store.state.lock().unwrap();
            for user in users {
                state.users.insert(user.id.clone(), user);
            }
        }
        store
    }

    pub fn add_user(&self, user: User) {
        self.state.lock().unwrap().users.insert(user.id.clone(), user);
    }

    /// Seed an assignment directly, bypassing the one-open-per-task check
    pub fn insert_assignment(&self, assignment: Assignment) -> Assignment {
        self.state.lock().unwrap().allocate_assignment(&assignment)
    }

    /// Overwrite a stored assignment, e.g. to simulate a concurrent writer
    pub fn overwrite_assignment(&self, assignment: Assignment) {
        self.state
            .lock()
            .unwrap()
            .assignments
            .insert(assignment.id, assignment);
    }

    pub fn all_assignments(&self) -> Vec<Assignment> {
        self.state.lock().unwrap().assignments.values().cloned().collect()
    }

    pub fn all_notifications(&self) -> Vec<Notification> {
        self.state
            .lock()
            .unwrap()
            .notifications
            .values()
            .cloned()
            .collect()
    }

    pub fn open_assignments(&self, task_id: i64) -> Vec<Assignment> {
        self.state
            .lock()
            .unwrap()
            .assignments
            .values()
            .filter(|a| a.task_id == task_id && !a.completed)
            .cloned()
            .collect()
    }

    pub fn task_count(&self) -> usize {
        self.state.lock().unwrap().tasks.len()
    }
}

#[async_trait]
impl TaskRepository for InMemoryRotationStore {
    async fn create_with_rotation(
        &self,
        task: &Task,
        rotation: &[String],
        first_assignment: &Assignment,
    ) -> RotationResult<(Task, Assignment)> {
        let mut state = self.state.lock().unwrap();
        state.next_task_id += 1;
        let created = Task {
            id: state.next_task_id,
            ..task.clone()
        };
        state.tasks.insert(created.id, created.clone());
        state.rotations.insert(created.id, rotation.to_vec());
        let assignment = state.allocate_assignment(&Assignment {
            task_id: created.id,
            ..first_assignment.clone()
        });
        Ok((created, assignment))
    }

    async fn get_by_id(&self, id: i64) -> RotationResult<Option<Task>> {
        Ok(self.state.lock().unwrap().tasks.get(&id).cloned())
    }

    async fn update(&self, task: &Task) -> RotationResult<()> {
        let mut state = self.state.lock().unwrap();
        match state.tasks.get_mut(&task.id) {
            Some(existing) => {
                *existing = task.clone();
                Ok(())
            }
            None => Err(RotationError::task_not_found(task.id)),
        }
    }

    async fn list_for_member(&self, user_id: &str) -> RotationResult<Vec<Task>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .tasks
            .values()
            .filter(|task| {
                state
                    .rotations
                    .get(&task.id)
                    .is_some_and(|members| members.iter().any(|m| m == user_id))
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl RotationRepository for InMemoryRotationStore {
    async fn get_rotation(&self, task_id: i64) -> RotationResult<Rotation> {
        let members = self
            .state
            .lock()
            .unwrap()
            .rotations
            .get(&task_id)
            .cloned()
            .unwrap_or_default();
        Ok(Rotation::new(task_id, members))
    }

    async fn replace_rotation(&self, task_id: i64, user_ids: &[String]) -> RotationResult<Rotation> {
        self.state
            .lock()
            .unwrap()
            .rotations
            .insert(task_id, user_ids.to_vec());
        Ok(Rotation::new(task_id, user_ids.to_vec()))
    }
}

#[async_trait]
impl AssignmentRepository for InMemoryRotationStore {
    async fn get_by_id(&self, id: i64) -> RotationResult<Option<Assignment>> {
        Ok(self.state.lock().unwrap().assignments.get(&id).cloned())
    }

    async fn find_open(&self, task_id: i64) -> RotationResult<Option<Assignment>> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .assignments
            .values()
            .find(|a| a.task_id == task_id && !a.completed)
            .cloned())
    }

    async fn list_by_task(&self, task_id: i64) -> RotationResult<Vec<Assignment>> {
        let mut history: Vec<_> = self
            .state
            .lock()
            .unwrap()
            .assignments
            .values()
            .filter(|a| a.task_id == task_id)
            .cloned()
            .collect();
        history.sort_by(|a, b| b.start_date.cmp(&a.start_date).then(b.id.cmp(&a.id)));
        Ok(history)
    }

    async fn list_open_for_user(&self, user_id: &str) -> RotationResult<Vec<Assignment>> {
        let mut open: Vec<_> = self
            .state
            .lock()
            .unwrap()
            .assignments
            .values()
            .filter(|a| a.user_id == user_id && !a.completed)
            .cloned()
            .collect();
        open.sort_by_key(|a| a.due_date);
        Ok(open)
    }

    async fn find_reminder_candidates(&self) -> RotationResult<Vec<Assignment>> {
        let mut candidates: Vec<_> = self
            .state
            .lock()
            .unwrap()
            .assignments
            .values()
            .filter(|a| a.awaits_reminder())
            .cloned()
            .collect();
        candidates.sort_by_key(|a| a.due_date);
        Ok(candidates)
    }

    async fn complete_and_advance(&self, handoff: &Handoff) -> RotationResult<Assignment> {
        let mut state = self.state.lock().unwrap();
        let conflict = RotationError::conflict(handoff.task_id, handoff.completed_assignment_id);

        // Successor was computed from a rotation that has since been replaced
        if state.rotations.get(&handoff.task_id) != Some(&handoff.rotation) {
            return Err(conflict);
        }

        match state.assignments.get_mut(&handoff.completed_assignment_id) {
            Some(current) if current.task_id == handoff.task_id && !current.completed => {
                current.completed = true;
                current.completed_at = Some(handoff.completed_at);
                current.completed_by = Some(handoff.completed_by.clone());
            }
            _ => return Err(conflict),
        }

        if state.has_open_assignment(handoff.task_id) {
            // Roll back the close, same as the unique index would
            if let Some(current) = state.assignments.get_mut(&handoff.completed_assignment_id) {
                current.completed = false;
                current.completed_at = None;
                current.completed_by = None;
            }
            return Err(conflict);
        }

        let successor = state.allocate_assignment(&handoff.successor);
        state.allocate_notification(&handoff.notification);
        Ok(successor)
    }

    async fn latch_reminder(
        &self,
        assignment_id: i64,
        reminder: &Notification,
    ) -> RotationResult<bool> {
        let mut state = self.state.lock().unwrap();
        match state.assignments.get_mut(&assignment_id) {
            Some(assignment) if assignment.awaits_reminder() => {
                assignment.notification_sent = true;
            }
            _ => return Ok(false),
        }
        state.allocate_notification(reminder);
        Ok(true)
    }
}

#[async_trait]
impl NotificationRepository for InMemoryRotationStore {
    async fn get_by_id(&self, id: i64) -> RotationResult<Option<Notification>> {
        Ok(self.state.lock().unwrap().notifications.get(&id).cloned())
    }

    async fn list_for_user(&self, user_id: &str) -> RotationResult<Vec<Notification>> {
        let mut list: Vec<_> = self
            .state
            .lock()
            .unwrap()
            .notifications
            .values()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(list)
    }

    async fn count_unread(&self, user_id: &str) -> RotationResult<i64> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .notifications
            .values()
            .filter(|n| n.user_id == user_id && !n.read)
            .count() as i64)
    }

    async fn mark_read(&self, id: i64) -> RotationResult<()> {
        match self.state.lock().unwrap().notifications.get_mut(&id) {
            Some(notification) => {
                notification.read = true;
                Ok(())
            }
            None => Err(RotationError::notification_not_found(id)),
        }
    }

    async fn mark_all_read(&self, user_id: &str) -> RotationResult<u64> {
        let mut updated = 0;
        for notification in self.state.lock().unwrap().notifications.values_mut() {
            if notification.user_id == user_id && !notification.read {
                notification.read = true;
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn delete(&self, id: i64) -> RotationResult<()> {
        self.state
            .lock()
            .unwrap()
            .notifications
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| RotationError::notification_not_found(id))
    }
}

#[async_trait]
impl UserDirectory for InMemoryRotationStore {
    async fn lookup(&self, user_id: &str) -> RotationResult<Option<User>> {
        Ok(self.state.lock().unwrap().users.get(user_id).cloned())
    }

    async fn list(&self) -> RotationResult<Vec<User>> {
        Ok(self.state.lock().unwrap().users.values().cloned().collect())
    }

    async fn upsert(&self, user: &User) -> RotationResult<User> {
        let mut state = self.state.lock().unwrap();
        let stored = match state.users.get(&user.id) {
            Some(existing) => User {
                created_at: existing.created_at,
                ..user.clone()
            },
            None => user.clone(),
        };
        state.users.insert(stored.id.clone(), stored.clone());
        Ok(stored)
    }
}

/// Mailer that records every message and can be told to fail
#[derive(Debug, Clone, Default)]
pub struct RecordingMailer {
    sent: Arc<Mutex<Vec<OutgoingMail>>>,
    failing: Arc<Mutex<HashSet<String>>>,
    fail_all: Arc<AtomicBool>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every send fails until `set_fail_all(false)`
    pub fn set_fail_all(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::SeqCst);
    }

    pub fn fail_for(&self, address: &str) {
        self.failing.lock().unwrap().insert(address.to_string());
    }

    pub fn recover(&self, address: &str) {
        self.failing.lock().unwrap().remove(address);
    }

    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, address: &str) -> Vec<OutgoingMail> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|mail| mail.to == address)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, mail: &OutgoingMail) -> RotationResult<()> {
        if self.fail_all.load(Ordering::SeqCst) || self.failing.lock().unwrap().contains(&mail.to)
        {
            return Err(RotationError::delivery(&mail.to, "mailbox unavailable"));
        }
        self.sent.lock().unwrap().push(mail.clone());
        Ok(())
    }
}
