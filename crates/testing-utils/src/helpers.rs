//! Clock and concurrency helpers

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rotation_domain::entities::{Assignment, Handoff, Notification, Rotation};
use rotation_domain::ports::TimeProvider;
use rotation_domain::repositories::{AssignmentRepository, RotationRepository};
use rotation_errors::RotationResult;
use std::sync::{Arc, Mutex};
use tokio::sync::Barrier;

/// Clock that only moves when the test says so
#[derive(Debug, Clone)]
pub struct FixedTimeProvider {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl FixedTimeProvider {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += by;
    }
}

impl TimeProvider for FixedTimeProvider {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Wraps an assignment repository so that `find_open` waits on a barrier.
///
/// Two callers that both reach the barrier are guaranteed to have read the
/// same open assignment before either of them commits.
pub struct GatedAssignments<R> {
    inner: R,
    gate: Arc<Barrier>,
}

impl<R> GatedAssignments<R> {
    pub fn new(inner: R, parties: usize) -> Self {
        Self {
            inner,
            gate: Arc::new(Barrier::new(parties)),
        }
    }
}

#[async_trait]
impl<R: AssignmentRepository> AssignmentRepository for GatedAssignments<R> {
    async fn get_by_id(&self, id: i64) -> RotationResult<Option<Assignment>> {
        self.inner.get_by_id(id).await
    }

    async fn find_open(&self, task_id: i64) -> RotationResult<Option<Assignment>> {
        let open = self.inner.find_open(task_id).await?;
        self.gate.wait().await;
        Ok(open)
    }

    async fn list_by_task(&self, task_id: i64) -> RotationResult<Vec<Assignment>> {
        self.inner.list_by_task(task_id).await
    }

    async fn list_open_for_user(&self, user_id: &str) -> RotationResult<Vec<Assignment>> {
        self.inner.list_open_for_user(user_id).await
    }

    async fn find_reminder_candidates(&self) -> RotationResult<Vec<Assignment>> {
        self.inner.find_reminder_candidates().await
    }

    async fn complete_and_advance(&self, handoff: &Handoff) -> RotationResult<Assignment> {
        self.inner.complete_and_advance(handoff).await
    }

    async fn latch_reminder(
        &self,
        assignment_id: i64,
        reminder: &Notification,
    ) -> RotationResult<bool> {
        self.inner.latch_reminder(assignment_id, reminder).await
    }
}

/// Wraps a rotation repository so that `get_rotation` pauses after reading.
///
/// The test calls `wait_for_read`, makes its own write, then `release`s the
/// reader, which carries on with the rotation it read before the write.
pub struct GatedRotations<R> {
    inner: R,
    read_done: Arc<Barrier>,
    resume: Arc<Barrier>,
}

impl<R> GatedRotations<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            read_done: Arc::new(Barrier::new(2)),
            resume: Arc::new(Barrier::new(2)),
        }
    }

    pub async fn wait_for_read(&self) {
        self.read_done.wait().await;
    }

    pub async fn release(&self) {
        self.resume.wait().await;
    }
}

#[async_trait]
impl<R: RotationRepository> RotationRepository for GatedRotations<R> {
    async fn get_rotation(&self, task_id: i64) -> RotationResult<Rotation> {
        let rotation = self.inner.get_rotation(task_id).await?;
        self.read_done.wait().await;
        self.resume.wait().await;
        Ok(rotation)
    }

    async fn replace_rotation(&self, task_id: i64, user_ids: &[String]) -> RotationResult<Rotation> {
        self.inner.replace_rotation(task_id, user_ids).await
    }
}
