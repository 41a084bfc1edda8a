//! 基于文件的SQLite库，多个连接同时完成同一分配

use chrono::{Duration, TimeZone, Utc};
use rotation_config::DatabaseConfig;
use rotation_domain::entities::{Assignment, Handoff, Notification, NotificationKind, Task};
use rotation_domain::repositories::{AssignmentRepository, TaskRepository};
use rotation_errors::RotationError;
use rotation_infrastructure::{DatabaseManager, SqliteAssignmentRepository, SqliteTaskRepository};
use std::sync::Arc;

async fn file_database(dir: &tempfile::TempDir) -> DatabaseManager {
    let path = dir.path().join("rotation.db");
    let config = DatabaseConfig {
        url: format!("sqlite:{}", path.display()),
        max_connections: 4,
        ..Default::default()
    };
    let manager = DatabaseManager::new(&config).await.unwrap();
    manager.migrate().await.unwrap();
    manager
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_simultaneous_completions_single_winner() {
    let dir = tempfile::tempdir().unwrap();
    let manager = file_database(&dir).await;
    let t0 = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();

    let task = Task::new("Dishes".into(), String::new(), 7, 2, "a".into(), t0);
    let (task, first) = SqliteTaskRepository::new(manager.pool().clone())
        .create_with_rotation(
            &task,
            &["a".to_string(), "b".to_string()],
            &Assignment::open(0, "a".into(), t0, 7).unwrap(),
        )
        .await
        .unwrap();

    let repo = Arc::new(SqliteAssignmentRepository::new(manager.pool().clone()));
    let now = t0 + Duration::days(2);
    let handoff = Handoff {
        completed_assignment_id: first.id,
        task_id: task.id,
        completed_by: "a".into(),
        completed_at: now,
        successor: Assignment::open(task.id, "b".into(), now, 7).unwrap(),
        notification: Notification::new(
            "b".into(),
            task.id,
            "You are now responsible for \"Dishes\"".into(),
            NotificationKind::Handoff,
            now,
        ),
        rotation: vec!["a".into(), "b".into()],
    };

    let attempts = (0..2).map(|_| {
        let repo = repo.clone();
        let handoff = handoff.clone();
        tokio::spawn(async move { repo.complete_and_advance(&handoff).await })
    });
    let results: Vec<_> = futures::future::join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect();

    let successes = results.iter().filter(|r| r.is_ok()).count();
    let conflicts = results
        .iter()
        .filter(|r| matches!(r, Err(RotationError::Conflict { .. })))
        .count();
    assert_eq!(successes, 1);
    assert_eq!(conflicts, 1);

    let history = repo.list_by_task(task.id).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history.iter().filter(|a| a.is_open()).count(), 1);

    let handoffs: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM notifications")
        .fetch_one(manager.pool())
        .await
        .unwrap();
    assert_eq!(handoffs, 1);

    manager.close().await;
}
