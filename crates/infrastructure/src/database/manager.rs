use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use rotation_config::DatabaseConfig;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::{debug, info};

/// SQLite 连接池与表结构管理
pub struct DatabaseManager {
    pool: SqlitePool,
}

impl DatabaseManager {
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        info!("创建SQLite数据库连接池: {}", config.url);

        let mut connect_options = SqliteConnectOptions::from_str(&config.url)
            .context("解析数据库URL失败")?
            .create_if_missing(true)
            .foreign_keys(true);

        // 内存库每个连接都是独立的数据库，只能保持单个常驻连接
        let pool_options = if config.is_in_memory() {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            connect_options = connect_options.journal_mode(SqliteJournalMode::Wal);
            SqlitePoolOptions::new()
                .max_connections(config.max_connections)
                .min_connections(config.min_connections)
                .max_lifetime(Duration::from_secs(1800))
        };

        let pool = pool_options
            .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds))
            .connect_with(connect_options)
            .await
            .context("创建数据库连接池失败")?;

        Ok(Self { pool })
    }

    /// 使用已有连接池，测试中常用
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// 幂等地创建全部表和索引
    pub async fn migrate(&self) -> Result<()> {
        let pool = &self.pool;
        info!("运行数据库迁移");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL,
                name TEXT NOT NULL,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(pool)
        .await
        .context("创建用户表失败")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                cycle_interval INTEGER NOT NULL CHECK (cycle_interval > 0),
                notify_lead_days INTEGER NOT NULL CHECK (notify_lead_days >= 0),
                created_by TEXT NOT NULL,
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL,
                CHECK (notify_lead_days <= cycle_interval)
            )
            "#,
        )
        .execute(pool)
        .await
        .context("创建任务表失败")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS task_rotation (
                task_id INTEGER NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
                user_id TEXT NOT NULL,
                position INTEGER NOT NULL CHECK (position >= 0),
                PRIMARY KEY (task_id, user_id),
                UNIQUE (task_id, position)
            )
            "#,
        )
        .execute(pool)
        .await
        .context("创建轮值表失败")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS task_assignments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                task_id INTEGER NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
                user_id TEXT NOT NULL,
                start_date DATETIME NOT NULL,
                due_date DATETIME NOT NULL,
                completed BOOLEAN NOT NULL DEFAULT 0,
                notification_sent BOOLEAN NOT NULL DEFAULT 0,
                completed_at DATETIME,
                completed_by TEXT
            )
            "#,
        )
        .execute(pool)
        .await
        .context("创建任务分配表失败")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS notifications (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                task_id INTEGER NOT NULL REFERENCES tasks(id) ON DELETE CASCADE,
                message TEXT NOT NULL,
                type TEXT NOT NULL CHECK (type IN ('HANDOFF', 'REMINDER')),
                read BOOLEAN NOT NULL DEFAULT 0,
                created_at DATETIME NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await
        .context("创建通知表失败")?;

        // 每个任务最多一个进行中的分配
        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS ux_task_assignments_open ON task_assignments(task_id) WHERE completed = 0",
        )
        .execute(pool)
        .await
        .context("创建进行中分配唯一索引失败")?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_task_assignments_pending ON task_assignments(completed, notification_sent)",
        )
        .execute(pool)
        .await
        .context("创建待提醒分配索引失败")?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_task_rotation_user ON task_rotation(user_id)")
            .execute(pool)
            .await
            .context("创建轮值用户索引失败")?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications(user_id, created_at)",
        )
        .execute(pool)
        .await
        .context("创建通知用户索引失败")?;

        debug!("数据库迁移完成");
        Ok(())
    }

    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .context("数据库健康检查失败")?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
