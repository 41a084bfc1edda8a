use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use rotation_api::{create_app, AppState};
use rotation_application::{
    NotificationService, ReminderScheduler, Repositories, RotationEngine, SweepReport,
    TaskQueryService,
};
use rotation_config::{AppConfig, ReminderSchedulerConfig};
use rotation_domain::ports::{Mailer, SystemTimeProvider, TimeProvider};
use rotation_infrastructure::{
    build_mailer, DatabaseManager, SqliteAssignmentRepository, SqliteNotificationRepository,
    SqliteRotationRepository, SqliteTaskRepository, SqliteUserDirectory,
};
use sqlx::SqlitePool;
use tokio::{
    net::TcpListener,
    sync::broadcast,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tracing::{error, info, warn};

/// 应用运行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
    /// 仅运行API服务器
    Api,
    /// 仅运行周期性提醒扫描
    Sweeper,
    /// API 与提醒扫描同时运行
    All,
    /// 执行一次提醒扫描后退出
    SweepOnce,
}

/// 应用层服务集合
#[derive(Clone)]
pub struct Services {
    pub repos: Repositories,
    pub engine: Arc<RotationEngine>,
    pub scheduler: Arc<ReminderScheduler>,
    pub notifications: Arc<NotificationService>,
    pub queries: Arc<TaskQueryService>,
    pub clock: Arc<dyn TimeProvider>,
}

impl Services {
    pub fn new(
        repos: Repositories,
        mailer: Arc<dyn Mailer>,
        clock: Arc<dyn TimeProvider>,
        max_concurrent_reminders: usize,
    ) -> Self {
        Self {
            engine: Arc::new(RotationEngine::new(repos.clone(), clock.clone())),
            scheduler: Arc::new(ReminderScheduler::new(
                repos.clone(),
                mailer,
                max_concurrent_reminders,
            )),
            notifications: Arc::new(NotificationService::new(repos.notifications.clone())),
            queries: Arc::new(TaskQueryService::new(repos.clone())),
            repos,
            clock,
        }
    }

    pub fn sqlite_repositories(pool: &SqlitePool) -> Repositories {
        Repositories {
            tasks: Arc::new(SqliteTaskRepository::new(pool.clone())),
            rotations: Arc::new(SqliteRotationRepository::new(pool.clone())),
            assignments: Arc::new(SqliteAssignmentRepository::new(pool.clone())),
            notifications: Arc::new(SqliteNotificationRepository::new(pool.clone())),
            users: Arc::new(SqliteUserDirectory::new(pool.clone())),
        }
    }

    pub fn api_state(&self, email_on_handoff: bool) -> AppState {
        AppState {
            engine: Arc::clone(&self.engine),
            scheduler: Arc::clone(&self.scheduler),
            notifications: Arc::clone(&self.notifications),
            queries: Arc::clone(&self.queries),
            users: Arc::clone(&self.repos.users),
            clock: Arc::clone(&self.clock),
            email_on_handoff,
        }
    }
}

/// 主应用程序
#[derive(Clone)]
pub struct Application {
    config: AppConfig,
    mode: AppMode,
    database: Arc<DatabaseManager>,
    services: Services,
}

impl Application {
    /// 连接数据库、运行迁移并装配所有服务
    pub async fn new(config: AppConfig, mode: AppMode) -> Result<Self> {
        info!("初始化应用程序，模式: {:?}", mode);

        let database = DatabaseManager::new(&config.database)
            .await
            .context("初始化数据库失败")?;
        database.migrate().await.context("运行数据库迁移失败")?;
        info!("数据库连接成功");

        let mailer = build_mailer(&config.mail).context("创建邮件发送器失败")?;

        Ok(Self::with_parts(
            config,
            mode,
            database,
            mailer,
            Arc::new(SystemTimeProvider),
        ))
    }

    /// 使用已准备好的数据库和邮件发送器装配应用
    pub fn with_parts(
        config: AppConfig,
        mode: AppMode,
        database: DatabaseManager,
        mailer: Arc<dyn Mailer>,
        clock: Arc<dyn TimeProvider>,
    ) -> Self {
        let repos = Services::sqlite_repositories(database.pool());
        let services = Services::new(
            repos,
            mailer,
            clock,
            config.scheduler.max_concurrent_reminders,
        );

        Self {
            config,
            mode,
            database: Arc::new(database),
            services,
        }
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// 运行应用程序，直到收到关闭信号
    pub async fn run(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        info!("启动应用程序，模式: {:?}", self.mode);

        match self.mode {
            AppMode::Api => self.run_api(shutdown_rx).await?,
            AppMode::Sweeper => self.run_sweeper(shutdown_rx).await?,
            AppMode::All => self.run_all_components(shutdown_rx).await?,
            AppMode::SweepOnce => {
                self.sweep_once().await?;
            }
        }

        Ok(())
    }

    /// 以当前时间执行一次到期提醒扫描
    pub async fn sweep_once(&self) -> Result<SweepReport> {
        let now = self.services.clock.now();
        let report = self
            .services
            .scheduler
            .run_due_reminder_sweep(now)
            .await
            .context("执行提醒扫描失败")?;

        for failure in &report.failures {
            warn!(
                "分配 {} (任务 {}, 用户 {}) 提醒失败: {}，可重试: {}",
                failure.assignment_id,
                failure.task_id,
                failure.user_id,
                failure.error,
                failure.retryable
            );
        }
        Ok(report)
    }

    pub async fn close(&self) {
        self.database.close().await;
        info!("数据库连接已关闭");
    }

    async fn run_api(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let listener = TcpListener::bind(&self.config.api.bind_address)
            .await
            .with_context(|| format!("绑定地址失败: {}", self.config.api.bind_address))?;

        self.serve_api(listener, shutdown_rx).await
    }

    /// 在给定监听器上提供API，收到关闭信号后等待进行中的请求完成
    pub async fn serve_api(
        &self,
        listener: TcpListener,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<()> {
        let address = listener.local_addr().context("读取监听地址失败")?;
        let app = create_app(
            self.services.api_state(self.config.mail.email_on_handoff),
            &self.config.api,
        );

        info!("API服务器启动在 http://{}", address);

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("API服务器收到关闭信号");
            })
            .await
            .context("API服务器运行失败")?;

        info!("API服务器已停止");
        Ok(())
    }

    async fn run_sweeper(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        info!(
            "启动提醒扫描循环，间隔 {} 秒",
            self.config.scheduler.sweep_interval_seconds
        );

        run_sweep_loop(
            Arc::clone(&self.services.scheduler),
            Arc::clone(&self.services.clock),
            self.config.scheduler.clone(),
            shutdown_rx,
        )
        .await;

        info!("提醒扫描循环已停止");
        Ok(())
    }

    async fn run_all_components(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        info!("启动所有组件");

        let mut handles = Vec::new();

        if self.config.api.enabled {
            let app = self.clone();
            let shutdown_rx = shutdown_rx.resubscribe();

            handles.push(tokio::spawn(async move {
                if let Err(e) = app.run_api(shutdown_rx).await {
                    error!("API服务器运行失败: {:#}", e);
                }
            }));
        }

        if self.config.scheduler.enabled {
            let app = self.clone();
            let shutdown_rx = shutdown_rx.resubscribe();

            handles.push(tokio::spawn(async move {
                if let Err(e) = app.run_sweeper(shutdown_rx).await {
                    error!("提醒扫描运行失败: {:#}", e);
                }
            }));
        }

        if handles.is_empty() {
            warn!("API 和提醒扫描均未启用，没有需要运行的组件");
        }

        for handle in handles {
            let _ = handle.await;
        }

        info!("所有组件已停止");
        Ok(())
    }
}

/// 周期性执行提醒扫描
///
/// 扫描在同一个任务中顺序执行，上一次未结束时不会开始下一次。
pub async fn run_sweep_loop(
    scheduler: Arc<ReminderScheduler>,
    clock: Arc<dyn TimeProvider>,
    config: ReminderSchedulerConfig,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    let period = Duration::from_secs(config.sweep_interval_seconds);
    let start = if config.run_on_startup {
        Instant::now()
    } else {
        Instant::now() + period
    };
    let mut interval = interval_at(start, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let now = clock.now();
                match scheduler.run_due_reminder_sweep(now).await {
                    Ok(report) if !report.failures.is_empty() => {
                        warn!("提醒扫描有 {} 个分配失败，将在下次扫描重试", report.failures.len());
                    }
                    Ok(_) => {}
                    Err(e) => error!("提醒扫描失败: {}", e),
                }
            }
            _ = shutdown_rx.recv() => {
                info!("提醒扫描循环收到关闭信号");
                break;
            }
        }
    }
}
