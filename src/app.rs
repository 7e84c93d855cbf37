use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use chrono::Utc;
use tokio::{net::TcpListener, sync::broadcast};
use tracing::{error, info, warn};

use cronmesh_api::{create_coordinator_routes, create_worker_routes, CoordinatorState, WorkerState};
use cronmesh_core::{AppConfig, TaskExecutor, TaskLocks, TaskRepository};
use cronmesh_dispatcher::{Coordinator, CronEvaluator, TaskSchedulerLoop};
use cronmesh_infrastructure::TaskRepositoryFactory;
use cronmesh_worker::{
    JobHandlerRegistry, LoggingStatusReporter, StatusReporter, TaskExecutionService, WorkerService,
};

/// 应用运行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum AppMode {
    /// 协调节点：调度循环、分发、上报接口和管理接口
    Coordinator,
    /// Worker：执行接口和心跳
    Worker,
    /// 单进程：调度循环直接调用本地执行服务
    Standalone,
}

/// 主应用程序
pub struct Application {
    config: AppConfig,
    mode: AppMode,
    task_repo: Arc<dyn TaskRepository>,
}

impl Application {
    pub async fn new(config: AppConfig, mode: AppMode) -> Result<Self> {
        info!("初始化应用程序，模式: {:?}", mode);

        let task_repo = TaskRepositoryFactory::create(&config.storage)
            .await
            .context("创建任务存储失败")?;

        let app = Self {
            config,
            mode,
            task_repo,
        };
        if mode != AppMode::Worker {
            app.seed_tasks().await?;
        }
        Ok(app)
    }

    pub fn task_repository(&self) -> &Arc<dyn TaskRepository> {
        &self.task_repo
    }

    /// 写入配置文件中的预置任务
    ///
    /// 同名任务已存在时跳过，持久化存储重启后不会重复写入。
    /// CRON表达式无效的任务只记录错误。
    async fn seed_tasks(&self) -> Result<usize> {
        let existing: Vec<String> = self
            .task_repo
            .get_all_tasks()
            .await?
            .into_iter()
            .map(|task| task.name)
            .collect();

        let mut seeded = 0;
        for seed in self.config.tasks.iter().cloned() {
            if existing.contains(&seed.name) {
                info!("预置任务 {} 已存在，跳过", seed.name);
                continue;
            }

            let mut task = seed.into_task();
            match CronEvaluator::next_occurrence(&task.schedule, Utc::now()) {
                Ok(next) => task.next_run_time = next,
                Err(e) => {
                    error!("预置任务 {} 的调度表达式无效: {}", task.name, e);
                    continue;
                }
            }

            self.task_repo.add_task(&task).await?;
            info!(
                "预置任务 {} ({}) 已写入，下次执行时间 {}",
                task.name, task.id, task.next_run_time
            );
            seeded += 1;
        }
        Ok(seeded)
    }

    /// 运行直到收到关闭信号
    pub async fn run(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        info!("启动应用程序，模式: {:?}", self.mode);
        match self.mode {
            AppMode::Coordinator => self.run_coordinator(shutdown_rx).await,
            AppMode::Worker => self.run_worker(shutdown_rx).await,
            AppMode::Standalone => self.run_standalone(shutdown_rx).await,
        }
    }

    async fn run_coordinator(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let coordinator = Arc::new(
            Coordinator::new(&self.config.dispatcher, Arc::clone(&self.task_repo))
                .context("创建协调节点失败")?,
        );
        coordinator.scheduler.start().await;

        let router = create_coordinator_routes(CoordinatorState {
            coordinator: Arc::clone(&coordinator),
        });
        let served = serve(router, &self.config.api.bind_address, shutdown_rx).await;

        coordinator.shutdown().await;
        info!("协调节点已停止");
        served
    }

    async fn run_worker(&self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let registry = Arc::new(JobHandlerRegistry::with_defaults().await);
        let worker = WorkerService::new(&self.config.worker, registry)
            .context("创建Worker服务失败")?;
        let heartbeat = worker.start(shutdown_rx.resubscribe());

        let router = create_worker_routes(WorkerState {
            execution: Arc::clone(worker.execution()),
        });
        let served = serve(router, &self.config.worker.bind_address, shutdown_rx).await;

        if let Err(e) = heartbeat.await {
            error!("等待心跳任务退出失败: {}", e);
        }
        info!("Worker {} 已停止", worker.address());
        served
    }

    async fn run_standalone(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let registry = Arc::new(JobHandlerRegistry::with_defaults().await);
        let execution = Arc::new(TaskExecutionService::new(
            &self.config.worker.address,
            registry,
            Arc::new(LoggingStatusReporter) as Arc<dyn StatusReporter>,
        ));
        let scheduler = Arc::new(TaskSchedulerLoop::new(
            Arc::clone(&self.task_repo),
            execution as Arc<dyn TaskExecutor>,
            TaskLocks::new(),
        ));

        scheduler.start().await;
        let _ = shutdown_rx.recv().await;
        info!("单进程模式收到关闭信号");
        scheduler.stop().await;
        Ok(())
    }
}

/// 在指定地址上提供HTTP服务，收到关闭信号后停止接收新请求
async fn serve(
    router: Router,
    bind_address: &str,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<()> {
    let listener = TcpListener::bind(bind_address)
        .await
        .with_context(|| format!("绑定地址失败: {}", bind_address))?;
    info!("HTTP服务启动在 http://{}", bind_address);

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            if shutdown_rx.recv().await.is_err() {
                warn!("关闭信号通道已关闭");
            }
        })
        .await
        .context("HTTP服务运行失败")
}
