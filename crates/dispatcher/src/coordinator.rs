use std::sync::Arc;
use std::time::Duration;

use cronmesh_core::{
    traits::{TaskRepository, TaskSender},
    DispatcherConfig, SchedulerResult, TaskLocks,
};

use crate::{
    dispatcher::{DispatchAttempt, DispatchPipeline, HttpTaskSender, TaskDispatcher},
    load_balancer::LoadBalancer,
    node_registry::NodeRegistry,
    retry_service::{RetryConfig, RetryCoordinator},
    scheduler::TaskSchedulerLoop,
    state_listener::StateListener,
    strategies::StrategyFactory,
};

/// 协调节点的组件装配
///
/// 注册表、负载均衡器、分发器、重试协调器、上报监听器和调度循环共享同一个
/// 任务存储和同一组任务锁。
pub struct Coordinator {
    pub registry: Arc<NodeRegistry>,
    pub load_balancer: Arc<LoadBalancer>,
    pub dispatcher: Arc<TaskDispatcher>,
    pub retry_coordinator: Arc<RetryCoordinator>,
    pub state_listener: Arc<StateListener>,
    pub scheduler: Arc<TaskSchedulerLoop>,
    pub task_repo: Arc<dyn TaskRepository>,
    /// 管理接口修改任务时也必须持有同一把任务锁
    pub task_locks: TaskLocks,
}

impl Coordinator {
    /// 使用HTTP发送器装配
    pub fn new(
        config: &DispatcherConfig,
        task_repo: Arc<dyn TaskRepository>,
    ) -> SchedulerResult<Self> {
        let sender = HttpTaskSender::new(Duration::from_secs(config.request_timeout_seconds))?;
        Self::with_sender(config, task_repo, Arc::new(sender), StrategyFactory::new())
    }

    pub fn with_sender(
        config: &DispatcherConfig,
        task_repo: Arc<dyn TaskRepository>,
        sender: Arc<dyn TaskSender>,
        factory: StrategyFactory,
    ) -> SchedulerResult<Self> {
        let registry = Arc::new(NodeRegistry::new());
        let load_balancer = Arc::new(LoadBalancer::from_config(
            Arc::clone(&registry),
            factory,
            config,
        )?);
        let task_locks = TaskLocks::new();

        let pipeline = Arc::new(DispatchPipeline::new(Arc::clone(&load_balancer), sender));
        let retry_coordinator = Arc::new(RetryCoordinator::new(
            Arc::clone(&task_repo),
            Arc::clone(&pipeline) as Arc<dyn DispatchAttempt>,
            task_locks.clone(),
            RetryConfig {
                max_backoff_seconds: config.max_backoff_seconds,
            },
        ));
        let dispatcher = Arc::new(TaskDispatcher::new(
            pipeline,
            Arc::clone(&retry_coordinator),
        ));
        let state_listener = Arc::new(StateListener::new(
            Arc::clone(&dispatcher),
            Arc::clone(&task_repo),
            task_locks.clone(),
        ));
        let scheduler = Arc::new(TaskSchedulerLoop::new(
            Arc::clone(&task_repo),
            Arc::clone(&dispatcher) as _,
            task_locks.clone(),
        ));

        Ok(Self {
            registry,
            load_balancer,
            dispatcher,
            retry_coordinator,
            state_listener,
            scheduler,
            task_repo,
            task_locks,
        })
    }

    /// 停止调度循环并取消退避中的重试
    pub async fn shutdown(&self) {
        if self.scheduler.is_running().await {
            self.scheduler.stop().await;
        }
        self.retry_coordinator.shutdown();
    }
}
