use std::sync::Arc;

use tracing::{debug, error, info, warn};

use cronmesh_core::{
    models::{ExecutionStatus, TaskExecutionResult},
    traits::TaskRepository,
    DagStatus, SchedulerError, SchedulerResult, StructuredLogger, TaskLocks,
};

use crate::{
    dispatcher::TaskDispatcher,
    load_balancer::LoadBalancer,
    retry_service::{RetryCoordinator, RetryOutcome},
};

/// 协调节点侧的上报通道消费者
///
/// 处理Worker的注册、心跳和执行结果上报：执行结束时回退节点负载，
/// 失败时按重试策略重新分发，最终结果通过分发器交给等待中的完成回调。
pub struct StateListener {
    load_balancer: Arc<LoadBalancer>,
    retry_coordinator: Arc<RetryCoordinator>,
    dispatcher: Arc<TaskDispatcher>,
    task_repo: Arc<dyn TaskRepository>,
    task_locks: TaskLocks,
}

impl StateListener {
    pub fn new(
        dispatcher: Arc<TaskDispatcher>,
        task_repo: Arc<dyn TaskRepository>,
        task_locks: TaskLocks,
    ) -> Self {
        Self {
            load_balancer: Arc::clone(dispatcher.load_balancer()),
            retry_coordinator: Arc::clone(dispatcher.retry_coordinator()),
            dispatcher,
            task_repo,
            task_locks,
        }
    }

    /// Worker注册
    pub async fn handle_register(&self, address: &str) -> SchedulerResult<()> {
        self.load_balancer.add_node(address).await?;
        info!("Worker {} 已注册", address.trim());
        Ok(())
    }

    /// Worker心跳，未知节点会被重新注册
    pub async fn handle_heartbeat(&self, address: &str) -> SchedulerResult<()> {
        self.load_balancer.registry().heartbeat(address)
    }

    /// 处理一次执行结果上报
    pub async fn handle_status(&self, result: TaskExecutionResult) -> SchedulerResult<()> {
        if result.task_id.is_nil() {
            return Err(SchedulerError::invalid_argument("上报结果缺少任务ID"));
        }

        StructuredLogger::log_status_report(
            result.task_id,
            &result.worker_address,
            &format!("{:?}", result.status),
            result.error_message.as_deref(),
        );

        if !result.status.is_finished() {
            debug!("任务 {} 状态为 {:?}，无需处理", result.task_id, result.status);
            return Ok(());
        }

        if !self
            .dispatcher
            .attempt_ledger()
            .settle_report(result.task_id, &result.worker_address)
        {
            info!(
                "任务 {} 在 {} 的失败已在分发时处理，忽略本次上报",
                result.task_id, result.worker_address
            );
            return Ok(());
        }

        if !result.worker_address.trim().is_empty() {
            self.load_balancer
                .decrease_load(&result.worker_address)
                .await?;
        }

        match result.status {
            ExecutionStatus::Completed => self.on_completed(result).await,
            _ => self.on_failed(result).await,
        }
    }

    async fn on_completed(&self, result: TaskExecutionResult) -> SchedulerResult<()> {
        {
            let _guard = self.task_locks.lock(result.task_id).await;
            if let Some(mut task) = self.task_repo.get_task(result.task_id).await? {
                task.reset_retry_state();
                if task.is_dag_participating() {
                    task.dag_status = DagStatus::Completed;
                } else if task.reactivate() {
                    info!("任务 {} 执行成功，清除失败状态", task.name);
                }
                task.touch();
                self.task_repo.update_task(&task).await?;
            }
        }

        info!(
            "任务 {} 在 {} 执行成功",
            result.task_id, result.worker_address
        );
        self.dispatcher.complete(result);
        Ok(())
    }

    async fn on_failed(&self, result: TaskExecutionResult) -> SchedulerResult<()> {
        let task = self.task_repo.get_task(result.task_id).await?;
        let Some(task) = task else {
            warn!("收到未知任务 {} 的失败上报", result.task_id);
            self.dispatcher.complete(result);
            return Ok(());
        };

        if !task.retry_policy.enable_retry {
            {
                let _guard = self.task_locks.lock(task.id).await;
                if let Some(mut task) = self.task_repo.get_task(task.id).await? {
                    task.mark_failed();
                    self.task_repo.update_task(&task).await?;
                }
            }
            warn!("任务 {} 执行失败且未启用重试", task.name);
            self.dispatcher.complete(result);
            return Ok(());
        }

        let failed_node = Some(result.worker_address.trim()).filter(|node| !node.is_empty());
        let outcome = self.retry_coordinator.retry_task(task.id, failed_node).await;
        match outcome {
            Ok(RetryOutcome::Dispatched { node, attempt }) => {
                debug!("任务 {} 第 {} 次重试已发送到 {}", task.name, attempt, node);
                Ok(())
            }
            Ok(outcome) => {
                warn!("任务 {} 不再重试: {:?}", task.name, outcome);
                self.dispatcher.complete(result);
                Ok(())
            }
            Err(e) => {
                error!("任务 {} 重试失败: {}", task.name, e);
                self.dispatcher.complete(result);
                Err(e)
            }
        }
    }
}
