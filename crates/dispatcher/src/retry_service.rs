use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use metrics::counter;
use tokio::sync::watch;
use tracing::{info, warn};
use uuid::Uuid;

use cronmesh_core::{
    models::{RetryPolicy, RetryStrategy},
    traits::TaskRepository,
    SchedulerError, SchedulerResult, StructuredLogger, TaskLocks, MAX_BACKOFF_LIMIT_SECONDS,
};

use crate::dispatcher::DispatchAttempt;

/// 重试策略配置
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// 最大重试间隔（秒）
    pub max_backoff_seconds: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_backoff_seconds: 3600, // 1小时
        }
    }
}

impl RetryConfig {
    /// 第 `attempt` 次重试（从1开始）前的等待时长
    ///
    /// 上限取 `max_backoff_seconds` 与 `MAX_BACKOFF_LIMIT_SECONDS` 中较小者。
    ///
    /// - Fixed: interval
    /// - Linear: interval × attempt
    /// - Exponential: interval × 2^attempt
    pub fn backoff(&self, policy: &RetryPolicy, attempt: u32) -> Duration {
        let interval = policy.retry_interval_seconds;
        let seconds = match policy.retry_strategy {
            RetryStrategy::Fixed => interval,
            RetryStrategy::Linear => interval.saturating_mul(attempt as u64),
            RetryStrategy::Exponential => 2u64
                .checked_pow(attempt)
                .map(|factor| interval.saturating_mul(factor))
                .unwrap_or(u64::MAX),
        };
        let cap = self.max_backoff_seconds.min(MAX_BACKOFF_LIMIT_SECONDS);
        Duration::from_secs(seconds.min(cap))
    }
}

/// 重试结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome {
    /// 第 `attempt` 次重试发送成功
    Dispatched { node: String, attempt: u32 },
    /// 重试次数已用尽，任务被标记为失败
    Exhausted { attempts: u32 },
    /// 等待退避期间收到停止信号
    Cancelled,
}

/// 重试协调器
///
/// 按任务的重试策略退避后重新分发，尽量避开失败的节点。
/// 重试簿记（`current_retry_count`、`next_retry_time`）在任务锁内读改写，
/// 与调度循环对同一任务的修改互斥。
pub struct RetryCoordinator {
    task_repo: Arc<dyn TaskRepository>,
    dispatch: Arc<dyn DispatchAttempt>,
    task_locks: TaskLocks,
    config: RetryConfig,
    shutdown_tx: watch::Sender<bool>,
}

impl RetryCoordinator {
    pub fn new(
        task_repo: Arc<dyn TaskRepository>,
        dispatch: Arc<dyn DispatchAttempt>,
        task_locks: TaskLocks,
        config: RetryConfig,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            task_repo,
            dispatch,
            task_locks,
            config,
            shutdown_tx,
        }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// 取消所有正在退避等待的重试
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// 重试任务直到发送成功、次数用尽或被取消
    ///
    /// 发送失败的节点已被驱逐，下一次尝试会避开它；没有可用节点同样消耗一次重试。
    pub async fn retry_task(
        &self,
        task_id: Uuid,
        excluded_node: Option<&str>,
    ) -> SchedulerResult<RetryOutcome> {
        let mut excluded = excluded_node.map(str::to_string);

        loop {
            let (task, delay) = {
                let _guard = self.task_locks.lock(task_id).await;
                let mut task = self
                    .task_repo
                    .get_task(task_id)
                    .await?
                    .ok_or(SchedulerError::TaskNotFound { id: task_id })?;

                if !task.can_retry() {
                    let attempts = task.current_retry_count;
                    task.mark_failed();
                    self.task_repo.update_task(&task).await?;
                    counter!("cronmesh_retry_exhausted_total").increment(1);
                    StructuredLogger::log_retry_exhausted(task.id, &task.name, attempts);
                    return Ok(RetryOutcome::Exhausted { attempts });
                }

                task.current_retry_count += 1;
                let delay = self
                    .config
                    .backoff(&task.retry_policy, task.current_retry_count);
                let now = Utc::now();
                let next_retry_time = chrono::Duration::from_std(delay)
                    .ok()
                    .and_then(|delay| now.checked_add_signed(delay))
                    .unwrap_or(now);
                task.next_retry_time = Some(next_retry_time);
                task.touch();
                self.task_repo.update_task(&task).await?;

                StructuredLogger::log_retry_scheduled(
                    task.id,
                    &task.name,
                    task.current_retry_count,
                    task.retry_policy.max_retry_count,
                    next_retry_time,
                );
                (task, delay)
            };

            counter!("cronmesh_retries_total").increment(1);

            if !self.wait(delay).await {
                info!("任务 {} 的重试在退避等待中被取消", task_id);
                return Ok(RetryOutcome::Cancelled);
            }

            match self.dispatch.attempt(&task, excluded.as_deref()).await {
                Ok(node) => {
                    info!(
                        "任务 {} 第 {} 次重试已发送到节点 {}",
                        task.id, task.current_retry_count, node
                    );
                    return Ok(RetryOutcome::Dispatched {
                        node,
                        attempt: task.current_retry_count,
                    });
                }
                Err(SchedulerError::DispatchFailed { node, message }) => {
                    warn!(
                        "任务 {} 第 {} 次重试发送到节点 {} 失败: {}",
                        task.id, task.current_retry_count, node, message
                    );
                    excluded = Some(node);
                }
                Err(SchedulerError::NoNodesAvailable) => {
                    warn!(
                        "任务 {} 第 {} 次重试时没有可用节点",
                        task.id, task.current_retry_count
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// 等待退避时间，收到停止信号时返回 false
    async fn wait(&self, delay: Duration) -> bool {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        if *shutdown_rx.borrow_and_update() {
            return false;
        }
        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            _ = shutdown_rx.changed() => false,
        }
    }
}
