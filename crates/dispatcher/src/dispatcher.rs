use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use metrics::counter;
use tracing::{debug, info, warn};
use uuid::Uuid;

use cronmesh_core::{
    models::{ScheduledTask, TaskExecutionResult},
    traits::{CompletionCallback, TaskExecutor, TaskSender},
    SchedulerError, SchedulerResult, StructuredLogger,
};

use crate::{
    load_balancer::LoadBalancer,
    retry_service::{RetryCoordinator, RetryOutcome},
};

/// 一次分发尝试：选择节点并发送
///
/// 重试协调器只依赖这个能力，不直接依赖分发器本身。
#[async_trait]
pub trait DispatchAttempt: Send + Sync {
    /// 成功时返回接收任务的节点地址；发送失败返回 `DispatchFailed`
    async fn attempt(&self, task: &ScheduledTask, excluded: Option<&str>)
        -> SchedulerResult<String>;
}

/// 已被发送失败结算的记录保留时长，超时后迟到的上报按普通上报处理
const SETTLED_ATTEMPT_TTL: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AttemptState {
    /// 已选中节点，等待发送结果或终态上报
    Open,
    /// 发送失败，驱逐、回退负载和重试已由分发路径完成
    FailedAtDispatch,
}

/// 分发尝试台账
///
/// Worker拒绝任务时既返回错误响应又上报失败结果，两个信号的先后不确定。
/// 每次尝试只结算一次：先到的一方负责回退负载和重试，后到的一方跳过。
#[derive(Debug, Default)]
pub struct AttemptLedger {
    attempts: DashMap<(Uuid, String), AttemptEntry>,
}

#[derive(Debug, Clone, Copy)]
struct AttemptEntry {
    token: Uuid,
    state: AttemptState,
    since: Instant,
}

impl AttemptLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记一次尝试，返回区分同一任务同一节点先后尝试的令牌
    fn open(&self, task_id: Uuid, node: &str) -> Uuid {
        let token = Uuid::new_v4();
        self.attempts.insert(
            (task_id, node.to_string()),
            AttemptEntry {
                token,
                state: AttemptState::Open,
                since: Instant::now(),
            },
        );
        token
    }

    /// 发送失败时结算；返回 false 表示终态上报已先结算了这次尝试
    fn settle_dispatch_failure(&self, task_id: Uuid, node: &str, token: Uuid) -> bool {
        self.prune();
        match self.attempts.get_mut(&(task_id, node.to_string())) {
            Some(mut entry) if entry.token == token => {
                entry.state = AttemptState::FailedAtDispatch;
                entry.since = Instant::now();
                true
            }
            // 记录已被上报移除，或已被之后的尝试覆盖
            _ => false,
        }
    }

    /// 终态上报时结算；返回 false 表示这次尝试已在发送失败时处理过
    pub fn settle_report(&self, task_id: Uuid, node: &str) -> bool {
        !matches!(
            self.attempts.remove(&(task_id, node.to_string())),
            Some((_, entry)) if entry.state == AttemptState::FailedAtDispatch
        )
    }

    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }

    fn prune(&self) {
        self.attempts
            .retain(|_, entry| entry.since.elapsed() < SETTLED_ATTEMPT_TTL);
    }
}

/// 分发管道：负载均衡选择节点 → 网络发送
///
/// 发送失败时认为节点不可达：从注册表驱逐并回退其负载计数。
pub struct DispatchPipeline {
    load_balancer: Arc<LoadBalancer>,
    sender: Arc<dyn TaskSender>,
    ledger: Arc<AttemptLedger>,
}

impl DispatchPipeline {
    pub fn new(load_balancer: Arc<LoadBalancer>, sender: Arc<dyn TaskSender>) -> Self {
        Self {
            load_balancer,
            sender,
            ledger: Arc::new(AttemptLedger::new()),
        }
    }

    pub fn load_balancer(&self) -> &Arc<LoadBalancer> {
        &self.load_balancer
    }

    pub fn ledger(&self) -> &Arc<AttemptLedger> {
        &self.ledger
    }
}

#[async_trait]
impl DispatchAttempt for DispatchPipeline {
    async fn attempt(
        &self,
        task: &ScheduledTask,
        excluded: Option<&str>,
    ) -> SchedulerResult<String> {
        let node = self
            .load_balancer
            .select_node_excluding(task, excluded)
            .await?;
        counter!("cronmesh_dispatch_total").increment(1);
        let token = self.ledger.open(task.id, &node);

        match self.sender.send_task(&node, task).await {
            Ok(()) => {
                StructuredLogger::log_task_dispatched(task.id, &task.name, &node);
                Ok(node)
            }
            Err(e) => {
                if !self.ledger.settle_dispatch_failure(task.id, &node, token) {
                    info!(
                        "任务 {} 发送到节点 {} 返回错误，但失败上报已先行处理: {}",
                        task.id, node, e
                    );
                    return Ok(node);
                }
                counter!("cronmesh_dispatch_failures_total").increment(1);
                let message = e.to_string();
                StructuredLogger::log_node_evicted(&node, task.id, &message);
                self.load_balancer.registry().remove_node(&node);
                self.load_balancer.decrease_load(&node).await?;
                Err(SchedulerError::DispatchFailed { node, message })
            }
        }
    }
}

/// 分发结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// 首次发送成功
    Dispatched { node: String },
    /// 首次发送失败，交给重试协调器后的结果
    Retried(RetryOutcome),
}

/// 任务分发器
///
/// 分布式模式下的执行能力：发送失败时驱逐节点并交给重试协调器，
/// 成功发送后等待Worker通过状态上报完成执行回调。
pub struct TaskDispatcher {
    pipeline: Arc<DispatchPipeline>,
    retry_coordinator: Arc<RetryCoordinator>,
    pending: Mutex<HashMap<Uuid, CompletionCallback>>,
}

impl TaskDispatcher {
    pub fn new(pipeline: Arc<DispatchPipeline>, retry_coordinator: Arc<RetryCoordinator>) -> Self {
        Self {
            pipeline,
            retry_coordinator,
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub fn load_balancer(&self) -> &Arc<LoadBalancer> {
        self.pipeline.load_balancer()
    }

    pub fn attempt_ledger(&self) -> &Arc<AttemptLedger> {
        self.pipeline.ledger()
    }

    pub fn retry_coordinator(&self) -> &Arc<RetryCoordinator> {
        &self.retry_coordinator
    }

    /// 分发任务；发送失败时在返回前完成驱逐和重试
    pub async fn dispatch(&self, task: &ScheduledTask) -> SchedulerResult<DispatchOutcome> {
        match self.pipeline.attempt(task, None).await {
            Ok(node) => Ok(DispatchOutcome::Dispatched { node }),
            Err(SchedulerError::DispatchFailed { node, message }) => {
                warn!(
                    "任务 {} 分发到节点 {} 失败，进入重试: {}",
                    task.id, node, message
                );
                let outcome = self
                    .retry_coordinator
                    .retry_task(task.id, Some(&node))
                    .await?;
                Ok(DispatchOutcome::Retried(outcome))
            }
            Err(e) => Err(e),
        }
    }

    /// 取出并调用等待中的完成回调，没有回调时返回 false
    pub fn complete(&self, result: TaskExecutionResult) -> bool {
        let callback = self.take_callback(result.task_id);
        match callback {
            Some(callback) => {
                debug!("任务 {} 执行结束，调用完成回调", result.task_id);
                callback(result);
                true
            }
            None => false,
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn take_callback(&self, task_id: Uuid) -> Option<CompletionCallback> {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&task_id)
    }

    fn register_callback(&self, task_id: Uuid, callback: CompletionCallback) {
        let replaced = self
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(task_id, callback)
            .is_some();
        if replaced {
            warn!("任务 {} 已有未完成的执行，旧的完成回调被替换", task_id);
        }
    }
}

#[async_trait]
impl TaskExecutor for TaskDispatcher {
    async fn execute(
        &self,
        task: ScheduledTask,
        on_completed: Option<CompletionCallback>,
    ) -> SchedulerResult<()> {
        if let Some(callback) = on_completed {
            self.register_callback(task.id, callback);
        }

        match self.dispatch(&task).await {
            Ok(DispatchOutcome::Dispatched { node })
            | Ok(DispatchOutcome::Retried(RetryOutcome::Dispatched { node, .. })) => {
                debug!("任务 {} 已交给节点 {}，等待状态上报", task.id, node);
                Ok(())
            }
            Ok(DispatchOutcome::Retried(outcome)) => {
                info!("任务 {} 未能分发: {:?}", task.id, outcome);
                let result = TaskExecutionResult::running(task.id, "")
                    .fail(format!("任务分发失败: {outcome:?}"), None);
                self.complete(result);
                Ok(())
            }
            Err(e) => {
                self.take_callback(task.id);
                Err(e)
            }
        }
    }
}

/// 基于HTTP的任务发送器，POST `{node}/api/task/execute`
pub struct HttpTaskSender {
    http_client: reqwest::Client,
}

impl HttpTaskSender {
    pub fn new(request_timeout: Duration) -> SchedulerResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| SchedulerError::Network(format!("创建HTTP客户端失败: {e}")))?;
        Ok(Self { http_client })
    }
}

#[async_trait]
impl TaskSender for HttpTaskSender {
    async fn send_task(&self, node_address: &str, task: &ScheduledTask) -> SchedulerResult<()> {
        let url = format!("{}/api/task/execute", node_address.trim_end_matches('/'));

        let response = self
            .http_client
            .post(&url)
            .json(task)
            .send()
            .await
            .map_err(|e| SchedulerError::Network(format!("连接节点 {node_address} 失败: {e}")))?;

        if response.status().is_success() {
            debug!("任务 {} 已发送到 {}", task.id, url);
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(SchedulerError::Network(format!(
                "节点 {node_address} 返回 HTTP {status}: {body}"
            )))
        }
    }
}
