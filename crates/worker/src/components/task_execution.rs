use std::collections::HashSet;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use cronmesh_core::{
    models::{ScheduledTask, TaskExecutionResult},
    traits::{CompletionCallback, TaskExecutor},
    SchedulerError, SchedulerResult,
};

use crate::executor_factory::JobHandlerRegistry;

/// 执行结果的上报通道
#[async_trait]
pub trait StatusReporter: Send + Sync {
    async fn report(&self, result: &TaskExecutionResult) -> SchedulerResult<()>;
}

/// 只写日志的上报通道，单进程模式使用
#[derive(Debug, Default)]
pub struct LoggingStatusReporter;

#[async_trait]
impl StatusReporter for LoggingStatusReporter {
    async fn report(&self, result: &TaskExecutionResult) -> SchedulerResult<()> {
        info!(
            task_id = %result.task_id,
            status = ?result.status,
            duration_ms = ?result.duration_ms(),
            error = ?result.error_message,
            "任务执行结束"
        );
        Ok(())
    }
}

/// Worker侧的任务执行服务
///
/// 按任务类型找到处理器，在任务的超时预算内执行，生成执行结果并上报。
pub struct TaskExecutionService {
    worker_address: String,
    registry: Arc<JobHandlerRegistry>,
    reporter: Arc<dyn StatusReporter>,
    running_tasks: Arc<RwLock<HashSet<Uuid>>>,
}

impl TaskExecutionService {
    pub fn new(
        worker_address: &str,
        registry: Arc<JobHandlerRegistry>,
        reporter: Arc<dyn StatusReporter>,
    ) -> Self {
        Self {
            worker_address: worker_address.to_string(),
            registry,
            reporter,
            running_tasks: Arc::new(RwLock::new(HashSet::new())),
        }
    }

    pub fn worker_address(&self) -> &str {
        &self.worker_address
    }

    pub fn registry(&self) -> &Arc<JobHandlerRegistry> {
        &self.registry
    }

    pub async fn get_current_task_count(&self) -> usize {
        self.running_tasks.read().await.len()
    }

    pub async fn is_running(&self, task_id: Uuid) -> bool {
        self.running_tasks.read().await.contains(&task_id)
    }

    /// 执行任务并返回结果，不上报
    pub async fn run_task(&self, task: &ScheduledTask) -> TaskExecutionResult {
        let result = TaskExecutionResult::running(task.id, &self.worker_address);

        let Some(handler) = self.registry.get(&task.task_type).await else {
            warn!("没有任务类型 {} 的处理器", task.task_type);
            return result.fail(format!("不支持的任务类型: {}", task.task_type), None);
        };

        self.running_tasks.write().await.insert(task.id);
        debug!(
            "任务 {} 开始执行，处理器 {}，超时 {}s",
            task.id,
            handler.name(),
            task.timeout_seconds
        );

        let budget = Duration::from_secs(task.timeout_seconds);
        let outcome = match tokio::time::timeout(budget, handler.execute(task)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(SchedulerError::ExecutionTimeout),
        };

        self.running_tasks.write().await.remove(&task.id);

        match outcome {
            Ok(output) => {
                info!("任务 {} ({}) 执行成功", task.name, task.id);
                if !output.is_empty() {
                    debug!("任务 {} 输出: {}", task.id, output);
                }
                result.complete()
            }
            Err(e) => {
                error!("任务 {} ({}) 执行失败: {}", task.name, task.id, e);
                result.fail(e.to_string(), Some(error_chain(&e)))
            }
        }
    }

    /// 接收协调节点发来的任务
    ///
    /// 没有对应处理器时立即上报失败并返回错误；否则在后台执行并上报结果。
    pub async fn accept(self: &Arc<Self>, task: ScheduledTask) -> SchedulerResult<()> {
        if !self.registry.contains(&task.task_type).await {
            let message = format!("不支持的任务类型: {}", task.task_type);
            let result = TaskExecutionResult::running(task.id, &self.worker_address)
                .fail(message.clone(), None);
            if let Err(e) = self.reporter.report(&result).await {
                warn!("上报任务 {} 的失败结果出错: {}", task.id, e);
            }
            return Err(SchedulerError::TaskExecution(message));
        }

        let service = Arc::clone(self);
        tokio::spawn(async move {
            let result = service.run_task(&task).await;
            if let Err(e) = service.reporter.report(&result).await {
                error!("上报任务 {} 的执行结果失败: {}", task.id, e);
            }
        });
        Ok(())
    }
}

/// 单进程模式下作为调度循环的执行能力
#[async_trait]
impl TaskExecutor for TaskExecutionService {
    async fn execute(
        &self,
        task: ScheduledTask,
        on_completed: Option<CompletionCallback>,
    ) -> SchedulerResult<()> {
        let result = self.run_task(&task).await;
        if let Err(e) = self.reporter.report(&result).await {
            warn!("上报任务 {} 的执行结果失败: {}", task.id, e);
        }
        if let Some(callback) = on_completed {
            callback(result);
        }
        Ok(())
    }
}

/// 把错误及其来源链展开为多行文本
fn error_chain(err: &dyn Error) -> String {
    let mut lines = vec![err.to_string()];
    let mut source = err.source();
    while let Some(cause) = source {
        lines.push(format!("caused by: {cause}"));
        source = cause.source();
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executors::JobHandler;
    use cronmesh_core::ExecutionStatus;
    use cronmesh_testing_utils::{ScheduledTaskBuilder, TestEnv};
    use std::sync::Mutex;

    #[derive(Default)]
    struct CollectingReporter {
        results: Mutex<Vec<TaskExecutionResult>>,
    }

    impl CollectingReporter {
        fn results(&self) -> Vec<TaskExecutionResult> {
            self.results.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl StatusReporter for CollectingReporter {
        async fn report(&self, result: &TaskExecutionResult) -> SchedulerResult<()> {
            self.results.lock().unwrap().push(result.clone());
            Ok(())
        }
    }

    struct SleepyHandler;

    #[async_trait]
    impl JobHandler for SleepyHandler {
        fn name(&self) -> &str {
            "sleepy"
        }

        fn supported_task_types(&self) -> Vec<String> {
            vec!["sleepy".to_string()]
        }

        async fn execute(&self, task: &ScheduledTask) -> SchedulerResult<String> {
            let seconds = task.parameters["sleep"].as_u64().unwrap_or(0);
            tokio::time::sleep(Duration::from_secs(seconds)).await;
            if task.parameters["fail"].as_bool().unwrap_or(false) {
                return Err(SchedulerError::TaskExecution("exit code 1".to_string()));
            }
            Ok("done".to_string())
        }
    }

    async fn service() -> (Arc<TaskExecutionService>, Arc<CollectingReporter>) {
        let registry = Arc::new(JobHandlerRegistry::new());
        registry.register(Arc::new(SleepyHandler)).await;
        let reporter = Arc::new(CollectingReporter::default());
        let service = Arc::new(TaskExecutionService::new(
            "http://worker-1:9090",
            registry,
            Arc::clone(&reporter) as Arc<dyn StatusReporter>,
        ));
        (service, reporter)
    }

    #[tokio::test]
    async fn test_run_task_success() {
        let (service, _) = service().await;
        let task = ScheduledTaskBuilder::new().with_task_type("sleepy").build();

        let result = service.run_task(&task).await;
        assert_eq!(result.status, ExecutionStatus::Completed);
        assert_eq!(result.worker_address, "http://worker-1:9090");
        assert!(result.end_time.is_some());
        assert_eq!(service.get_current_task_count().await, 0);
    }

    #[tokio::test]
    async fn test_run_task_failure_carries_message_and_trace() {
        let (service, _) = service().await;
        let task = ScheduledTaskBuilder::new()
            .with_task_type("sleepy")
            .with_parameters(serde_json::json!({"fail": true}))
            .build();

        let result = service.run_task(&task).await;
        assert_eq!(result.status, ExecutionStatus::Failed);
        assert!(result.error_message.unwrap().contains("exit code 1"));
        assert!(result.stack_trace.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_task_times_out() {
        let (service, _) = service().await;
        let task = ScheduledTaskBuilder::new()
            .with_task_type("sleepy")
            .with_timeout(2)
            .with_parameters(serde_json::json!({"sleep": 60}))
            .build();

        let result = service.run_task(&task).await;
        assert_eq!(result.status, ExecutionStatus::Failed);
        assert_eq!(
            result.error_message.as_deref(),
            Some(SchedulerError::ExecutionTimeout.to_string().as_str())
        );
        assert!(!service.is_running(task.id).await);
    }

    #[tokio::test]
    async fn test_unknown_task_type_reported_as_failure() {
        let (service, reporter) = service().await;
        let task = ScheduledTaskBuilder::new().with_task_type("gpu").build();

        let result = service.accept(task.clone()).await;
        assert!(matches!(result, Err(SchedulerError::TaskExecution(_))));

        let reported = reporter.results();
        assert_eq!(reported.len(), 1);
        assert_eq!(reported[0].task_id, task.id);
        assert_eq!(reported[0].status, ExecutionStatus::Failed);
    }

    #[tokio::test]
    async fn test_accept_runs_in_background_and_reports() {
        let (service, reporter) = service().await;
        let task = ScheduledTaskBuilder::new().with_task_type("sleepy").build();

        service.accept(task.clone()).await.unwrap();

        let reported = TestEnv::wait_for(
            || {
                let count = reporter.results().len();
                async move { count == 1 }
            },
            Duration::from_secs(5),
        )
        .await;
        assert!(reported);
        assert_eq!(reporter.results()[0].status, ExecutionStatus::Completed);
    }

    #[tokio::test]
    async fn test_executor_invokes_callback() {
        let (service, reporter) = service().await;
        let task = ScheduledTaskBuilder::new().with_task_type("sleepy").build();

        let (tx, rx) = tokio::sync::oneshot::channel();
        let callback: CompletionCallback = Box::new(move |result| {
            let _ = tx.send(result);
        });
        service.execute(task.clone(), Some(callback)).await.unwrap();

        let result = rx.await.unwrap();
        assert_eq!(result.task_id, task.id);
        assert!(result.success);
        assert_eq!(reporter.results().len(), 1);
    }

    #[test]
    fn test_error_chain_includes_sources() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        let err = serde_json::Error::io(io);
        let chain = error_chain(&err);
        assert!(chain.contains("disk full"));
    }
}
