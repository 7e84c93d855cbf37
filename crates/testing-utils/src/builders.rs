//! Test data builders for creating test entities

use chrono::{DateTime, Utc};
use cronmesh_core::models::{
    DagStatus, RetryPolicy, RetryStrategy, ScheduledTask, TaskExecutionResult,
};
use uuid::Uuid;

/// Builder for creating test ScheduledTask entities
///
/// 默认任务立即到期、每5秒执行一次、关闭重试。
pub struct ScheduledTaskBuilder {
    task: ScheduledTask,
}

impl ScheduledTaskBuilder {
    pub fn new() -> Self {
        let mut task = ScheduledTask::new("test_task", "*/5 * * * * *", "shell");
        task.retry_policy = RetryPolicy::disabled();
        task.timeout_seconds = 30;
        Self { task }
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.task.id = id;
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.task.name = name.to_string();
        self
    }

    pub fn with_schedule(mut self, schedule: &str) -> Self {
        self.task.schedule = schedule.to_string();
        self
    }

    pub fn with_task_type(mut self, task_type: &str) -> Self {
        self.task.task_type = task_type.to_string();
        self
    }

    pub fn with_parameters(mut self, parameters: serde_json::Value) -> Self {
        self.task.parameters = parameters;
        self
    }

    pub fn with_next_run_time(mut self, next_run_time: DateTime<Utc>) -> Self {
        self.task.next_run_time = next_run_time;
        self
    }

    pub fn with_timeout(mut self, timeout_seconds: u64) -> Self {
        self.task.timeout_seconds = timeout_seconds;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.task.enabled = false;
        self
    }

    pub fn with_retry(
        mut self,
        strategy: RetryStrategy,
        max_retry_count: u32,
        interval_seconds: u64,
    ) -> Self {
        self.task.retry_policy = RetryPolicy {
            enable_retry: true,
            max_retry_count,
            retry_interval_seconds: interval_seconds,
            retry_strategy: strategy,
        };
        self
    }

    pub fn with_successors(mut self, successors: Vec<Uuid>) -> Self {
        self.task.successor_ids = successors;
        self
    }

    pub fn with_dag_status(mut self, status: DagStatus) -> Self {
        self.task.dag_status = status;
        self
    }

    pub fn without_parallel_execution(mut self) -> Self {
        self.task.allow_parallel_execution = false;
        self
    }

    pub fn build(self) -> ScheduledTask {
        self.task
    }
}

impl Default for ScheduledTaskBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// 构造上报结果
pub fn completed_result(task_id: Uuid, worker: &str) -> TaskExecutionResult {
    TaskExecutionResult::running(task_id, worker).complete()
}

pub fn failed_result(task_id: Uuid, worker: &str, message: &str) -> TaskExecutionResult {
    TaskExecutionResult::running(task_id, worker).fail(message.to_string(), None)
}
