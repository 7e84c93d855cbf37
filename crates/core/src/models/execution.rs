use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 单次执行的状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ExecutionStatus {
    #[serde(rename = "RUNNING")]
    Running,
    #[serde(rename = "COMPLETED")]
    Completed,
    #[serde(rename = "FAILED")]
    Failed,
    #[serde(rename = "RETRYING")]
    Retrying,
}

impl ExecutionStatus {
    /// 本次尝试是否已经结束（负载计数需要回退）
    pub fn is_finished(&self) -> bool {
        matches!(self, ExecutionStatus::Completed | ExecutionStatus::Failed)
    }
}

/// 任务执行结果
///
/// 由执行方在开始时创建，完成或失败时定稿，每次尝试向协调节点上报一次。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskExecutionResult {
    pub task_id: Uuid,
    pub status: ExecutionStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub success: bool,
    pub error_message: Option<String>,
    pub stack_trace: Option<String>,
    pub worker_address: String,
}

impl TaskExecutionResult {
    /// 开始执行时创建的运行中结果
    pub fn running(task_id: Uuid, worker_address: &str) -> Self {
        Self {
            task_id,
            status: ExecutionStatus::Running,
            start_time: Utc::now(),
            end_time: None,
            success: false,
            error_message: None,
            stack_trace: None,
            worker_address: worker_address.to_string(),
        }
    }

    pub fn complete(mut self) -> Self {
        self.status = ExecutionStatus::Completed;
        self.success = true;
        self.end_time = Some(Utc::now());
        self
    }

    pub fn fail(mut self, error_message: String, stack_trace: Option<String>) -> Self {
        self.status = ExecutionStatus::Failed;
        self.success = false;
        self.error_message = Some(error_message);
        self.stack_trace = stack_trace;
        self.end_time = Some(Utc::now());
        self
    }

    /// 执行耗时（毫秒），未结束时为 None
    pub fn duration_ms(&self) -> Option<i64> {
        self.end_time
            .map(|end| (end - self.start_time).num_milliseconds())
    }
}
