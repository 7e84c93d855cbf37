use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 调度任务定义
///
/// 表示协调节点持有的一个Cron任务，包含调度、重试和DAG编排所需的全部字段。
///
/// # 字段说明
///
/// - `id`: 任务的唯一标识符
/// - `schedule`: cron 表达式，支持5字段标准格式和 `*/N` 秒级扩展
/// - `next_run_time`: 下次执行时间（UTC），仅由调度循环和重试协调器修改
/// - `task_type` / `parameters`: 交给Worker的任务类型标签和不透明参数
/// - `retry_policy`: 重试策略
/// - `current_retry_count` / `next_retry_time`: 重试簿记
/// - `predecessor_ids` 至 `allow_parallel_execution`: DAG编排字段
///
/// # 使用示例
///
/// ```rust
/// use cronmesh_core::models::ScheduledTask;
///
/// let task = ScheduledTask::new("数据备份", "0 2 * * *", "shell");
/// assert!(task.enabled);
/// assert!(!task.is_dag_participating());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduledTask {
    pub id: Uuid,
    pub name: String,
    pub schedule: String,
    pub next_run_time: DateTime<Utc>,
    pub enabled: bool,
    pub task_type: String,
    #[serde(default)]
    pub parameters: serde_json::Value,
    #[serde(default)]
    pub retry_policy: RetryPolicy,
    pub timeout_seconds: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub current_retry_count: u32,
    #[serde(default)]
    pub next_retry_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub predecessor_ids: Vec<Uuid>,
    #[serde(default)]
    pub successor_ids: Vec<Uuid>,
    #[serde(default)]
    pub dag_status: DagStatus,
    #[serde(default)]
    pub completed_dependencies_count: u32,
    #[serde(default)]
    pub total_dependencies_count: u32,
    #[serde(default)]
    pub workflow_id: Option<Uuid>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_allow_parallel")]
    pub allow_parallel_execution: bool,
}

fn default_allow_parallel() -> bool {
    true
}

/// 重试策略
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryPolicy {
    pub enable_retry: bool,
    pub max_retry_count: u32,
    pub retry_interval_seconds: u64,
    pub retry_strategy: RetryStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            enable_retry: true,
            max_retry_count: 3,
            retry_interval_seconds: 60,
            retry_strategy: RetryStrategy::Fixed,
        }
    }
}

impl RetryPolicy {
    /// 关闭重试的策略
    pub fn disabled() -> Self {
        Self {
            enable_retry: false,
            max_retry_count: 0,
            ..Self::default()
        }
    }
}

/// 退避方式
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum RetryStrategy {
    #[default]
    #[serde(rename = "FIXED")]
    Fixed,
    #[serde(rename = "LINEAR")]
    Linear,
    #[serde(rename = "EXPONENTIAL")]
    Exponential,
}

/// DAG状态
///
/// `Waiting → Ready → Running → {Completed | Failed | Skipped}`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum DagStatus {
    #[default]
    #[serde(rename = "WAITING")]
    Waiting,
    #[serde(rename = "READY")]
    Ready,
    #[serde(rename = "RUNNING")]
    Running,
    #[serde(rename = "COMPLETED")]
    Completed,
    #[serde(rename = "FAILED")]
    Failed,
    #[serde(rename = "SKIPPED")]
    Skipped,
}

impl DagStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DagStatus::Completed | DagStatus::Failed | DagStatus::Skipped
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DagStatus::Waiting => "WAITING",
            DagStatus::Ready => "READY",
            DagStatus::Running => "RUNNING",
            DagStatus::Completed => "COMPLETED",
            DagStatus::Failed => "FAILED",
            DagStatus::Skipped => "SKIPPED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "WAITING" => Some(DagStatus::Waiting),
            "READY" => Some(DagStatus::Ready),
            "RUNNING" => Some(DagStatus::Running),
            "COMPLETED" => Some(DagStatus::Completed),
            "FAILED" => Some(DagStatus::Failed),
            "SKIPPED" => Some(DagStatus::Skipped),
            _ => None,
        }
    }
}

impl ScheduledTask {
    /// 创建新任务，下次执行时间为当前时间（即立即到期）
    pub fn new(name: &str, schedule: &str, task_type: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            schedule: schedule.to_string(),
            next_run_time: now,
            enabled: true,
            task_type: task_type.to_string(),
            parameters: serde_json::Value::Null,
            retry_policy: RetryPolicy::default(),
            timeout_seconds: 300, // 默认5分钟超时
            created_at: now,
            updated_at: now,
            current_retry_count: 0,
            next_retry_time: None,
            predecessor_ids: Vec::new(),
            successor_ids: Vec::new(),
            dag_status: DagStatus::Waiting,
            completed_dependencies_count: 0,
            total_dependencies_count: 0,
            workflow_id: None,
            priority: 0,
            allow_parallel_execution: true,
        }
    }

    /// 检查任务是否到期
    ///
    /// 重试用尽后处于 Failed 终态的任务不再到期，直到被重新激活。
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.enabled && !self.is_terminally_failed() && self.next_run_time <= now
    }

    pub fn is_terminally_failed(&self) -> bool {
        self.dag_status == DagStatus::Failed
    }

    /// 是否参与DAG编排
    pub fn is_dag_participating(&self) -> bool {
        !self.predecessor_ids.is_empty() || !self.successor_ids.is_empty()
    }

    /// 是否还能继续重试
    pub fn can_retry(&self) -> bool {
        self.retry_policy.enable_retry
            && self.current_retry_count < self.retry_policy.max_retry_count
    }

    /// 设置前置依赖，同步依赖计数
    pub fn set_predecessors(&mut self, predecessors: Vec<Uuid>) {
        self.total_dependencies_count = predecessors.len() as u32;
        self.completed_dependencies_count = self
            .completed_dependencies_count
            .min(self.total_dependencies_count);
        self.predecessor_ids = predecessors;
        self.refresh_dag_readiness();
    }

    /// 记录一个前置依赖完成；计数不会超过总数
    pub fn mark_dependency_completed(&mut self) {
        if self.completed_dependencies_count < self.total_dependencies_count {
            self.completed_dependencies_count += 1;
        }
        self.refresh_dag_readiness();
    }

    /// 所有依赖完成时由 Waiting 转为 Ready
    pub fn refresh_dag_readiness(&mut self) {
        if self.dag_status == DagStatus::Waiting
            && self.completed_dependencies_count == self.total_dependencies_count
        {
            self.dag_status = DagStatus::Ready;
        }
    }

    /// 标记为终态失败，之后不再自动重试
    pub fn mark_failed(&mut self) {
        self.dag_status = DagStatus::Failed;
        self.next_retry_time = None;
        self.touch();
    }

    /// 从 Failed 终态恢复：清空重试簿记，DAG状态回到 Waiting 并重新判断依赖
    ///
    /// 不处于终态失败时不做任何修改，返回 false。
    pub fn reactivate(&mut self) -> bool {
        if !self.is_terminally_failed() {
            return false;
        }
        self.dag_status = DagStatus::Waiting;
        self.refresh_dag_readiness();
        self.reset_retry_state();
        true
    }

    /// 一次新的调度周期开始，清空上一轮的重试簿记
    pub fn reset_retry_state(&mut self) {
        self.current_retry_count = 0;
        self.next_retry_time = None;
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
