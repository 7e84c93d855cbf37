use serde::{Deserialize, Serialize};

use crate::models::{RetryPolicy, ScheduledTask};

/// 配置文件中预置的任务（`[[tasks]]`）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSeed {
    pub name: String,
    pub schedule: String,
    pub task_type: String,
    #[serde(default)]
    pub parameters: serde_json::Value,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub retry_policy: Option<RetryPolicy>,
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    #[serde(default)]
    pub priority: i32,
}

fn default_enabled() -> bool {
    true
}

impl TaskSeed {
    pub fn into_task(self) -> ScheduledTask {
        let mut task = ScheduledTask::new(&self.name, &self.schedule, &self.task_type);
        task.parameters = self.parameters;
        task.enabled = self.enabled;
        task.priority = self.priority;
        if let Some(policy) = self.retry_policy {
            task.retry_policy = policy;
        }
        if let Some(timeout) = self.timeout_seconds {
            task.timeout_seconds = timeout;
        }
        task
    }
}
