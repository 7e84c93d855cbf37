use std::collections::HashMap;
use std::process::Stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info};

use cronmesh_core::{models::ScheduledTask, SchedulerError, SchedulerResult};

/// 执行一类任务的能力
///
/// 参数来自 `ScheduledTask::parameters`，对调度核心不透明，由处理器自行解析。
#[async_trait]
pub trait JobHandler: Send + Sync {
    fn name(&self) -> &str;

    fn supported_task_types(&self) -> Vec<String>;

    /// 执行任务，成功时返回输出文本
    async fn execute(&self, task: &ScheduledTask) -> SchedulerResult<String>;
}

/// Shell任务参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellTaskParams {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    pub working_dir: Option<String>,
    #[serde(default)]
    pub env_vars: HashMap<String, String>,
}

/// Shell任务处理器
///
/// 子进程随执行future一起被丢弃时会被终止，超时取消因此不会留下孤儿进程。
#[derive(Debug, Default)]
pub struct ShellJobHandler;

impl ShellJobHandler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl JobHandler for ShellJobHandler {
    fn name(&self) -> &str {
        "shell"
    }

    fn supported_task_types(&self) -> Vec<String> {
        vec!["shell".to_string()]
    }

    async fn execute(&self, task: &ScheduledTask) -> SchedulerResult<String> {
        let params: ShellTaskParams = serde_json::from_value(task.parameters.clone())
            .map_err(|e| SchedulerError::invalid_argument(format!("解析Shell任务参数失败: {e}")))?;

        info!(
            "执行Shell任务: task_id={}, command={}, args={:?}",
            task.id, params.command, params.args
        );

        let mut cmd = Command::new(&params.command);
        cmd.args(&params.args)
            .envs(&params.env_vars)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = &params.working_dir {
            cmd.current_dir(dir);
        }

        let output = cmd
            .output()
            .await
            .map_err(|e| SchedulerError::TaskExecution(format!("启动Shell命令失败: {e}")))?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim_end().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim_end().to_string();

        if output.status.success() {
            debug!("Shell任务 {} 执行成功", task.id);
            Ok(stdout)
        } else {
            let message = if stderr.is_empty() {
                format!("命令执行失败，退出码: {:?}", output.status.code())
            } else {
                format!(
                    "命令执行失败，退出码: {:?}: {}",
                    output.status.code(),
                    stderr
                )
            };
            Err(SchedulerError::TaskExecution(message))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cronmesh_testing_utils::ScheduledTaskBuilder;
    use serde_json::json;

    #[tokio::test]
    async fn test_shell_captures_stdout() {
        let task = ScheduledTaskBuilder::new()
            .with_parameters(json!({"command": "echo", "args": ["hello", "cronmesh"]}))
            .build();
        let output = ShellJobHandler::new().execute(&task).await.unwrap();
        assert_eq!(output, "hello cronmesh");
    }

    #[tokio::test]
    async fn test_shell_env_and_working_dir() {
        let dir = std::env::temp_dir();
        let task = ScheduledTaskBuilder::new()
            .with_parameters(json!({
                "command": "sh",
                "args": ["-c", "echo $GREETING; pwd"],
                "working_dir": dir.to_str().unwrap(),
                "env_vars": {"GREETING": "hi"}
            }))
            .build();
        let output = ShellJobHandler::new().execute(&task).await.unwrap();
        assert!(output.starts_with("hi\n"));
    }

    #[tokio::test]
    async fn test_shell_non_zero_exit_is_error() {
        let task = ScheduledTaskBuilder::new()
            .with_parameters(json!({"command": "sh", "args": ["-c", "echo oops >&2; exit 3"]}))
            .build();
        let err = ShellJobHandler::new().execute(&task).await.unwrap_err();
        let text = err.to_string();
        assert!(text.contains("Some(3)"));
        assert!(text.contains("oops"));
    }

    #[tokio::test]
    async fn test_shell_missing_command_rejected() {
        let task = ScheduledTaskBuilder::new()
            .with_parameters(json!({"args": ["x"]}))
            .build();
        let result = ShellJobHandler::new().execute(&task).await;
        assert!(matches!(result, Err(SchedulerError::InvalidArgument(_))));
    }

    #[tokio::test]
    async fn test_shell_unknown_binary_fails_to_start() {
        let task = ScheduledTaskBuilder::new()
            .with_parameters(json!({"command": "/nonexistent/cronmesh-test-binary"}))
            .build();
        let result = ShellJobHandler::new().execute(&task).await;
        assert!(matches!(result, Err(SchedulerError::TaskExecution(_))));
    }
}
