//! 日志初始化与结构化事件日志
//!
//! 所有组件都通过 `tracing` 输出日志；进程入口调用 [`init_logging`] 安装订阅者，
//! 关键调度事件统一走 [`StructuredLogger`]，保证字段名一致，便于检索。

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

/// 初始化日志系统
///
/// `RUST_LOG` 存在时优先生效，否则使用传入的日志级别。
pub fn init_logging(log_level: &str, log_format: &str) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    match log_format {
        "json" => {
            registry
                .with(tracing_subscriber::fmt::layer().json())
                .try_init()
                .context("初始化JSON日志格式失败")?;
        }
        "pretty" => {
            registry
                .with(tracing_subscriber::fmt::layer().pretty())
                .try_init()
                .context("初始化Pretty日志格式失败")?;
        }
        _ => {
            return Err(anyhow::anyhow!("不支持的日志格式: {log_format}"));
        }
    }

    Ok(())
}

/// Structured logging utilities
pub struct StructuredLogger;

impl StructuredLogger {
    /// Log task scheduling event
    pub fn log_task_scheduled(
        task_id: Uuid,
        task_name: &str,
        task_type: &str,
        next_run_time: DateTime<Utc>,
    ) {
        info!(
            event = "task_scheduled",
            task.id = %task_id,
            task.name = task_name,
            task.type = task_type,
            task.next_run_time = %next_run_time,
            "Task scheduled for execution"
        );
    }

    /// Log successful dispatch to a worker node
    pub fn log_task_dispatched(task_id: Uuid, task_name: &str, node: &str) {
        info!(
            event = "task_dispatched",
            task.id = %task_id,
            task.name = task_name,
            node.address = node,
            "Task dispatched to worker node"
        );
    }

    /// Log node eviction after a failed send
    pub fn log_node_evicted(node: &str, task_id: Uuid, reason: &str) {
        warn!(
            event = "node_evicted",
            node.address = node,
            task.id = %task_id,
            reason = reason,
            "Worker node evicted from registry"
        );
    }

    pub fn log_retry_scheduled(
        task_id: Uuid,
        task_name: &str,
        attempt: u32,
        max_attempts: u32,
        next_retry_time: DateTime<Utc>,
    ) {
        info!(
            event = "task_retry_scheduled",
            task.id = %task_id,
            task.name = task_name,
            retry.attempt = attempt,
            retry.max_attempts = max_attempts,
            retry.next_time = %next_retry_time,
            "Task retry scheduled"
        );
    }

    pub fn log_retry_exhausted(task_id: Uuid, task_name: &str, attempts: u32) {
        error!(
            event = "task_retry_exhausted",
            task.id = %task_id,
            task.name = task_name,
            retry.attempts = attempts,
            "Task retries exhausted, marked as failed"
        );
    }

    /// Log an execution report received from a worker
    pub fn log_status_report(
        task_id: Uuid,
        worker: &str,
        status: &str,
        error_message: Option<&str>,
    ) {
        if error_message.is_some() {
            warn!(
                event = "task_status_report",
                task.id = %task_id,
                worker.address = worker,
                task.status = status,
                task.error = error_message.unwrap_or("Unknown error"),
                "Task execution reported with error"
            );
        } else {
            debug!(
                event = "task_status_report",
                task.id = %task_id,
                worker.address = worker,
                task.status = status,
                "Task execution status reported"
            );
        }
    }

    /// Log system-level errors that must not escape background loops
    pub fn log_system_error(component: &str, operation: &str, error: &dyn std::error::Error) {
        error!(
            event = "system_error",
            component = component,
            operation = operation,
            error = %error,
            "System error occurred"
        );
    }
}
