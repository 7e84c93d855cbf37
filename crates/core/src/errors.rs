use thiserror::Error;
use uuid::Uuid;

/// 调度器错误类型定义
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("无效参数: {0}")]
    InvalidArgument(String),

    #[error("无效的CRON表达式: {expr} - {reason}")]
    CronParse { expr: String, reason: String },

    #[error("没有可用的Worker节点")]
    NoNodesAvailable,

    #[error("任务分发到节点 {node} 失败: {message}")]
    DispatchFailed { node: String, message: String },

    #[error("任务未找到: {id}")]
    TaskNotFound { id: Uuid },

    #[error("负载均衡策略未找到: {name}")]
    StrategyNotFound { name: String },

    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("网络错误: {0}")]
    Network(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("任务执行错误: {0}")]
    TaskExecution(String),

    #[error("任务执行超时")]
    ExecutionTimeout,

    #[error("内部错误: {0}")]
    Internal(String),
}

impl SchedulerError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        SchedulerError::InvalidArgument(message.into())
    }

    pub fn cron_parse(expr: &str, reason: impl Into<String>) -> Self {
        SchedulerError::CronParse {
            expr: expr.to_string(),
            reason: reason.into(),
        }
    }

    /// 网络发送类错误，调度器会据此驱逐节点并触发重试
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SchedulerError::Network(_)
                | SchedulerError::DispatchFailed { .. }
                | SchedulerError::NoNodesAvailable
        )
    }
}

/// 统一的Result类型
pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cron_parse_error_carries_expression() {
        let err = SchedulerError::cron_parse("*/0 * * * * *", "间隔必须为正整数");
        let text = err.to_string();
        assert!(text.contains("*/0 * * * * *"));
        assert!(text.contains("间隔必须为正整数"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(SchedulerError::NoNodesAvailable.is_transient());
        assert!(SchedulerError::Network("connection refused".into()).is_transient());
        assert!(!SchedulerError::invalid_argument("empty").is_transient());
    }
}
