use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use cronmesh_core::SchedulerError;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("调度器错误: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error("请求参数错误: {0}")]
    BadRequest(String),

    #[error("未找到资源")]
    NotFound,

    #[error("内部服务器错误: {0}")]
    Internal(String),
}

impl ApiError {
    fn parts(&self) -> (StatusCode, String, &'static str, Vec<String>) {
        match self {
            ApiError::Scheduler(SchedulerError::TaskNotFound { id }) => (
                StatusCode::NOT_FOUND,
                format!("任务 ID {} 不存在", id),
                "TASK_NOT_FOUND",
                vec!["使用 GET /api/tasks 查看所有可用任务".to_string()],
            ),
            ApiError::Scheduler(SchedulerError::StrategyNotFound { name }) => (
                StatusCode::NOT_FOUND,
                format!("负载均衡策略 {} 不存在", name),
                "STRATEGY_NOT_FOUND",
                vec!["使用 GET /api/load-balancer/strategies 查看可用策略".to_string()],
            ),
            ApiError::Scheduler(SchedulerError::CronParse { expr, reason }) => (
                StatusCode::BAD_REQUEST,
                format!("Cron表达式 '{}' 无效: {}", expr, reason),
                "INVALID_CRON_EXPRESSION",
                vec![
                    "支持5段或6段格式".to_string(),
                    "示例: '0 */5 * * * *' (每5分钟执行一次)".to_string(),
                ],
            ),
            ApiError::Scheduler(SchedulerError::InvalidArgument(msg)) => (
                StatusCode::BAD_REQUEST,
                format!("请求参数无效: {}", msg),
                "INVALID_ARGUMENT",
                vec!["请检查请求参数格式是否正确".to_string()],
            ),
            ApiError::Scheduler(SchedulerError::NoNodesAvailable) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "没有可用的Worker节点".to_string(),
                "NO_NODES_AVAILABLE",
                vec!["使用 GET /api/worker/nodes 检查Worker心跳".to_string()],
            ),
            ApiError::Scheduler(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                err.to_string(),
                "INTERNAL_ERROR",
                vec!["系统遇到内部错误，请稍后重试".to_string()],
            ),
            ApiError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                format!("请求参数错误: {}", msg),
                "BAD_REQUEST",
                vec!["请检查请求格式和参数".to_string()],
            ),
            ApiError::NotFound => (
                StatusCode::NOT_FOUND,
                "请求的资源不存在".to_string(),
                "NOT_FOUND",
                vec!["请检查请求URL是否正确".to_string()],
            ),
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("系统内部错误: {}", msg),
                "INTERNAL_ERROR",
                vec!["如果问题持续存在，请联系系统管理员".to_string()],
            ),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        self.parts().0
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, error_type, suggestions) = self.parts();
        if status.is_server_error() {
            tracing::error!("API请求处理失败: {}", self);
        }

        let body = Json(json!({
            "error": {
                "message": message,
                "type": error_type,
                "code": status.as_u16(),
                "suggestions": suggestions,
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }
        }));

        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
