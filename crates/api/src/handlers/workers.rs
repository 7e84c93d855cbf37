use std::sync::Arc;

use axum::{extract::State, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error};

use cronmesh_core::{models::TaskExecutionResult, SchedulerError};

use crate::{
    error::ApiResult,
    response::{ok_message, success},
    routes::CoordinatorState,
};

/// 节点视图
#[derive(Debug, Serialize)]
pub struct NodeView {
    pub address: String,
    pub last_heartbeat: DateTime<Utc>,
    pub alive: bool,
    pub load: usize,
}

/// 接收执行结果上报
///
/// 结果在后台处理：失败重试可能要等待退避时间，不能占住Worker的上报请求。
pub async fn report_status(
    State(state): State<CoordinatorState>,
    Json(result): Json<TaskExecutionResult>,
) -> ApiResult<impl IntoResponse> {
    if result.task_id.is_nil() {
        return Err(SchedulerError::invalid_argument("上报结果缺少任务ID").into());
    }
    debug!(
        "收到任务 {} 的状态上报: {:?} (来自 {})",
        result.task_id, result.status, result.worker_address
    );

    let listener = Arc::clone(&state.coordinator.state_listener);
    tokio::spawn(async move {
        let task_id = result.task_id;
        if let Err(e) = listener.handle_status(result).await {
            error!("处理任务 {} 的状态上报失败: {}", task_id, e);
        }
    });

    Ok(ok_message("状态已接收"))
}

/// Worker注册，请求体为JSON字符串形式的地址
pub async fn register_worker(
    State(state): State<CoordinatorState>,
    Json(address): Json<String>,
) -> ApiResult<impl IntoResponse> {
    state
        .coordinator
        .state_listener
        .handle_register(&address)
        .await?;
    Ok(ok_message(format!("Worker {} 已注册", address.trim())))
}

/// Worker心跳，请求体为JSON字符串形式的地址
pub async fn heartbeat(
    State(state): State<CoordinatorState>,
    Json(address): Json<String>,
) -> ApiResult<impl IntoResponse> {
    state
        .coordinator
        .state_listener
        .handle_heartbeat(&address)
        .await?;
    Ok(ok_message("心跳已接收"))
}

/// 已知节点及其心跳和负载
pub async fn list_nodes(State(state): State<CoordinatorState>) -> ApiResult<impl IntoResponse> {
    let load_balancer = &state.coordinator.load_balancer;
    let timeout_secs = load_balancer.heartbeat_timeout().num_seconds();
    let loads = load_balancer.get_node_loads().await;
    let now = Utc::now();

    let nodes: Vec<NodeView> = load_balancer
        .registry()
        .snapshot()
        .into_iter()
        .map(|(address, last_heartbeat)| NodeView {
            alive: (now - last_heartbeat).num_seconds() <= timeout_secs,
            load: loads.get(&address).copied().unwrap_or(0),
            address,
            last_heartbeat,
        })
        .collect();

    Ok(success(nodes))
}
