use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use cronmesh_dispatcher::Coordinator;
use cronmesh_worker::TaskExecutionService;

use crate::handlers::{
    execute::execute_task,
    load_balancer::{get_node_loads, get_strategy_info, list_strategies, set_strategy},
    tasks::{create_task, delete_task, get_task, list_tasks, trigger_task, update_task},
    workers::{heartbeat, list_nodes, register_worker, report_status},
};

/// 协调节点API状态
#[derive(Clone)]
pub struct CoordinatorState {
    pub coordinator: Arc<Coordinator>,
}

/// Worker API状态
#[derive(Clone)]
pub struct WorkerState {
    pub execution: Arc<TaskExecutionService>,
}

/// 创建协调节点路由
pub fn create_coordinator_routes(state: CoordinatorState) -> Router {
    Router::new()
        // Worker上报
        .route("/api/task/status", post(report_status))
        .route("/api/worker/register", post(register_worker))
        .route("/api/worker/heartbeat", post(heartbeat))
        .route("/api/worker/nodes", get(list_nodes))
        // 负载均衡
        .route(
            "/api/load-balancer/strategy",
            get(get_strategy_info).put(set_strategy),
        )
        .route("/api/load-balancer/strategies", get(list_strategies))
        .route("/api/load-balancer/loads", get(get_node_loads))
        // 任务管理
        .route("/api/tasks", get(list_tasks).post(create_task))
        .route(
            "/api/tasks/{id}",
            get(get_task).put(update_task).delete(delete_task),
        )
        .route("/api/tasks/{id}/trigger", post(trigger_task))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// 创建Worker路由
pub fn create_worker_routes(state: WorkerState) -> Router {
    Router::new()
        .route("/api/task/execute", post(execute_task))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
