use axum::{extract::State, response::IntoResponse, Json};
use tracing::info;

use cronmesh_core::models::ScheduledTask;

use crate::{error::ApiResult, response::accepted, routes::WorkerState};

/// 接收协调节点下发的任务
///
/// 接受后立即返回202，执行结果通过状态上报送回协调节点。
/// 没有对应处理器时返回500，同时已上报一条失败结果。
pub async fn execute_task(
    State(state): State<WorkerState>,
    Json(task): Json<ScheduledTask>,
) -> ApiResult<impl IntoResponse> {
    info!(
        "收到任务 {} ({})，类型 {}",
        task.name, task.id, task.task_type
    );
    let task_id = task.id;
    state.execution.accept(task).await?;
    Ok(accepted(format!("任务 {} 已接收", task_id)))
}
