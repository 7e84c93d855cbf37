use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use cronmesh_core::{
    models::{RetryPolicy, ScheduledTask},
    SchedulerError,
};
use cronmesh_dispatcher::CronEvaluator;

use crate::{
    error::{ApiError, ApiResult},
    response::{created, ok_message, success},
    routes::CoordinatorState,
};

/// 任务创建请求
#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub name: String,
    pub schedule: String,
    pub task_type: String,
    #[serde(default)]
    pub parameters: serde_json::Value,
    pub enabled: Option<bool>,
    pub retry_policy: Option<RetryPolicy>,
    pub timeout_seconds: Option<u64>,
    #[serde(default)]
    pub priority: i32,
    pub allow_parallel_execution: Option<bool>,
    #[serde(default)]
    pub predecessor_ids: Vec<Uuid>,
    pub workflow_id: Option<Uuid>,
}

/// 任务更新请求，缺省字段保持不变
#[derive(Debug, Default, Deserialize)]
pub struct UpdateTaskRequest {
    pub name: Option<String>,
    pub schedule: Option<String>,
    pub parameters: Option<serde_json::Value>,
    pub enabled: Option<bool>,
    pub retry_policy: Option<RetryPolicy>,
    pub timeout_seconds: Option<u64>,
    pub priority: Option<i32>,
    pub allow_parallel_execution: Option<bool>,
}

fn require_non_empty(field: &str, value: &str) -> ApiResult<()> {
    if value.trim().is_empty() {
        return Err(ApiError::BadRequest(format!("{} 不能为空", field)));
    }
    Ok(())
}

fn require_positive_timeout(timeout_seconds: Option<u64>) -> ApiResult<()> {
    if timeout_seconds == Some(0) {
        return Err(ApiError::BadRequest("timeout_seconds 必须大于0".to_string()));
    }
    Ok(())
}

/// 创建任务，下次执行时间取CRON表达式在当前时间之后的第一次触发
pub async fn create_task(
    State(state): State<CoordinatorState>,
    Json(request): Json<CreateTaskRequest>,
) -> ApiResult<impl IntoResponse> {
    require_non_empty("name", &request.name)?;
    require_non_empty("task_type", &request.task_type)?;
    require_positive_timeout(request.timeout_seconds)?;

    let repo = &state.coordinator.task_repo;
    let mut task = ScheduledTask::new(
        request.name.trim(),
        request.schedule.trim(),
        request.task_type.trim(),
    );
    task.next_run_time = CronEvaluator::next_occurrence(&task.schedule, Utc::now())?;
    task.parameters = request.parameters;
    task.priority = request.priority;
    task.workflow_id = request.workflow_id;
    if let Some(enabled) = request.enabled {
        task.enabled = enabled;
    }
    if let Some(policy) = request.retry_policy {
        task.retry_policy = policy;
    }
    if let Some(timeout) = request.timeout_seconds {
        task.timeout_seconds = timeout;
    }
    if let Some(parallel) = request.allow_parallel_execution {
        task.allow_parallel_execution = parallel;
    }

    // 前置任务必须已存在，并把新任务登记为它们的后继
    let mut predecessors = Vec::with_capacity(request.predecessor_ids.len());
    for id in &request.predecessor_ids {
        let predecessor = repo.get_task(*id).await?.ok_or_else(|| {
            ApiError::BadRequest(format!("前置任务 {} 不存在", id))
        })?;
        predecessors.push(predecessor);
    }
    if !predecessors.is_empty() {
        task.set_predecessors(request.predecessor_ids.clone());
    }

    repo.add_task(&task).await?;
    for mut predecessor in predecessors {
        if !predecessor.successor_ids.contains(&task.id) {
            predecessor.successor_ids.push(task.id);
            predecessor.touch();
            repo.update_task(&predecessor).await?;
        }
    }

    info!(
        "任务 {} ({}) 已创建，下次执行时间 {}",
        task.name, task.id, task.next_run_time
    );
    Ok(created(task))
}

/// 获取任务列表，按优先级排序
pub async fn list_tasks(State(state): State<CoordinatorState>) -> ApiResult<impl IntoResponse> {
    let tasks = state.coordinator.task_repo.get_all_tasks().await?;
    Ok(success(tasks))
}

pub async fn get_task(
    State(state): State<CoordinatorState>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let task = state
        .coordinator
        .task_repo
        .get_task(id)
        .await?
        .ok_or(SchedulerError::TaskNotFound { id })?;
    Ok(success(task))
}

/// 更新任务
///
/// 修改调度表达式时会重新计算下次执行时间。
pub async fn update_task(
    State(state): State<CoordinatorState>,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateTaskRequest>,
) -> ApiResult<impl IntoResponse> {
    require_positive_timeout(request.timeout_seconds)?;
    let repo = &state.coordinator.task_repo;
    let _guard = state.coordinator.task_locks.lock(id).await;
    let mut task = repo
        .get_task(id)
        .await?
        .ok_or(SchedulerError::TaskNotFound { id })?;

    if let Some(name) = request.name {
        require_non_empty("name", &name)?;
        task.name = name.trim().to_string();
    }
    if let Some(schedule) = request.schedule {
        let schedule = schedule.trim().to_string();
        task.next_run_time = CronEvaluator::next_occurrence(&schedule, Utc::now())?;
        task.schedule = schedule;
    }
    if let Some(parameters) = request.parameters {
        task.parameters = parameters;
    }
    if let Some(enabled) = request.enabled {
        task.enabled = enabled;
        if enabled && task.reactivate() {
            info!("任务 {} 重新启用，清除失败状态", task.name);
        }
    }
    if let Some(policy) = request.retry_policy {
        task.retry_policy = policy;
    }
    if let Some(timeout) = request.timeout_seconds {
        task.timeout_seconds = timeout;
    }
    if let Some(priority) = request.priority {
        task.priority = priority;
    }
    if let Some(parallel) = request.allow_parallel_execution {
        task.allow_parallel_execution = parallel;
    }
    task.touch();

    repo.update_task(&task).await?;
    info!("任务 {} ({}) 已更新", task.name, task.id);
    Ok(success(task))
}

pub async fn delete_task(
    State(state): State<CoordinatorState>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let repo = &state.coordinator.task_repo;
    let _guard = state.coordinator.task_locks.lock(id).await;
    if repo.get_task(id).await?.is_none() {
        return Err(SchedulerError::TaskNotFound { id }.into());
    }
    repo.delete_task(id).await?;
    info!("任务 {} 已删除", id);
    Ok(ok_message(format!("任务 {} 已删除", id)))
}

/// 手动触发：把下次执行时间设为当前时间，由调度循环在下一个周期执行
///
/// 重试用尽而处于失败终态的任务会被重新激活。
pub async fn trigger_task(
    State(state): State<CoordinatorState>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let repo = &state.coordinator.task_repo;
    let _guard = state.coordinator.task_locks.lock(id).await;
    let mut task = repo
        .get_task(id)
        .await?
        .ok_or(SchedulerError::TaskNotFound { id })?;
    if !task.enabled {
        return Err(ApiError::BadRequest(format!("任务 {} 已禁用", task.name)));
    }

    if task.reactivate() {
        info!("任务 {} 从失败状态重新激活", task.name);
    }
    task.next_run_time = Utc::now();
    task.touch();
    repo.update_task(&task).await?;
    info!("任务 {} ({}) 已手动触发", task.name, task.id);
    Ok(success(task))
}
