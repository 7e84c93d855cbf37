use axum::{extract::State, response::IntoResponse, Json};
use serde::Deserialize;

use cronmesh_dispatcher::StrategyConfig;

use crate::{
    error::ApiResult,
    response::{ok_message, success},
    routes::CoordinatorState,
};

/// 策略切换请求
#[derive(Debug, Deserialize)]
pub struct SetStrategyRequest {
    pub name: String,
    #[serde(default)]
    pub config: StrategyConfig,
}

pub async fn get_strategy_info(
    State(state): State<CoordinatorState>,
) -> ApiResult<impl IntoResponse> {
    Ok(success(
        state.coordinator.load_balancer.get_strategy_info().await,
    ))
}

pub async fn list_strategies(State(state): State<CoordinatorState>) -> ApiResult<impl IntoResponse> {
    Ok(success(state.coordinator.load_balancer.available_strategies()))
}

/// 运行时切换策略，负载计数保留
pub async fn set_strategy(
    State(state): State<CoordinatorState>,
    Json(request): Json<SetStrategyRequest>,
) -> ApiResult<impl IntoResponse> {
    state
        .coordinator
        .load_balancer
        .set_strategy(&request.name, &request.config)
        .await?;
    Ok(ok_message(format!("负载均衡策略已切换为 {}", request.name)))
}

pub async fn get_node_loads(State(state): State<CoordinatorState>) -> ApiResult<impl IntoResponse> {
    Ok(success(state.coordinator.load_balancer.get_node_loads().await))
}
