//! # Cronmesh API
//!
//! 基于Axum的HTTP接口。协调节点和Worker各自挂载一组路由。
//!
//! ## 协调节点
//! - `POST /api/task/status` - 执行结果上报
//! - `POST /api/worker/register` - Worker注册（请求体为地址字符串）
//! - `POST /api/worker/heartbeat` - Worker心跳（请求体为地址字符串）
//! - `GET /api/worker/nodes` - 节点心跳与负载
//! - `GET|PUT /api/load-balancer/strategy` - 当前策略 / 切换策略
//! - `GET /api/load-balancer/strategies` - 可用策略
//! - `GET /api/load-balancer/loads` - 节点负载计数
//! - `GET|POST /api/tasks`, `GET|PUT|DELETE /api/tasks/{id}`, `POST /api/tasks/{id}/trigger`
//!
//! ## Worker
//! - `POST /api/task/execute` - 接收任务，202表示已接受

pub mod error;
pub mod handlers;
pub mod response;
pub mod routes;

pub use error::{ApiError, ApiResult};
pub use routes::{create_coordinator_routes, create_worker_routes, CoordinatorState, WorkerState};
