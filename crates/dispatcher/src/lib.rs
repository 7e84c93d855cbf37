//! 协调节点核心
//!
//! CRON求值、节点注册表、负载均衡、分发与重试、调度循环，以及Worker上报的处理。

pub mod coordinator;
pub mod cron_utils;
pub mod dispatcher;
pub mod load_balancer;
pub mod node_registry;
pub mod retry_service;
pub mod scheduler;
pub mod state_listener;
pub mod strategies;

#[cfg(test)]
mod strategies_test;

pub use coordinator::Coordinator;
pub use cron_utils::{CronEvaluator, CronScheduler};
pub use dispatcher::{
    AttemptLedger, DispatchAttempt, DispatchOutcome, DispatchPipeline, HttpTaskSender,
    TaskDispatcher,
};
pub use load_balancer::LoadBalancer;
pub use node_registry::NodeRegistry;
pub use retry_service::{RetryConfig, RetryCoordinator, RetryOutcome};
pub use scheduler::TaskSchedulerLoop;
pub use state_listener::StateListener;
pub use strategies::*;
