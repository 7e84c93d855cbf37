//! Worker节点
//!
//! 接收协调节点分发的任务，按任务类型交给处理器执行，上报执行结果并定期发送心跳。

pub mod components;
pub mod executor_factory;
pub mod executors;
pub mod service;

pub use components::{
    CoordinatorLink, DispatcherClient, HeartbeatManager, LoggingStatusReporter, StatusReporter,
    TaskExecutionService, HEARTBEAT_INTERVAL,
};
pub use executor_factory::JobHandlerRegistry;
pub use executors::{JobHandler, ShellJobHandler, ShellTaskParams};
pub use service::WorkerService;
