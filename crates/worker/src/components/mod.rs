pub mod dispatcher_client;
pub mod heartbeat_manager;
pub mod task_execution;

pub use dispatcher_client::{CoordinatorLink, DispatcherClient};
pub use heartbeat_manager::{HeartbeatManager, HEARTBEAT_INTERVAL};
pub use task_execution::{LoggingStatusReporter, StatusReporter, TaskExecutionService};
