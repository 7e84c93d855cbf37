pub mod config;
pub mod errors;
pub mod logging;
pub mod models;
pub mod task_locks;
pub mod traits;

pub use config::*;
pub use errors::*;
pub use logging::*;
pub use models::{
    DagStatus, ExecutionStatus, RetryPolicy, RetryStrategy, ScheduledTask,
    TaskExecutionResult,
};
pub use task_locks::TaskLocks;
pub use traits::{CompletionCallback, TaskExecutor, TaskRepository, TaskSender};
