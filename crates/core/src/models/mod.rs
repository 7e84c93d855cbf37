pub mod execution;
pub mod task;

pub use execution::{ExecutionStatus, TaskExecutionResult};
pub use task::{DagStatus, RetryPolicy, RetryStrategy, ScheduledTask};
