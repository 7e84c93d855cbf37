use async_trait::async_trait;

use crate::{
    models::{ScheduledTask, TaskExecutionResult},
    SchedulerResult,
};

/// 执行完成回调，每次执行最多调用一次
pub type CompletionCallback = Box<dyn FnOnce(TaskExecutionResult) + Send + 'static>;

/// 任务执行能力
///
/// 单进程模式下由本地执行服务实现，分布式模式下由分发器实现。
/// 执行失败既可能以错误返回，也可能以 Failed 结果通过回调送达，调用方两种情况都要处理。
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(
        &self,
        task: ScheduledTask,
        on_completed: Option<CompletionCallback>,
    ) -> SchedulerResult<()>;
}
