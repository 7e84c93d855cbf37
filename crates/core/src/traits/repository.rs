use async_trait::async_trait;
use uuid::Uuid;

use crate::{models::ScheduledTask, SchedulerResult};

/// 任务存储接口
///
/// 调度循环和重试协调器通过它读写任务定义。删除只是存储层操作，调度核心从不删除任务。
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// 新增任务，任务ID已存在时返回参数错误
    async fn add_task(&self, task: &ScheduledTask) -> SchedulerResult<()>;

    /// 更新任务，任务不存在时返回 `TaskNotFound`
    async fn update_task(&self, task: &ScheduledTask) -> SchedulerResult<()>;

    /// 删除任务，不存在时为空操作
    async fn delete_task(&self, id: Uuid) -> SchedulerResult<()>;

    /// 根据ID获取任务
    async fn get_task(&self, id: Uuid) -> SchedulerResult<Option<ScheduledTask>>;

    /// 获取全部任务
    async fn get_all_tasks(&self) -> SchedulerResult<Vec<ScheduledTask>>;
}
