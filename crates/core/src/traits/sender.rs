use async_trait::async_trait;

use crate::{models::ScheduledTask, SchedulerResult};

/// 把任务发送到指定Worker节点的网络能力
#[async_trait]
pub trait TaskSender: Send + Sync {
    /// 发送任务；网络错误或非成功响应都返回错误
    async fn send_task(&self, node_address: &str, task: &ScheduledTask) -> SchedulerResult<()>;
}
