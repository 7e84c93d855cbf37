use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use cronmesh_core::{
    models::ScheduledTask, traits::TaskRepository, SchedulerError, SchedulerResult,
};

/// 内存任务存储
///
/// 单进程部署和演示使用，进程退出后数据丢失。
#[derive(Debug, Clone, Default)]
pub struct InMemoryTaskRepository {
    tasks: Arc<RwLock<HashMap<Uuid, ScheduledTask>>>,
}

impl InMemoryTaskRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.tasks.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tasks.read().await.is_empty()
    }
}

#[async_trait]
impl TaskRepository for InMemoryTaskRepository {
    async fn add_task(&self, task: &ScheduledTask) -> SchedulerResult<()> {
        let mut tasks = self.tasks.write().await;
        if tasks.contains_key(&task.id) {
            return Err(SchedulerError::invalid_argument(format!(
                "任务 {} 已存在",
                task.id
            )));
        }
        tasks.insert(task.id, task.clone());
        debug!("任务 {} ({}) 已保存", task.name, task.id);
        Ok(())
    }

    async fn update_task(&self, task: &ScheduledTask) -> SchedulerResult<()> {
        let mut tasks = self.tasks.write().await;
        match tasks.get_mut(&task.id) {
            Some(existing) => {
                *existing = task.clone();
                Ok(())
            }
            None => Err(SchedulerError::TaskNotFound { id: task.id }),
        }
    }

    async fn delete_task(&self, id: Uuid) -> SchedulerResult<()> {
        if self.tasks.write().await.remove(&id).is_some() {
            debug!("任务 {} 已删除", id);
        }
        Ok(())
    }

    async fn get_task(&self, id: Uuid) -> SchedulerResult<Option<ScheduledTask>> {
        Ok(self.tasks.read().await.get(&id).cloned())
    }

    /// 按优先级从高到低、创建时间从早到晚返回
    async fn get_all_tasks(&self) -> SchedulerResult<Vec<ScheduledTask>> {
        let mut tasks: Vec<ScheduledTask> = self.tasks.read().await.values().cloned().collect();
        tasks.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.created_at.cmp(&b.created_at))
        });
        Ok(tasks)
    }
}
