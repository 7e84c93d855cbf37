use std::sync::Arc;

use tracing::info;

use cronmesh_core::{
    config::{StorageBackend, StorageConfig},
    traits::TaskRepository,
    SchedulerResult,
};

use crate::{InMemoryTaskRepository, SqliteTaskRepository};

/// 按存储配置创建任务存储
pub struct TaskRepositoryFactory;

impl TaskRepositoryFactory {
    pub async fn create(config: &StorageConfig) -> SchedulerResult<Arc<dyn TaskRepository>> {
        match config.backend {
            StorageBackend::Memory => {
                info!("使用内存任务存储");
                Ok(Arc::new(InMemoryTaskRepository::new()))
            }
            StorageBackend::Sqlite => {
                info!("使用SQLite任务存储: {}", config.database_url);
                let repo =
                    SqliteTaskRepository::connect(&config.database_url, config.max_connections)
                        .await?;
                Ok(Arc::new(repo))
            }
        }
    }
}
