use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::executors::{JobHandler, ShellJobHandler};

/// 按任务类型查找处理器的注册表
#[derive(Default)]
pub struct JobHandlerRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn JobHandler>>>,
}

impl JobHandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册内置处理器（shell）
    pub async fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register(Arc::new(ShellJobHandler::new())).await;
        registry
    }

    /// 为处理器声明的每个任务类型注册，已有的同类型处理器会被替换
    pub async fn register(&self, handler: Arc<dyn JobHandler>) {
        let mut handlers = self.handlers.write().await;
        for task_type in handler.supported_task_types() {
            if handlers
                .insert(task_type.clone(), Arc::clone(&handler))
                .is_some()
            {
                warn!("任务类型 {} 的处理器被 {} 替换", task_type, handler.name());
            } else {
                info!("注册任务处理器: {} -> {}", task_type, handler.name());
            }
        }
    }

    pub async fn get(&self, task_type: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.read().await.get(task_type).cloned()
    }

    pub async fn contains(&self, task_type: &str) -> bool {
        self.handlers.read().await.contains_key(task_type)
    }

    /// 已注册的任务类型，按名称排序
    pub async fn task_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.read().await.keys().cloned().collect();
        types.sort();
        types
    }
}
