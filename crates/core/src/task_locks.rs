use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

/// 按任务ID串行化任务定义的读改写
///
/// 调度循环更新 `next_run_time`，重试协调器更新重试字段，两者可能同时修改同一任务，
/// 持有同一把锁才能避免更新丢失。
#[derive(Debug, Clone, Default)]
pub struct TaskLocks {
    locks: Arc<Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>>,
}

impl TaskLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取某个任务的锁，守卫释放时解锁
    pub async fn lock(&self, task_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(locks.entry(task_id).or_default())
        };
        lock.lock_owned().await
    }

    /// 清理没有持有者的锁
    pub fn prune(&self) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
