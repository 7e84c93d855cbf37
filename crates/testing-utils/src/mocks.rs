//! Mock implementations for repository, sender and executor traits
//!
//! 内存实现，单元测试无需数据库或网络。

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use cronmesh_core::{
    models::{ScheduledTask, TaskExecutionResult},
    traits::{CompletionCallback, TaskExecutor, TaskRepository, TaskSender},
    SchedulerError, SchedulerResult,
};
use uuid::Uuid;

/// Mock implementation of TaskRepository for testing
#[derive(Debug, Clone, Default)]
pub struct MockTaskRepository {
    tasks: Arc<Mutex<HashMap<Uuid, ScheduledTask>>>,
    update_count: Arc<Mutex<usize>>,
    fail_reads: Arc<Mutex<bool>>,
}

impl MockTaskRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tasks(tasks: Vec<ScheduledTask>) -> Self {
        let repo = Self::new();
        {
            let mut map = repo.tasks.lock().unwrap();
            for task in tasks {
                map.insert(task.id, task);
            }
        }
        repo
    }

    /// 直接写入，已存在时覆盖
    pub fn insert_task(&self, task: &ScheduledTask) {
        self.tasks.lock().unwrap().insert(task.id, task.clone());
    }

    /// 直接读取，不经过trait
    pub fn task(&self, id: Uuid) -> Option<ScheduledTask> {
        self.tasks.lock().unwrap().get(&id).cloned()
    }

    pub fn count(&self) -> usize {
        self.tasks.lock().unwrap().len()
    }

    pub fn update_count(&self) -> usize {
        *self.update_count.lock().unwrap()
    }

    /// 让 `get_all_tasks` 返回错误，用于验证调度循环的容错
    pub fn set_fail_reads(&self, fail: bool) {
        *self.fail_reads.lock().unwrap() = fail;
    }
}

#[async_trait]
impl TaskRepository for MockTaskRepository {
    async fn add_task(&self, task: &ScheduledTask) -> SchedulerResult<()> {
        let mut tasks = self.tasks.lock().unwrap();
        if tasks.contains_key(&task.id) {
            return Err(SchedulerError::invalid_argument(format!(
                "任务 {} 已存在",
                task.id
            )));
        }
        tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn update_task(&self, task: &ScheduledTask) -> SchedulerResult<()> {
        let mut tasks = self.tasks.lock().unwrap();
        if !tasks.contains_key(&task.id) {
            return Err(SchedulerError::TaskNotFound { id: task.id });
        }
        tasks.insert(task.id, task.clone());
        *self.update_count.lock().unwrap() += 1;
        Ok(())
    }

    async fn delete_task(&self, id: Uuid) -> SchedulerResult<()> {
        self.tasks.lock().unwrap().remove(&id);
        Ok(())
    }

    async fn get_task(&self, id: Uuid) -> SchedulerResult<Option<ScheduledTask>> {
        Ok(self.tasks.lock().unwrap().get(&id).cloned())
    }

    async fn get_all_tasks(&self) -> SchedulerResult<Vec<ScheduledTask>> {
        if *self.fail_reads.lock().unwrap() {
            return Err(SchedulerError::Internal("模拟存储读取失败".to_string()));
        }
        Ok(self.tasks.lock().unwrap().values().cloned().collect())
    }
}

/// 可编排成功/失败序列的任务发送器
///
/// 脚本耗尽后使用默认行为。
#[derive(Debug, Clone)]
pub struct MockTaskSender {
    script: Arc<Mutex<VecDeque<bool>>>,
    default_success: bool,
    calls: Arc<Mutex<Vec<(String, Uuid)>>>,
}

impl MockTaskSender {
    /// 总是成功
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::new())),
            default_success: true,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// 总是失败
    pub fn always_failing() -> Self {
        Self {
            default_success: false,
            ..Self::new()
        }
    }

    /// 前 `times` 次失败，之后成功
    pub fn failing_times(times: usize) -> Self {
        let sender = Self::new();
        sender.script.lock().unwrap().extend(std::iter::repeat(false).take(times));
        sender
    }

    pub fn calls(&self) -> Vec<(String, Uuid)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn nodes_called(&self) -> Vec<String> {
        self.calls().into_iter().map(|(node, _)| node).collect()
    }
}

impl Default for MockTaskSender {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskSender for MockTaskSender {
    async fn send_task(&self, node_address: &str, task: &ScheduledTask) -> SchedulerResult<()> {
        self.calls
            .lock()
            .unwrap()
            .push((node_address.to_string(), task.id));
        let success = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(self.default_success);
        if success {
            Ok(())
        } else {
            Err(SchedulerError::Network(format!(
                "模拟连接 {node_address} 失败"
            )))
        }
    }
}

/// 执行器的行为
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingMode {
    /// 立即以成功结果调用回调
    Complete,
    /// 保留回调，由测试调用 `finish_all` 完成
    Hold,
    /// 直接返回错误
    Fail,
}

/// 记录每次调用的执行器
#[derive(Clone)]
pub struct RecordingExecutor {
    mode: RecordingMode,
    executed: Arc<Mutex<Vec<ScheduledTask>>>,
    held: Arc<Mutex<Vec<(Uuid, CompletionCallback)>>>,
}

impl RecordingExecutor {
    pub fn new(mode: RecordingMode) -> Self {
        Self {
            mode,
            executed: Arc::new(Mutex::new(Vec::new())),
            held: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn executed(&self) -> Vec<ScheduledTask> {
        self.executed.lock().unwrap().clone()
    }

    pub fn execution_count(&self) -> usize {
        self.executed.lock().unwrap().len()
    }

    pub fn executions_of(&self, task_id: Uuid) -> usize {
        self.executed
            .lock()
            .unwrap()
            .iter()
            .filter(|task| task.id == task_id)
            .count()
    }

    /// 以成功结果完成所有保留的执行
    pub fn finish_all(&self) {
        let held: Vec<_> = self.held.lock().unwrap().drain(..).collect();
        for (task_id, callback) in held {
            callback(TaskExecutionResult::running(task_id, "local").complete());
        }
    }
}

#[async_trait]
impl TaskExecutor for RecordingExecutor {
    async fn execute(
        &self,
        task: ScheduledTask,
        on_completed: Option<CompletionCallback>,
    ) -> SchedulerResult<()> {
        let task_id = task.id;
        self.executed.lock().unwrap().push(task);

        match self.mode {
            RecordingMode::Complete => {
                if let Some(callback) = on_completed {
                    callback(TaskExecutionResult::running(task_id, "local").complete());
                }
                Ok(())
            }
            RecordingMode::Hold => {
                if let Some(callback) = on_completed {
                    self.held.lock().unwrap().push((task_id, callback));
                }
                Ok(())
            }
            RecordingMode::Fail => Err(SchedulerError::TaskExecution("模拟执行失败".to_string())),
        }
    }
}
