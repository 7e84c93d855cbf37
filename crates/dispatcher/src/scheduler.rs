use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use metrics::counter;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use cronmesh_core::{
    traits::{CompletionCallback, TaskExecutor, TaskRepository},
    SchedulerResult, StructuredLogger, TaskLocks,
};

use crate::cron_utils::CronEvaluator;

/// 调度循环的轮询间隔
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// 在途记录在任务超时之外额外保留的时长，覆盖上报的网络延迟
pub const IN_FLIGHT_GRACE: Duration = Duration::from_secs(60);

/// 一次在途执行；`token` 区分同一任务的先后两次执行
#[derive(Debug, Clone, Copy)]
struct InFlight {
    token: Uuid,
    deadline: DateTime<Utc>,
}

/// 调度循环
///
/// 每个周期读取全部任务，对到期任务计算下一次执行时间并写回存储，
/// 然后把任务交给执行能力，不等待执行完成。
pub struct TaskSchedulerLoop {
    task_repo: Arc<dyn TaskRepository>,
    executor: Arc<dyn TaskExecutor>,
    task_locks: TaskLocks,
    in_flight: Arc<DashMap<Uuid, InFlight>>,
    in_flight_grace: Duration,
    running: RwLock<bool>,
    stop_tx: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl TaskSchedulerLoop {
    pub fn new(
        task_repo: Arc<dyn TaskRepository>,
        executor: Arc<dyn TaskExecutor>,
        task_locks: TaskLocks,
    ) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            task_repo,
            executor,
            task_locks,
            in_flight: Arc::new(DashMap::new()),
            in_flight_grace: IN_FLIGHT_GRACE,
            running: RwLock::new(false),
            stop_tx,
            handle: Mutex::new(None),
        }
    }

    /// 设置在途记录的宽限时长
    pub fn with_in_flight_grace(mut self, grace: Duration) -> Self {
        self.in_flight_grace = grace;
        self
    }

    /// 启动调度循环，重复启动为空操作
    pub async fn start(self: &Arc<Self>) {
        let mut running = self.running.write().await;
        if *running {
            warn!("调度循环已在运行，忽略重复启动");
            return;
        }
        *running = true;

        self.stop_tx.send_replace(false);
        let stop_rx = self.stop_tx.subscribe();
        let handle = tokio::spawn(Arc::clone(self).run(stop_rx));
        *self.handle.lock().await = Some(handle);
        info!("调度循环已启动，轮询间隔 {:?}", TICK_INTERVAL);
    }

    /// 停止调度循环，已发出的执行不会被取消；重复停止为空操作
    pub async fn stop(&self) {
        let mut running = self.running.write().await;
        if !*running {
            warn!("调度循环未运行，忽略停止请求");
            return;
        }
        *running = false;

        self.stop_tx.send_replace(true);
        if let Some(handle) = self.handle.lock().await.take() {
            if let Err(e) = handle.await {
                error!("等待调度循环退出时出错: {}", e);
            }
        }
        info!("调度循环已停止");
    }

    pub async fn is_running(&self) -> bool {
        *self.running.read().await
    }

    /// 当前在途（已发出且未结束）的任务数
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    async fn run(self: Arc<Self>, mut stop_rx: watch::Receiver<bool>) {
        loop {
            if *stop_rx.borrow_and_update() {
                break;
            }

            let scheduled = self.tick().await;
            if scheduled > 0 {
                debug!("本轮调度了 {} 个任务", scheduled);
            }

            tokio::select! {
                _ = tokio::time::sleep(TICK_INTERVAL) => {}
                _ = stop_rx.changed() => {}
            }
        }
        debug!("调度循环退出");
    }

    /// 执行一轮调度，返回本轮发出的任务数；单个任务的错误只记录日志
    pub async fn tick(&self) -> usize {
        self.tick_at(Utc::now()).await
    }

    /// 以指定时间作为当前时间执行一轮调度
    pub async fn tick_at(&self, now: DateTime<Utc>) -> usize {
        let tasks = match self.task_repo.get_all_tasks().await {
            Ok(tasks) => tasks,
            Err(e) => {
                StructuredLogger::log_system_error("scheduler", "get_all_tasks", &e);
                return 0;
            }
        };

        let mut scheduled = 0;
        for task in tasks.iter().filter(|task| task.is_due(now)) {
            match self.schedule_task(task.id, now).await {
                Ok(true) => scheduled += 1,
                Ok(false) => {}
                Err(e) => StructuredLogger::log_system_error("scheduler", "schedule_task", &e),
            }
        }

        self.task_locks.prune();
        scheduled
    }

    /// 推进任务的下一次执行时间并发出执行；返回是否发出
    async fn schedule_task(&self, task_id: Uuid, now: DateTime<Utc>) -> SchedulerResult<bool> {
        let task = {
            let _guard = self.task_locks.lock(task_id).await;
            let Some(mut task) = self.task_repo.get_task(task_id).await? else {
                return Ok(false);
            };
            if !task.is_due(now) {
                return Ok(false);
            }

            match CronEvaluator::next_occurrence(&task.schedule, now) {
                Ok(next) => task.next_run_time = next,
                Err(e) => {
                    error!("任务 {} 的CRON表达式无效，已禁用: {}", task.name, e);
                    task.enabled = false;
                    task.touch();
                    self.task_repo.update_task(&task).await?;
                    return Ok(false);
                }
            }

            let already_running = self.is_in_flight(task.id, now);
            if !already_running {
                task.reset_retry_state();
            }
            task.touch();
            self.task_repo.update_task(&task).await?;

            if already_running && !task.allow_parallel_execution {
                warn!(
                    "任务 {} 上一次执行尚未结束且不允许并行，跳过本次执行，下次执行时间 {}",
                    task.name, task.next_run_time
                );
                return Ok(false);
            }

            StructuredLogger::log_task_scheduled(
                task.id,
                &task.name,
                &task.task_type,
                task.next_run_time,
            );
            task
        };

        counter!("cronmesh_tasks_scheduled_total").increment(1);
        let token = Uuid::new_v4();
        self.in_flight.insert(
            task_id,
            InFlight {
                token,
                deadline: in_flight_deadline(now, task.timeout_seconds, self.in_flight_grace),
            },
        );

        let executor = Arc::clone(&self.executor);
        let in_flight = Arc::clone(&self.in_flight);
        let on_completed: CompletionCallback = {
            let in_flight = Arc::clone(&self.in_flight);
            Box::new(move |result| {
                in_flight.remove_if(&result.task_id, |_, entry| entry.token == token);
                debug!(
                    "任务 {} 执行结束: {:?}",
                    result.task_id, result.status
                );
            })
        };

        tokio::spawn(async move {
            if let Err(e) = executor.execute(task, Some(on_completed)).await {
                in_flight.remove_if(&task_id, |_, entry| entry.token == token);
                error!("任务 {} 执行失败: {}", task_id, e);
            }
        });

        Ok(true)
    }

    /// 任务是否仍在途；超过截止时间的记录视为丢失并清除
    fn is_in_flight(&self, task_id: Uuid, now: DateTime<Utc>) -> bool {
        let Some(entry) = self.in_flight.get(&task_id).map(|entry| *entry) else {
            return false;
        };
        if now < entry.deadline {
            return true;
        }

        warn!(
            "任务 {} 超过截止时间 {} 仍未收到执行结果，视为已结束",
            task_id, entry.deadline
        );
        counter!("cronmesh_in_flight_expired_total").increment(1);
        self.in_flight
            .remove_if(&task_id, |_, current| current.token == entry.token);
        false
    }
}

fn in_flight_deadline(now: DateTime<Utc>, timeout_seconds: u64, grace: Duration) -> DateTime<Utc> {
    let budget = Duration::from_secs(timeout_seconds).saturating_add(grace);
    chrono::Duration::from_std(budget)
        .ok()
        .and_then(|budget| now.checked_add_signed(budget))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
