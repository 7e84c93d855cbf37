use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::oneshot;

use cronmesh_core::{
    CompletionCallback, DispatcherConfig, ExecutionStatus, RetryStrategy, ScheduledTask,
    SchedulerError, SchedulerResult, TaskExecutionResult, TaskExecutor, TaskSender,
};
use cronmesh_dispatcher::{
    Coordinator, DispatchOutcome, RetryOutcome, StateListener, StrategyFactory,
};
use cronmesh_testing_utils::{
    completed_result, failed_result, MockTaskRepository, MockTaskSender, ScheduledTaskBuilder,
};

const NODE_A: &str = "http://worker-a:9090";
const NODE_B: &str = "http://worker-b:9090";

fn coordinator(repo: &MockTaskRepository, sender: &MockTaskSender) -> Coordinator {
    Coordinator::with_sender(
        &DispatcherConfig::default(),
        Arc::new(repo.clone()),
        Arc::new(sender.clone()),
        StrategyFactory::new(),
    )
    .unwrap()
}

fn capture() -> (CompletionCallback, oneshot::Receiver<TaskExecutionResult>) {
    let (tx, rx) = oneshot::channel();
    let callback: CompletionCallback = Box::new(move |result| {
        let _ = tx.send(result);
    });
    (callback, rx)
}

#[tokio::test]
async fn test_dispatch_success_increments_load() {
    let repo = MockTaskRepository::new();
    let sender = MockTaskSender::new();
    let coordinator = coordinator(&repo, &sender);
    coordinator.load_balancer.add_node(NODE_A).await.unwrap();

    let task = ScheduledTaskBuilder::new().build();
    repo.insert_task(&task);

    let outcome = coordinator.dispatcher.dispatch(&task).await.unwrap();
    assert_eq!(
        outcome,
        DispatchOutcome::Dispatched {
            node: NODE_A.to_string()
        }
    );
    assert_eq!(coordinator.load_balancer.current_load(NODE_A).await, 1);
    assert_eq!(sender.calls(), vec![(NODE_A.to_string(), task.id)]);
}

#[tokio::test]
async fn test_failed_send_evicts_node_and_retries_elsewhere() {
    let repo = MockTaskRepository::new();
    let sender = MockTaskSender::failing_times(1);
    let coordinator = coordinator(&repo, &sender);
    coordinator.load_balancer.add_node(NODE_A).await.unwrap();
    coordinator.load_balancer.add_node(NODE_B).await.unwrap();

    let task = ScheduledTaskBuilder::new()
        .with_retry(RetryStrategy::Fixed, 3, 0)
        .build();
    repo.insert_task(&task);

    let outcome = coordinator.dispatcher.dispatch(&task).await.unwrap();
    assert_eq!(
        outcome,
        DispatchOutcome::Retried(RetryOutcome::Dispatched {
            node: NODE_B.to_string(),
            attempt: 1,
        })
    );

    assert!(!coordinator.registry.contains(NODE_A));
    assert!(coordinator.registry.contains(NODE_B));
    assert_eq!(coordinator.load_balancer.current_load(NODE_A).await, 0);
    assert_eq!(coordinator.load_balancer.current_load(NODE_B).await, 1);
    assert_eq!(sender.nodes_called(), vec![NODE_A, NODE_B]);
    assert_eq!(repo.task(task.id).unwrap().current_retry_count, 1);
}

#[tokio::test]
async fn test_dispatch_without_nodes_fails() {
    let repo = MockTaskRepository::new();
    let sender = MockTaskSender::new();
    let coordinator = coordinator(&repo, &sender);

    let task = ScheduledTaskBuilder::new().build();
    repo.insert_task(&task);

    let result = coordinator.dispatcher.dispatch(&task).await;
    assert!(matches!(result, Err(SchedulerError::NoNodesAvailable)));
    assert_eq!(sender.call_count(), 0);
}

#[tokio::test]
async fn test_execute_keeps_callback_until_status_arrives() {
    let repo = MockTaskRepository::new();
    let sender = MockTaskSender::new();
    let coordinator = coordinator(&repo, &sender);
    coordinator.load_balancer.add_node(NODE_A).await.unwrap();

    let task = ScheduledTaskBuilder::new().build();
    repo.insert_task(&task);

    let (callback, mut rx) = capture();
    coordinator
        .dispatcher
        .execute(task.clone(), Some(callback))
        .await
        .unwrap();

    assert_eq!(coordinator.dispatcher.pending_count(), 1);
    assert!(rx.try_recv().is_err());

    assert!(coordinator
        .dispatcher
        .complete(completed_result(task.id, NODE_A)));
    let result = rx.await.unwrap();
    assert_eq!(result.status, ExecutionStatus::Completed);
    assert_eq!(coordinator.dispatcher.pending_count(), 0);

    assert!(!coordinator
        .dispatcher
        .complete(completed_result(task.id, NODE_A)));
}

#[tokio::test]
async fn test_execute_reports_failure_when_dispatch_gives_up() {
    let repo = MockTaskRepository::new();
    let sender = MockTaskSender::always_failing();
    let coordinator = coordinator(&repo, &sender);
    coordinator.load_balancer.add_node(NODE_A).await.unwrap();

    let task = ScheduledTaskBuilder::new().build();
    repo.insert_task(&task);

    let (callback, rx) = capture();
    coordinator
        .dispatcher
        .execute(task.clone(), Some(callback))
        .await
        .unwrap();

    let result = rx.await.unwrap();
    assert_eq!(result.status, ExecutionStatus::Failed);
    assert!(!result.success);
    assert_eq!(coordinator.dispatcher.pending_count(), 0);
    assert_eq!(sender.call_count(), 1);
}

#[tokio::test]
async fn test_execute_error_drops_callback() {
    let repo = MockTaskRepository::new();
    let sender = MockTaskSender::new();
    let coordinator = coordinator(&repo, &sender);

    let task = ScheduledTaskBuilder::new().build();
    repo.insert_task(&task);

    let (callback, rx) = capture();
    let result = coordinator
        .dispatcher
        .execute(task.clone(), Some(callback))
        .await;

    assert!(matches!(result, Err(SchedulerError::NoNodesAvailable)));
    assert_eq!(coordinator.dispatcher.pending_count(), 0);
    // 回调被丢弃，发送端随之关闭
    assert!(rx.await.is_err());
}

/// 首次发送时模拟Worker拒绝任务：先上报失败结果，再返回错误响应
#[derive(Default)]
struct RejectingSender {
    listener: Mutex<Option<Arc<StateListener>>>,
    calls: Mutex<Vec<String>>,
}

impl RejectingSender {
    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskSender for RejectingSender {
    async fn send_task(&self, node_address: &str, task: &ScheduledTask) -> SchedulerResult<()> {
        let first = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(node_address.to_string());
            calls.len() == 1
        };
        if !first {
            return Ok(());
        }

        let listener = self.listener.lock().unwrap().clone();
        if let Some(listener) = listener {
            listener
                .handle_status(failed_result(task.id, node_address, "不支持的任务类型: gpu"))
                .await?;
        }
        Err(SchedulerError::Network(format!(
            "节点 {node_address} 返回 HTTP 500"
        )))
    }
}

#[tokio::test]
async fn test_rejection_reported_before_response_is_handled_once() {
    let repo = MockTaskRepository::new();
    let sender = Arc::new(RejectingSender::default());
    let coordinator = Coordinator::with_sender(
        &DispatcherConfig::default(),
        Arc::new(repo.clone()),
        Arc::clone(&sender) as Arc<dyn TaskSender>,
        StrategyFactory::new(),
    )
    .unwrap();
    *sender.listener.lock().unwrap() = Some(Arc::clone(&coordinator.state_listener));
    coordinator.load_balancer.add_node(NODE_A).await.unwrap();
    coordinator.load_balancer.add_node(NODE_B).await.unwrap();

    let task = ScheduledTaskBuilder::new()
        .with_retry(RetryStrategy::Fixed, 3, 0)
        .build();
    repo.insert_task(&task);

    let outcome = coordinator.dispatcher.dispatch(&task).await.unwrap();
    assert_eq!(
        outcome,
        DispatchOutcome::Dispatched {
            node: NODE_A.to_string()
        }
    );

    // 上报已负责回退负载并重试到另一个节点，错误响应不再驱逐或重试
    assert_eq!(sender.calls(), vec![NODE_A.to_string(), NODE_B.to_string()]);
    assert!(coordinator.registry.contains(NODE_A));
    assert_eq!(coordinator.load_balancer.current_load(NODE_A).await, 0);
    assert_eq!(coordinator.load_balancer.current_load(NODE_B).await, 1);
    assert_eq!(repo.task(task.id).unwrap().current_retry_count, 1);
}

#[tokio::test]
async fn test_rejection_reported_after_response_is_ignored() {
    let repo = MockTaskRepository::new();
    let sender = MockTaskSender::failing_times(1);
    let coordinator = coordinator(&repo, &sender);
    coordinator.load_balancer.add_node(NODE_A).await.unwrap();
    coordinator.load_balancer.add_node(NODE_B).await.unwrap();

    let task = ScheduledTaskBuilder::new()
        .with_retry(RetryStrategy::Fixed, 3, 0)
        .build();
    repo.insert_task(&task);

    let (callback, mut rx) = capture();
    coordinator
        .dispatcher
        .execute(task.clone(), Some(callback))
        .await
        .unwrap();
    assert_eq!(sender.call_count(), 2);
    assert_eq!(coordinator.load_balancer.current_load(NODE_B).await, 1);

    coordinator
        .state_listener
        .handle_status(failed_result(task.id, NODE_A, "不支持的任务类型: gpu"))
        .await
        .unwrap();

    assert_eq!(sender.call_count(), 2);
    assert_eq!(coordinator.load_balancer.current_load(NODE_B).await, 1);
    assert_eq!(repo.task(task.id).unwrap().current_retry_count, 1);
    assert_eq!(coordinator.dispatcher.pending_count(), 1);
    assert!(rx.try_recv().is_err());

    coordinator
        .state_listener
        .handle_status(completed_result(task.id, NODE_B))
        .await
        .unwrap();
    assert_eq!(rx.await.unwrap().status, ExecutionStatus::Completed);
    assert_eq!(coordinator.load_balancer.current_load(NODE_B).await, 0);
}

#[tokio::test]
async fn test_execution_failure_retries_on_another_node() {
    let repo = MockTaskRepository::new();
    let sender = MockTaskSender::new();
    let coordinator = coordinator(&repo, &sender);
    coordinator.load_balancer.add_node(NODE_A).await.unwrap();
    coordinator.load_balancer.add_node(NODE_B).await.unwrap();

    let task = ScheduledTaskBuilder::new()
        .with_retry(RetryStrategy::Fixed, 3, 0)
        .build();
    repo.insert_task(&task);

    let failed = match coordinator.dispatcher.dispatch(&task).await.unwrap() {
        DispatchOutcome::Dispatched { node } => node,
        other => panic!("期望首次发送成功，实际为 {other:?}"),
    };

    coordinator
        .state_listener
        .handle_status(failed_result(task.id, &failed, "exit code 1"))
        .await
        .unwrap();

    let nodes = sender.nodes_called();
    assert_eq!(nodes.len(), 2);
    assert_ne!(nodes[1], failed);
}
