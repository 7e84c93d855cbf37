use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::info;

use cronmesh_core::{SchedulerResult, WorkerConfig};

use crate::components::{
    CoordinatorLink, DispatcherClient, HeartbeatManager, StatusReporter, TaskExecutionService,
};
use crate::executor_factory::JobHandlerRegistry;

/// Worker到协调节点的请求超时
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Worker节点服务
///
/// 组合协调节点客户端、任务执行服务和心跳发送器。HTTP入口由API层提供，
/// 收到的任务交给 `execution()`。
pub struct WorkerService {
    address: String,
    hostname: String,
    execution: Arc<TaskExecutionService>,
    heartbeat: HeartbeatManager,
}

impl WorkerService {
    pub fn new(config: &WorkerConfig, registry: Arc<JobHandlerRegistry>) -> SchedulerResult<Self> {
        let client = Arc::new(DispatcherClient::new(
            &config.coordinator_url,
            &config.address,
            REQUEST_TIMEOUT,
        )?);
        let execution = Arc::new(TaskExecutionService::new(
            &config.address,
            registry,
            Arc::clone(&client) as Arc<dyn StatusReporter>,
        ));
        let heartbeat = HeartbeatManager::new(client as Arc<dyn CoordinatorLink>);

        let hostname = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "unknown".to_string());

        Ok(Self {
            address: config.address.clone(),
            hostname,
            execution,
            heartbeat,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn execution(&self) -> &Arc<TaskExecutionService> {
        &self.execution
    }

    /// 启动心跳，返回后台任务句柄
    pub fn start(&self, shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        info!(
            "Worker {} 启动 (主机: {})，心跳间隔 {:?}",
            self.address,
            self.hostname,
            crate::components::HEARTBEAT_INTERVAL
        );
        self.heartbeat.start(shutdown_rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_service_uses_configured_address() {
        let config = WorkerConfig {
            address: "http://worker-7:9090".to_string(),
            coordinator_url: "http://127.0.0.1:1".to_string(),
            ..WorkerConfig::default()
        };
        let registry = Arc::new(JobHandlerRegistry::with_defaults().await);
        let service = WorkerService::new(&config, registry).unwrap();

        assert_eq!(service.address(), "http://worker-7:9090");
        assert_eq!(service.execution().worker_address(), "http://worker-7:9090");
        assert!(!service.hostname().is_empty());
        assert!(service.execution().registry().contains("shell").await);
    }

    #[tokio::test]
    async fn test_heartbeat_stops_on_shutdown() {
        let config = WorkerConfig {
            coordinator_url: "http://127.0.0.1:1".to_string(),
            ..WorkerConfig::default()
        };
        let service =
            WorkerService::new(&config, Arc::new(JobHandlerRegistry::new())).unwrap();
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let handle = service.start(shutdown_rx);
        shutdown_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
