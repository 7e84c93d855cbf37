use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info};

use cronmesh_core::{models::TaskExecutionResult, SchedulerError, SchedulerResult};

use super::task_execution::StatusReporter;

/// Worker到协调节点的注册与心跳
#[async_trait]
pub trait CoordinatorLink: Send + Sync {
    async fn register(&self) -> SchedulerResult<()>;
    async fn send_heartbeat(&self) -> SchedulerResult<()>;
}

/// 协调节点的HTTP客户端
pub struct DispatcherClient {
    coordinator_url: String,
    worker_address: String,
    http_client: reqwest::Client,
}

impl DispatcherClient {
    pub fn new(
        coordinator_url: &str,
        worker_address: &str,
        request_timeout: Duration,
    ) -> SchedulerResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| SchedulerError::Network(format!("创建HTTP客户端失败: {e}")))?;
        Ok(Self {
            coordinator_url: coordinator_url.trim_end_matches('/').to_string(),
            worker_address: worker_address.to_string(),
            http_client,
        })
    }

    pub fn coordinator_url(&self) -> &str {
        &self.coordinator_url
    }

    pub fn worker_address(&self) -> &str {
        &self.worker_address
    }

    /// 上报一次执行结果
    pub async fn report_status(&self, result: &TaskExecutionResult) -> SchedulerResult<()> {
        self.post("/api/task/status", result).await?;
        debug!("任务 {} 的状态 {:?} 已上报", result.task_id, result.status);
        Ok(())
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> SchedulerResult<()> {
        let url = format!("{}{}", self.coordinator_url, path);
        let response = self
            .http_client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| SchedulerError::Network(format!("连接协调节点 {url} 失败: {e}")))?;

        if response.status().is_success() {
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(SchedulerError::Network(format!(
                "请求 {url} 失败: HTTP {status} - {body}"
            )))
        }
    }
}

#[async_trait]
impl CoordinatorLink for DispatcherClient {
    async fn register(&self) -> SchedulerResult<()> {
        self.post("/api/worker/register", &self.worker_address)
            .await?;
        info!(
            "Worker {} 已注册到协调节点 {}",
            self.worker_address, self.coordinator_url
        );
        Ok(())
    }

    async fn send_heartbeat(&self) -> SchedulerResult<()> {
        self.post("/api/worker/heartbeat", &self.worker_address)
            .await?;
        debug!("Worker {} 心跳已发送", self.worker_address);
        Ok(())
    }
}

#[async_trait]
impl StatusReporter for DispatcherClient {
    async fn report(&self, result: &TaskExecutionResult) -> SchedulerResult<()> {
        self.report_status(result).await
    }
}
