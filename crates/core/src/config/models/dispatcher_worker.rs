use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// 重试退避上限允许配置的最大值（7天）
pub const MAX_BACKOFF_LIMIT_SECONDS: u64 = 7 * 24 * 3600;

/// 协调节点（调度+分发）配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// 节点心跳超时，超过该时长未心跳的节点不参与选择
    pub heartbeat_timeout_seconds: u64,
    /// 负载均衡策略名称，见 `StrategyFactory::available_strategies`
    pub dispatch_strategy: String,
    /// 传给策略的配置项，未识别的键会被忽略
    pub strategy_config: HashMap<String, serde_json::Value>,
    /// 发送任务到Worker的请求超时
    pub request_timeout_seconds: u64,
    /// 重试退避上限
    pub max_backoff_seconds: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout_seconds: 30,
            dispatch_strategy: "RoundRobin".to_string(),
            strategy_config: HashMap::new(),
            request_timeout_seconds: 10,
            max_backoff_seconds: 3600,
        }
    }
}

impl DispatcherConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.heartbeat_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("心跳超时时间必须大于0"));
        }

        if self.dispatch_strategy.trim().is_empty() {
            return Err(anyhow::anyhow!("调度策略不能为空"));
        }

        if self.request_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("请求超时时间必须大于0"));
        }

        if self.max_backoff_seconds == 0 {
            return Err(anyhow::anyhow!("最大退避间隔必须大于0"));
        }

        if self.max_backoff_seconds > MAX_BACKOFF_LIMIT_SECONDS {
            return Err(anyhow::anyhow!(
                "最大退避间隔不能超过 {} 秒，实际为 {}",
                MAX_BACKOFF_LIMIT_SECONDS,
                self.max_backoff_seconds
            ));
        }

        Ok(())
    }
}

/// Worker节点配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// 本节点对外地址，也是注册到协调节点的节点标识
    pub address: String,
    /// 协调节点地址
    pub coordinator_url: String,
    /// 本节点执行接口监听地址
    pub bind_address: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            address: "http://127.0.0.1:9090".to_string(),
            coordinator_url: "http://127.0.0.1:8080".to_string(),
            bind_address: "0.0.0.0:9090".to_string(),
        }
    }
}

impl WorkerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.address.trim().is_empty() {
            return Err(anyhow::anyhow!("Worker地址不能为空"));
        }

        if !self.address.starts_with("http://") && !self.address.starts_with("https://") {
            return Err(anyhow::anyhow!("Worker地址格式无效: {}", self.address));
        }

        if self.coordinator_url.trim().is_empty() {
            return Err(anyhow::anyhow!("协调节点地址不能为空"));
        }

        if self.bind_address.trim().is_empty() {
            return Err(anyhow::anyhow!("监听地址不能为空"));
        }

        Ok(())
    }
}
