use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use tracing::{debug, info};

use cronmesh_core::{SchedulerError, SchedulerResult};

/// Worker节点注册表
///
/// 保存 节点地址 → 最后心跳时间。存活只是查询时的过滤条件，
/// 注册表本身不会过期删除节点，节点只在分发失败或管理操作时被移除。
#[derive(Debug, Default)]
pub struct NodeRegistry {
    nodes: DashMap<String, DateTime<Utc>>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册节点，效果与心跳相同
    pub fn register(&self, address: &str) -> SchedulerResult<()> {
        self.heartbeat_at(address, Utc::now())
    }

    /// 刷新节点心跳，未知节点会被隐式注册
    pub fn heartbeat(&self, address: &str) -> SchedulerResult<()> {
        self.heartbeat_at(address, Utc::now())
    }

    /// 以指定时间刷新心跳
    pub fn heartbeat_at(&self, address: &str, at: DateTime<Utc>) -> SchedulerResult<()> {
        let address = validate_address(address)?;
        if self.nodes.insert(address.to_string(), at).is_none() {
            info!("Worker节点已注册: {}", address);
        } else {
            debug!("Worker节点心跳: {}", address);
        }
        Ok(())
    }

    /// 获取在 `max_age` 内有过心跳的节点，按地址排序
    ///
    /// 按整秒比较，边界包含在内（`now - last_seen <= max_age`）。
    pub fn alive_nodes(&self, max_age: Duration) -> Vec<String> {
        self.alive_nodes_at(max_age, Utc::now())
    }

    pub fn alive_nodes_at(&self, max_age: Duration, now: DateTime<Utc>) -> Vec<String> {
        let max_age_secs = max_age.num_seconds();
        let mut alive: Vec<String> = self
            .nodes
            .iter()
            .filter(|entry| (now - *entry.value()).num_seconds() <= max_age_secs)
            .map(|entry| entry.key().clone())
            .collect();
        alive.sort();
        alive
    }

    /// 移除节点，不存在时为空操作
    pub fn remove_node(&self, address: &str) -> bool {
        let removed = self.nodes.remove(address).is_some();
        if removed {
            info!("Worker节点已从注册表移除: {}", address);
        }
        removed
    }

    pub fn contains(&self, address: &str) -> bool {
        self.nodes.contains_key(address)
    }

    pub fn last_seen(&self, address: &str) -> Option<DateTime<Utc>> {
        self.nodes.get(address).map(|entry| *entry.value())
    }

    /// 全部已知节点及其最后心跳时间
    pub fn snapshot(&self) -> Vec<(String, DateTime<Utc>)> {
        let mut nodes: Vec<_> = self
            .nodes
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        nodes.sort_by(|a, b| a.0.cmp(&b.0));
        nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

pub(crate) fn validate_address(address: &str) -> SchedulerResult<&str> {
    let trimmed = address.trim();
    if trimmed.is_empty() {
        return Err(SchedulerError::invalid_argument("节点地址不能为空"));
    }
    Ok(trimmed)
}
