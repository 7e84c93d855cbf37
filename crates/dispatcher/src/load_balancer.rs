use std::collections::HashMap;
use std::sync::Arc;

use chrono::Duration;
use metrics::gauge;
use tokio::sync::Mutex;
use tracing::{debug, info};

use cronmesh_core::{models::ScheduledTask, DispatcherConfig, SchedulerError, SchedulerResult};

use crate::{
    node_registry::{validate_address, NodeRegistry},
    strategies::{LoadBalancingStrategy, StrategyConfig, StrategyFactory, StrategyInfo},
};

/// 默认心跳超时：30秒内有心跳的节点才是候选
pub const DEFAULT_HEARTBEAT_TIMEOUT_SECONDS: i64 = 30;

struct BalancerState {
    strategy: Box<dyn LoadBalancingStrategy>,
    loads: HashMap<String, usize>,
}

/// 负载均衡器
///
/// 组合节点注册表（候选发现）和负载均衡策略（选择），并独占每个节点的在途任务计数。
/// “读取候选、选择、计数递增”在同一把锁内完成，并发选择不会读到过期计数。
pub struct LoadBalancer {
    registry: Arc<NodeRegistry>,
    heartbeat_timeout: Duration,
    factory: StrategyFactory,
    state: Mutex<BalancerState>,
}

impl LoadBalancer {
    pub fn new(registry: Arc<NodeRegistry>, strategy: Box<dyn LoadBalancingStrategy>) -> Self {
        Self {
            registry,
            heartbeat_timeout: Duration::seconds(DEFAULT_HEARTBEAT_TIMEOUT_SECONDS),
            factory: StrategyFactory::new(),
            state: Mutex::new(BalancerState {
                strategy,
                loads: HashMap::new(),
            }),
        }
    }

    /// 根据分发配置创建，策略名称未知时返回 `StrategyNotFound`
    pub fn from_config(
        registry: Arc<NodeRegistry>,
        factory: StrategyFactory,
        config: &DispatcherConfig,
    ) -> SchedulerResult<Self> {
        let strategy =
            factory.create_with_config(&config.dispatch_strategy, &config.strategy_config)?;
        info!("负载均衡策略: {}", strategy.name());
        Ok(Self {
            registry,
            heartbeat_timeout: Duration::seconds(config.heartbeat_timeout_seconds as i64),
            factory,
            state: Mutex::new(BalancerState {
                strategy,
                loads: HashMap::new(),
            }),
        })
    }

    pub fn with_heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        self.heartbeat_timeout
    }

    /// 为任务选择节点，并把该节点的负载计数加一
    pub async fn select_node(&self, task: &ScheduledTask) -> SchedulerResult<String> {
        self.select_node_excluding(task, None).await
    }

    /// 选择节点时尽量避开 `excluded`；排除后没有其他候选时仍使用全部候选
    pub async fn select_node_excluding(
        &self,
        task: &ScheduledTask,
        excluded: Option<&str>,
    ) -> SchedulerResult<String> {
        if task.id.is_nil() {
            return Err(SchedulerError::invalid_argument("任务不能为空"));
        }

        let mut state = self.state.lock().await;

        let alive = self.registry.alive_nodes(self.heartbeat_timeout);
        let candidates = match excluded {
            Some(excluded) => {
                let filtered: Vec<String> =
                    alive.iter().filter(|n| *n != excluded).cloned().collect();
                if filtered.is_empty() {
                    debug!("排除节点 {} 后没有其他候选，使用全部存活节点", excluded);
                    alive
                } else {
                    filtered
                }
            }
            None => alive,
        };

        if candidates.is_empty() {
            return Err(SchedulerError::NoNodesAvailable);
        }

        let BalancerState { strategy, loads } = &mut *state;
        let node = strategy.select_node(&candidates, task, loads)?;
        let load = loads.entry(node.clone()).or_insert(0);
        *load += 1;
        gauge!("cronmesh_node_load", "node" => node.clone()).set(*load as f64);

        debug!(
            "任务 {} 选择节点 {} (策略: {}, 当前负载: {})",
            task.id,
            node,
            strategy.name(),
            load
        );
        Ok(node)
    }

    /// 节点负载减一，最小为0；未知节点为空操作
    pub async fn decrease_load(&self, address: &str) -> SchedulerResult<()> {
        let address = validate_address(address)?;
        let mut state = self.state.lock().await;
        if let Some(load) = state.loads.get_mut(address) {
            *load = load.saturating_sub(1);
            gauge!("cronmesh_node_load", "node" => address.to_string()).set(*load as f64);
            debug!("节点 {} 负载减少为 {}", address, load);
        }
        Ok(())
    }

    /// 注册节点并初始化负载计数
    pub async fn add_node(&self, address: &str) -> SchedulerResult<()> {
        let address = validate_address(address)?;
        self.registry.register(address)?;
        let mut state = self.state.lock().await;
        state.loads.entry(address.to_string()).or_insert(0);
        Ok(())
    }

    /// 从注册表和负载表中同时移除节点
    pub async fn remove_node(&self, address: &str) {
        self.registry.remove_node(address);
        let mut state = self.state.lock().await;
        state.loads.remove(address);
    }

    pub async fn get_node_loads(&self) -> HashMap<String, usize> {
        self.state.lock().await.loads.clone()
    }

    pub async fn current_load(&self, address: &str) -> usize {
        self.state
            .lock()
            .await
            .loads
            .get(address)
            .copied()
            .unwrap_or(0)
    }

    pub async fn get_strategy_info(&self) -> StrategyInfo {
        self.state.lock().await.strategy.info()
    }

    pub fn available_strategies(&self) -> Vec<String> {
        self.factory.available_strategies()
    }

    /// 运行时切换策略，负载计数保持不变
    pub async fn set_strategy(&self, name: &str, config: &StrategyConfig) -> SchedulerResult<()> {
        let strategy = self.factory.create_with_config(name, config)?;
        let mut state = self.state.lock().await;
        info!("负载均衡策略切换: {} -> {}", state.strategy.name(), strategy.name());
        state.strategy = strategy;
        Ok(())
    }

    pub async fn update_strategy_config(&self, config: &StrategyConfig) {
        self.state.lock().await.strategy.update_config(config);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategies::{LeastConnectionsStrategy, RoundRobinStrategy};
    use uuid::Uuid;

    fn balancer(strategy: Box<dyn LoadBalancingStrategy>, nodes: &[&str]) -> LoadBalancer {
        let registry = Arc::new(NodeRegistry::new());
        for node in nodes {
            registry.register(node).unwrap();
        }
        LoadBalancer::new(registry, strategy)
    }

    fn task() -> ScheduledTask {
        ScheduledTask::new("t", "*/5 * * * * *", "shell")
    }

    #[tokio::test]
    async fn test_single_node_always_selected() {
        let lb = balancer(Box::new(RoundRobinStrategy::new()), &["http://n1"]);
        let task = task();
        for _ in 0..10 {
            assert_eq!(lb.select_node(&task).await.unwrap(), "http://n1");
        }
        assert_eq!(lb.current_load("http://n1").await, 10);
    }

    #[tokio::test]
    async fn test_round_robin_alternates_between_two_nodes() {
        let lb = balancer(Box::new(RoundRobinStrategy::new()), &["http://n1", "http://n2"]);
        let task = task();
        let mut picks = Vec::new();
        for _ in 0..4 {
            picks.push(lb.select_node(&task).await.unwrap());
        }
        assert_eq!(picks, vec!["http://n1", "http://n2", "http://n1", "http://n2"]);

        lb.decrease_load("http://n1").await.unwrap();
        assert_eq!(lb.select_node(&task).await.unwrap(), "http://n1");
        assert_eq!(lb.select_node(&task).await.unwrap(), "http://n2");
    }

    #[tokio::test]
    async fn test_least_connections_refavors_decremented_node() {
        let lb = balancer(
            Box::new(LeastConnectionsStrategy::new()),
            &["http://n1", "http://n2"],
        );
        let task = task();
        assert_eq!(lb.select_node(&task).await.unwrap(), "http://n1");
        assert_eq!(lb.select_node(&task).await.unwrap(), "http://n2");

        lb.decrease_load("http://n1").await.unwrap();
        assert_eq!(lb.select_node(&task).await.unwrap(), "http://n1");
    }

    #[tokio::test]
    async fn test_no_nodes_and_nil_task() {
        let lb = balancer(Box::new(RoundRobinStrategy::new()), &[]);
        assert!(matches!(
            lb.select_node(&task()).await,
            Err(SchedulerError::NoNodesAvailable)
        ));

        let lb = balancer(Box::new(RoundRobinStrategy::new()), &["http://n1"]);
        let mut nil_task = task();
        nil_task.id = Uuid::nil();
        assert!(matches!(
            lb.select_node(&nil_task).await,
            Err(SchedulerError::InvalidArgument(_))
        ));
        assert_eq!(lb.current_load("http://n1").await, 0);
    }

    #[tokio::test]
    async fn test_decrease_load_validation_and_floor() {
        let lb = balancer(Box::new(RoundRobinStrategy::new()), &["http://n1"]);
        for address in ["", " ", "\t\n"] {
            assert!(matches!(
                lb.decrease_load(address).await,
                Err(SchedulerError::InvalidArgument(_))
            ));
        }
        lb.decrease_load("http://unknown").await.unwrap();
        assert!(lb.get_node_loads().await.is_empty());

        lb.select_node(&task()).await.unwrap();
        lb.decrease_load("http://n1").await.unwrap();
        lb.decrease_load("http://n1").await.unwrap();
        assert_eq!(lb.current_load("http://n1").await, 0);
    }

    #[tokio::test]
    async fn test_stale_nodes_are_not_candidates() {
        let registry = Arc::new(NodeRegistry::new());
        registry
            .heartbeat_at("http://old", chrono::Utc::now() - Duration::minutes(5))
            .unwrap();
        registry.register("http://fresh").unwrap();
        let lb = LoadBalancer::new(registry, Box::new(RoundRobinStrategy::new()));
        for _ in 0..3 {
            assert_eq!(lb.select_node(&task()).await.unwrap(), "http://fresh");
        }
    }

    #[tokio::test]
    async fn test_exclusion_is_a_preference() {
        let lb = balancer(Box::new(RoundRobinStrategy::new()), &["http://n1", "http://n2"]);
        let task = task();
        for _ in 0..3 {
            assert_eq!(
                lb.select_node_excluding(&task, Some("http://n1")).await.unwrap(),
                "http://n2"
            );
        }

        lb.remove_node("http://n2").await;
        assert_eq!(
            lb.select_node_excluding(&task, Some("http://n1")).await.unwrap(),
            "http://n1"
        );
    }

    #[tokio::test]
    async fn test_add_and_remove_keep_loads_in_lockstep() {
        let lb = balancer(Box::new(RoundRobinStrategy::new()), &[]);
        lb.add_node("http://n1").await.unwrap();
        lb.add_node("http://n2").await.unwrap();
        assert_eq!(lb.get_node_loads().await.len(), 2);

        let task = task();
        lb.select_node(&task).await.unwrap();
        lb.select_node(&task).await.unwrap();

        lb.remove_node("http://n2").await;
        assert!(!lb.registry().contains("http://n2"));
        assert_eq!(lb.get_node_loads().await.len(), 1);
        for _ in 0..3 {
            assert_eq!(lb.select_node(&task).await.unwrap(), "http://n1");
        }
    }

    #[tokio::test]
    async fn test_concurrent_selection_counts_every_pick() {
        let lb = Arc::new(balancer(
            Box::new(LeastConnectionsStrategy::new()),
            &["http://n1", "http://n2"],
        ));
        let handles: Vec<_> = (0..20)
            .map(|_| {
                let lb = Arc::clone(&lb);
                tokio::spawn(async move { lb.select_node(&task()).await.unwrap() })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }
        let loads = lb.get_node_loads().await;
        assert_eq!(loads["http://n1"], 10);
        assert_eq!(loads["http://n2"], 10);
    }

    #[tokio::test]
    async fn test_strategy_switch_and_info() {
        let lb = balancer(Box::new(RoundRobinStrategy::new()), &["http://n1"]);
        assert_eq!(lb.get_strategy_info().await.name, "RoundRobin");

        lb.set_strategy("LeastConnections", &StrategyConfig::new())
            .await
            .unwrap();
        assert_eq!(lb.get_strategy_info().await.name, "LeastConnections");

        assert!(matches!(
            lb.set_strategy("Unknown", &StrategyConfig::new()).await,
            Err(SchedulerError::StrategyNotFound { .. })
        ));

        lb.set_strategy("RoundRobin", &StrategyConfig::new()).await.unwrap();
        lb.update_strategy_config(&StrategyConfig::from([(
            "weighted".to_string(),
            serde_json::json!(true),
        )]))
        .await;
        assert_eq!(lb.get_strategy_info().await.name, "WeightedRoundRobin");
    }

    #[tokio::test]
    async fn test_from_config_uses_named_strategy() {
        let mut config = DispatcherConfig::default();
        config.dispatch_strategy = "Random".to_string();
        config.heartbeat_timeout_seconds = 10;
        let lb = LoadBalancer::from_config(
            Arc::new(NodeRegistry::new()),
            StrategyFactory::new(),
            &config,
        )
        .unwrap();
        assert_eq!(lb.get_strategy_info().await.name, "Random");
        assert_eq!(lb.heartbeat_timeout(), Duration::seconds(10));

        config.dispatch_strategy = "Missing".to_string();
        assert!(LoadBalancer::from_config(
            Arc::new(NodeRegistry::new()),
            StrategyFactory::new(),
            &config
        )
        .is_err());
    }
}
