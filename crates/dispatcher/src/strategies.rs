use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use cronmesh_core::{models::ScheduledTask, SchedulerError, SchedulerResult};

/// 策略配置，键未识别时忽略
pub type StrategyConfig = HashMap<String, Value>;

/// 策略描述信息
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StrategyInfo {
    pub name: String,
    pub description: String,
    pub config: StrategyConfig,
}

/// 负载均衡策略
///
/// 从候选节点中选出一个节点。调用方（负载均衡器）在同一把锁内完成
/// “选择 + 负载计数递增”，因此这里可以使用 `&mut self` 维护游标等状态。
pub trait LoadBalancingStrategy: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// 选择节点；候选为空时返回 `NoNodesAvailable`
    fn select_node(
        &mut self,
        candidates: &[String],
        task: &ScheduledTask,
        loads: &HashMap<String, usize>,
    ) -> SchedulerResult<String>;

    /// 应用配置，未识别的键被忽略
    fn update_config(&mut self, config: &StrategyConfig);

    fn config(&self) -> StrategyConfig;

    fn info(&self) -> StrategyInfo {
        StrategyInfo {
            name: self.name().to_string(),
            description: self.description().to_string(),
            config: self.config(),
        }
    }
}

fn ensure_candidates(candidates: &[String]) -> SchedulerResult<()> {
    if candidates.is_empty() {
        debug!("没有可用的Worker节点");
        return Err(SchedulerError::NoNodesAvailable);
    }
    Ok(())
}

/// 单个节点允许的最大权重，超出时截断
pub const MAX_NODE_WEIGHT: u32 = 1000;

fn clamp_weight(node: &str, weight: u64) -> u32 {
    if weight > MAX_NODE_WEIGHT as u64 {
        warn!(
            "节点 {} 的权重 {} 超过上限，按 {} 处理",
            node, weight, MAX_NODE_WEIGHT
        );
        MAX_NODE_WEIGHT
    } else {
        weight as u32
    }
}

/// 轮询策略，配置 `weighted = true` 和 `weights` 后即为加权轮询
#[derive(Debug, Default)]
pub struct RoundRobinStrategy {
    cursor: usize,
    weighted: bool,
    weights: HashMap<String, u32>,
}

impl RoundRobinStrategy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn weighted(weights: HashMap<String, u32>) -> Self {
        let weights = weights
            .into_iter()
            .map(|(node, weight)| {
                let weight = clamp_weight(&node, weight as u64);
                (node, weight)
            })
            .collect();
        Self {
            cursor: 0,
            weighted: true,
            weights,
        }
    }

    fn weight_of(&self, node: &str) -> u64 {
        self.weights.get(node).copied().unwrap_or(1) as u64
    }

    /// 在一轮周期中定位第 `position` 个位置；权重为 W 的节点在周期中连续占 W 个位置
    ///
    /// 返回候选下标和周期长度。非加权或权重全为0时周期即候选列表本身。
    fn locate(&self, candidates: &[String], position: usize) -> (usize, u64) {
        let total: u64 = if self.weighted {
            candidates.iter().map(|node| self.weight_of(node)).sum()
        } else {
            0
        };
        if total == 0 {
            let len = candidates.len();
            return (position % len, len as u64);
        }

        let mut offset = position as u64 % total;
        for (index, node) in candidates.iter().enumerate() {
            let weight = self.weight_of(node);
            if offset < weight {
                return (index, total);
            }
            offset -= weight;
        }
        (candidates.len() - 1, total)
    }
}

impl LoadBalancingStrategy for RoundRobinStrategy {
    fn name(&self) -> &str {
        if self.weighted {
            "WeightedRoundRobin"
        } else {
            "RoundRobin"
        }
    }

    fn description(&self) -> &str {
        if self.weighted {
            "按权重展开的轮询，权重为W的节点每轮被选中W次"
        } else {
            "按稳定顺序依次选择候选节点"
        }
    }

    fn select_node(
        &mut self,
        candidates: &[String],
        _task: &ScheduledTask,
        _loads: &HashMap<String, usize>,
    ) -> SchedulerResult<String> {
        ensure_candidates(candidates)?;
        // 游标只递增，每次按当前周期长度取模，候选集缩小时不会越界
        let (index, cycle_len) = self.locate(candidates, self.cursor);
        self.cursor = self.cursor.wrapping_add(1);
        let selected = candidates[index].clone();

        debug!(
            "轮询策略选择节点: {} (游标: {}, 周期: {})",
            selected,
            self.cursor.wrapping_sub(1),
            cycle_len
        );
        Ok(selected)
    }

    fn update_config(&mut self, config: &StrategyConfig) {
        if let Some(value) = config.get("weighted") {
            match value.as_bool() {
                Some(weighted) => self.weighted = weighted,
                None => warn!("忽略无效的 weighted 配置: {}", value),
            }
        }
        if let Some(value) = config.get("weights") {
            match value.as_object() {
                Some(map) => {
                    self.weights = map
                        .iter()
                        .filter_map(|(node, weight)| match weight.as_u64() {
                            Some(w) => Some((node.clone(), clamp_weight(node, w))),
                            None => {
                                warn!("忽略节点 {} 的无效权重: {}", node, weight);
                                None
                            }
                        })
                        .collect();
                }
                None => warn!("忽略无效的 weights 配置: {}", value),
            }
        }
    }

    fn config(&self) -> StrategyConfig {
        let mut config = StrategyConfig::new();
        config.insert("weighted".to_string(), json!(self.weighted));
        if !self.weights.is_empty() {
            config.insert("weights".to_string(), json!(self.weights));
        }
        config
    }
}

/// 最少连接策略，负载相同时取候选顺序中的第一个
#[derive(Debug, Default)]
pub struct LeastConnectionsStrategy;

impl LeastConnectionsStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl LoadBalancingStrategy for LeastConnectionsStrategy {
    fn name(&self) -> &str {
        "LeastConnections"
    }

    fn description(&self) -> &str {
        "选择当前在途任务最少的节点"
    }

    fn select_node(
        &mut self,
        candidates: &[String],
        _task: &ScheduledTask,
        loads: &HashMap<String, usize>,
    ) -> SchedulerResult<String> {
        ensure_candidates(candidates)?;
        let selected = candidates
            .iter()
            .min_by_key(|node| loads.get(*node).copied().unwrap_or(0))
            .ok_or(SchedulerError::NoNodesAvailable)?;

        debug!(
            "最少连接策略选择节点: {} (负载: {})",
            selected,
            loads.get(selected).copied().unwrap_or(0)
        );
        Ok(selected.clone())
    }

    fn update_config(&mut self, _config: &StrategyConfig) {}

    fn config(&self) -> StrategyConfig {
        StrategyConfig::new()
    }
}

/// 随机策略
#[derive(Debug, Default)]
pub struct RandomStrategy;

impl RandomStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl LoadBalancingStrategy for RandomStrategy {
    fn name(&self) -> &str {
        "Random"
    }

    fn description(&self) -> &str {
        "在候选节点中均匀随机选择"
    }

    fn select_node(
        &mut self,
        candidates: &[String],
        _task: &ScheduledTask,
        _loads: &HashMap<String, usize>,
    ) -> SchedulerResult<String> {
        ensure_candidates(candidates)?;
        let index = rand::rng().random_range(0..candidates.len());
        debug!("随机策略选择节点: {}", candidates[index]);
        Ok(candidates[index].clone())
    }

    fn update_config(&mut self, _config: &StrategyConfig) {}

    fn config(&self) -> StrategyConfig {
        StrategyConfig::new()
    }
}

/// 任务类型亲和策略
///
/// `cpu-intensive`、`io-intensive`、`memory-intensive` 分别固定映射到候选列表的
/// 第0、1、2个位置（按候选数取模）；可通过 `affinity.<类型> = [地址...]` 覆盖。
/// 其他任务类型退化为轮询。
#[derive(Debug, Default)]
pub struct TaskTypeAffinityStrategy {
    affinity: HashMap<String, Vec<String>>,
    fallback: RoundRobinStrategy,
}

const AFFINITY_SLOTS: [(&str, usize); 3] = [
    ("cpu-intensive", 0),
    ("io-intensive", 1),
    ("memory-intensive", 2),
];

impl TaskTypeAffinityStrategy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LoadBalancingStrategy for TaskTypeAffinityStrategy {
    fn name(&self) -> &str {
        "Custom"
    }

    fn description(&self) -> &str {
        "按任务类型的节点亲和表选择，未知类型退化为轮询"
    }

    fn select_node(
        &mut self,
        candidates: &[String],
        task: &ScheduledTask,
        loads: &HashMap<String, usize>,
    ) -> SchedulerResult<String> {
        ensure_candidates(candidates)?;

        if let Some(preferred) = self.affinity.get(&task.task_type) {
            if let Some(node) = preferred.iter().find(|node| candidates.contains(*node)) {
                debug!("任务类型 {} 命中亲和配置节点: {}", task.task_type, node);
                return Ok(node.clone());
            }
        }

        if let Some((_, slot)) = AFFINITY_SLOTS
            .iter()
            .find(|(task_type, _)| *task_type == task.task_type)
        {
            let node = &candidates[slot % candidates.len()];
            debug!("任务类型 {} 映射到固定节点: {}", task.task_type, node);
            return Ok(node.clone());
        }

        debug!("任务类型 {} 无亲和配置，使用轮询", task.task_type);
        self.fallback.select_node(candidates, task, loads)
    }

    fn update_config(&mut self, config: &StrategyConfig) {
        for (key, value) in config {
            let Some(task_type) = key.strip_prefix("affinity.") else {
                continue;
            };
            match value.as_array() {
                Some(nodes) => {
                    let nodes = nodes
                        .iter()
                        .filter_map(|n| n.as_str().map(str::to_string))
                        .collect();
                    self.affinity.insert(task_type.to_string(), nodes);
                }
                None => warn!("忽略无效的亲和配置 {}: {}", key, value),
            }
        }
    }

    fn config(&self) -> StrategyConfig {
        self.affinity
            .iter()
            .map(|(task_type, nodes)| (format!("affinity.{task_type}"), json!(nodes)))
            .collect()
    }
}

/// 单节点请求上限装饰器
///
/// 包装任意基础策略，每个节点累计被选中的次数不超过 `max_requests_per_node`；
/// 所有候选都达到上限时清零全部计数。
pub struct RequestCeilingStrategy {
    inner: Box<dyn LoadBalancingStrategy>,
    max_requests_per_node: usize,
    request_counts: HashMap<String, usize>,
    description: String,
}

impl RequestCeilingStrategy {
    pub const DEFAULT_MAX_REQUESTS: usize = 100;

    pub fn new(inner: Box<dyn LoadBalancingStrategy>, max_requests_per_node: usize) -> Self {
        let description = format!("为 {} 策略增加单节点请求上限，全部饱和时重置", inner.name());
        Self {
            inner,
            max_requests_per_node: max_requests_per_node.max(1),
            request_counts: HashMap::new(),
            description,
        }
    }

    pub fn request_count(&self, node: &str) -> usize {
        self.request_counts.get(node).copied().unwrap_or(0)
    }
}

impl LoadBalancingStrategy for RequestCeilingStrategy {
    fn name(&self) -> &str {
        "RequestCeiling"
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn select_node(
        &mut self,
        candidates: &[String],
        task: &ScheduledTask,
        loads: &HashMap<String, usize>,
    ) -> SchedulerResult<String> {
        ensure_candidates(candidates)?;

        let mut eligible: Vec<String> = candidates
            .iter()
            .filter(|node| self.request_count(node) < self.max_requests_per_node)
            .cloned()
            .collect();

        if eligible.is_empty() {
            info!(
                "所有节点均达到请求上限 {}，重置请求计数",
                self.max_requests_per_node
            );
            self.request_counts.clear();
            eligible = candidates.to_vec();
        }

        let selected = self.inner.select_node(&eligible, task, loads)?;
        *self.request_counts.entry(selected.clone()).or_insert(0) += 1;
        Ok(selected)
    }

    fn update_config(&mut self, config: &StrategyConfig) {
        if let Some(value) = config.get("max_requests_per_node") {
            match value.as_u64() {
                Some(max) if max > 0 => self.max_requests_per_node = max as usize,
                _ => warn!("忽略无效的 max_requests_per_node 配置: {}", value),
            }
        }
        self.inner.update_config(config);
    }

    fn config(&self) -> StrategyConfig {
        let mut config = self.inner.config();
        config.insert(
            "max_requests_per_node".to_string(),
            json!(self.max_requests_per_node),
        );
        config.insert("base_strategy".to_string(), json!(self.inner.name()));
        config
    }
}

type StrategyConstructor = Arc<dyn Fn() -> Box<dyn LoadBalancingStrategy> + Send + Sync>;

/// 策略工厂：名称 → 构造函数，支持运行时注册
#[derive(Clone)]
pub struct StrategyFactory {
    constructors: HashMap<String, StrategyConstructor>,
}

impl Default for StrategyFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl StrategyFactory {
    /// 创建包含内置策略的工厂
    pub fn new() -> Self {
        let mut factory = Self {
            constructors: HashMap::new(),
        };
        factory.register("RoundRobin", || Box::new(RoundRobinStrategy::new()));
        factory.register("WeightedRoundRobin", || {
            Box::new(RoundRobinStrategy::weighted(HashMap::new()))
        });
        factory.register("LeastConnections", || Box::new(LeastConnectionsStrategy::new()));
        factory.register("Random", || Box::new(RandomStrategy::new()));
        factory.register("Custom", || Box::new(TaskTypeAffinityStrategy::new()));
        factory.register("RequestCeiling", || {
            Box::new(RequestCeilingStrategy::new(
                Box::new(RoundRobinStrategy::new()),
                RequestCeilingStrategy::DEFAULT_MAX_REQUESTS,
            ))
        });
        factory
    }

    /// 注册新策略，同名时覆盖
    pub fn register<F>(&mut self, name: &str, constructor: F)
    where
        F: Fn() -> Box<dyn LoadBalancingStrategy> + Send + Sync + 'static,
    {
        if self
            .constructors
            .insert(name.to_string(), Arc::new(constructor))
            .is_some()
        {
            warn!("策略 {} 已存在，覆盖原有实现", name);
        }
    }

    pub fn create(&self, name: &str) -> SchedulerResult<Box<dyn LoadBalancingStrategy>> {
        self.constructors
            .get(name)
            .map(|constructor| constructor())
            .ok_or_else(|| SchedulerError::StrategyNotFound {
                name: name.to_string(),
            })
    }

    /// 创建策略并应用配置
    ///
    /// `RequestCeiling` 可通过 `base_strategy` 指定被包装的基础策略。
    pub fn create_with_config(
        &self,
        name: &str,
        config: &StrategyConfig,
    ) -> SchedulerResult<Box<dyn LoadBalancingStrategy>> {
        let base = config.get("base_strategy").and_then(Value::as_str);
        let mut strategy: Box<dyn LoadBalancingStrategy> = match (name, base) {
            ("RequestCeiling", Some(base)) => {
                if base == "RequestCeiling" {
                    return Err(SchedulerError::invalid_argument(
                        "RequestCeiling 不能包装自身",
                    ));
                }
                Box::new(RequestCeilingStrategy::new(
                    self.create(base)?,
                    RequestCeilingStrategy::DEFAULT_MAX_REQUESTS,
                ))
            }
            _ => self.create(name)?,
        };
        strategy.update_config(config);
        Ok(strategy)
    }

    pub fn available_strategies(&self) -> Vec<String> {
        let mut names: Vec<String> = self.constructors.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn strategy_info(&self, name: &str) -> SchedulerResult<StrategyInfo> {
        Ok(self.create(name)?.info())
    }
}
