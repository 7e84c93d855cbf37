#[cfg(test)]
mod strategies_tests {
    use std::collections::HashMap;

    use crate::strategies::*;
    use cronmesh_core::{models::ScheduledTask, SchedulerError};
    use serde_json::json;

    fn create_test_task(task_type: &str) -> ScheduledTask {
        ScheduledTask::new("test_task", "*/5 * * * * *", task_type)
    }

    fn nodes(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn no_loads() -> HashMap<String, usize> {
        HashMap::new()
    }

    #[test]
    fn test_every_strategy_rejects_empty_candidates() {
        let factory = StrategyFactory::new();
        let task = create_test_task("shell");
        for name in factory.available_strategies() {
            let mut strategy = factory.create(&name).unwrap();
            let result = strategy.select_node(&[], &task, &no_loads());
            assert!(
                matches!(result, Err(SchedulerError::NoNodesAvailable)),
                "{name} 应返回 NoNodesAvailable"
            );
        }
    }

    #[test]
    fn test_round_robin_cycles_in_order() {
        let mut strategy = RoundRobinStrategy::new();
        let task = create_test_task("shell");
        let candidates = nodes(&["n1", "n2", "n3"]);

        let picks: Vec<String> = (0..6)
            .map(|_| strategy.select_node(&candidates, &task, &no_loads()).unwrap())
            .collect();
        assert_eq!(picks, nodes(&["n1", "n2", "n3", "n1", "n2", "n3"]));
    }

    #[test]
    fn test_round_robin_ignores_load() {
        let mut strategy = RoundRobinStrategy::new();
        let task = create_test_task("shell");
        let candidates = nodes(&["n1", "n2"]);
        let loads = HashMap::from([("n1".to_string(), 10), ("n2".to_string(), 0)]);

        assert_eq!(strategy.select_node(&candidates, &task, &loads).unwrap(), "n1");
        assert_eq!(strategy.select_node(&candidates, &task, &loads).unwrap(), "n2");
    }

    #[test]
    fn test_round_robin_survives_shrinking_candidates() {
        let mut strategy = RoundRobinStrategy::new();
        let task = create_test_task("shell");
        let three = nodes(&["n1", "n2", "n3"]);
        strategy.select_node(&three, &task, &no_loads()).unwrap();
        strategy.select_node(&three, &task, &no_loads()).unwrap();

        let one = nodes(&["n1"]);
        for _ in 0..5 {
            assert_eq!(strategy.select_node(&one, &task, &no_loads()).unwrap(), "n1");
        }
    }

    #[test]
    fn test_weighted_round_robin_expands_cycle() {
        let mut strategy = StrategyFactory::new().create("WeightedRoundRobin").unwrap();
        strategy.update_config(&HashMap::from([(
            "weights".to_string(),
            json!({"n1": 3, "n2": 1}),
        )]));
        let task = create_test_task("shell");
        let candidates = nodes(&["n1", "n2"]);

        let picks: Vec<String> = (0..8)
            .map(|_| strategy.select_node(&candidates, &task, &no_loads()).unwrap())
            .collect();
        assert_eq!(picks.iter().filter(|n| *n == "n1").count(), 6);
        assert_eq!(picks.iter().filter(|n| *n == "n2").count(), 2);
        assert_eq!(strategy.name(), "WeightedRoundRobin");
    }

    #[test]
    fn test_weighted_round_robin_clamps_huge_weights() {
        let mut strategy = StrategyFactory::new().create("WeightedRoundRobin").unwrap();
        strategy.update_config(&HashMap::from([(
            "weights".to_string(),
            json!({"n1": 4294967295u64, "n2": 1, "n3": "heavy"}),
        )]));
        assert_eq!(strategy.config()["weights"]["n1"], json!(MAX_NODE_WEIGHT));
        assert!(strategy.config()["weights"].get("n3").is_none());

        let task = create_test_task("shell");
        let candidates = nodes(&["n1", "n2"]);
        let rounds = MAX_NODE_WEIGHT as usize + 1;
        let picks: Vec<String> = (0..rounds)
            .map(|_| strategy.select_node(&candidates, &task, &no_loads()).unwrap())
            .collect();
        assert_eq!(picks.iter().filter(|n| *n == "n2").count(), 1);
        assert_eq!(picks.last().map(String::as_str), Some("n2"));
    }

    #[test]
    fn test_weighted_round_robin_all_zero_weights_fall_back() {
        let mut strategy = RoundRobinStrategy::weighted(HashMap::from([
            ("n1".to_string(), 0),
            ("n2".to_string(), 0),
        ]));
        let task = create_test_task("shell");
        let candidates = nodes(&["n1", "n2"]);
        let picks: Vec<String> = (0..4)
            .map(|_| strategy.select_node(&candidates, &task, &no_loads()).unwrap())
            .collect();
        assert_eq!(picks, vec!["n1", "n2", "n1", "n2"]);
    }

    #[test]
    fn test_weighted_flag_toggles_name() {
        let mut strategy = RoundRobinStrategy::new();
        assert_eq!(strategy.name(), "RoundRobin");
        strategy.update_config(&HashMap::from([("weighted".to_string(), json!(true))]));
        assert_eq!(strategy.name(), "WeightedRoundRobin");
    }

    #[test]
    fn test_least_connections_picks_minimum_first_on_tie() {
        let mut strategy = LeastConnectionsStrategy::new();
        let task = create_test_task("shell");
        let candidates = nodes(&["n1", "n2", "n3"]);

        let loads = HashMap::from([
            ("n1".to_string(), 2),
            ("n2".to_string(), 1),
            ("n3".to_string(), 1),
        ]);
        assert_eq!(strategy.select_node(&candidates, &task, &loads).unwrap(), "n2");

        let loads = HashMap::from([("n1".to_string(), 1)]);
        assert_eq!(strategy.select_node(&candidates, &task, &loads).unwrap(), "n2");

        assert_eq!(
            strategy.select_node(&candidates, &task, &no_loads()).unwrap(),
            "n1"
        );
    }

    #[test]
    fn test_random_stays_within_candidates() {
        let mut strategy = RandomStrategy::new();
        let task = create_test_task("shell");
        let candidates = nodes(&["n1", "n2", "n3"]);
        for _ in 0..50 {
            let pick = strategy.select_node(&candidates, &task, &no_loads()).unwrap();
            assert!(candidates.contains(&pick));
        }
    }

    #[test]
    fn test_affinity_maps_task_types_to_fixed_slots() {
        let mut strategy = TaskTypeAffinityStrategy::new();
        let candidates = nodes(&["n1", "n2", "n3"]);

        for _ in 0..3 {
            let cpu = create_test_task("cpu-intensive");
            let io = create_test_task("io-intensive");
            let mem = create_test_task("memory-intensive");
            assert_eq!(strategy.select_node(&candidates, &cpu, &no_loads()).unwrap(), "n1");
            assert_eq!(strategy.select_node(&candidates, &io, &no_loads()).unwrap(), "n2");
            assert_eq!(strategy.select_node(&candidates, &mem, &no_loads()).unwrap(), "n3");
        }

        let two = nodes(&["n1", "n2"]);
        let mem = create_test_task("memory-intensive");
        assert_eq!(strategy.select_node(&two, &mem, &no_loads()).unwrap(), "n1");
    }

    #[test]
    fn test_affinity_unknown_type_falls_back_to_round_robin() {
        let mut strategy = TaskTypeAffinityStrategy::new();
        let candidates = nodes(&["n1", "n2"]);
        let task = create_test_task("shell");
        assert_eq!(strategy.select_node(&candidates, &task, &no_loads()).unwrap(), "n1");
        assert_eq!(strategy.select_node(&candidates, &task, &no_loads()).unwrap(), "n2");
    }

    #[test]
    fn test_affinity_override_from_config() {
        let mut strategy = TaskTypeAffinityStrategy::new();
        strategy.update_config(&HashMap::from([
            ("affinity.cpu-intensive".to_string(), json!(["n3", "n2"])),
            ("unrelated".to_string(), json!(42)),
        ]));
        let task = create_test_task("cpu-intensive");

        let all = nodes(&["n1", "n2", "n3"]);
        assert_eq!(strategy.select_node(&all, &task, &no_loads()).unwrap(), "n3");

        let without_n3 = nodes(&["n1", "n2"]);
        assert_eq!(strategy.select_node(&without_n3, &task, &no_loads()).unwrap(), "n2");
        assert!(strategy.config().contains_key("affinity.cpu-intensive"));
    }

    #[test]
    fn test_request_ceiling_caps_and_resets() {
        let mut strategy =
            RequestCeilingStrategy::new(Box::new(LeastConnectionsStrategy::new()), 2);
        let task = create_test_task("shell");
        let candidates = nodes(&["n1", "n2"]);

        let picks: Vec<String> = (0..4)
            .map(|_| strategy.select_node(&candidates, &task, &no_loads()).unwrap())
            .collect();
        assert_eq!(picks, nodes(&["n1", "n1", "n2", "n2"]));
        assert_eq!(strategy.request_count("n1"), 2);

        // 全部饱和后重置
        assert_eq!(strategy.select_node(&candidates, &task, &no_loads()).unwrap(), "n1");
        assert_eq!(strategy.request_count("n1"), 1);
        assert_eq!(strategy.request_count("n2"), 0);
    }

    #[test]
    fn test_request_ceiling_config_forwards_to_base() {
        let factory = StrategyFactory::new();
        let config = HashMap::from([
            ("base_strategy".to_string(), json!("RoundRobin")),
            ("max_requests_per_node".to_string(), json!(1)),
            ("weighted".to_string(), json!(true)),
        ]);
        let strategy = factory.create_with_config("RequestCeiling", &config).unwrap();
        let info = strategy.info();
        assert_eq!(info.name, "RequestCeiling");
        assert_eq!(info.config["max_requests_per_node"], json!(1));
        assert_eq!(info.config["base_strategy"], json!("WeightedRoundRobin"));
    }

    #[test]
    fn test_factory_lists_and_describes_strategies() {
        let factory = StrategyFactory::new();
        let names = factory.available_strategies();
        for expected in [
            "Custom",
            "LeastConnections",
            "Random",
            "RequestCeiling",
            "RoundRobin",
            "WeightedRoundRobin",
        ] {
            assert!(names.contains(&expected.to_string()));
        }

        let info = factory.strategy_info("LeastConnections").unwrap();
        assert_eq!(info.name, "LeastConnections");
        assert!(!info.description.is_empty());

        assert!(matches!(
            factory.create("Nope"),
            Err(SchedulerError::StrategyNotFound { .. })
        ));
    }

    #[test]
    fn test_factory_runtime_registration() {
        struct FirstNode;

        impl LoadBalancingStrategy for FirstNode {
            fn name(&self) -> &str {
                "FirstNode"
            }
            fn description(&self) -> &str {
                "总是选择第一个候选"
            }
            fn select_node(
                &mut self,
                candidates: &[String],
                _task: &ScheduledTask,
                _loads: &HashMap<String, usize>,
            ) -> cronmesh_core::SchedulerResult<String> {
                candidates
                    .first()
                    .cloned()
                    .ok_or(SchedulerError::NoNodesAvailable)
            }
            fn update_config(&mut self, _config: &StrategyConfig) {}
            fn config(&self) -> StrategyConfig {
                StrategyConfig::new()
            }
        }

        let mut factory = StrategyFactory::new();
        factory.register("FirstNode", || Box::new(FirstNode));
        assert!(factory.available_strategies().contains(&"FirstNode".to_string()));

        let mut strategy = factory.create("FirstNode").unwrap();
        let task = create_test_task("shell");
        assert_eq!(
            strategy.select_node(&nodes(&["b", "a"]), &task, &no_loads()).unwrap(),
            "b"
        );
    }
}
