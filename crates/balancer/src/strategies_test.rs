use std::collections::HashMap;

use orchestrator_core::traits::{BalancerCandidate, LoadBalancingStrategy};
use orchestrator_errors::OrchestratorError;

use crate::strategies::*;

fn candidate(id: &str, weight: u32, connections: u32) -> BalancerCandidate {
    BalancerCandidate {
        worker_id: id.to_string(),
        base_url: format!("http://{id}.local"),
        weight,
        current_connections: connections,
        priority: 0,
    }
}

#[tokio::test]
async fn test_round_robin_cycles_in_order() {
    let strategy = RoundRobinStrategy::new();
    let pool = vec![
        candidate("A", 100, 0),
        candidate("B", 100, 0),
        candidate("C", 100, 0),
    ];

    let mut picks = Vec::new();
    for _ in 0..6 {
        picks.push(strategy.select_worker(&pool).await.unwrap().unwrap());
    }
    assert_eq!(picks, vec!["A", "B", "C", "A", "B", "C"]);
}

#[tokio::test]
async fn test_round_robin_empty_pool() {
    let strategy = RoundRobinStrategy::new();
    assert!(strategy.select_worker(&[]).await.unwrap().is_none());
}

#[tokio::test]
async fn test_round_robin_index_survives_pool_change() {
    let strategy = RoundRobinStrategy::new();
    let full = vec![
        candidate("A", 100, 0),
        candidate("B", 100, 0),
        candidate("C", 100, 0),
    ];
    strategy.select_worker(&full).await.unwrap(); // A, 下标变为1
    strategy.select_worker(&full).await.unwrap(); // B, 下标变为2

    // 池缩小后下标不重置：2 % 2 == 0，回到A——可能跳过成员，既定行为
    let shrunk = vec![candidate("A", 100, 0), candidate("B", 100, 0)];
    let pick = strategy.select_worker(&shrunk).await.unwrap().unwrap();
    assert_eq!(pick, "A");
}

#[tokio::test]
async fn test_least_connections_picks_minimum() {
    let strategy = LeastConnectionsStrategy::new();
    let pool = vec![
        candidate("A", 100, 4),
        candidate("B", 100, 1),
        candidate("C", 100, 3),
    ];
    let pick = strategy.select_worker(&pool).await.unwrap().unwrap();
    assert_eq!(pick, "B");
}

#[tokio::test]
async fn test_health_aware_prefers_idle_worker() {
    let strategy = HealthAwareStrategy::new();
    // A: 100 / max(1,0) = 100, B: 100 / 5 = 20
    let pool = vec![candidate("A", 100, 0), candidate("B", 100, 5)];
    let pick = strategy.select_worker(&pool).await.unwrap().unwrap();
    assert_eq!(pick, "A");
}

#[tokio::test]
async fn test_health_aware_tie_breaks_by_input_order() {
    let strategy = HealthAwareStrategy::new();
    let pool = vec![candidate("A", 100, 2), candidate("B", 100, 2)];
    let pick = strategy.select_worker(&pool).await.unwrap().unwrap();
    assert_eq!(pick, "A");
}

#[tokio::test]
async fn test_weighted_distribution_converges() {
    let strategy = WeightedStrategy::new();
    let pool = vec![candidate("A", 80, 0), candidate("B", 20, 0)];

    let mut counts: HashMap<String, u32> = HashMap::new();
    for _ in 0..2000 {
        let pick = strategy.select_worker(&pool).await.unwrap().unwrap();
        *counts.entry(pick).or_insert(0) += 1;
    }

    let a = *counts.get("A").unwrap_or(&0) as f64 / 2000.0;
    // 80/20抽样，留出抽样误差余量
    assert!(a > 0.72 && a < 0.88, "A占比失真: {a}");
}

#[tokio::test]
async fn test_create_strategy_rejects_unknown_name() {
    let err = create_strategy("fastest-first").unwrap_err();
    assert!(matches!(err, OrchestratorError::Validation(_)));

    for name in ["round-robin", "least-connections", "weighted", "health-aware"] {
        assert_eq!(create_strategy(name).unwrap().name(), name);
    }
}
