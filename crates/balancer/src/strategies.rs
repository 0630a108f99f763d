use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use rand::Rng;
use tracing::debug;

use orchestrator_core::traits::{BalancerCandidate, LoadBalancingStrategy};
use orchestrator_errors::{OrchestratorError, OrchestratorResult};

/// 轮询策略。单个旋转下标由该策略实例的所有调用共享；
/// 候选池构成变化时下标不重置，可能跳过或重复个别成员——
/// 这是文档化的既定行为。
#[derive(Debug)]
pub struct RoundRobinStrategy {
    counter: AtomicUsize,
}

impl RoundRobinStrategy {
    pub fn new() -> Self {
        Self {
            counter: AtomicUsize::new(0),
        }
    }
}

impl Default for RoundRobinStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LoadBalancingStrategy for RoundRobinStrategy {
    async fn select_worker(
        &self,
        candidates: &[BalancerCandidate],
    ) -> OrchestratorResult<Option<String>> {
        if candidates.is_empty() {
            return Ok(None);
        }
        let index = self.counter.fetch_add(1, Ordering::Relaxed) % candidates.len();
        let selected = &candidates[index];
        debug!(
            worker_id = %selected.worker_id,
            index,
            pool = candidates.len(),
            "轮询策略选择Worker"
        );
        Ok(Some(selected.worker_id.clone()))
    }

    fn name(&self) -> &str {
        "round-robin"
    }
}

/// 最少连接策略：当前连接数最小者胜出，平局取靠前者
#[derive(Debug)]
pub struct LeastConnectionsStrategy;

impl LeastConnectionsStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl Default for LeastConnectionsStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LoadBalancingStrategy for LeastConnectionsStrategy {
    async fn select_worker(
        &self,
        candidates: &[BalancerCandidate],
    ) -> OrchestratorResult<Option<String>> {
        let selected = candidates.iter().min_by_key(|c| c.current_connections);
        Ok(selected.map(|c| c.worker_id.clone()))
    }

    fn name(&self) -> &str {
        "least-connections"
    }
}

/// 加权随机策略：按声明权重成比例抽取，未声明时权重100
#[derive(Debug)]
pub struct WeightedStrategy;

impl WeightedStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl Default for WeightedStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LoadBalancingStrategy for WeightedStrategy {
    async fn select_worker(
        &self,
        candidates: &[BalancerCandidate],
    ) -> OrchestratorResult<Option<String>> {
        if candidates.is_empty() {
            return Ok(None);
        }
        let total: u64 = candidates.iter().map(|c| c.weight as u64).sum();
        if total == 0 {
            return Ok(Some(candidates[0].worker_id.clone()));
        }
        let mut draw = rand::rng().random_range(0..total);
        for candidate in candidates {
            let weight = candidate.weight as u64;
            if draw < weight {
                return Ok(Some(candidate.worker_id.clone()));
            }
            draw -= weight;
        }
        // 数值边界兜底
        Ok(Some(candidates[candidates.len() - 1].worker_id.clone()))
    }

    fn name(&self) -> &str {
        "weighted"
    }
}

/// 健康感知策略（默认）：得分 = weight / max(1, connections)，
/// 取最大者，平局按输入顺序取先出现者
#[derive(Debug)]
pub struct HealthAwareStrategy;

impl HealthAwareStrategy {
    pub fn new() -> Self {
        Self
    }
}

impl Default for HealthAwareStrategy {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LoadBalancingStrategy for HealthAwareStrategy {
    async fn select_worker(
        &self,
        candidates: &[BalancerCandidate],
    ) -> OrchestratorResult<Option<String>> {
        let mut best: Option<&BalancerCandidate> = None;
        let mut best_score = f64::MIN;
        for candidate in candidates {
            let score = candidate.health_score();
            // 严格大于：平局保留先出现的候选
            if score > best_score {
                best_score = score;
                best = Some(candidate);
            }
        }
        Ok(best.map(|c| c.worker_id.clone()))
    }

    fn name(&self) -> &str {
        "health-aware"
    }
}

/// 按名称构造策略。策略集合是封闭的，未知名称返回ValidationError。
pub fn create_strategy(name: &str) -> OrchestratorResult<Arc<dyn LoadBalancingStrategy>> {
    match name {
        "round-robin" => Ok(Arc::new(RoundRobinStrategy::new())),
        "least-connections" => Ok(Arc::new(LeastConnectionsStrategy::new())),
        "weighted" => Ok(Arc::new(WeightedStrategy::new())),
        "health-aware" => Ok(Arc::new(HealthAwareStrategy::new())),
        other => Err(OrchestratorError::validation(format!(
            "未知的负载均衡策略: {other}"
        ))),
    }
}
