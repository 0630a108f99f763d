use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use orchestrator_errors::OrchestratorResult;

/// 参与选择的Worker快照，由负载均衡器在每次路由时构造
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalancerCandidate {
    pub worker_id: String,
    pub base_url: String,
    /// 未声明时默认100
    pub weight: u32,
    pub current_connections: u32,
    pub priority: i32,
}

impl BalancerCandidate {
    /// 健康感知评分：weight / max(1, connections)
    pub fn health_score(&self) -> f64 {
        self.weight as f64 / self.current_connections.max(1) as f64
    }
}

/// 负载均衡策略接口。策略集合是封闭的，由配置按名称选择。
#[async_trait]
pub trait LoadBalancingStrategy: Send + Sync + std::fmt::Debug {
    /// 从候选池中选出一个Worker；空池返回None
    async fn select_worker(
        &self,
        candidates: &[BalancerCandidate],
    ) -> OrchestratorResult<Option<String>>;

    fn name(&self) -> &str;
}
