use async_trait::async_trait;

use orchestrator_errors::OrchestratorResult;

/// TTL键值缓存的最小契约。
///
/// 该层只是尽力而为的旁路缓存，内存状态永远是事实来源；
/// 任何实现的失败都不允许影响调用方的主流程。
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn put(
        &self,
        key: &str,
        value: serde_json::Value,
        ttl_seconds: u64,
    ) -> OrchestratorResult<()>;

    async fn get(&self, key: &str) -> OrchestratorResult<Option<serde_json::Value>>;

    async fn delete(&self, key: &str) -> OrchestratorResult<()>;
}

/// 缓存键的TTL约定（秒）
pub mod ttl {
    pub const WORKER: u64 = 24 * 60 * 60;
    pub const HEALTH: u64 = 60 * 60;
    pub const SERVICE: u64 = 5 * 60;
    pub const METRICS_LATEST: u64 = 5 * 60;
    pub const METRICS_AGGREGATED: u64 = 5 * 60;
    pub const ALERT: u64 = 24 * 60 * 60;
}
