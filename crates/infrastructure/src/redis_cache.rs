use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::debug;

use orchestrator_core::traits::CacheStore;
use orchestrator_errors::{OrchestratorError, OrchestratorResult};

/// Redis写穿缓存。仅用于跨实例可见性，内存状态始终是事实来源。
#[derive(Clone)]
pub struct RedisCacheStore {
    manager: ConnectionManager,
    key_prefix: String,
}

impl RedisCacheStore {
    /// 建立带自动重连的Redis连接
    pub async fn connect(url: &str) -> OrchestratorResult<Self> {
        let client = redis::Client::open(url)
            .map_err(|e| OrchestratorError::Cache(format!("Redis地址无效: {e}")))?;
        let manager = ConnectionManager::new(client)
            .await
            .map_err(|e| OrchestratorError::Cache(format!("Redis连接失败: {e}")))?;
        debug!("Redis缓存连接已建立");
        Ok(Self {
            manager,
            key_prefix: "orchestrator:".to_string(),
        })
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn put(
        &self,
        key: &str,
        value: serde_json::Value,
        ttl_seconds: u64,
    ) -> OrchestratorResult<()> {
        let payload = serde_json::to_string(&value)?;
        let mut conn = self.manager.clone();
        conn.set_ex::<_, _, ()>(self.full_key(key), payload, ttl_seconds)
            .await
            .map_err(|e| OrchestratorError::Cache(format!("SET {key} 失败: {e}")))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> OrchestratorResult<Option<serde_json::Value>> {
        let mut conn = self.manager.clone();
        let raw: Option<String> = conn
            .get(self.full_key(key))
            .await
            .map_err(|e| OrchestratorError::Cache(format!("GET {key} 失败: {e}")))?;
        match raw {
            Some(s) => Ok(Some(serde_json::from_str(&s)?)),
            None => Ok(None),
        }
    }

    async fn delete(&self, key: &str) -> OrchestratorResult<()> {
        let mut conn = self.manager.clone();
        conn.del::<_, ()>(self.full_key(key))
            .await
            .map_err(|e| OrchestratorError::Cache(format!("DEL {key} 失败: {e}")))?;
        Ok(())
    }
}
