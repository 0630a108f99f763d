use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;

use orchestrator_core::traits::CacheStore;
use orchestrator_errors::OrchestratorResult;

struct Entry {
    value: serde_json::Value,
    expires_at: DateTime<Utc>,
}

/// 进程内TTL缓存。未配置Redis时使用，也是测试中的标准实现。
/// 过期条目在读取时惰性清除。
#[derive(Clone, Default)]
pub struct MemoryCacheStore {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for Entry {
    fn default() -> Self {
        Self {
            value: serde_json::Value::Null,
            expires_at: Utc::now(),
        }
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn put(
        &self,
        key: &str,
        value: serde_json::Value,
        ttl_seconds: u64,
    ) -> OrchestratorResult<()> {
        let entry = Entry {
            value,
            expires_at: Utc::now() + Duration::seconds(ttl_seconds as i64),
        };
        self.entries.write().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn get(&self, key: &str) -> OrchestratorResult<Option<serde_json::Value>> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                None => return Ok(None),
                Some(entry) if entry.expires_at > Utc::now() => {
                    return Ok(Some(entry.value.clone()))
                }
                Some(_) => {}
            }
        }
        // 已过期，惰性删除
        self.entries.write().await.remove(key);
        Ok(None)
    }

    async fn delete(&self, key: &str) -> OrchestratorResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}
