use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

use orchestrator_core::config::{AuthConfig, DiscoveryConfig, ExternalDependencyConfig, WorkerEndpointConfig};
use orchestrator_core::models::{
    DiscoveryDocument, ServiceEvent, ServiceRecord, ServiceStatus,
};
use orchestrator_core::traits::{ttl, CacheStore, ServiceChangeListener};
use orchestrator_errors::{OrchestratorError, OrchestratorResult};

/// 单个周期内并发探测上限
const PROBE_CONCURRENCY: usize = 8;

/// 服务发现：周期性探测Worker的发现端点与外部依赖，
/// 合并为服务目录，向订阅者广播变更，并定期清扫陈旧记录。
pub struct ServiceDiscovery {
    catalog: RwLock<HashMap<String, ServiceRecord>>,
    listeners: RwLock<Vec<Arc<dyn ServiceChangeListener>>>,
    http: reqwest::Client,
    config: DiscoveryConfig,
    worker_endpoints: Vec<WorkerEndpointConfig>,
    external_dependencies: Vec<ExternalDependencyConfig>,
    cache: Option<Arc<dyn CacheStore>>,
    cycle_in_progress: AtomicBool,
}

impl ServiceDiscovery {
    pub fn new(
        config: DiscoveryConfig,
        auth: &AuthConfig,
        worker_endpoints: Vec<WorkerEndpointConfig>,
        external_dependencies: Vec<ExternalDependencyConfig>,
        cache: Option<Arc<dyn CacheStore>>,
    ) -> OrchestratorResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.probe_timeout_seconds))
            .user_agent(auth.user_agent.clone())
            .build()
            .map_err(|e| OrchestratorError::internal(format!("构建HTTP客户端失败: {e}")))?;
        Ok(Self {
            catalog: RwLock::new(HashMap::new()),
            listeners: RwLock::new(Vec::new()),
            http,
            config,
            worker_endpoints,
            external_dependencies,
            cache,
            cycle_in_progress: AtomicBool::new(false),
        })
    }

    pub async fn subscribe(&self, listener: Arc<dyn ServiceChangeListener>) {
        info!(listener = listener.name(), "注册服务目录订阅者");
        self.listeners.write().await.push(listener);
    }

    /// 发现主循环：固定间隔探测 + 独立间隔的陈旧清扫
    pub async fn run(self: Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut probe_interval =
            tokio::time::interval(Duration::from_secs(self.config.interval_seconds));
        let mut sweep_interval =
            tokio::time::interval(Duration::from_secs(self.config.sweep_interval_seconds));
        info!(
            interval = self.config.interval_seconds,
            "服务发现循环已启动"
        );

        loop {
            tokio::select! {
                _ = probe_interval.tick() => {
                    // 上一周期未结束则跳过，避免慢周期互相踩踏
                    if self.cycle_in_progress.swap(true, Ordering::SeqCst) {
                        warn!("上一发现周期仍在进行，跳过本次");
                        continue;
                    }
                    self.discovery_cycle().await;
                    self.cycle_in_progress.store(false, Ordering::SeqCst);
                }
                _ = sweep_interval.tick() => {
                    self.sweep_stale().await;
                }
                _ = shutdown_rx.recv() => {
                    info!("服务发现循环收到关闭信号");
                    break;
                }
            }
        }
    }

    /// 一个发现周期：Worker端点与外部依赖各自扇出，单点失败互不影响
    pub async fn discovery_cycle(&self) {
        let worker_probes = stream::iter(self.worker_endpoints.clone())
            .map(|endpoint| async move {
                let outcome = self.probe_worker(&endpoint).await;
                (endpoint, outcome)
            })
            .buffer_unordered(PROBE_CONCURRENCY)
            .collect::<Vec<_>>()
            .await;

        for (endpoint, outcome) in worker_probes {
            match outcome {
                Ok(doc) => self.register_worker_services(&endpoint, doc).await,
                Err(e) => {
                    debug!(worker_id = %endpoint.id, error = %e, "Worker发现探测失败");
                    self.mark_unavailable(
                        &endpoint.id,
                        &endpoint.id,
                        endpoint.service_type.as_str(),
                        &endpoint.base_url,
                        &e.to_string(),
                    )
                    .await;
                }
            }
        }

        let external_probes = stream::iter(self.external_dependencies.clone())
            .map(|dep| async move {
                let outcome = self.probe_external(&dep).await;
                (dep, outcome)
            })
            .buffer_unordered(PROBE_CONCURRENCY)
            .collect::<Vec<_>>()
            .await;

        for (dep, outcome) in external_probes {
            let service_id = format!("external:{}", dep.name);
            match outcome {
                Ok(()) => {
                    self.upsert_service(
                        service_id,
                        dep.name.clone(),
                        dep.service_type.clone(),
                        dep.probe_url.clone(),
                        ServiceStatus::Available,
                        vec![],
                        None,
                        HashMap::new(),
                    )
                    .await;
                }
                Err(e) => {
                    self.mark_unavailable(
                        &service_id,
                        &dep.name,
                        &dep.service_type,
                        &dep.probe_url,
                        &e.to_string(),
                    )
                    .await;
                }
            }
        }
    }

    async fn probe_worker(
        &self,
        endpoint: &WorkerEndpointConfig,
    ) -> OrchestratorResult<DiscoveryDocument> {
        let url = format!(
            "{}/discovery/services",
            endpoint.base_url.trim_end_matches('/')
        );
        let response = self.http.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(OrchestratorError::Upstream {
                worker_id: endpoint.id.clone(),
                status: status.as_u16(),
                message: "发现端点返回非2xx".to_string(),
            });
        }
        Ok(response.json::<DiscoveryDocument>().await?)
    }

    async fn probe_external(&self, dep: &ExternalDependencyConfig) -> OrchestratorResult<()> {
        let response = self.http.get(&dep.probe_url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(OrchestratorError::Upstream {
                worker_id: dep.name.clone(),
                status: status.as_u16(),
                message: "依赖探测返回非2xx".to_string(),
            });
        }
        Ok(())
    }

    /// 将Worker本身与其上报的子服务写入目录
    async fn register_worker_services(
        &self,
        endpoint: &WorkerEndpointConfig,
        doc: DiscoveryDocument,
    ) {
        let mut metadata = HashMap::new();
        if let Some(version) = &doc.version {
            metadata.insert(
                "version".to_string(),
                serde_json::Value::String(version.clone()),
            );
        }
        if !doc.endpoints.is_empty() {
            if let Ok(endpoints) = serde_json::to_value(&doc.endpoints) {
                metadata.insert("endpoints".to_string(), endpoints);
            }
        }

        let capabilities = if doc.capabilities.is_empty() {
            endpoint.capabilities.clone()
        } else {
            doc.capabilities.clone()
        };

        self.upsert_service(
            endpoint.id.clone(),
            doc.name.clone().unwrap_or_else(|| endpoint.id.clone()),
            endpoint.service_type.as_str().to_string(),
            endpoint.base_url.clone(),
            ServiceStatus::Available,
            capabilities,
            None,
            metadata,
        )
        .await;

        for sub in doc.services {
            let service_id = format!("{}:{}", endpoint.id, sub.name);
            self.upsert_service(
                service_id,
                sub.name.clone(),
                sub.service_type
                    .unwrap_or_else(|| endpoint.service_type.as_str().to_string()),
                sub.url.unwrap_or_else(|| endpoint.base_url.clone()),
                ServiceStatus::Available,
                sub.capabilities,
                Some(endpoint.id.clone()),
                HashMap::new(),
            )
            .await;
        }
    }

    /// 注册或刷新一条服务记录：discovered_at在刷新时保留，last_seen总是更新
    #[allow(clippy::too_many_arguments)]
    async fn upsert_service(
        &self,
        service_id: String,
        name: String,
        service_type: String,
        base_url: String,
        status: ServiceStatus,
        capabilities: Vec<String>,
        parent_worker: Option<String>,
        metadata: HashMap<String, serde_json::Value>,
    ) {
        let now = Utc::now();
        let (event, record) = {
            let mut catalog = self.catalog.write().await;
            match catalog.get_mut(&service_id) {
                Some(existing) => {
                    existing.name = name;
                    existing.service_type = service_type;
                    existing.base_url = base_url;
                    existing.status = status;
                    existing.capabilities = capabilities;
                    existing.parent_worker = parent_worker;
                    existing.last_seen = now;
                    existing.metadata.extend(metadata);
                    (ServiceEvent::Refreshed, existing.clone())
                }
                None => {
                    let record = ServiceRecord {
                        service_id: service_id.clone(),
                        name,
                        service_type,
                        base_url,
                        status,
                        capabilities,
                        parent_worker,
                        discovered_at: now,
                        last_seen: now,
                        metadata,
                    };
                    info!(service_id = %service_id, "发现新服务");
                    catalog.insert(service_id, record.clone());
                    (ServiceEvent::Discovered, record)
                }
            }
        };

        self.cache_service(&record).await;
        self.notify(event, &record).await;
    }

    /// 标记不可用但不移除；记录不存在时补建一条不可用记录。
    /// 失败不刷新last_seen，持续失败的记录最终由清扫移除。
    async fn mark_unavailable(
        &self,
        service_id: &str,
        name: &str,
        service_type: &str,
        base_url: &str,
        reason: &str,
    ) {
        let record = {
            let mut catalog = self.catalog.write().await;
            match catalog.get_mut(service_id) {
                Some(existing) => {
                    existing.status = ServiceStatus::Unavailable;
                    existing.metadata.insert(
                        "unavailable_reason".to_string(),
                        serde_json::Value::String(reason.to_string()),
                    );
                    existing.clone()
                }
                None => {
                    let now = Utc::now();
                    let mut metadata = HashMap::new();
                    metadata.insert(
                        "unavailable_reason".to_string(),
                        serde_json::Value::String(reason.to_string()),
                    );
                    let record = ServiceRecord {
                        service_id: service_id.to_string(),
                        name: name.to_string(),
                        service_type: service_type.to_string(),
                        base_url: base_url.to_string(),
                        status: ServiceStatus::Unavailable,
                        capabilities: vec![],
                        parent_worker: None,
                        discovered_at: now,
                        last_seen: now,
                        metadata,
                    };
                    catalog.insert(service_id.to_string(), record.clone());
                    record
                }
            }
        };

        self.cache_service(&record).await;
        self.notify(ServiceEvent::MarkedUnavailable, &record).await;
    }

    /// 陈旧清扫：移除超过窗口未刷新的记录
    pub async fn sweep_stale(&self) {
        let window = chrono::Duration::seconds(self.config.stale_after_seconds as i64);
        let now = Utc::now();

        let removed: Vec<ServiceRecord> = {
            let mut catalog = self.catalog.write().await;
            let stale_ids: Vec<String> = catalog
                .values()
                .filter(|r| r.is_stale(now, window))
                .map(|r| r.service_id.clone())
                .collect();
            stale_ids
                .into_iter()
                .filter_map(|id| catalog.remove(&id))
                .collect()
        };

        for record in removed {
            info!(service_id = %record.service_id, "移除陈旧服务记录");
            if let Some(cache) = &self.cache {
                let _ = cache
                    .delete(&format!("service:{}", record.service_id))
                    .await;
            }
            self.notify(ServiceEvent::Removed, &record).await;
        }
    }

    /// 尽力而为地广播事件：单个订阅者失败不影响其余订阅者
    async fn notify(&self, event: ServiceEvent, record: &ServiceRecord) {
        let listeners = self.listeners.read().await;
        for listener in listeners.iter() {
            if let Err(e) = listener.on_service_event(event, record) {
                warn!(
                    listener = listener.name(),
                    service_id = %record.service_id,
                    error = %e,
                    "订阅者处理服务事件失败"
                );
            }
        }
    }

    async fn cache_service(&self, record: &ServiceRecord) {
        if let Some(cache) = &self.cache {
            let key = format!("service:{}", record.service_id);
            if let Ok(value) = serde_json::to_value(record) {
                if let Err(e) = cache.put(&key, value, ttl::SERVICE).await {
                    warn!(service_id = %record.service_id, error = %e, "服务缓存写入失败");
                }
            }
        }
    }

    pub async fn all_services(&self) -> Vec<ServiceRecord> {
        let mut services: Vec<ServiceRecord> =
            self.catalog.read().await.values().cloned().collect();
        services.sort_by(|a, b| a.service_id.cmp(&b.service_id));
        services
    }

    pub async fn available_services(&self) -> Vec<ServiceRecord> {
        self.all_services()
            .await
            .into_iter()
            .filter(|s| s.is_available())
            .collect()
    }

    pub async fn services_by_type(&self, service_type: &str) -> Vec<ServiceRecord> {
        self.all_services()
            .await
            .into_iter()
            .filter(|s| s.service_type == service_type)
            .collect()
    }

    pub async fn services_by_capability(&self, capability: &str) -> Vec<ServiceRecord> {
        self.all_services()
            .await
            .into_iter()
            .filter(|s| s.has_capability(capability))
            .collect()
    }

    /// 顶层Worker服务（排除子服务）
    pub async fn worker_services(&self) -> Vec<ServiceRecord> {
        self.all_services()
            .await
            .into_iter()
            .filter(|s| s.parent_worker.is_none())
            .collect()
    }

    #[cfg(test)]
    pub(crate) async fn inject_record(&self, record: ServiceRecord) {
        self.catalog
            .write()
            .await
            .insert(record.service_id.clone(), record);
    }
}
