use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use orchestrator_api::{create_routes, AppState};
use orchestrator_balancer::LoadBalancer;
use orchestrator_core::config::AppConfig;
use orchestrator_core::models::WorkerRegistration;
use orchestrator_core::traits::{CacheStore, NotificationChannel};
use orchestrator_discovery::ServiceDiscovery;
use orchestrator_infrastructure::RedisCacheStore;
use orchestrator_metrics::MetricsCollector;
use orchestrator_monitor::{HealthMonitor, LogChannel, WebhookChannel};
use orchestrator_registry::{AdminClient, WorkerRegistry};

/// 管理命令的出站调用超时
const ADMIN_TIMEOUT_SECONDS: u64 = 10;

/// 主应用程序：装配全部组件并驱动后台循环与API服务器
pub struct Application {
    config: AppConfig,
    state: AppState,
}

impl Application {
    /// 按依赖顺序装配组件：缓存 → 注册表 → 发现/监控/均衡/采集
    pub async fn new(config: AppConfig) -> Result<Self> {
        let cache = create_cache(&config).await?;

        let admin = AdminClient::new(&config.auth, Duration::from_secs(ADMIN_TIMEOUT_SECONDS))
            .context("创建管理命令客户端失败")?;
        let registry = Arc::new(WorkerRegistry::new(admin, cache.clone()));

        // 静态配置的Worker端点预注册进注册表
        for endpoint in &config.workers {
            registry
                .register_worker(WorkerRegistration {
                    id: endpoint.id.clone(),
                    service_type: endpoint.service_type,
                    base_url: endpoint.base_url.clone(),
                    capabilities: endpoint.capabilities.clone(),
                    priority: endpoint.priority,
                    max_instances: endpoint.max_instances,
                    current_instances: 1,
                    metadata: endpoint.metadata.clone(),
                })
                .await
                .with_context(|| format!("预注册Worker {} 失败", endpoint.id))?;
        }
        info!(workers = config.workers.len(), "Worker注册表已初始化");

        let mut channels: Vec<Arc<dyn NotificationChannel>> = vec![Arc::new(LogChannel)];
        if let Some(url) = &config.api.alert_webhook_url {
            channels.push(Arc::new(
                WebhookChannel::new(url.clone()).context("创建告警Webhook通道失败")?,
            ));
        }

        let discovery = Arc::new(
            ServiceDiscovery::new(
                config.discovery.clone(),
                &config.auth,
                config.workers.clone(),
                config.external_dependencies.clone(),
                cache.clone(),
            )
            .context("创建服务发现失败")?,
        );

        let monitor = Arc::new(
            HealthMonitor::new(
                config.health.clone(),
                &config.auth,
                registry.clone(),
                channels.clone(),
                cache.clone(),
            )
            .context("创建健康监控失败")?,
        );

        let weights: HashMap<String, u32> = config
            .workers
            .iter()
            .filter_map(|w| w.weight.map(|weight| (w.id.clone(), weight)))
            .collect();
        let balancer = Arc::new(
            LoadBalancer::new(&config.balancer, &config.auth, registry.clone(), weights)
                .context("创建负载均衡器失败")?,
        );

        let collector = Arc::new(
            MetricsCollector::new(
                config.metrics.clone(),
                &config.auth,
                registry.clone(),
                channels,
                cache,
            )
            .context("创建指标采集器失败")?,
        );

        Ok(Self {
            config,
            state: AppState {
                registry,
                discovery,
                monitor,
                balancer,
                collector,
            },
        })
    }

    /// 运行应用：后台循环 + API服务器，收到关闭信号后统一收尾
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let discovery_handle = {
            let discovery = Arc::clone(&self.state.discovery);
            let rx = shutdown_rx.resubscribe();
            tokio::spawn(discovery.run(rx))
        };
        let monitor_handle = {
            let monitor = Arc::clone(&self.state.monitor);
            let rx = shutdown_rx.resubscribe();
            tokio::spawn(monitor.run(rx))
        };
        let collector_handle = {
            let collector = Arc::clone(&self.state.collector);
            let rx = shutdown_rx.resubscribe();
            tokio::spawn(collector.run(rx))
        };

        let app = create_routes(self.state.clone());
        let listener = TcpListener::bind(&self.config.api.bind_address)
            .await
            .with_context(|| format!("绑定地址失败: {}", self.config.api.bind_address))?;
        info!("API服务器启动在 http://{}", self.config.api.bind_address);

        let server_handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app.into_make_service()).await {
                error!("API服务器运行失败: {e}");
            }
        });

        let _ = shutdown_rx.recv().await;
        info!("应用收到关闭信号");

        server_handle.abort();
        let _ = tokio::join!(discovery_handle, monitor_handle, collector_handle);

        info!("所有组件已停止");
        Ok(())
    }
}

/// 创建外部缓存层。缓存是可选的持久化辅助，
/// 连接失败时降级为无缓存运行而不是阻止启动。
async fn create_cache(config: &AppConfig) -> Result<Option<Arc<dyn CacheStore>>> {
    if !config.cache.enabled {
        return Ok(None);
    }
    let url = config
        .cache
        .redis_url
        .as_deref()
        .context("cache.enabled 为 true 时必须提供 cache.redis_url")?;
    match RedisCacheStore::connect(url).await {
        Ok(store) => {
            info!("Redis缓存层已连接");
            Ok(Some(Arc::new(store)))
        }
        Err(e) => {
            warn!(error = %e, "Redis连接失败，降级为无缓存运行");
            Ok(None)
        }
    }
}
