use axum::{
    routing::{any, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use orchestrator_balancer::LoadBalancer;
use orchestrator_discovery::ServiceDiscovery;
use orchestrator_metrics::MetricsCollector;
use orchestrator_monitor::HealthMonitor;
use orchestrator_registry::WorkerRegistry;

use crate::handlers::{
    balancer::{get_balancer_status, open_breaker, set_strategy},
    health::health_check,
    metrics::{list_advisories, system_metrics, worker_metrics},
    proxy::proxy_request,
    services::{list_services, services_by_type},
    system::get_system_health,
    workers::{
        get_worker, get_worker_health, list_workers, register_worker, restart_worker, scale_worker,
        start_worker, stop_worker,
    },
};

/// API应用状态
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<WorkerRegistry>,
    pub discovery: Arc<ServiceDiscovery>,
    pub monitor: Arc<HealthMonitor>,
    pub balancer: Arc<LoadBalancer>,
    pub collector: Arc<MetricsCollector>,
}

/// 创建API路由
pub fn create_routes(state: AppState) -> Router {
    Router::new()
        // 健康检查
        .route("/health", get(health_check))
        .route("/api/system/health", get(get_system_health))
        // Worker管理API
        .route("/api/workers", get(list_workers).post(register_worker))
        .route("/api/workers/{id}", get(get_worker))
        .route("/api/workers/{id}/health", get(get_worker_health))
        .route("/api/workers/{id}/restart", post(restart_worker))
        .route("/api/workers/{id}/stop", post(stop_worker))
        .route("/api/workers/{id}/start", post(start_worker))
        .route("/api/workers/{id}/scale", post(scale_worker))
        // 服务目录API
        .route("/api/services", get(list_services))
        .route("/api/services/type/{service_type}", get(services_by_type))
        // 负载均衡API
        .route("/api/balancer/status", get(get_balancer_status))
        .route("/api/balancer/strategy", post(set_strategy))
        .route("/api/balancer/breaker/{id}/open", post(open_breaker))
        // 指标API
        .route("/api/metrics/system", get(system_metrics))
        .route("/api/metrics/workers/{id}", get(worker_metrics))
        .route("/api/metrics/alerts", get(list_advisories))
        // 业务请求代理
        .route("/proxy/{*path}", any(proxy_request))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
