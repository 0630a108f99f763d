use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::routing::get;
use axum::{Json, Router};
use chrono::{Duration, Utc};

use orchestrator_core::config::{
    AuthConfig, DiscoveryConfig, ExternalDependencyConfig, WorkerEndpointConfig,
};
use orchestrator_core::models::{ServiceEvent, ServiceRecord, ServiceStatus, ServiceType};
use orchestrator_core::traits::ServiceChangeListener;
use orchestrator_errors::{OrchestratorError, OrchestratorResult};

use crate::discovery::ServiceDiscovery;

fn worker_endpoint(id: &str, base_url: &str) -> WorkerEndpointConfig {
    WorkerEndpointConfig {
        id: id.to_string(),
        service_type: ServiceType::Financial,
        base_url: base_url.to_string(),
        capabilities: vec!["wallet".to_string()],
        priority: 0,
        max_instances: 1,
        weight: None,
        metadata: HashMap::new(),
    }
}

fn discovery_with(
    workers: Vec<WorkerEndpointConfig>,
    externals: Vec<ExternalDependencyConfig>,
) -> ServiceDiscovery {
    let mut config = DiscoveryConfig::default();
    config.probe_timeout_seconds = 2;
    ServiceDiscovery::new(config, &AuthConfig::default(), workers, externals, None).unwrap()
}

/// 返回固定发现文档的Worker桩
async fn spawn_discovery_stub() -> String {
    let app = Router::new().route(
        "/discovery/services",
        get(|| async {
            Json(serde_json::json!({
                "name": "wallet-worker",
                "version": "2.3.1",
                "capabilities": ["wallet", "fees"],
                "services": [
                    {"name": "fee-engine", "type": "financial"},
                    {"name": "ledger", "capabilities": ["audit"]}
                ]
            }))
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

struct RecordingListener {
    events: Mutex<Vec<(ServiceEvent, String)>>,
}

impl RecordingListener {
    fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }
}

impl ServiceChangeListener for RecordingListener {
    fn on_service_event(
        &self,
        event: ServiceEvent,
        record: &ServiceRecord,
    ) -> OrchestratorResult<()> {
        self.events
            .lock()
            .unwrap()
            .push((event, record.service_id.clone()));
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

struct FailingListener;

impl ServiceChangeListener for FailingListener {
    fn on_service_event(&self, _: ServiceEvent, _: &ServiceRecord) -> OrchestratorResult<()> {
        Err(OrchestratorError::internal("listener boom"))
    }

    fn name(&self) -> &str {
        "failing"
    }
}

fn stale_record(service_id: &str, minutes_since_seen: i64) -> ServiceRecord {
    let now = Utc::now();
    ServiceRecord {
        service_id: service_id.to_string(),
        name: service_id.to_string(),
        service_type: "api".to_string(),
        base_url: "http://localhost:4000".to_string(),
        status: ServiceStatus::Available,
        capabilities: vec![],
        parent_worker: None,
        discovered_at: now - Duration::minutes(60),
        last_seen: now - Duration::minutes(minutes_since_seen),
        metadata: HashMap::new(),
    }
}

#[tokio::test]
async fn test_cycle_registers_worker_and_sub_services() {
    let base_url = spawn_discovery_stub().await;
    let discovery = discovery_with(vec![worker_endpoint("wallet-worker", &base_url)], vec![]);

    discovery.discovery_cycle().await;

    let services = discovery.all_services().await;
    assert_eq!(services.len(), 3);

    let workers = discovery.worker_services().await;
    assert_eq!(workers.len(), 1);
    assert_eq!(workers[0].service_id, "wallet-worker");
    assert_eq!(workers[0].name, "wallet-worker");
    assert_eq!(workers[0].metadata["version"], "2.3.1");
    assert!(workers[0].has_capability("fees"));

    let subs: Vec<_> = services
        .iter()
        .filter(|s| s.parent_worker.as_deref() == Some("wallet-worker"))
        .collect();
    assert_eq!(subs.len(), 2);
    // 未声明URL的子服务继承父Worker地址
    assert!(subs.iter().all(|s| s.base_url == base_url));
}

#[tokio::test]
async fn test_refresh_preserves_discovered_at() {
    let base_url = spawn_discovery_stub().await;
    let discovery = discovery_with(vec![worker_endpoint("wallet-worker", &base_url)], vec![]);

    discovery.discovery_cycle().await;
    let first = discovery.all_services().await;
    let discovered_at = first
        .iter()
        .find(|s| s.service_id == "wallet-worker")
        .unwrap()
        .discovered_at;

    discovery.discovery_cycle().await;
    let second = discovery.all_services().await;
    let refreshed = second
        .iter()
        .find(|s| s.service_id == "wallet-worker")
        .unwrap();
    assert_eq!(refreshed.discovered_at, discovered_at);
    assert!(refreshed.last_seen >= discovered_at);
}

#[tokio::test]
async fn test_unreachable_worker_marked_unavailable_not_removed() {
    let discovery = discovery_with(
        vec![worker_endpoint("dead-worker", "http://127.0.0.1:1")],
        vec![],
    );

    discovery.discovery_cycle().await;

    let services = discovery.all_services().await;
    assert_eq!(services.len(), 1);
    assert_eq!(services[0].status, ServiceStatus::Unavailable);
    assert!(services[0].metadata.contains_key("unavailable_reason"));
    assert!(discovery.available_services().await.is_empty());
}

#[tokio::test]
async fn test_external_dependency_probe() {
    let app = Router::new().route("/ping", get(|| async { "pong" }));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let discovery = discovery_with(
        vec![],
        vec![ExternalDependencyConfig {
            name: "object-storage".to_string(),
            probe_url: format!("http://{addr}/ping"),
            service_type: "external".to_string(),
        }],
    );

    discovery.discovery_cycle().await;

    let services = discovery.services_by_type("external").await;
    assert_eq!(services.len(), 1);
    assert_eq!(services[0].service_id, "external:object-storage");
    assert!(services[0].is_available());
}

#[tokio::test]
async fn test_failing_subscriber_does_not_block_others() {
    let base_url = spawn_discovery_stub().await;
    let discovery = discovery_with(vec![worker_endpoint("wallet-worker", &base_url)], vec![]);

    let recorder = Arc::new(RecordingListener::new());
    discovery.subscribe(Arc::new(FailingListener)).await;
    discovery.subscribe(recorder.clone()).await;

    discovery.discovery_cycle().await;

    let events = recorder.events.lock().unwrap();
    // Worker + 2个子服务，全部送达第二个订阅者
    assert_eq!(events.len(), 3);
    assert!(events
        .iter()
        .all(|(event, _)| *event == ServiceEvent::Discovered));
}

#[tokio::test]
async fn test_sweep_removes_only_stale_records() {
    let discovery = discovery_with(vec![], vec![]);
    discovery.inject_record(stale_record("old-service", 11)).await;
    discovery.inject_record(stale_record("fresh-service", 9)).await;

    let recorder = Arc::new(RecordingListener::new());
    discovery.subscribe(recorder.clone()).await;

    discovery.sweep_stale().await;

    let remaining = discovery.all_services().await;
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].service_id, "fresh-service");

    let events = recorder.events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0], (ServiceEvent::Removed, "old-service".to_string()));
}

#[tokio::test]
async fn test_capability_query() {
    let base_url = spawn_discovery_stub().await;
    let discovery = discovery_with(vec![worker_endpoint("wallet-worker", &base_url)], vec![]);
    discovery.discovery_cycle().await;

    let audit = discovery.services_by_capability("audit").await;
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].name, "ledger");
}
