use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::post;
use axum::Router;

use orchestrator_core::config::AuthConfig;
use orchestrator_core::models::{ServiceType, WorkerRegistration, WorkerStatus};
use orchestrator_core::traits::CacheStore;
use orchestrator_errors::OrchestratorError;
use orchestrator_infrastructure::MemoryCacheStore;

use crate::admin_client::AdminClient;
use crate::registry::WorkerRegistry;

fn test_registration(id: &str, base_url: &str) -> WorkerRegistration {
    WorkerRegistration {
        id: id.to_string(),
        service_type: ServiceType::Financial,
        base_url: base_url.to_string(),
        capabilities: vec!["wallet".to_string()],
        priority: 0,
        max_instances: 3,
        current_instances: 1,
        metadata: HashMap::new(),
    }
}

fn test_registry() -> WorkerRegistry {
    let admin = AdminClient::new(&AuthConfig::default(), Duration::from_secs(2)).unwrap();
    WorkerRegistry::new(admin, None)
}

/// 启动一个本地Worker管理端点桩，所有admin命令返回200
async fn spawn_admin_stub() -> String {
    let app = Router::new()
        .route("/admin/restart", post(|| async { "ok" }))
        .route("/admin/stop", post(|| async { "ok" }))
        .route("/admin/start", post(|| async { "ok" }))
        .route("/admin/scale", post(|| async { "ok" }));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn test_register_worker_is_idempotent_upsert() {
    let registry = test_registry();
    let mut first = test_registration("wallet-worker", "http://localhost:4001");
    first
        .metadata
        .insert("region".to_string(), serde_json::json!("cn-north"));
    registry.register_worker(first).await.unwrap();

    let mut second = test_registration("wallet-worker", "http://localhost:4002");
    second
        .metadata
        .insert("region".to_string(), serde_json::json!("cn-south"));
    registry.register_worker(second).await.unwrap();

    let workers = registry.list_workers().await;
    assert_eq!(workers.len(), 1);
    assert_eq!(workers[0].base_url, "http://localhost:4002");
    assert_eq!(workers[0].metadata["region"], "cn-south");
}

#[tokio::test]
async fn test_reregister_preserves_registered_at_and_status() {
    let registry = test_registry();
    registry
        .register_worker(test_registration("w1", "http://localhost:4001"))
        .await
        .unwrap();
    let original = registry.get_worker("w1").await.unwrap();

    registry
        .update_status("w1", WorkerStatus::Healthy, None)
        .await
        .unwrap();
    registry
        .register_worker(test_registration("w1", "http://localhost:4001"))
        .await
        .unwrap();

    let after = registry.get_worker("w1").await.unwrap();
    assert_eq!(after.registered_at, original.registered_at);
    assert_eq!(after.status, WorkerStatus::Healthy);
}

#[tokio::test]
async fn test_register_rejects_instances_over_max() {
    let registry = test_registry();
    let mut registration = test_registration("w1", "http://localhost:4001");
    registration.current_instances = 5; // max_instances = 3
    let err = registry.register_worker(registration).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::Validation(_)));
}

#[tokio::test]
async fn test_capability_query_filters_to_healthy_only() {
    let registry = test_registry();
    registry
        .register_worker(test_registration("w1", "http://localhost:4001"))
        .await
        .unwrap();
    registry
        .register_worker(test_registration("w2", "http://localhost:4002"))
        .await
        .unwrap();
    registry
        .update_status("w1", WorkerStatus::Healthy, None)
        .await
        .unwrap();
    registry
        .update_status("w2", WorkerStatus::Degraded, None)
        .await
        .unwrap();

    let found = registry.list_by_capability("wallet").await;
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, "w1");
}

#[tokio::test]
async fn test_update_status_unknown_worker_is_not_found() {
    let registry = test_registry();
    let err = registry
        .update_status("ghost", WorkerStatus::Healthy, None)
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestratorError::WorkerNotFound { .. }));
}

#[tokio::test]
async fn test_error_count_tracks_failure_transitions() {
    let registry = test_registry();
    registry
        .register_worker(test_registration("w1", "http://localhost:4001"))
        .await
        .unwrap();

    // unknown -> unhealthy: +1
    let w = registry
        .update_status("w1", WorkerStatus::Unhealthy, None)
        .await
        .unwrap();
    assert_eq!(w.error_count, 1);

    // unhealthy -> unhealthy: 不重复计数
    let w = registry
        .update_status("w1", WorkerStatus::Unhealthy, None)
        .await
        .unwrap();
    assert_eq!(w.error_count, 1);

    // unhealthy -> healthy: -1
    let w = registry
        .update_status("w1", WorkerStatus::Healthy, None)
        .await
        .unwrap();
    assert_eq!(w.error_count, 0);

    // healthy -> healthy 再恢复不会降到负数
    let w = registry
        .update_status("w1", WorkerStatus::Degraded, None)
        .await
        .unwrap();
    assert_eq!(w.error_count, 0);
    let w = registry
        .update_status("w1", WorkerStatus::Healthy, None)
        .await
        .unwrap();
    assert_eq!(w.error_count, 0);
}

#[tokio::test]
async fn test_scale_out_of_bounds_returns_validation_error() {
    let registry = test_registry();
    registry
        .register_worker(test_registration("w1", "http://localhost:4001"))
        .await
        .unwrap();

    let err = registry.scale("w1", 4).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::Validation(_)));
    let err = registry.scale("w1", 0).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::Validation(_)));

    // current_instances 保持不变
    let worker = registry.get_worker("w1").await.unwrap();
    assert_eq!(worker.current_instances, 1);
}

#[tokio::test]
async fn test_scale_success_updates_current_instances() {
    let base_url = spawn_admin_stub().await;
    let registry = test_registry();
    registry
        .register_worker(test_registration("w1", &base_url))
        .await
        .unwrap();

    let result = registry.scale("w1", 2).await.unwrap();
    assert!(result.success);
    assert_eq!(registry.get_worker("w1").await.unwrap().current_instances, 2);
}

#[tokio::test]
async fn test_restart_success_sets_transitional_status() {
    let base_url = spawn_admin_stub().await;
    let registry = test_registry();
    registry
        .register_worker(test_registration("w1", &base_url))
        .await
        .unwrap();

    let result = registry.restart("w1").await.unwrap();
    assert!(result.success);
    assert_eq!(
        registry.get_worker("w1").await.unwrap().status,
        WorkerStatus::Restarting
    );
}

#[tokio::test]
async fn test_restart_unreachable_worker_returns_result_object() {
    let registry = test_registry();
    // 未监听的端口，连接会被拒绝
    registry
        .register_worker(test_registration("w1", "http://127.0.0.1:1"))
        .await
        .unwrap();

    let result = registry.restart("w1").await.unwrap();
    assert!(!result.success);
    assert!(result.error.is_some());

    let worker = registry.get_worker("w1").await.unwrap();
    assert_eq!(worker.status, WorkerStatus::Error);
    assert!(worker.metadata.contains_key("last_admin_error"));
}

#[tokio::test]
async fn test_lifecycle_command_unknown_worker_is_not_found() {
    let registry = test_registry();
    let err = registry.restart("ghost").await.unwrap_err();
    assert!(matches!(err, OrchestratorError::WorkerNotFound { .. }));
}

#[tokio::test]
async fn test_register_writes_through_cache() {
    let cache = Arc::new(MemoryCacheStore::new());
    let admin = AdminClient::new(&AuthConfig::default(), Duration::from_secs(2)).unwrap();
    let registry = WorkerRegistry::new(admin, Some(cache.clone()));

    registry
        .register_worker(test_registration("w1", "http://localhost:4001"))
        .await
        .unwrap();

    let cached = cache.get("worker:w1").await.unwrap().unwrap();
    assert_eq!(cached["id"], "w1");
    assert_eq!(cached["service_type"], "financial");
}
