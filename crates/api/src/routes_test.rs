use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use tower::ServiceExt;

use orchestrator_balancer::LoadBalancer;
use orchestrator_core::config::AppConfig;
use orchestrator_discovery::ServiceDiscovery;
use orchestrator_metrics::MetricsCollector;
use orchestrator_monitor::HealthMonitor;
use orchestrator_registry::{AdminClient, WorkerRegistry};

use crate::routes::{create_routes, AppState};

fn test_app() -> (Router, AppState) {
    let config = AppConfig::default();
    let admin = AdminClient::new(&config.auth, Duration::from_secs(2)).unwrap();
    let registry = Arc::new(WorkerRegistry::new(admin, None));
    let discovery = Arc::new(
        ServiceDiscovery::new(config.discovery.clone(), &config.auth, vec![], vec![], None)
            .unwrap(),
    );
    let monitor = Arc::new(
        HealthMonitor::new(
            config.health.clone(),
            &config.auth,
            registry.clone(),
            vec![],
            None,
        )
        .unwrap(),
    );
    let balancer = Arc::new(
        LoadBalancer::new(&config.balancer, &config.auth, registry.clone(), HashMap::new())
            .unwrap(),
    );
    let collector = Arc::new(
        MetricsCollector::new(
            config.metrics.clone(),
            &config.auth,
            registry.clone(),
            vec![],
            None,
        )
        .unwrap(),
    );
    let state = AppState {
        registry,
        discovery,
        monitor,
        balancer,
        collector,
    };
    (create_routes(state.clone()), state)
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn registration(id: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "service_type": "api",
        "base_url": "http://127.0.0.1:1",
        "capabilities": ["auth"],
        "priority": 0,
        "max_instances": 2,
        "current_instances": 1,
        "metadata": {}
    })
}

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _) = test_app();
    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "ok");
}

#[tokio::test]
async fn test_register_and_get_worker() {
    let (app, _) = test_app();
    let response = app
        .clone()
        .oneshot(json_request("POST", "/api/workers", registration("w1")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(Request::get("/api/workers/w1").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["id"], "w1");
    assert_eq!(body["data"]["service_type"], "api");
    assert_eq!(body["data"]["status"], "unknown");
}

#[tokio::test]
async fn test_unknown_worker_returns_stable_code() {
    let (app, _) = test_app();
    let response = app
        .oneshot(
            Request::get("/api/workers/no-such")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "WORKER_NOT_FOUND");
}

#[tokio::test]
async fn test_scale_out_of_bounds_is_rejected() {
    let (app, _) = test_app();
    app.clone()
        .oneshot(json_request("POST", "/api/workers", registration("w1")))
        .await
        .unwrap();

    // max_instances为2，请求5超出范围
    let response = app
        .oneshot(json_request(
            "POST",
            "/api/workers/w1/scale",
            serde_json::json!({ "instances": 5 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_restart_unreachable_worker_returns_result_object() {
    let (app, _) = test_app();
    app.clone()
        .oneshot(json_request("POST", "/api/workers", registration("w1")))
        .await
        .unwrap();

    // 远端管理端点不可达：HTTP层仍是200，失败体现在结果对象里
    let response = app
        .oneshot(json_request(
            "POST",
            "/api/workers/w1/restart",
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["success"], false);
    assert!(body["data"]["error"].is_string());
}

#[tokio::test]
async fn test_strategy_switch_and_rejection() {
    let (app, _) = test_app();
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/balancer/strategy",
            serde_json::json!({ "strategy": "round-robin" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(
            Request::get("/api/balancer/status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["data"]["strategy"], "round-robin");

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/balancer/strategy",
            serde_json::json!({ "strategy": "fastest-first" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_open_breaker_reports_cooldown() {
    let (app, _) = test_app();
    app.clone()
        .oneshot(json_request("POST", "/api/workers", registration("w1")))
        .await
        .unwrap();

    let response = app
        .oneshot(json_request(
            "POST",
            "/api/balancer/breaker/w1/open",
            serde_json::json!({ "duration_seconds": 120 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let remaining = body["data"]["cooldown_remaining_ms"].as_u64().unwrap();
    assert!(remaining > 110_000 && remaining <= 120_000);
}

#[tokio::test]
async fn test_services_listing_starts_empty() {
    let (app, _) = test_app();
    let response = app
        .clone()
        .oneshot(Request::get("/api/services").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"], serde_json::json!([]));

    let response = app
        .oneshot(
            Request::get("/api/services/type/external")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_proxy_without_workers_is_unavailable() {
    let (app, _) = test_app();
    let response = app
        .oneshot(
            Request::get("/proxy/wallet/balance")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "SERVICE_UNAVAILABLE");
    assert_eq!(body["error"]["retryable"], true);
}

#[tokio::test]
async fn test_system_metrics_before_first_cycle() {
    let (app, _) = test_app();
    let response = app
        .oneshot(
            Request::get("/api/metrics/system")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert!(body["data"].is_null());
}

#[tokio::test]
async fn test_metrics_alerts_listing() {
    let (app, _) = test_app();
    let response = app
        .oneshot(
            Request::get("/api/metrics/alerts")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"], serde_json::json!([]));
}
