use std::time::Duration;

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use crate::{error::ApiResult, response::success, routes::AppState};

#[derive(Debug, Deserialize)]
pub struct StrategyRequest {
    pub strategy: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct OpenBreakerRequest {
    pub duration_seconds: Option<u64>,
}

/// 均衡器状态：当前策略、各Worker连接数与熔断状态
pub async fn get_balancer_status(
    State(state): State<AppState>,
) -> ApiResult<impl axum::response::IntoResponse> {
    Ok(success(state.balancer.status().await))
}

/// 运行时切换负载均衡策略
pub async fn set_strategy(
    State(state): State<AppState>,
    Json(request): Json<StrategyRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    state.balancer.set_strategy(&request.strategy).await?;
    Ok(success(json!({ "strategy": request.strategy })))
}

/// 手动打开某Worker的熔断器，body可指定冷却时长
pub async fn open_breaker(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<OpenBreakerRequest>>,
) -> ApiResult<impl axum::response::IntoResponse> {
    // 未知Worker直接404，避免为不存在的ID建熔断条目
    state.registry.get_worker(&id).await?;
    let duration = body
        .and_then(|Json(req)| req.duration_seconds)
        .map(Duration::from_secs);
    state.balancer.open_circuit_breaker(&id, duration).await;
    let remaining = state.balancer.breaker_cooldown_remaining(&id).await;
    Ok(success(json!({
        "worker_id": id,
        "cooldown_remaining_ms": remaining.map(|d| d.as_millis() as u64),
    })))
}
