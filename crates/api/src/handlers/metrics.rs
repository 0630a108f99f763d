use axum::extract::{Path, State};

use orchestrator_errors::OrchestratorError;

use crate::{error::ApiResult, response::success, routes::AppState};

/// 系统级聚合指标；尚未完成首个采集周期时data为null
pub async fn system_metrics(
    State(state): State<AppState>,
) -> ApiResult<impl axum::response::IntoResponse> {
    Ok(success(state.collector.latest_aggregate().await))
}

/// 单个Worker的最新采样与趋势
pub async fn worker_metrics(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let report = state
        .collector
        .worker_report(&id)
        .await
        .ok_or_else(|| OrchestratorError::worker_not_found(&id))?;
    Ok(success(report))
}

/// 当前周期的建议性指标告警
pub async fn list_advisories(
    State(state): State<AppState>,
) -> ApiResult<impl axum::response::IntoResponse> {
    Ok(success(state.collector.advisories().await))
}
