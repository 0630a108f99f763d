use axum::extract::State;

use crate::{error::ApiResult, response::success, routes::AppState};

/// 全局健康摘要
pub async fn get_system_health(
    State(state): State<AppState>,
) -> ApiResult<impl axum::response::IntoResponse> {
    Ok(success(state.monitor.health_summary().await))
}
