use serde_json::json;

use crate::response::success;

/// 进程存活检查
pub async fn health_check() -> impl axum::response::IntoResponse {
    success(json!({
        "status": "ok",
        "service": "orchestrator",
    }))
}
