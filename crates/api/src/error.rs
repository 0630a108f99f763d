use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use orchestrator_errors::OrchestratorError;

/// API层错误：领域错误加可选的重试提示。
/// 响应体携带稳定的错误代码字符串，HTTP状态码由错误类别映射。
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct ApiError {
    error: OrchestratorError,
    retry_after_ms: Option<u64>,
}

impl From<OrchestratorError> for ApiError {
    fn from(error: OrchestratorError) -> Self {
        Self {
            error,
            retry_after_ms: None,
        }
    }
}

impl ApiError {
    pub fn bad_request<S: Into<String>>(msg: S) -> Self {
        OrchestratorError::validation(msg).into()
    }

    /// 附加重试提示（典型来源：熔断器剩余冷却时间）
    pub fn with_retry_after(mut self, cooldown: Option<Duration>) -> Self {
        self.retry_after_ms = cooldown.map(|d| d.as_millis() as u64);
        self
    }

    fn status(&self) -> StatusCode {
        match &self.error {
            OrchestratorError::Validation(_) => StatusCode::BAD_REQUEST,
            OrchestratorError::WorkerNotFound { .. }
            | OrchestratorError::ServiceNotFound { .. } => StatusCode::NOT_FOUND,
            OrchestratorError::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            OrchestratorError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            OrchestratorError::Upstream { .. }
            | OrchestratorError::Network(_)
            | OrchestratorError::ForwardExhausted { .. } => StatusCode::BAD_GATEWAY,
            OrchestratorError::Configuration(_)
            | OrchestratorError::Cache(_)
            | OrchestratorError::Serialization(_)
            | OrchestratorError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut body = json!({
            "success": false,
            "error": {
                "code": self.error.code(),
                "message": self.error.to_string(),
                "user_message": self.error.user_message(),
                "retryable": self.error.is_retryable(),
            },
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        if let Some(retry_after_ms) = self.retry_after_ms {
            body["error"]["retry_after_ms"] = json!(retry_after_ms);
        }
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
