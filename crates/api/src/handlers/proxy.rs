use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use tracing::debug;

use orchestrator_balancer::{ForwardRequest, ResponseBody};
use orchestrator_core::models::ServiceType;
use orchestrator_errors::OrchestratorError;

use crate::{error::ApiError, error::ApiResult, routes::AppState};

/// 路径首段到服务类型的映射表；未命中走默认的api类型
const PREFIX_TABLE: [(&str, ServiceType); 8] = [
    ("auth", ServiceType::Api),
    ("user", ServiceType::Api),
    ("wallet", ServiceType::Financial),
    ("banking", ServiceType::Financial),
    ("security", ServiceType::Security),
    ("ocr", ServiceType::Security),
    ("analytics", ServiceType::Analytics),
    ("metrics", ServiceType::Analytics),
];

/// 请求头中不透传给上游的字段。
/// Authorization由均衡器按自身凭证重写，host/length由HTTP客户端重算。
const HOP_HEADERS: [&str; 4] = ["host", "content-length", "authorization", "x-target-worker"];

/// 按路径首段解析目标服务类型
pub fn resolve_prefix(path: &str) -> ServiceType {
    let first = path.trim_start_matches('/').split('/').next().unwrap_or("");
    PREFIX_TABLE
        .iter()
        .find(|(prefix, _)| *prefix == first)
        .map(|(_, service_type)| *service_type)
        .unwrap_or(ServiceType::Api)
}

/// 业务请求代理：解析目标服务类型后交给负载均衡器路由。
/// X-Target-Worker头可指定Worker，此时用该Worker的服务类型路由。
pub async fn proxy_request(
    State(state): State<AppState>,
    Path(path): Path<String>,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Response> {
    let service_type = match headers
        .get("x-target-worker")
        .and_then(|v| v.to_str().ok())
    {
        Some(worker_id) => state.registry.get_worker(worker_id).await?.service_type,
        None => resolve_prefix(&path),
    };

    let correlation_id = headers
        .get("x-correlation-id")
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string());

    let forwarded_headers: Vec<(String, String)> = headers
        .iter()
        .filter(|(name, _)| !HOP_HEADERS.contains(&name.as_str()))
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();

    let request = ForwardRequest {
        method: method.as_str().to_string(),
        path: path.clone(),
        headers: forwarded_headers,
        body: if body.is_empty() {
            None
        } else {
            Some(body.to_vec())
        },
        correlation_id,
    };

    debug!(path = %path, service_type = %service_type, "代理业务请求");
    match state.balancer.route_request(service_type, request).await {
        Ok(response) => {
            let status =
                StatusCode::from_u16(response.status).unwrap_or(StatusCode::BAD_GATEWAY);
            let content_type = response
                .content_type
                .clone()
                .unwrap_or_else(|| "application/octet-stream".to_string());
            let bytes = match response.body {
                ResponseBody::Json(value) => serde_json::to_vec(&value)
                    .map_err(|e| ApiError::from(OrchestratorError::from(e)))?,
                ResponseBody::Text(text) => text.into_bytes(),
                ResponseBody::Binary(bytes) => bytes,
            };
            Ok((
                status,
                [
                    (header::CONTENT_TYPE, content_type),
                    (
                        header::HeaderName::from_static("x-orchestrator-worker"),
                        response.worker_id,
                    ),
                ],
                bytes,
            )
                .into_response())
        }
        Err(error @ OrchestratorError::Unavailable { .. }) => {
            // 全类型不可用时把最长的熔断冷却时间作为重试提示
            let mut longest = None;
            for worker in state.registry.list_by_type(service_type).await {
                let remaining = state.balancer.breaker_cooldown_remaining(&worker.id).await;
                if remaining > longest {
                    longest = remaining;
                }
            }
            Err(ApiError::from(error).with_retry_after(longest))
        }
        Err(error) => Err(error.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_table_resolution() {
        assert_eq!(resolve_prefix("auth/login"), ServiceType::Api);
        assert_eq!(resolve_prefix("user/profile"), ServiceType::Api);
        assert_eq!(resolve_prefix("wallet/balance"), ServiceType::Financial);
        assert_eq!(resolve_prefix("banking/transfer"), ServiceType::Financial);
        assert_eq!(resolve_prefix("security/scan"), ServiceType::Security);
        assert_eq!(resolve_prefix("ocr/submit"), ServiceType::Security);
        assert_eq!(resolve_prefix("analytics/report"), ServiceType::Analytics);
        assert_eq!(resolve_prefix("metrics/export"), ServiceType::Analytics);
    }

    #[test]
    fn test_unknown_prefix_defaults_to_api() {
        assert_eq!(resolve_prefix("unknown/route"), ServiceType::Api);
        assert_eq!(resolve_prefix(""), ServiceType::Api);
    }

    #[test]
    fn test_leading_slash_is_ignored() {
        assert_eq!(resolve_prefix("/wallet/balance"), ServiceType::Financial);
    }
}
