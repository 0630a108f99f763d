use axum::extract::{Path, Query, State};
use serde::Deserialize;

use crate::{error::ApiResult, response::success, routes::AppState};

#[derive(Debug, Deserialize)]
pub struct ServiceQueryParams {
    /// true时只返回当前可用的服务
    pub available: Option<bool>,
}

/// 服务目录全量列表
pub async fn list_services(
    State(state): State<AppState>,
    Query(params): Query<ServiceQueryParams>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let services = if params.available.unwrap_or(false) {
        state.discovery.available_services().await
    } else {
        state.discovery.all_services().await
    };
    Ok(success(services))
}

/// 按服务类型查询目录。目录中的类型是自由字符串
/// （包含external等非Worker类型），不做枚举校验。
pub async fn services_by_type(
    State(state): State<AppState>,
    Path(service_type): Path<String>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let services = state.discovery.services_by_type(&service_type).await;
    Ok(success(services))
}
