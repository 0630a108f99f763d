use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use orchestrator_core::models::{ServiceType, WorkerRegistration};

use crate::{error::ApiError, error::ApiResult, response::success, routes::AppState};

/// Worker查询参数
#[derive(Debug, Deserialize)]
pub struct WorkerQueryParams {
    pub service_type: Option<String>,
    pub capability: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ScaleRequest {
    pub instances: u32,
}

/// 获取Worker列表，支持按类型或能力过滤
pub async fn list_workers(
    State(state): State<AppState>,
    Query(params): Query<WorkerQueryParams>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let workers = if let Some(type_str) = &params.service_type {
        let service_type = ServiceType::parse(type_str)
            .ok_or_else(|| ApiError::bad_request(format!("未知的服务类型: {type_str}")))?;
        state.registry.list_by_type(service_type).await
    } else if let Some(capability) = &params.capability {
        state.registry.list_by_capability(capability).await
    } else {
        state.registry.list_workers().await
    };
    Ok(success(workers))
}

/// 注册（或幂等更新）一个Worker
pub async fn register_worker(
    State(state): State<AppState>,
    Json(registration): Json<WorkerRegistration>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let descriptor = state.registry.register_worker(registration).await?;
    Ok(success(descriptor))
}

/// 获取单个Worker信息
pub async fn get_worker(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let worker = state.registry.get_worker(&id).await?;
    Ok(success(worker))
}

/// 获取单个Worker的健康探测历史
pub async fn get_worker_health(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl axum::response::IntoResponse> {
    // 确认Worker存在后再查历史，未探测过的Worker返回空列表
    state.registry.get_worker(&id).await?;
    let history = state.monitor.worker_history(&id).await.unwrap_or_default();
    Ok(success(history))
}

/// 生命周期命令统一以结果对象返回，远端失败不会变成HTTP错误
pub async fn restart_worker(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let result = state.registry.restart(&id).await?;
    Ok(success(result))
}

pub async fn stop_worker(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let result = state.registry.stop(&id).await?;
    Ok(success(result))
}

pub async fn start_worker(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let result = state.registry.start(&id).await?;
    Ok(success(result))
}

pub async fn scale_worker(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ScaleRequest>,
) -> ApiResult<impl axum::response::IntoResponse> {
    let result = state.registry.scale(&id, request.instances).await?;
    Ok(success(result))
}
