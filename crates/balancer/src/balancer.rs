use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use rand::Rng;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use orchestrator_core::config::{AuthConfig, BalancerConfig};
use orchestrator_core::models::ServiceType;
use orchestrator_core::traits::{BalancerCandidate, LoadBalancingStrategy};
use orchestrator_errors::{OrchestratorError, OrchestratorResult};
use orchestrator_registry::WorkerRegistry;

use crate::circuit_breaker::{BreakerSnapshot, CircuitBreakerTable};
use crate::strategies::create_strategy;

/// 响应时间历史容量（每Worker）
const RESPONSE_TIME_CAPACITY: usize = 100;

/// 未声明权重时的默认值
const DEFAULT_WEIGHT: u32 = 100;

/// 待转发的业务请求
#[derive(Debug, Clone)]
pub struct ForwardRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    pub correlation_id: Option<String>,
}

/// 按声明内容类型归一化后的响应体：
/// JSON解析成值，文本原样透传，其余作为原始字节返回
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ResponseBody {
    Json(serde_json::Value),
    Text(String),
    Binary(Vec<u8>),
}

/// 转发结果，调用方拿到的统一形状
#[derive(Debug, Clone, Serialize)]
pub struct ForwardedResponse {
    pub worker_id: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub body: ResponseBody,
    pub response_time_ms: u64,
}

/// 均衡器状态读模型
#[derive(Debug, Clone, Serialize)]
pub struct BalancerStatus {
    pub strategy: String,
    pub workers: Vec<WorkerBalancerEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkerBalancerEntry {
    pub worker_id: String,
    pub current_connections: u32,
    pub avg_response_time_ms: f64,
    pub breaker: BreakerSnapshot,
}

/// 负载均衡器：按逻辑服务类型把请求路由到存活的Worker实例，
/// 以可插拔策略选择、以每Worker熔断器做护栏，失败时做一次故障转移。
pub struct LoadBalancer {
    registry: Arc<WorkerRegistry>,
    breakers: CircuitBreakerTable,
    connections: RwLock<HashMap<String, u32>>,
    response_times: RwLock<HashMap<String, VecDeque<u64>>>,
    strategy: RwLock<Arc<dyn LoadBalancingStrategy>>,
    weights: HashMap<String, u32>,
    http: reqwest::Client,
    bearer_token: String,
}

impl LoadBalancer {
    pub fn new(
        config: &BalancerConfig,
        auth: &AuthConfig,
        registry: Arc<WorkerRegistry>,
        weights: HashMap<String, u32>,
    ) -> OrchestratorResult<Self> {
        let strategy = create_strategy(&config.strategy)?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.forward_timeout_seconds))
            .user_agent(auth.user_agent.clone())
            .build()
            .map_err(|e| OrchestratorError::internal(format!("构建HTTP客户端失败: {e}")))?;

        Ok(Self {
            registry,
            breakers: CircuitBreakerTable::new(Duration::from_secs(
                config.breaker_cooldown_seconds,
            )),
            connections: RwLock::new(HashMap::new()),
            response_times: RwLock::new(HashMap::new()),
            strategy: RwLock::new(strategy),
            weights,
            http,
            bearer_token: auth.bearer_token.clone(),
        })
    }

    /// 运行时切换策略；未知名称返回ValidationError
    pub async fn set_strategy(&self, name: &str) -> OrchestratorResult<()> {
        let strategy = create_strategy(name)?;
        info!(strategy = name, "切换负载均衡策略");
        *self.strategy.write().await = strategy;
        Ok(())
    }

    pub async fn strategy_name(&self) -> String {
        self.strategy.read().await.name().to_string()
    }

    /// 显式打开熔断器。这是调用方在检测到持续失败后的主动操作，
    /// 均衡器自身不会因单次失败自动触发。
    pub async fn open_circuit_breaker(&self, worker_id: &str, duration: Option<Duration>) {
        self.breakers.open(worker_id, duration).await;
    }

    pub async fn breaker_cooldown_remaining(&self, worker_id: &str) -> Option<Duration> {
        self.breakers.cooldown_remaining(worker_id).await
    }

    /// 解析候选池：该类型下可路由状态的Worker，剔除熔断未到期者
    pub async fn candidate_pool(&self, service_type: ServiceType) -> Vec<BalancerCandidate> {
        let workers = self.registry.list_by_type(service_type).await;
        let connections = self.connections.read().await;
        let mut pool = Vec::with_capacity(workers.len());
        for worker in workers {
            if !worker.status.is_routable() {
                continue;
            }
            if self.breakers.is_open(&worker.id).await {
                continue;
            }
            let current_connections = connections.get(&worker.id).copied().unwrap_or(0);
            let weight = self
                .weights
                .get(&worker.id)
                .copied()
                .unwrap_or(DEFAULT_WEIGHT);
            pool.push(BalancerCandidate {
                worker_id: worker.id,
                base_url: worker.base_url,
                weight,
                current_connections,
                priority: worker.priority,
            });
        }
        pool
    }

    /// 路由一个业务请求：候选池 → 策略选择 → 熔断复查 → 转发；
    /// 失败时从剩余池随机转移一次，两次都失败则合并两个失败原因。
    pub async fn route_request(
        &self,
        service_type: ServiceType,
        request: ForwardRequest,
    ) -> OrchestratorResult<ForwardedResponse> {
        counter!("orchestrator_requests_routed_total").increment(1);
        let pool = self.candidate_pool(service_type).await;
        if pool.is_empty() {
            counter!("orchestrator_route_unavailable_total").increment(1);
            return Err(OrchestratorError::unavailable(service_type.as_str()));
        }

        let strategy = self.strategy.read().await.clone();
        let selected_id = strategy
            .select_worker(&pool)
            .await?
            .ok_or_else(|| OrchestratorError::unavailable(service_type.as_str()))?;

        // 竞态护栏：选中与转发之间熔断可能已被打开
        if self.breakers.is_open(&selected_id).await {
            return Err(OrchestratorError::unavailable(service_type.as_str()));
        }

        let selected = pool
            .iter()
            .find(|c| c.worker_id == selected_id)
            .cloned()
            .ok_or_else(|| OrchestratorError::unavailable(service_type.as_str()))?;

        let primary_error = match self.try_forward(&selected, &request).await {
            Ok(response) => return Ok(response),
            Err(e) => {
                warn!(worker_id = %selected.worker_id, error = %e, "转发失败，尝试故障转移");
                self.breakers.record_failure(&selected.worker_id).await;
                e
            }
        };

        // 恰好一次故障转移：从剩余池随机抽取另一个Worker
        let remaining: Vec<&BalancerCandidate> = pool
            .iter()
            .filter(|c| c.worker_id != selected.worker_id)
            .collect();
        if remaining.is_empty() {
            return Err(primary_error);
        }
        counter!("orchestrator_failovers_total").increment(1);
        let failover = remaining[rand::rng().random_range(0..remaining.len())].clone();

        match self.try_forward(&failover, &request).await {
            Ok(response) => Ok(response),
            Err(failover_error) => {
                self.breakers.record_failure(&failover.worker_id).await;
                Err(OrchestratorError::ForwardExhausted {
                    primary_id: selected.worker_id.clone(),
                    primary_error: primary_error.to_string(),
                    failover_id: failover.worker_id.clone(),
                    failover_error: failover_error.to_string(),
                })
            }
        }
    }

    /// 带连接计数的转发：计数在所有退出路径上保证释放
    async fn try_forward(
        &self,
        candidate: &BalancerCandidate,
        request: &ForwardRequest,
    ) -> OrchestratorResult<ForwardedResponse> {
        self.adjust_connections(&candidate.worker_id, 1).await;
        let result = self.forward(candidate, request).await;
        self.adjust_connections(&candidate.worker_id, -1).await;

        match result {
            Ok(response) => {
                self.record_response_time(&candidate.worker_id, response.response_time_ms)
                    .await;
                histogram!("orchestrator_forward_duration_ms")
                    .record(response.response_time_ms as f64);
                // 成功转发把熔断器复位为closed且清零失败计数
                self.breakers.reset(&candidate.worker_id).await;
                Ok(response)
            }
            Err(e) => Err(e),
        }
    }

    async fn forward(
        &self,
        candidate: &BalancerCandidate,
        request: &ForwardRequest,
    ) -> OrchestratorResult<ForwardedResponse> {
        let url = format!(
            "{}/{}",
            candidate.base_url.trim_end_matches('/'),
            request.path.trim_start_matches('/')
        );
        let method = reqwest::Method::from_bytes(request.method.as_bytes())
            .map_err(|_| OrchestratorError::validation(format!("非法HTTP方法: {}", request.method)))?;
        let correlation_id = request
            .correlation_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        debug!(worker_id = %candidate.worker_id, url = %url, correlation_id = %correlation_id, "转发业务请求");

        let mut builder = self
            .http
            .request(method, &url)
            .header("X-Correlation-Id", &correlation_id)
            .header("X-Orchestrator-Worker", &candidate.worker_id);
        if !self.bearer_token.is_empty() {
            builder = builder.bearer_auth(&self.bearer_token);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let started = Instant::now();
        let response = builder.send().await?;
        let response_time_ms = started.elapsed().as_millis() as u64;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(OrchestratorError::Upstream {
                worker_id: candidate.worker_id.clone(),
                status: status.as_u16(),
                message: message.chars().take(200).collect(),
            });
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let bytes = response.bytes().await?;
        let body = normalize_body(content_type.as_deref(), &bytes);

        Ok(ForwardedResponse {
            worker_id: candidate.worker_id.clone(),
            status: status.as_u16(),
            content_type,
            body,
            response_time_ms,
        })
    }

    async fn adjust_connections(&self, worker_id: &str, delta: i32) {
        let mut connections = self.connections.write().await;
        let entry = connections.entry(worker_id.to_string()).or_insert(0);
        if delta > 0 {
            *entry += delta as u32;
        } else {
            *entry = entry.saturating_sub((-delta) as u32);
        }
    }

    async fn record_response_time(&self, worker_id: &str, response_time_ms: u64) {
        let mut times = self.response_times.write().await;
        let series = times.entry(worker_id.to_string()).or_default();
        if series.len() >= RESPONSE_TIME_CAPACITY {
            series.pop_front();
        }
        series.push_back(response_time_ms);
    }

    pub async fn status(&self) -> BalancerStatus {
        let workers = self.registry.list_workers().await;
        let connections = self.connections.read().await;
        let times = self.response_times.read().await;

        let mut entries = Vec::with_capacity(workers.len());
        for worker in workers {
            let avg = times
                .get(&worker.id)
                .filter(|s| !s.is_empty())
                .map(|s| s.iter().sum::<u64>() as f64 / s.len() as f64)
                .unwrap_or(0.0);
            entries.push(WorkerBalancerEntry {
                current_connections: connections.get(&worker.id).copied().unwrap_or(0),
                avg_response_time_ms: avg,
                breaker: self.breakers.snapshot(&worker.id).await,
                worker_id: worker.id,
            });
        }

        BalancerStatus {
            strategy: self.strategy_name().await,
            workers: entries,
        }
    }
}

/// 按声明内容类型归一化响应体
fn normalize_body(content_type: Option<&str>, bytes: &[u8]) -> ResponseBody {
    let content_type = content_type.unwrap_or("");
    if content_type.contains("application/json") {
        match serde_json::from_slice(bytes) {
            Ok(value) => ResponseBody::Json(value),
            Err(_) => ResponseBody::Binary(bytes.to_vec()),
        }
    } else if content_type.starts_with("text/") {
        match std::str::from_utf8(bytes) {
            Ok(text) => ResponseBody::Text(text.to_string()),
            Err(_) => ResponseBody::Binary(bytes.to_vec()),
        }
    } else {
        ResponseBody::Binary(bytes.to_vec())
    }
}
