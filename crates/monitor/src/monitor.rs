use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

use orchestrator_core::config::{AuthConfig, HealthConfig};
use orchestrator_core::models::{
    Alert, AlertKind, AlertSeverity, HealthHistory, HealthRecord, WorkerDescriptor, WorkerStatus,
    HEALTH_HISTORY_DURABLE_SLICE,
};
use orchestrator_core::traits::{ttl, CacheStore, NotificationChannel};
use orchestrator_errors::{OrchestratorError, OrchestratorResult};
use orchestrator_registry::WorkerRegistry;

/// Worker健康端点的自报文档，字段均可缺省
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HealthPayload {
    pub status: Option<String>,
    #[serde(default)]
    pub errors: Vec<String>,
}

/// 健康状态判定规则，对每次成功的HTTP交换求值。
/// 规则顺序：非2xx ⇒ unhealthy；超阈值响应 ⇒ degraded；
/// 自报healthy ⇒ healthy；自报错误列表非空 ⇒ degraded；默认healthy。
pub fn evaluate_probe(
    http_status: u16,
    response_time_ms: u64,
    threshold_ms: u64,
    payload: &HealthPayload,
) -> WorkerStatus {
    if !(200..300).contains(&http_status) {
        return WorkerStatus::Unhealthy;
    }
    if response_time_ms > threshold_ms {
        return WorkerStatus::Degraded;
    }
    if payload.status.as_deref() == Some("healthy") {
        return WorkerStatus::Healthy;
    }
    if !payload.errors.is_empty() {
        return WorkerStatus::Degraded;
    }
    WorkerStatus::Healthy
}

/// 健康摘要中的单个Worker条目
#[derive(Debug, Clone, Serialize)]
pub struct WorkerHealthEntry {
    pub worker_id: String,
    pub status: WorkerStatus,
    pub consecutive_failures: usize,
    pub error_rate: f64,
    pub avg_response_time_ms: f64,
    pub last_check: Option<DateTime<Utc>>,
}

/// 全局健康摘要
#[derive(Debug, Clone, Serialize)]
pub struct HealthSummary {
    pub total_workers: usize,
    pub healthy: usize,
    pub degraded: usize,
    pub unhealthy: usize,
    pub other: usize,
    pub workers: Vec<WorkerHealthEntry>,
    pub generated_at: DateTime<Utc>,
}

/// 健康监控器：周期探测所有注册Worker，维护有界历史，
/// 派生告警并驱动慢性不健康Worker的自动恢复。
pub struct HealthMonitor {
    registry: Arc<WorkerRegistry>,
    histories: RwLock<HashMap<String, HealthHistory>>,
    channels: Vec<Arc<dyn NotificationChannel>>,
    http: reqwest::Client,
    config: HealthConfig,
    cache: Option<Arc<dyn CacheStore>>,
    probe_in_progress: AtomicBool,
    recovery_in_progress: AtomicBool,
}

impl HealthMonitor {
    pub fn new(
        config: HealthConfig,
        auth: &AuthConfig,
        registry: Arc<WorkerRegistry>,
        channels: Vec<Arc<dyn NotificationChannel>>,
        cache: Option<Arc<dyn CacheStore>>,
    ) -> OrchestratorResult<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.probe_timeout_seconds))
            .user_agent(auth.user_agent.clone());
        if !auth.bearer_token.is_empty() {
            let mut headers = reqwest::header::HeaderMap::new();
            let value = format!("Bearer {}", auth.bearer_token);
            if let Ok(header) = reqwest::header::HeaderValue::from_str(&value) {
                headers.insert(reqwest::header::AUTHORIZATION, header);
            }
            builder = builder.default_headers(headers);
        }
        let http = builder
            .build()
            .map_err(|e| OrchestratorError::internal(format!("构建HTTP客户端失败: {e}")))?;

        Ok(Self {
            registry,
            histories: RwLock::new(HashMap::new()),
            channels,
            http,
            config,
            cache,
            probe_in_progress: AtomicBool::new(false),
            recovery_in_progress: AtomicBool::new(false),
        })
    }

    /// 监控主循环：探测周期 + 粗粒度的自动恢复周期
    pub async fn run(self: Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut probe_interval =
            tokio::time::interval(Duration::from_secs(self.config.interval_seconds));
        let mut recovery_interval =
            tokio::time::interval(Duration::from_secs(self.config.recovery_interval_seconds));
        info!(
            interval = self.config.interval_seconds,
            "健康监控循环已启动"
        );

        loop {
            tokio::select! {
                _ = probe_interval.tick() => {
                    if self.probe_in_progress.swap(true, Ordering::SeqCst) {
                        warn!("上一探测周期仍在进行，跳过本次");
                        continue;
                    }
                    self.probe_cycle().await;
                    self.probe_in_progress.store(false, Ordering::SeqCst);
                }
                _ = recovery_interval.tick() => {
                    if self.recovery_in_progress.swap(true, Ordering::SeqCst) {
                        continue;
                    }
                    self.recovery_cycle().await;
                    self.recovery_in_progress.store(false, Ordering::SeqCst);
                }
                _ = shutdown_rx.recv() => {
                    info!("健康监控循环收到关闭信号");
                    break;
                }
            }
        }
    }

    /// 一个探测周期：对所有注册Worker扇出探测，单点失败互不影响。
    /// 每个结果独立且幂等地写回对应Worker的记录，完成顺序不影响终态。
    pub async fn probe_cycle(&self) {
        let workers = self.registry.list_workers().await;
        if workers.is_empty() {
            return;
        }

        let records: Vec<HealthRecord> = stream::iter(workers)
            .map(|worker| async move { self.probe_worker(&worker).await })
            .buffer_unordered(self.config.probe_concurrency.max(1))
            .collect()
            .await;

        for record in records {
            counter!("orchestrator_health_probes_total").increment(1);
            if record.status == WorkerStatus::Unhealthy {
                counter!("orchestrator_health_probe_failures_total").increment(1);
            }
            self.apply_record(record).await;
        }
    }

    /// 单个Worker的健康探测。超时、连接错误、非2xx都转换为
    /// unhealthy记录，从不让异常逃出本函数。
    async fn probe_worker(&self, worker: &WorkerDescriptor) -> HealthRecord {
        let url = format!("{}/health", worker.base_url.trim_end_matches('/'));
        let started = Instant::now();

        match self.http.get(&url).send().await {
            Ok(response) => {
                let http_status = response.status().as_u16();
                let payload = response.json::<HealthPayload>().await.unwrap_or_default();
                let response_time_ms = started.elapsed().as_millis() as u64;
                let status = evaluate_probe(
                    http_status,
                    response_time_ms,
                    self.config.response_time_threshold_ms,
                    &payload,
                );
                HealthRecord {
                    worker_id: worker.id.clone(),
                    status,
                    response_time_ms,
                    http_status: Some(http_status),
                    timestamp: Utc::now(),
                    warnings: payload.errors,
                    error: None,
                }
            }
            Err(e) => {
                debug!(worker_id = %worker.id, error = %e, "健康探测失败");
                HealthRecord {
                    worker_id: worker.id.clone(),
                    status: WorkerStatus::Unhealthy,
                    response_time_ms: started.elapsed().as_millis() as u64,
                    http_status: None,
                    timestamp: Utc::now(),
                    warnings: vec![],
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// 把一次探测结果写入历史、回写注册表状态、评估并分发告警
    async fn apply_record(&self, record: HealthRecord) {
        let worker_id = record.worker_id.clone();
        let status = record.status;

        let alerts = {
            let mut histories = self.histories.write().await;
            let history = histories.entry(worker_id.clone()).or_default();
            history.push(record);
            self.evaluate_alerts(&worker_id, history)
        };

        // 状态只通过注册表自己的更新方法写入
        if let Err(e) = self.registry.update_status(&worker_id, status, None).await {
            warn!(worker_id = %worker_id, error = %e, "回写Worker状态失败");
        }

        self.cache_history(&worker_id).await;

        for alert in alerts {
            self.dispatch_alert(alert).await;
        }
    }

    /// 告警规则，逐条独立评估，同一周期可同时触发多条；
    /// 条件持续满足时每个周期都会重新触发，不做去重。
    fn evaluate_alerts(&self, worker_id: &str, history: &HealthHistory) -> Vec<Alert> {
        let mut alerts = Vec::new();

        let failures = history.consecutive_failures();
        if failures >= self.config.consecutive_failure_threshold {
            alerts.push(Alert::new(
                worker_id.to_string(),
                AlertKind::ConsecutiveFailures,
                AlertSeverity::Critical,
                format!("连续 {failures} 次健康探测失败"),
            ));
        }

        let error_rate = history.rolling_error_rate();
        if error_rate >= self.config.error_rate_threshold {
            alerts.push(Alert::new(
                worker_id.to_string(),
                AlertKind::HighErrorRate,
                AlertSeverity::Warning,
                format!("滚动错误率 {:.0}%", error_rate * 100.0),
            ));
        }

        let avg_rt = history.rolling_avg_response_time();
        if avg_rt > self.config.response_time_threshold_ms as f64 {
            alerts.push(Alert::new(
                worker_id.to_string(),
                AlertKind::PerformanceDegradation,
                AlertSeverity::Warning,
                format!("滚动平均响应时间 {avg_rt:.0}ms 超过阈值"),
            ));
        }

        alerts
    }

    /// 把告警独立投递到每个通道；单个通道失败不影响其余通道
    pub async fn dispatch_alert(&self, alert: Alert) {
        counter!("orchestrator_alerts_total").increment(1);
        for channel in &self.channels {
            if let Err(e) = channel.notify(&alert).await {
                warn!(
                    channel = channel.name(),
                    worker_id = %alert.worker_id,
                    error = %e,
                    "告警投递失败"
                );
            }
        }

        if let Some(cache) = &self.cache {
            let key = format!(
                "alert:{}:{}:{}",
                alert.timestamp.timestamp(),
                alert.worker_id,
                alert.kind.as_str()
            );
            if let Ok(value) = serde_json::to_value(&alert) {
                if let Err(e) = cache.put(&key, value, ttl::ALERT).await {
                    warn!(error = %e, "告警缓存写入失败");
                }
            }
        }
    }

    /// 自动恢复周期：对慢性不健康的Worker触发远程重启。
    /// 除本周期间隔外不再做退避——持续失败会在每个周期重试，这是有意的简单策略。
    pub async fn recovery_cycle(&self) {
        let workers = self.registry.list_workers().await;
        for worker in workers {
            if worker.status != WorkerStatus::Unhealthy {
                continue;
            }
            let failures = {
                let histories = self.histories.read().await;
                histories
                    .get(&worker.id)
                    .map(|h| h.consecutive_failures())
                    .unwrap_or(0)
            };
            if failures < self.config.consecutive_failure_threshold {
                continue;
            }

            info!(worker_id = %worker.id, failures, "触发自动恢复重启");
            counter!("orchestrator_auto_recoveries_total").increment(1);
            let alert = match self.registry.restart(&worker.id).await {
                Ok(result) if result.success => Alert::new(
                    worker.id.clone(),
                    AlertKind::AutoRecoverySuccess,
                    AlertSeverity::Info,
                    format!("Worker {} 自动恢复重启已下发", worker.id),
                ),
                Ok(result) => Alert::new(
                    worker.id.clone(),
                    AlertKind::AutoRecoveryFailed,
                    AlertSeverity::Critical,
                    format!(
                        "Worker {} 自动恢复失败: {}",
                        worker.id,
                        result.error.unwrap_or_default()
                    ),
                ),
                Err(e) => Alert::new(
                    worker.id.clone(),
                    AlertKind::AutoRecoveryFailed,
                    AlertSeverity::Critical,
                    format!("Worker {} 自动恢复失败: {e}", worker.id),
                ),
            };
            self.dispatch_alert(alert).await;
        }
    }

    /// 当前+最近10条历史写入缓存层（仅该切片参与外部持久化）
    async fn cache_history(&self, worker_id: &str) {
        if let Some(cache) = &self.cache {
            let histories = self.histories.read().await;
            if let Some(history) = histories.get(worker_id) {
                let payload = serde_json::json!({
                    "current": history.latest(),
                    "history": history.recent(HEALTH_HISTORY_DURABLE_SLICE),
                });
                let key = format!("health:{worker_id}");
                if let Err(e) = cache.put(&key, payload, ttl::HEALTH).await {
                    warn!(worker_id = %worker_id, error = %e, "健康历史缓存写入失败");
                }
            }
        }
    }

    pub async fn health_summary(&self) -> HealthSummary {
        let workers = self.registry.list_workers().await;
        let histories = self.histories.read().await;

        let mut entries = Vec::with_capacity(workers.len());
        let (mut healthy, mut degraded, mut unhealthy, mut other) = (0, 0, 0, 0);
        for worker in &workers {
            match worker.status {
                WorkerStatus::Healthy => healthy += 1,
                WorkerStatus::Degraded => degraded += 1,
                WorkerStatus::Unhealthy => unhealthy += 1,
                _ => other += 1,
            }
            let (failures, error_rate, avg_rt) = histories
                .get(&worker.id)
                .map(|h| {
                    (
                        h.consecutive_failures(),
                        h.rolling_error_rate(),
                        h.rolling_avg_response_time(),
                    )
                })
                .unwrap_or((0, 0.0, 0.0));
            entries.push(WorkerHealthEntry {
                worker_id: worker.id.clone(),
                status: worker.status,
                consecutive_failures: failures,
                error_rate,
                avg_response_time_ms: avg_rt,
                last_check: worker.last_health_check,
            });
        }

        HealthSummary {
            total_workers: workers.len(),
            healthy,
            degraded,
            unhealthy,
            other,
            workers: entries,
            generated_at: Utc::now(),
        }
    }

    pub async fn worker_history(&self, worker_id: &str) -> Option<Vec<HealthRecord>> {
        let histories = self.histories.read().await;
        histories
            .get(worker_id)
            .map(|h| h.iter().cloned().collect())
    }

    #[cfg(test)]
    pub(crate) async fn inject_history(&self, worker_id: &str, history: HealthHistory) {
        self.histories
            .write()
            .await
            .insert(worker_id.to_string(), history);
    }

    #[cfg(test)]
    pub(crate) fn evaluate_alerts_for_test(
        &self,
        worker_id: &str,
        history: &HealthHistory,
    ) -> Vec<Alert> {
        self.evaluate_alerts(worker_id, history)
    }
}
