use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use metrics::counter;
use serde::Serialize;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

use orchestrator_core::config::{AuthConfig, MetricsConfig};
use orchestrator_core::models::{
    classify_trend, AggregatedMetrics, Alert, AlertKind, AlertSeverity, MetricSample,
    MetricsAdvisory, Trend, WorkerDescriptor, WorkerStatus, WorkerTrend, DOMAIN_COUNTER_KEYS,
    METRIC_SERIES_CAPACITY,
};
use orchestrator_core::traits::{ttl, CacheStore, NotificationChannel};
use orchestrator_errors::{OrchestratorError, OrchestratorResult};
use orchestrator_registry::WorkerRegistry;

/// 单个采集周期内的并发拉取上限
const PULL_CONCURRENCY: usize = 8;

/// 保留的聚合快照条数，速率估算只需要最近两条
const AGGREGATE_HISTORY_CAPACITY: usize = 10;

/// 趋势分类需要的最少采样数：近3条 vs 前3条
const TREND_WINDOW: usize = 3;

/// 延迟变化超过±50%视为剧烈
const SEVERE_LATENCY_CHANGE: f64 = 0.50;

/// 单个Worker的指标读模型，供API层查询
#[derive(Debug, Clone, Serialize)]
pub struct WorkerMetricsReport {
    pub latest: MetricSample,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trend: Option<WorkerTrend>,
    pub samples_recorded: usize,
}

/// 指标采集器：周期拉取各Worker的自报指标，归一化后维护
/// 每Worker有界时序与全局聚合，并计算趋势与建议性告警。
/// 只读组件：从不回写熔断器或Worker状态。
pub struct MetricsCollector {
    registry: Arc<WorkerRegistry>,
    series: RwLock<HashMap<String, VecDeque<MetricSample>>>,
    aggregates: RwLock<VecDeque<AggregatedMetrics>>,
    advisories: RwLock<Vec<MetricsAdvisory>>,
    channels: Vec<Arc<dyn NotificationChannel>>,
    http: reqwest::Client,
    config: MetricsConfig,
    cache: Option<Arc<dyn CacheStore>>,
    cycle_in_progress: AtomicBool,
}

impl MetricsCollector {
    pub fn new(
        config: MetricsConfig,
        auth: &AuthConfig,
        registry: Arc<WorkerRegistry>,
        channels: Vec<Arc<dyn NotificationChannel>>,
        cache: Option<Arc<dyn CacheStore>>,
    ) -> OrchestratorResult<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.pull_timeout_seconds))
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
            series: RwLock::new(HashMap::new()),
            aggregates: RwLock::new(VecDeque::new()),
            advisories: RwLock::new(Vec::new()),
            channels,
            http,
            config,
            cache,
            cycle_in_progress: AtomicBool::new(false),
        })
    }

    /// 采集主循环
    pub async fn run(self: Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.config.interval_seconds));
        info!(interval = self.config.interval_seconds, "指标采集循环已启动");

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if self.cycle_in_progress.swap(true, Ordering::SeqCst) {
                        warn!("上一采集周期仍在进行，跳过本次");
                        continue;
                    }
                    self.collection_cycle().await;
                    self.cycle_in_progress.store(false, Ordering::SeqCst);
                }
                _ = shutdown_rx.recv() => {
                    info!("指标采集循环收到关闭信号");
                    break;
                }
            }
        }
    }

    /// 一个采集周期：扇出拉取 → 记录采样 → 重算聚合 → 刷新建议告警。
    /// 单个Worker拉取失败只记日志，不影响其余Worker和后续周期。
    pub async fn collection_cycle(&self) {
        let workers: Vec<WorkerDescriptor> = self
            .registry
            .list_workers()
            .await
            .into_iter()
            .filter(|w| w.status != WorkerStatus::Stopped)
            .collect();
        if workers.is_empty() {
            return;
        }

        let results: Vec<(String, OrchestratorResult<MetricSample>)> = stream::iter(workers)
            .map(|worker| async move { (worker.id.clone(), self.pull_worker(&worker).await) })
            .buffer_unordered(PULL_CONCURRENCY)
            .collect()
            .await;

        for (worker_id, result) in results {
            counter!("orchestrator_metrics_pulls_total").increment(1);
            match result {
                Ok(sample) => self.record_sample(sample).await,
                Err(e) => {
                    counter!("orchestrator_metrics_pull_failures_total").increment(1);
                    debug!(worker_id = %worker_id, error = %e, "指标拉取失败");
                }
            }
        }

        self.recompute_aggregate().await;
        self.refresh_advisories().await;
    }

    /// 拉取并归一化单个Worker的指标
    async fn pull_worker(&self, worker: &WorkerDescriptor) -> OrchestratorResult<MetricSample> {
        let url = format!("{}/metrics", worker.base_url.trim_end_matches('/'));
        let response = self.http.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(OrchestratorError::Upstream {
                worker_id: worker.id.clone(),
                status: status.as_u16(),
                message: "指标端点返回非2xx".to_string(),
            });
        }
        let payload: serde_json::Value = response.json().await?;
        Ok(crate::normalize::normalize_payload(&worker.id, &payload))
    }

    /// 采样入有界时序，最新快照写穿缓存
    async fn record_sample(&self, sample: MetricSample) {
        let worker_id = sample.worker_id.clone();
        {
            let mut series = self.series.write().await;
            let entry = series.entry(worker_id.clone()).or_default();
            if entry.len() >= METRIC_SERIES_CAPACITY {
                entry.pop_front();
            }
            entry.push_back(sample.clone());
        }

        if let Some(cache) = &self.cache {
            let key = format!("metrics:latest:{worker_id}");
            if let Ok(value) = serde_json::to_value(&sample) {
                if let Err(e) = cache.put(&key, value, ttl::METRICS_LATEST).await {
                    warn!(worker_id = %worker_id, error = %e, "指标快照缓存写入失败");
                }
            }
        }
    }

    /// 全局聚合：每周期基于各Worker最新采样重算。
    /// 延迟按请求量加权，仅计入上报了非零延迟的Worker；
    /// 请求速率由最近两次聚合的总请求差值估算。
    pub async fn recompute_aggregate(&self) {
        let series = self.series.read().await;
        let latest: Vec<&MetricSample> =
            series.values().filter_map(|s| s.back()).collect();
        if latest.is_empty() {
            return;
        }

        let total_requests: u64 = latest.iter().map(|s| s.requests_total).sum();
        let total_errors: u64 = latest.iter().map(|s| s.errors_total).sum();
        let overall_error_rate = if total_requests > 0 {
            total_errors as f64 / total_requests as f64
        } else {
            0.0
        };

        let (weighted_sum, weight_total) = latest
            .iter()
            .filter(|s| s.latency_avg_ms > 0.0)
            .fold((0.0_f64, 0u64), |(sum, total), s| {
                let weight = s.requests_total.max(1);
                (sum + s.latency_avg_ms * weight as f64, total + weight)
            });
        let weighted_avg_latency_ms = if weight_total > 0 {
            weighted_sum / weight_total as f64
        } else {
            0.0
        };

        let mut domain_counters: HashMap<String, u64> = HashMap::new();
        for key in DOMAIN_COUNTER_KEYS {
            let sum = latest
                .iter()
                .map(|s| s.domain_counters.get(key).copied().unwrap_or(0))
                .sum();
            domain_counters.insert(key.to_string(), sum);
        }

        let mut trends = HashMap::new();
        for (worker_id, samples) in series.iter() {
            if let Some(trend) = compute_worker_trend(samples) {
                trends.insert(worker_id.clone(), trend);
            }
        }
        let workers_reporting = latest.len();
        drop(latest);
        drop(series);

        let timestamp = Utc::now();
        let requests_per_second = {
            let aggregates = self.aggregates.read().await;
            aggregates
                .back()
                .and_then(|prev| {
                    let elapsed = (timestamp - prev.timestamp).num_milliseconds() as f64 / 1000.0;
                    if elapsed <= 0.0 {
                        return None;
                    }
                    let delta = total_requests.saturating_sub(prev.total_requests) as f64;
                    Some(delta / elapsed)
                })
                .unwrap_or(0.0)
        };

        let aggregated = AggregatedMetrics {
            timestamp,
            workers_reporting,
            total_requests,
            total_errors,
            overall_error_rate,
            weighted_avg_latency_ms,
            requests_per_second,
            domain_counters,
            trends,
        };

        {
            let mut aggregates = self.aggregates.write().await;
            if aggregates.len() >= AGGREGATE_HISTORY_CAPACITY {
                aggregates.pop_front();
            }
            aggregates.push_back(aggregated.clone());
        }

        if let Some(cache) = &self.cache {
            if let Ok(value) = serde_json::to_value(&aggregated) {
                if let Err(e) = cache
                    .put("metrics:aggregated:latest", value, ttl::METRICS_AGGREGATED)
                    .await
                {
                    warn!(error = %e, "聚合指标缓存写入失败");
                }
            }
        }
    }

    /// 基于各Worker最新采样刷新建议性告警列表。
    /// 阈值：错误率、平均延迟、内存占用；每周期整体替换，不做去重。
    pub async fn refresh_advisories(&self) {
        let series = self.series.read().await;
        let mut advisories = Vec::new();
        for samples in series.values() {
            let Some(sample) = samples.back() else {
                continue;
            };
            if sample.error_rate > self.config.error_rate_alert_threshold {
                advisories.push(MetricsAdvisory {
                    worker_id: sample.worker_id.clone(),
                    reason: format!("错误率 {:.1}% 超过阈值", sample.error_rate * 100.0),
                    value: sample.error_rate,
                    threshold: self.config.error_rate_alert_threshold,
                    timestamp: sample.timestamp,
                });
            }
            if sample.latency_avg_ms > self.config.latency_alert_threshold_ms {
                advisories.push(MetricsAdvisory {
                    worker_id: sample.worker_id.clone(),
                    reason: format!("平均延迟 {:.0}ms 超过阈值", sample.latency_avg_ms),
                    value: sample.latency_avg_ms,
                    threshold: self.config.latency_alert_threshold_ms,
                    timestamp: sample.timestamp,
                });
            }
            if let Some(memory) = sample.memory_mb {
                if memory > self.config.memory_alert_threshold_mb {
                    advisories.push(MetricsAdvisory {
                        worker_id: sample.worker_id.clone(),
                        reason: format!("内存占用 {memory:.0}MB 超过阈值"),
                        value: memory,
                        threshold: self.config.memory_alert_threshold_mb,
                        timestamp: sample.timestamp,
                    });
                }
            }
        }
        drop(series);

        for advisory in &advisories {
            counter!("orchestrator_metrics_advisories_total").increment(1);
            let alert = Alert::new(
                advisory.worker_id.clone(),
                AlertKind::MetricsAdvisory,
                AlertSeverity::Warning,
                advisory.reason.clone(),
            );
            for channel in &self.channels {
                if let Err(e) = channel.notify(&alert).await {
                    warn!(channel = channel.name(), error = %e, "建议告警投递失败");
                }
            }
        }

        *self.advisories.write().await = advisories;
    }

    pub async fn latest_aggregate(&self) -> Option<AggregatedMetrics> {
        self.aggregates.read().await.back().cloned()
    }

    pub async fn worker_report(&self, worker_id: &str) -> Option<WorkerMetricsReport> {
        let series = self.series.read().await;
        let samples = series.get(worker_id)?;
        let latest = samples.back()?.clone();
        Some(WorkerMetricsReport {
            trend: compute_worker_trend(samples),
            samples_recorded: samples.len(),
            latest,
        })
    }

    pub async fn advisories(&self) -> Vec<MetricsAdvisory> {
        self.advisories.read().await.clone()
    }

    #[cfg(test)]
    pub(crate) async fn inject_samples(&self, worker_id: &str, samples: Vec<MetricSample>) {
        self.series
            .write()
            .await
            .insert(worker_id.to_string(), samples.into());
    }
}

/// 近3条采样与其前3条采样的均值对比；采样不足6条时不出趋势
fn compute_worker_trend(samples: &VecDeque<MetricSample>) -> Option<WorkerTrend> {
    if samples.len() < TREND_WINDOW * 2 {
        return None;
    }
    let recent: Vec<&MetricSample> = samples.iter().rev().take(TREND_WINDOW).collect();
    let previous: Vec<&MetricSample> = samples
        .iter()
        .rev()
        .skip(TREND_WINDOW)
        .take(TREND_WINDOW)
        .collect();

    let avg = |window: &[&MetricSample], f: fn(&MetricSample) -> f64| {
        window.iter().map(|s| f(s)).sum::<f64>() / window.len() as f64
    };

    let requests = classify_trend(
        avg(&previous, |s| s.requests_total as f64),
        avg(&recent, |s| s.requests_total as f64),
    );
    let error_rate = classify_trend(
        avg(&previous, |s| s.error_rate),
        avg(&recent, |s| s.error_rate),
    );

    let prev_latency = avg(&previous, |s| s.latency_avg_ms);
    let recent_latency = avg(&recent, |s| s.latency_avg_ms);
    let latency = classify_trend(prev_latency, recent_latency);
    let latency_change = if prev_latency > 0.0 {
        (recent_latency - prev_latency) / prev_latency
    } else if recent_latency > 0.0 {
        1.0
    } else {
        0.0
    };

    Some(WorkerTrend {
        requests,
        error_rate,
        is_improving: latency == Trend::Decreasing,
        is_degrading: latency == Trend::Increasing,
        is_severe: latency_change.abs() > SEVERE_LATENCY_CHANGE,
        latency,
    })
}

#[cfg(test)]
mod trend_tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;

    fn sample(requests: u64, error_rate: f64, latency: f64) -> MetricSample {
        MetricSample {
            worker_id: "w1".to_string(),
            timestamp: Utc::now(),
            requests_total: requests,
            errors_total: 0,
            error_rate,
            latency_min_ms: 0.0,
            latency_avg_ms: latency,
            latency_max_ms: latency,
            cpu_percent: None,
            memory_mb: None,
            uptime_seconds: None,
            domain_counters: HashMap::new(),
        }
    }

    #[test]
    fn test_increasing_requests_trend() {
        let samples: VecDeque<MetricSample> = [10, 10, 10, 18, 19, 20]
            .iter()
            .map(|r| sample(*r, 0.0, 100.0))
            .collect();
        let trend = compute_worker_trend(&samples).unwrap();
        assert_eq!(trend.requests, Trend::Increasing);
        assert_eq!(trend.latency, Trend::Stable);
        assert!(!trend.is_degrading);
    }

    #[test]
    fn test_flat_series_is_stable() {
        let samples: VecDeque<MetricSample> =
            (0..6).map(|_| sample(100, 0.01, 50.0)).collect();
        let trend = compute_worker_trend(&samples).unwrap();
        assert_eq!(trend.requests, Trend::Stable);
        assert_eq!(trend.error_rate, Trend::Stable);
        assert!(!trend.is_improving && !trend.is_degrading && !trend.is_severe);
    }

    #[test]
    fn test_severe_latency_degradation() {
        let mut samples: VecDeque<MetricSample> = VecDeque::new();
        for _ in 0..3 {
            samples.push_back(sample(100, 0.0, 100.0));
        }
        for _ in 0..3 {
            samples.push_back(sample(100, 0.0, 200.0));
        }
        let trend = compute_worker_trend(&samples).unwrap();
        assert_eq!(trend.latency, Trend::Increasing);
        assert!(trend.is_degrading);
        assert!(trend.is_severe);
    }

    #[test]
    fn test_latency_improvement_without_severity() {
        let mut samples: VecDeque<MetricSample> = VecDeque::new();
        for _ in 0..3 {
            samples.push_back(sample(100, 0.0, 100.0));
        }
        for _ in 0..3 {
            samples.push_back(sample(100, 0.0, 80.0));
        }
        let trend = compute_worker_trend(&samples).unwrap();
        assert!(trend.is_improving);
        assert!(!trend.is_severe);
    }

    #[test]
    fn test_insufficient_samples_yield_no_trend() {
        let samples: VecDeque<MetricSample> =
            (0..5).map(|_| sample(10, 0.0, 10.0)).collect();
        assert!(compute_worker_trend(&samples).is_none());
    }
}
