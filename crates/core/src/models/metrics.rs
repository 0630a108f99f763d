use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 指标时序容量上限（约24小时 @ 1分钟采样）
pub const METRIC_SERIES_CAPACITY: usize = 1440;

/// 归一化后的一次指标采样
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSample {
    pub worker_id: String,
    pub timestamp: DateTime<Utc>,
    pub requests_total: u64,
    pub errors_total: u64,
    /// 0.0 - 1.0
    pub error_rate: f64,
    pub latency_min_ms: f64,
    pub latency_avg_ms: f64,
    pub latency_max_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_mb: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime_seconds: Option<u64>,
    /// 固定的业务计数器集合，缺失的键记为0
    #[serde(default)]
    pub domain_counters: HashMap<String, u64>,
}

/// 业务计数器的规范键名
pub const DOMAIN_COUNTER_KEYS: [&str; 4] = [
    "wallet_operations",
    "ocr_jobs",
    "messages_sent",
    "active_sessions",
];

/// 趋势分类：近3个采样均值 vs 前3个采样均值
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Increasing,
    Decreasing,
    Stable,
}

/// 按±10%阈值分类趋势；样本不足时视为stable
pub fn classify_trend(previous_avg: f64, recent_avg: f64) -> Trend {
    if previous_avg <= 0.0 {
        if recent_avg > 0.0 {
            return Trend::Increasing;
        }
        return Trend::Stable;
    }
    let change = (recent_avg - previous_avg) / previous_avg;
    if change > 0.10 {
        Trend::Increasing
    } else if change < -0.10 {
        Trend::Decreasing
    } else {
        Trend::Stable
    }
}

/// 单个Worker的趋势汇总
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerTrend {
    pub requests: Trend,
    pub error_rate: Trend,
    pub latency: Trend,
    /// 延迟下降超过10%
    pub is_improving: bool,
    /// 延迟上升超过10%
    pub is_degrading: bool,
    /// 延迟变化超过±50%时置位
    pub is_severe: bool,
}

/// 全局聚合指标，每个采集周期重新计算
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedMetrics {
    pub timestamp: DateTime<Utc>,
    pub workers_reporting: usize,
    pub total_requests: u64,
    pub total_errors: u64,
    pub overall_error_rate: f64,
    /// 按请求量加权的平均延迟，仅统计上报了非零延迟的Worker
    pub weighted_avg_latency_ms: f64,
    /// 由最近两次聚合的请求量差值估算
    pub requests_per_second: f64,
    pub domain_counters: HashMap<String, u64>,
    pub trends: HashMap<String, WorkerTrend>,
}

/// 采集器计算出的建议性告警，只读暴露，不反向驱动任何状态
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsAdvisory {
    pub worker_id: String,
    pub reason: String,
    pub value: f64,
    pub threshold: f64,
    pub timestamp: DateTime<Utc>,
}
