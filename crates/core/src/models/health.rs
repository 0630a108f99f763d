use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::worker::WorkerStatus;

/// 单次健康探测的记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthRecord {
    pub worker_id: String,
    pub status: WorkerStatus,
    pub response_time_ms: u64,
    pub http_status: Option<u16>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// 历史记录容量上限，超出后淘汰最旧记录
pub const HEALTH_HISTORY_CAPACITY: usize = 100;

/// 允许进入外部缓存层的历史切片长度
pub const HEALTH_HISTORY_DURABLE_SLICE: usize = 10;

/// 滚动统计窗口（错误率、平均响应时间）
const ROLLING_WINDOW: usize = 10;

/// 单个Worker的有界健康历史
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthHistory {
    records: VecDeque<HealthRecord>,
}

impl HealthHistory {
    pub fn new() -> Self {
        Self {
            records: VecDeque::with_capacity(HEALTH_HISTORY_CAPACITY),
        }
    }

    pub fn push(&mut self, record: HealthRecord) {
        if self.records.len() >= HEALTH_HISTORY_CAPACITY {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn latest(&self) -> Option<&HealthRecord> {
        self.records.back()
    }

    /// 从最新记录向前扫描，直到遇到非unhealthy的记录为止
    pub fn consecutive_failures(&self) -> usize {
        self.records
            .iter()
            .rev()
            .take_while(|r| r.status == WorkerStatus::Unhealthy)
            .count()
    }

    /// 最近10条记录的错误率（0.0 - 1.0）
    pub fn rolling_error_rate(&self) -> f64 {
        let window: Vec<&HealthRecord> = self.records.iter().rev().take(ROLLING_WINDOW).collect();
        if window.is_empty() {
            return 0.0;
        }
        let failures = window
            .iter()
            .filter(|r| r.status == WorkerStatus::Unhealthy)
            .count();
        failures as f64 / window.len() as f64
    }

    /// 最近10条记录的平均响应时间（毫秒）
    pub fn rolling_avg_response_time(&self) -> f64 {
        let window: Vec<&HealthRecord> = self.records.iter().rev().take(ROLLING_WINDOW).collect();
        if window.is_empty() {
            return 0.0;
        }
        let total: u64 = window.iter().map(|r| r.response_time_ms).sum();
        total as f64 / window.len() as f64
    }

    /// 最新N条记录（最旧在前），用于缓存层的持久化切片
    pub fn recent(&self, n: usize) -> Vec<HealthRecord> {
        let skip = self.records.len().saturating_sub(n);
        self.records.iter().skip(skip).cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HealthRecord> {
        self.records.iter()
    }
}

/// 告警严重级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

/// 告警类别，字符串形式即对外稳定的类别名
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlertKind {
    ConsecutiveFailures,
    HighErrorRate,
    PerformanceDegradation,
    AutoRecoverySuccess,
    AutoRecoveryFailed,
    MetricsAdvisory,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::ConsecutiveFailures => "consecutive-failures",
            AlertKind::HighErrorRate => "high-error-rate",
            AlertKind::PerformanceDegradation => "performance-degradation",
            AlertKind::AutoRecoverySuccess => "auto-recovery-success",
            AlertKind::AutoRecoveryFailed => "auto-recovery-failed",
            AlertKind::MetricsAdvisory => "metrics-advisory",
        }
    }
}

/// 一条健康/运维告警
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub worker_id: String,
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    pub fn new<S: Into<String>>(
        worker_id: S,
        kind: AlertKind,
        severity: AlertSeverity,
        message: S,
    ) -> Self {
        Self {
            worker_id: worker_id.into(),
            kind,
            severity,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}
