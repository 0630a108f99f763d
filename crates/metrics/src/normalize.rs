use std::collections::HashMap;

use chrono::Utc;
use serde_json::Value;

use orchestrator_core::models::{MetricSample, DOMAIN_COUNTER_KEYS};

/// 各Worker上报的指标字段拼写并不统一（历史版本遗留），
/// 这里按别名表归一化到规范的MetricSample字段。
/// 每个字段按别名顺序取第一个命中的值。
const REQUESTS_ALIASES: [&str; 4] = ["requests_total", "total_requests", "requests", "requestCount"];
const ERRORS_ALIASES: [&str; 4] = ["errors_total", "total_errors", "errors", "errorCount"];
const ERROR_RATE_ALIASES: [&str; 2] = ["error_rate", "errorRate"];
const LATENCY_MIN_ALIASES: [&str; 3] = ["latency_min_ms", "min_latency_ms", "minResponseTime"];
const LATENCY_AVG_ALIASES: [&str; 4] = [
    "latency_avg_ms",
    "avg_latency_ms",
    "avg_response_time_ms",
    "avgResponseTime",
];
const LATENCY_MAX_ALIASES: [&str; 3] = ["latency_max_ms", "max_latency_ms", "maxResponseTime"];
const CPU_ALIASES: [&str; 3] = ["cpu_percent", "cpu_usage_percent", "cpuUsage"];
const MEMORY_ALIASES: [&str; 3] = ["memory_mb", "memory_usage_mb", "memoryUsage"];
const UPTIME_ALIASES: [&str; 3] = ["uptime_seconds", "uptime", "uptimeSeconds"];

/// 业务计数器的别名表，与DOMAIN_COUNTER_KEYS一一对应
const DOMAIN_ALIASES: [(&str, [&str; 3]); 4] = [
    (
        "wallet_operations",
        ["wallet_operations", "wallet_ops", "walletOperations"],
    ),
    ("ocr_jobs", ["ocr_jobs", "ocr_processed", "ocrJobs"]),
    (
        "messages_sent",
        ["messages_sent", "sent_messages", "messagesSent"],
    ),
    (
        "active_sessions",
        ["active_sessions", "sessions_active", "activeSessions"],
    ),
];

/// 顶层优先，其次查嵌套的 "metrics" 对象
fn lookup<'a>(payload: &'a Value, names: &[&str]) -> Option<&'a Value> {
    for name in names {
        if let Some(value) = payload.get(name) {
            return Some(value);
        }
    }
    let nested = payload.get("metrics")?;
    for name in names {
        if let Some(value) = nested.get(name) {
            return Some(value);
        }
    }
    None
}

fn number(payload: &Value, names: &[&str]) -> Option<f64> {
    lookup(payload, names).and_then(Value::as_f64)
}

fn integer(payload: &Value, names: &[&str]) -> Option<u64> {
    lookup(payload, names).and_then(|v| v.as_u64().or_else(|| v.as_f64().map(|f| f.max(0.0) as u64)))
}

/// 把一次原始指标拉取归一化为规范采样。
/// 缺失字段取零值；错误率优先用自报值，否则由计数推导；
/// 自报错误率大于1时按百分比处理。
pub fn normalize_payload(worker_id: &str, payload: &Value) -> MetricSample {
    let requests_total = integer(payload, &REQUESTS_ALIASES).unwrap_or(0);
    let errors_total = integer(payload, &ERRORS_ALIASES).unwrap_or(0);

    let error_rate = match number(payload, &ERROR_RATE_ALIASES) {
        Some(rate) if rate > 1.0 => rate / 100.0,
        Some(rate) => rate,
        None if requests_total > 0 => errors_total as f64 / requests_total as f64,
        None => 0.0,
    };

    let mut domain_counters: HashMap<String, u64> = HashMap::new();
    for (canonical, aliases) in DOMAIN_ALIASES {
        domain_counters.insert(
            canonical.to_string(),
            integer(payload, &aliases).unwrap_or(0),
        );
    }
    debug_assert_eq!(domain_counters.len(), DOMAIN_COUNTER_KEYS.len());

    MetricSample {
        worker_id: worker_id.to_string(),
        timestamp: Utc::now(),
        requests_total,
        errors_total,
        error_rate,
        latency_min_ms: number(payload, &LATENCY_MIN_ALIASES).unwrap_or(0.0),
        latency_avg_ms: number(payload, &LATENCY_AVG_ALIASES).unwrap_or(0.0),
        latency_max_ms: number(payload, &LATENCY_MAX_ALIASES).unwrap_or(0.0),
        cpu_percent: number(payload, &CPU_ALIASES),
        memory_mb: number(payload, &MEMORY_ALIASES),
        uptime_seconds: integer(payload, &UPTIME_ALIASES),
        domain_counters,
    }
}
