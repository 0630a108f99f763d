use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use orchestrator_errors::{OrchestratorError, OrchestratorResult};

use crate::models::ServiceType;

/// 应用配置根结构，从TOML文件加载，环境变量可覆盖关键项
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub balancer: BalancerConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub workers: Vec<WorkerEndpointConfig>,
    #[serde(default)]
    pub external_dependencies: Vec<ExternalDependencyConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub bind_address: String,
    /// 告警Webhook通道地址，未配置则只走日志通道
    pub alert_webhook_url: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            alert_webhook_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// 对Worker出站调用携带的Bearer凭证
    pub bearer_token: String,
    pub user_agent: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            bearer_token: String::new(),
            user_agent: "orchestrator-control-plane/1.0".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    pub interval_seconds: u64,
    pub probe_timeout_seconds: u64,
    /// 超过该窗口未刷新的记录会被维护清扫移除
    pub stale_after_seconds: u64,
    pub sweep_interval_seconds: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 30,
            probe_timeout_seconds: 5,
            stale_after_seconds: 600,
            sweep_interval_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    pub interval_seconds: u64,
    pub probe_timeout_seconds: u64,
    pub response_time_threshold_ms: u64,
    pub recovery_interval_seconds: u64,
    pub consecutive_failure_threshold: usize,
    /// 0.0 - 1.0
    pub error_rate_threshold: f64,
    /// 单个探测周期内的并发探测上限
    pub probe_concurrency: usize,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 30,
            probe_timeout_seconds: 10,
            response_time_threshold_ms: 5000,
            recovery_interval_seconds: 60,
            consecutive_failure_threshold: 3,
            error_rate_threshold: 0.10,
            probe_concurrency: 16,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalancerConfig {
    /// round-robin | least-connections | weighted | health-aware
    pub strategy: String,
    pub forward_timeout_seconds: u64,
    pub breaker_cooldown_seconds: u64,
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self {
            strategy: "health-aware".to_string(),
            forward_timeout_seconds: 30,
            breaker_cooldown_seconds: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub interval_seconds: u64,
    pub pull_timeout_seconds: u64,
    pub error_rate_alert_threshold: f64,
    pub latency_alert_threshold_ms: f64,
    pub memory_alert_threshold_mb: f64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            interval_seconds: 60,
            pull_timeout_seconds: 15,
            error_rate_alert_threshold: 0.05,
            latency_alert_threshold_ms: 5000.0,
            memory_alert_threshold_mb: 200.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    pub enabled: bool,
    pub redis_url: Option<String>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            redis_url: None,
        }
    }
}

/// 静态配置的Worker端点，启动时预注册进Registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerEndpointConfig {
    pub id: String,
    pub service_type: ServiceType,
    pub base_url: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_one")]
    pub max_instances: u32,
    #[serde(default)]
    pub weight: Option<u32>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

fn default_one() -> u32 {
    1
}

/// 外部依赖（非Worker），只参与服务发现探测
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalDependencyConfig {
    pub name: String,
    pub probe_url: String,
    #[serde(default = "default_dependency_type")]
    pub service_type: String,
}

fn default_dependency_type() -> String {
    "external".to_string()
}

impl AppConfig {
    /// 从TOML文件加载配置；文件缺失时报配置错误
    pub fn load<P: AsRef<Path>>(path: P) -> OrchestratorResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            OrchestratorError::config_error(format!("无法读取配置文件 {}: {e}", path.display()))
        })?;
        let mut config: AppConfig = toml::from_str(&content)
            .map_err(|e| OrchestratorError::config_error(format!("配置文件解析失败: {e}")))?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// 环境变量覆盖，优先于文件内容
    pub fn apply_env_overrides(&mut self) {
        if let Ok(bind) = std::env::var("ORCHESTRATOR_API_BIND") {
            self.api.bind_address = bind;
        }
        if let Ok(token) = std::env::var("ORCHESTRATOR_AUTH_TOKEN") {
            self.auth.bearer_token = token;
        }
        if let Ok(url) = std::env::var("ORCHESTRATOR_REDIS_URL") {
            self.cache.redis_url = Some(url);
            self.cache.enabled = true;
        }
    }

    pub fn validate(&self) -> OrchestratorResult<()> {
        if self.api.bind_address.is_empty() {
            return Err(OrchestratorError::config_error("api.bind_address 不能为空"));
        }
        if self.cache.enabled && self.cache.redis_url.is_none() {
            return Err(OrchestratorError::config_error(
                "cache.enabled 为 true 时必须提供 cache.redis_url",
            ));
        }
        if !matches!(
            self.balancer.strategy.as_str(),
            "round-robin" | "least-connections" | "weighted" | "health-aware"
        ) {
            return Err(OrchestratorError::config_error(format!(
                "未知的负载均衡策略: {}",
                self.balancer.strategy
            )));
        }
        if !(0.0..=1.0).contains(&self.health.error_rate_threshold) {
            return Err(OrchestratorError::config_error(
                "health.error_rate_threshold 必须在 [0, 1] 区间内",
            ));
        }
        for worker in &self.workers {
            if worker.id.is_empty() {
                return Err(OrchestratorError::config_error("workers[].id 不能为空"));
            }
            if worker.max_instances == 0 {
                return Err(OrchestratorError::config_error(format!(
                    "Worker {} 的 max_instances 必须大于0",
                    worker.id
                )));
            }
        }
        let mut seen = std::collections::HashSet::new();
        for worker in &self.workers {
            if !seen.insert(&worker.id) {
                return Err(OrchestratorError::config_error(format!(
                    "重复的Worker ID: {}",
                    worker.id
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_documented_intervals() {
        let config = AppConfig::default();
        assert_eq!(config.discovery.interval_seconds, 30);
        assert_eq!(config.discovery.probe_timeout_seconds, 5);
        assert_eq!(config.discovery.stale_after_seconds, 600);
        assert_eq!(config.health.interval_seconds, 30);
        assert_eq!(config.health.probe_timeout_seconds, 10);
        assert_eq!(config.health.response_time_threshold_ms, 5000);
        assert_eq!(config.health.recovery_interval_seconds, 60);
        assert_eq!(config.metrics.interval_seconds, 60);
        assert_eq!(config.metrics.pull_timeout_seconds, 15);
        assert_eq!(config.balancer.strategy, "health-aware");
        assert_eq!(config.balancer.breaker_cooldown_seconds, 60);
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[api]
bind_address = "127.0.0.1:9000"

[balancer]
strategy = "round-robin"
forward_timeout_seconds = 10
breaker_cooldown_seconds = 30

[[workers]]
id = "wallet-worker"
service_type = "financial"
base_url = "http://localhost:4001"
capabilities = ["wallet", "fees"]
max_instances = 3
"#
        )
        .unwrap();

        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.api.bind_address, "127.0.0.1:9000");
        assert_eq!(config.balancer.strategy, "round-robin");
        assert_eq!(config.workers.len(), 1);
        assert_eq!(config.workers[0].service_type, ServiceType::Financial);
        // 未出现的段落保持默认值
        assert_eq!(config.health.interval_seconds, 30);
    }

    #[test]
    fn test_validate_rejects_unknown_strategy() {
        let mut config = AppConfig::default();
        config.balancer.strategy = "fastest-first".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_duplicate_worker_ids() {
        let mut config = AppConfig::default();
        let worker = WorkerEndpointConfig {
            id: "w1".to_string(),
            service_type: ServiceType::Api,
            base_url: "http://localhost:4000".to_string(),
            capabilities: vec![],
            priority: 0,
            max_instances: 1,
            weight: None,
            metadata: HashMap::new(),
        };
        config.workers = vec![worker.clone(), worker];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_requires_redis_url_when_cache_enabled() {
        let mut config = AppConfig::default();
        config.cache.enabled = true;
        assert!(config.validate().is_err());
        config.cache.redis_url = Some("redis://localhost:6379".to_string());
        assert!(config.validate().is_ok());
    }
}
