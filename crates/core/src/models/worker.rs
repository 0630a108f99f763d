use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Worker承载的逻辑服务类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceType {
    BotGateway,
    Api,
    Financial,
    Security,
    Web,
    Analytics,
}

impl ServiceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::BotGateway => "bot-gateway",
            ServiceType::Api => "api",
            ServiceType::Financial => "financial",
            ServiceType::Security => "security",
            ServiceType::Web => "web",
            ServiceType::Analytics => "analytics",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "bot-gateway" => Some(ServiceType::BotGateway),
            "api" => Some(ServiceType::Api),
            "financial" => Some(ServiceType::Financial),
            "security" => Some(ServiceType::Security),
            "web" => Some(ServiceType::Web),
            "analytics" => Some(ServiceType::Analytics),
            _ => None,
        }
    }
}

impl std::fmt::Display for ServiceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Worker生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Unknown,
    Starting,
    Healthy,
    Degraded,
    Unhealthy,
    Restarting,
    Stopping,
    Stopped,
    Error,
}

impl WorkerStatus {
    /// 该状态是否计入负载均衡候选池
    pub fn is_routable(&self) -> bool {
        matches!(self, WorkerStatus::Healthy | WorkerStatus::Degraded)
    }

    /// 进入该状态是否视为一次故障转移
    pub fn is_failure(&self) -> bool {
        matches!(self, WorkerStatus::Unhealthy | WorkerStatus::Error)
    }
}

/// Worker注册请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRegistration {
    pub id: String,
    pub service_type: ServiceType,
    pub base_url: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_max_instances")]
    pub max_instances: u32,
    #[serde(default = "default_current_instances")]
    pub current_instances: u32,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

fn default_max_instances() -> u32 {
    1
}

fn default_current_instances() -> u32 {
    1
}

/// Worker节点描述：身份、声明容量与生命周期状态
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerDescriptor {
    pub id: String,
    pub service_type: ServiceType,
    pub base_url: String,
    pub capabilities: Vec<String>,
    pub priority: i32,
    pub max_instances: u32,
    pub current_instances: u32,
    pub status: WorkerStatus,
    pub registered_at: DateTime<Utc>,
    pub last_health_check: Option<DateTime<Utc>>,
    pub error_count: u32,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl WorkerDescriptor {
    /// 从注册请求创建新的Worker记录
    pub fn new(registration: WorkerRegistration) -> Self {
        Self {
            id: registration.id,
            service_type: registration.service_type,
            base_url: registration.base_url,
            capabilities: registration.capabilities,
            priority: registration.priority,
            max_instances: registration.max_instances,
            current_instances: registration.current_instances,
            status: WorkerStatus::Unknown,
            registered_at: Utc::now(),
            last_health_check: None,
            error_count: 0,
            metadata: registration.metadata,
        }
    }

    /// 重新注册时合并最新声明，保留注册时间与运行期状态
    pub fn apply_registration(&mut self, registration: WorkerRegistration) {
        self.service_type = registration.service_type;
        self.base_url = registration.base_url;
        self.capabilities = registration.capabilities;
        self.priority = registration.priority;
        self.max_instances = registration.max_instances;
        self.current_instances = registration.current_instances;
        self.metadata = registration.metadata;
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self.status, WorkerStatus::Healthy)
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }

    /// 状态迁移时维护错误计数：进入失败状态+1，恢复健康-1（下限0）
    pub fn transition_to(&mut self, status: WorkerStatus) {
        if status.is_failure() && !self.status.is_failure() {
            self.error_count += 1;
        } else if status == WorkerStatus::Healthy && self.status != WorkerStatus::Healthy {
            self.error_count = self.error_count.saturating_sub(1);
        }
        self.status = status;
    }
}

/// 生命周期命令（restart/stop/start/scale）的结果对象。
/// 远程失败不跨组件边界抛出异常，统一通过该结构返回。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LifecycleResult {
    pub success: bool,
    pub message: Option<String>,
    pub error: Option<String>,
}

impl LifecycleResult {
    pub fn ok<S: Into<String>>(message: S) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            error: None,
        }
    }

    pub fn failed<S: Into<String>>(error: S) -> Self {
        Self {
            success: false,
            message: None,
            error: Some(error.into()),
        }
    }
}
