use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// 发现服务的可用状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Available,
    Degraded,
    Unavailable,
}

/// 服务目录事件，推送给订阅者
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceEvent {
    Discovered,
    Refreshed,
    MarkedUnavailable,
    Removed,
}

/// 一条被发现的服务记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub service_id: String,
    pub name: String,
    pub service_type: String,
    pub base_url: String,
    pub status: ServiceStatus,
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// 子服务所属的Worker，顶层Worker服务为空
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_worker: Option<String>,
    pub discovered_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ServiceRecord {
    /// 自首次发现以来的运行时长
    pub fn uptime(&self) -> Duration {
        Utc::now() - self.discovered_at
    }

    pub fn is_available(&self) -> bool {
        matches!(self.status, ServiceStatus::Available)
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }

    /// 记录是否超过了陈旧窗口
    pub fn is_stale(&self, now: DateTime<Utc>, window: Duration) -> bool {
        now - self.last_seen > window
    }
}

/// Worker发现端点返回的文档（字段均可缺省，防御式解析）
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DiscoveryDocument {
    pub name: Option<String>,
    pub version: Option<String>,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub endpoints: HashMap<String, String>,
    #[serde(default)]
    pub services: Vec<SubServiceEntry>,
}

/// 发现文档中上报的子服务条目
#[derive(Debug, Clone, Deserialize)]
pub struct SubServiceEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub service_type: Option<String>,
    pub url: Option<String>,
    #[serde(default)]
    pub capabilities: Vec<String>,
}
