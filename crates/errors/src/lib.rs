use thiserror::Error;


#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("数据验证失败: {0}")]
    Validation(String),
    #[error("Worker未找到: {id}")]
    WorkerNotFound { id: String },
    #[error("服务未找到: {id}")]
    ServiceNotFound { id: String },
    #[error("服务类型 {service_type} 没有可用的Worker实例")]
    Unavailable { service_type: String },
    #[error("操作超时: {0}")]
    Timeout(String),
    #[error("上游调用失败: {worker_id} 返回 {status}: {message}")]
    Upstream {
        worker_id: String,
        status: u16,
        message: String,
    },
    #[error("配置错误: {0}")]
    Configuration(String),
    #[error("网络错误: {0}")]
    Network(String),
    #[error("缓存错误: {0}")]
    Cache(String),
    #[error("序列化错误: {0}")]
    Serialization(String),
    #[error("转发失败(含一次故障转移): 首选 {primary_id}: {primary_error}; 转移 {failover_id}: {failover_error}")]
    ForwardExhausted {
        primary_id: String,
        primary_error: String,
        failover_id: String,
        failover_error: String,
    },
    #[error("内部错误: {0}")]
    Internal(String),
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

impl OrchestratorError {
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }
    pub fn worker_not_found<S: Into<String>>(id: S) -> Self {
        Self::WorkerNotFound { id: id.into() }
    }
    pub fn service_not_found<S: Into<String>>(id: S) -> Self {
        Self::ServiceNotFound { id: id.into() }
    }
    pub fn unavailable<S: Into<String>>(service_type: S) -> Self {
        Self::Unavailable {
            service_type: service_type.into(),
        }
    }
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        Self::Timeout(msg.into())
    }
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// 稳定的错误代码，供API错误响应体使用
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::WorkerNotFound { .. } => "WORKER_NOT_FOUND",
            Self::ServiceNotFound { .. } => "SERVICE_NOT_FOUND",
            Self::Unavailable { .. } => "SERVICE_UNAVAILABLE",
            Self::Timeout(_) => "TIMEOUT",
            Self::Upstream { .. } => "UPSTREAM_ERROR",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::Network(_) => "NETWORK_ERROR",
            Self::Cache(_) => "CACHE_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::ForwardExhausted { .. } => "FORWARD_EXHAUSTED",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network(_)
                | Self::Timeout(_)
                | Self::Unavailable { .. }
                | Self::Upstream { .. }
                | Self::ForwardExhausted { .. }
        )
    }

    pub fn user_message(&self) -> &str {
        match self {
            Self::WorkerNotFound { .. } => "请求的Worker节点不存在",
            Self::ServiceNotFound { .. } => "请求的服务不存在",
            Self::Validation(_) => "输入数据验证失败",
            Self::Unavailable { .. } => "该服务暂时没有可用实例，请稍后重试",
            Self::Timeout(_) => "操作超时，请稍后重试",
            Self::ForwardExhausted { .. } => "请求转发失败，请稍后重试",
            _ => "系统繁忙，请稍后重试",
        }
    }
}

impl From<serde_json::Error> for OrchestratorError {
    fn from(err: serde_json::Error) -> Self {
        OrchestratorError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for OrchestratorError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            OrchestratorError::Timeout(err.to_string())
        } else {
            OrchestratorError::Network(err.to_string())
        }
    }
}

impl From<anyhow::Error> for OrchestratorError {
    fn from(err: anyhow::Error) -> Self {
        OrchestratorError::Internal(err.to_string())
    }
}
