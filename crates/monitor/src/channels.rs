use std::time::Duration;

use async_trait::async_trait;
use tracing::{error, info, warn};

use orchestrator_core::models::{Alert, AlertSeverity};
use orchestrator_core::traits::NotificationChannel;
use orchestrator_errors::{OrchestratorError, OrchestratorResult};

/// 日志通道：把告警写入tracing，始终可用
pub struct LogChannel;

#[async_trait]
impl NotificationChannel for LogChannel {
    async fn notify(&self, alert: &Alert) -> OrchestratorResult<()> {
        match alert.severity {
            AlertSeverity::Critical => {
                error!(
                    worker_id = %alert.worker_id,
                    kind = alert.kind.as_str(),
                    "告警: {}", alert.message
                );
            }
            AlertSeverity::Warning => {
                warn!(
                    worker_id = %alert.worker_id,
                    kind = alert.kind.as_str(),
                    "告警: {}", alert.message
                );
            }
            AlertSeverity::Info => {
                info!(
                    worker_id = %alert.worker_id,
                    kind = alert.kind.as_str(),
                    "告警: {}", alert.message
                );
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// Webhook通道：把告警POST到外部地址
pub struct WebhookChannel {
    url: String,
    http: reqwest::Client,
}

impl WebhookChannel {
    pub fn new(url: String) -> OrchestratorResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| OrchestratorError::internal(format!("构建HTTP客户端失败: {e}")))?;
        Ok(Self { url, http })
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    async fn notify(&self, alert: &Alert) -> OrchestratorResult<()> {
        let response = self.http.post(&self.url).json(alert).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(OrchestratorError::Upstream {
                worker_id: alert.worker_id.clone(),
                status: status.as_u16(),
                message: "Webhook返回非2xx".to_string(),
            });
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "webhook"
    }
}
