use async_trait::async_trait;

use orchestrator_errors::OrchestratorResult;

use crate::models::Alert;

/// 告警通知通道。每条告警独立投递到所有通道，
/// 单个通道的失败只记日志，不影响其他通道。
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn notify(&self, alert: &Alert) -> OrchestratorResult<()>;

    fn name(&self) -> &str;
}
