use orchestrator_errors::OrchestratorResult;

use crate::models::{ServiceEvent, ServiceRecord};

/// 服务目录变更订阅者。回调在发现周期内同步调用，
/// 逐个包裹错误边界：失败记日志后继续通知其余订阅者。
/// 没有投递保证，也没有背压。
pub trait ServiceChangeListener: Send + Sync {
    fn on_service_event(
        &self,
        event: ServiceEvent,
        record: &ServiceRecord,
    ) -> OrchestratorResult<()>;

    fn name(&self) -> &str;
}
