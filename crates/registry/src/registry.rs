use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{info, warn};

use orchestrator_core::models::{
    LifecycleResult, ServiceType, WorkerDescriptor, WorkerRegistration, WorkerStatus,
};
use orchestrator_core::traits::{ttl, CacheStore};
use orchestrator_errors::{OrchestratorError, OrchestratorResult};

use crate::admin_client::{AdminClient, AdminCommand};

/// Worker注册表：整个控制平面的Worker目录。
///
/// 表由本组件独占持有，其他组件只能通过访问方法读取；
/// 状态写入统一走 `update_status`，保证错误计数等派生字段的一致性。
/// Worker从不硬删除，停止的Worker仍然可见。
pub struct WorkerRegistry {
    workers: RwLock<HashMap<String, WorkerDescriptor>>,
    admin: AdminClient,
    cache: Option<Arc<dyn CacheStore>>,
}

impl WorkerRegistry {
    pub fn new(admin: AdminClient, cache: Option<Arc<dyn CacheStore>>) -> Self {
        Self {
            workers: RwLock::new(HashMap::new()),
            admin,
            cache,
        }
    }

    /// 幂等注册：同ID重复注册更新声明字段，保留注册时间与运行期状态。
    pub async fn register_worker(
        &self,
        registration: WorkerRegistration,
    ) -> OrchestratorResult<WorkerDescriptor> {
        if registration.current_instances < 1
            || registration.current_instances > registration.max_instances
        {
            return Err(OrchestratorError::validation(format!(
                "Worker {} 的实例数 {} 超出范围 [1, {}]",
                registration.id, registration.current_instances, registration.max_instances
            )));
        }

        let descriptor = {
            let mut workers = self.workers.write().await;
            match workers.get_mut(&registration.id) {
                Some(existing) => {
                    existing.apply_registration(registration);
                    existing.clone()
                }
                None => {
                    let descriptor = WorkerDescriptor::new(registration);
                    info!(worker_id = %descriptor.id, service_type = %descriptor.service_type, "注册新Worker");
                    workers.insert(descriptor.id.clone(), descriptor.clone());
                    descriptor
                }
            }
        };

        self.cache_worker(&descriptor).await;
        Ok(descriptor)
    }

    pub async fn get_worker(&self, id: &str) -> OrchestratorResult<WorkerDescriptor> {
        self.workers
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| OrchestratorError::worker_not_found(id))
    }

    pub async fn list_workers(&self) -> Vec<WorkerDescriptor> {
        let mut workers: Vec<WorkerDescriptor> =
            self.workers.read().await.values().cloned().collect();
        workers.sort_by(|a, b| a.id.cmp(&b.id));
        workers
    }

    pub async fn list_by_type(&self, service_type: ServiceType) -> Vec<WorkerDescriptor> {
        let mut workers: Vec<WorkerDescriptor> = self
            .workers
            .read()
            .await
            .values()
            .filter(|w| w.service_type == service_type)
            .cloned()
            .collect();
        workers.sort_by(|a, b| a.id.cmp(&b.id));
        workers
    }

    /// 能力查询隐含只返回健康状态的Worker
    pub async fn list_by_capability(&self, capability: &str) -> Vec<WorkerDescriptor> {
        let mut workers: Vec<WorkerDescriptor> = self
            .workers
            .read()
            .await
            .values()
            .filter(|w| w.is_healthy() && w.has_capability(capability))
            .cloned()
            .collect();
        workers.sort_by(|a, b| a.id.cmp(&b.id));
        workers
    }

    /// 更新Worker状态并打补丁到metadata。
    /// 进入unhealthy/error时错误计数+1，恢复healthy时-1（下限0）。
    pub async fn update_status(
        &self,
        id: &str,
        status: WorkerStatus,
        metadata_patch: Option<HashMap<String, serde_json::Value>>,
    ) -> OrchestratorResult<WorkerDescriptor> {
        let descriptor = {
            let mut workers = self.workers.write().await;
            let worker = workers
                .get_mut(id)
                .ok_or_else(|| OrchestratorError::worker_not_found(id))?;
            worker.transition_to(status);
            worker.last_health_check = Some(Utc::now());
            if let Some(patch) = metadata_patch {
                worker.metadata.extend(patch);
            }
            worker.clone()
        };

        self.cache_worker(&descriptor).await;
        Ok(descriptor)
    }

    pub async fn restart(&self, id: &str) -> OrchestratorResult<LifecycleResult> {
        self.lifecycle_command(id, AdminCommand::Restart, WorkerStatus::Restarting)
            .await
    }

    pub async fn stop(&self, id: &str) -> OrchestratorResult<LifecycleResult> {
        self.lifecycle_command(id, AdminCommand::Stop, WorkerStatus::Stopping)
            .await
    }

    pub async fn start(&self, id: &str) -> OrchestratorResult<LifecycleResult> {
        self.lifecycle_command(id, AdminCommand::Start, WorkerStatus::Starting)
            .await
    }

    /// 调整实例数。范围校验失败直接返回ValidationError且不触达远端；
    /// current_instances 仅在远端成功后更新。
    pub async fn scale(&self, id: &str, instances: u32) -> OrchestratorResult<LifecycleResult> {
        let worker = self.get_worker(id).await?;
        if instances < 1 || instances > worker.max_instances {
            return Err(OrchestratorError::validation(format!(
                "实例数 {} 超出范围 [1, {}]",
                instances, worker.max_instances
            )));
        }

        match self
            .admin
            .send(&worker.base_url, AdminCommand::Scale, Some(instances))
            .await
        {
            Ok(()) => {
                let descriptor = {
                    let mut workers = self.workers.write().await;
                    if let Some(w) = workers.get_mut(id) {
                        w.current_instances = instances;
                        Some(w.clone())
                    } else {
                        None
                    }
                };
                if let Some(d) = descriptor {
                    self.cache_worker(&d).await;
                }
                info!(worker_id = %id, instances, "Worker扩缩容成功");
                Ok(LifecycleResult::ok(format!(
                    "Worker {id} 已调整为 {instances} 个实例"
                )))
            }
            Err(e) => {
                warn!(worker_id = %id, error = %e, "Worker扩缩容失败");
                self.record_admin_failure(id, &e).await;
                Ok(LifecycleResult::failed(e.to_string()))
            }
        }
    }

    /// 通用生命周期命令：成功则乐观写入过渡状态，失败则标记error并附失败详情
    async fn lifecycle_command(
        &self,
        id: &str,
        command: AdminCommand,
        transitional: WorkerStatus,
    ) -> OrchestratorResult<LifecycleResult> {
        let worker = self.get_worker(id).await?;

        match self.admin.send(&worker.base_url, command, None).await {
            Ok(()) => {
                let _ = self.update_status(id, transitional, None).await;
                info!(worker_id = %id, command = ?command, "Worker生命周期命令已下发");
                Ok(LifecycleResult::ok(format!(
                    "Worker {id} 命令 {command:?} 已接受"
                )))
            }
            Err(e) => {
                warn!(worker_id = %id, command = ?command, error = %e, "Worker生命周期命令失败");
                self.record_admin_failure(id, &e).await;
                Ok(LifecycleResult::failed(e.to_string()))
            }
        }
    }

    async fn record_admin_failure(&self, id: &str, error: &OrchestratorError) {
        let mut patch = HashMap::new();
        patch.insert(
            "last_admin_error".to_string(),
            serde_json::Value::String(error.to_string()),
        );
        let _ = self.update_status(id, WorkerStatus::Error, Some(patch)).await;
    }

    /// 写穿缓存，尽力而为：失败只记日志
    async fn cache_worker(&self, descriptor: &WorkerDescriptor) {
        if let Some(cache) = &self.cache {
            let key = format!("worker:{}", descriptor.id);
            match serde_json::to_value(descriptor) {
                Ok(value) => {
                    if let Err(e) = cache.put(&key, value, ttl::WORKER).await {
                        warn!(worker_id = %descriptor.id, error = %e, "Worker缓存写入失败");
                    }
                }
                Err(e) => warn!(worker_id = %descriptor.id, error = %e, "Worker序列化失败"),
            }
        }
    }
}
