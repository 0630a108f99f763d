use std::time::Duration;

use serde_json::json;
use tracing::debug;

use orchestrator_core::config::AuthConfig;
use orchestrator_errors::{OrchestratorError, OrchestratorResult};

/// Worker管理端点客户端。所有出站调用携带Bearer凭证与固定User-Agent。
#[derive(Clone)]
pub struct AdminClient {
    http: reqwest::Client,
    bearer_token: String,
}

/// 远程管理命令
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminCommand {
    Restart,
    Stop,
    Start,
    Scale,
}

impl AdminCommand {
    pub fn path(&self) -> &'static str {
        match self {
            AdminCommand::Restart => "admin/restart",
            AdminCommand::Stop => "admin/stop",
            AdminCommand::Start => "admin/start",
            AdminCommand::Scale => "admin/scale",
        }
    }
}

impl AdminClient {
    pub fn new(auth: &AuthConfig, timeout: Duration) -> OrchestratorResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(auth.user_agent.clone())
            .build()
            .map_err(|e| OrchestratorError::internal(format!("构建HTTP客户端失败: {e}")))?;
        Ok(Self {
            http,
            bearer_token: auth.bearer_token.clone(),
        })
    }

    /// 发送管理命令。scale命令附带 {"instances": n} 请求体。
    pub async fn send(
        &self,
        base_url: &str,
        command: AdminCommand,
        instances: Option<u32>,
    ) -> OrchestratorResult<()> {
        let url = format!("{}/{}", base_url.trim_end_matches('/'), command.path());
        debug!(url = %url, command = ?command, "发送Worker管理命令");

        let mut request = self.http.post(&url);
        if !self.bearer_token.is_empty() {
            request = request.bearer_auth(&self.bearer_token);
        }
        if command == AdminCommand::Scale {
            let count = instances
                .ok_or_else(|| OrchestratorError::validation("scale命令缺少instances参数"))?;
            request = request.json(&json!({ "instances": count }));
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OrchestratorError::Upstream {
                worker_id: url,
                status: status.as_u16(),
                message: truncate(&body, 200),
            });
        }
        Ok(())
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &s[..end])
    }
}
