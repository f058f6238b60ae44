use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::ToolServiceError;
use crate::execution::envelope;
use crate::tools::{Arguments, ToolInvocationResult, ToolInvocationService};

/// `GET /health` of the bridge.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeHealth {
    pub status: String,
    pub uptime: Option<f64>,
    pub tool_calls: Option<u64>,
    pub success_rate: Option<f64>,
    /// Failed calls per tool name.
    pub errors: BTreeMap<String, u64>,
}

impl BridgeHealth {
    pub fn is_healthy(&self) -> bool {
        matches!(self.status.as_str(), "healthy" | "ok" | "success")
    }
}

/// HTTP bridge in front of the F1 data server: `POST {base_url}/mcp/tool`.
///
/// One attempt per call; retries belong to `RetryingService`.
pub struct BridgeClient {
    client: Client,
    base_url: String,
    timeout_secs: u64,
}

impl BridgeClient {
    pub fn new(base_url: impl Into<String>, timeout_secs: u64) -> Result<Self, ToolServiceError> {
        let timeout_secs = timeout_secs.max(1);
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout_secs,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn health(&self) -> Result<BridgeHealth, ToolServiceError> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ToolServiceError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json::<BridgeHealth>().await?)
    }
}

fn is_retryable(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

#[async_trait]
impl ToolInvocationService for BridgeClient {
    async fn invoke(
        &self,
        name: &str,
        arguments: &Arguments,
    ) -> Result<ToolInvocationResult, ToolServiceError> {
        tracing::debug!("[BridgeClient] POST /mcp/tool {} {:?}", name, arguments);

        let response = self
            .client
            .post(format!("{}/mcp/tool", self.base_url))
            .json(&json!({"name": name, "arguments": arguments}))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ToolServiceError::Timeout {
                        tool: name.to_string(),
                        secs: self.timeout_secs,
                    }
                } else {
                    e.into()
                }
            })?;

        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            let value: Value = serde_json::from_str(&body)?;
            return Ok(ToolInvocationResult::from_envelope(value));
        }

        if is_retryable(status) {
            tracing::warn!("[BridgeClient] {} answered HTTP {}", name, status);
            return Err(ToolServiceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        // the bridge reports tool exceptions as HTTP 500 with a `detail`
        let message = serde_json::from_str::<Value>(&body)
            .ok()
            .and_then(|v| envelope::error_message(&v))
            .unwrap_or_else(|| format!("HTTP {}: {}", status.as_u16(), body.trim()));
        tracing::warn!("[BridgeClient] {} failed upstream: {}", name, message);
        Ok(ToolInvocationResult::failure(message))
    }
}
