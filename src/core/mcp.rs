use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::Mutex;

use crate::error::ToolServiceError;
use crate::execution::envelope;
use crate::tools::{Arguments, ToolInvocationResult, ToolInvocationService};

const PROTOCOL_VERSION: &str = "2024-11-05";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MCPTool {
    pub name: String,
    pub description: Option<String>,
    #[serde(default = "default_input_schema", rename = "inputSchema", alias = "input_schema")]
    pub input_schema: Value,
}

fn default_input_schema() -> Value {
    json!({
        "type": "object",
        "properties": {}
    })
}

#[derive(Debug, Serialize, Deserialize)]
struct MCPResponse {
    jsonrpc: String,
    id: Option<u64>,
    result: Option<Value>,
    error: Option<MCPError>,
}

#[derive(Debug, Serialize, Deserialize)]
struct MCPError {
    code: i32,
    message: String,
}

/// JSON-RPC 2.0 over a child process's stdin/stdout, one message per line.
pub struct MCPClient {
    process: Child,
    stdout: BufReader<ChildStdout>,
    request_id: u64,
}

impl MCPClient {
    pub async fn new(command: &str, args: &[String]) -> Result<Self, ToolServiceError> {
        let mut process = Command::new(command)
            .args(args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let stdout = process
            .stdout
            .take()
            .ok_or_else(|| ToolServiceError::Protocol("Failed to get stdout".to_string()))?;

        let mut client = Self {
            process,
            stdout: BufReader::new(stdout),
            request_id: 0,
        };

        client.initialize().await?;
        Ok(client)
    }

    async fn initialize(&mut self) -> Result<(), ToolServiceError> {
        let id = self.next_id();
        let request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "initialize",
            "params": {
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {},
                "clientInfo": {
                    "name": env!("CARGO_PKG_NAME"),
                    "version": env!("CARGO_PKG_VERSION")
                }
            }
        });

        self.send(&request).await?;
        self.read_response(id).await?;
        self.send(&json!({"jsonrpc": "2.0", "method": "notifications/initialized"}))
            .await?;
        tracing::debug!("[MCPClient] Session initialized");
        Ok(())
    }

    pub async fn list_tools(&mut self) -> Result<Vec<MCPTool>, ToolServiceError> {
        let id = self.next_id();
        let request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "tools/list"
        });

        self.send(&request).await?;
        let response = self.read_response(id).await?;

        match response.result.as_ref().and_then(|r| r.get("tools")) {
            Some(tools) => Ok(serde_json::from_value(tools.clone())?),
            None => Ok(vec![]),
        }
    }

    /// Raw `tools/call` result; a JSON-RPC error becomes an error result.
    pub async fn call_tool(
        &mut self,
        name: &str,
        arguments: &Arguments,
    ) -> Result<ToolInvocationResult, ToolServiceError> {
        let id = self.next_id();
        let request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": "tools/call",
            "params": {
                "name": name,
                "arguments": arguments
            }
        });

        self.send(&request).await?;
        let response = self.read_response(id).await?;

        if let Some(error) = response.error {
            return Ok(ToolInvocationResult::failure(format!(
                "Tool call failed ({}): {}",
                error.code, error.message
            )));
        }
        let result = response
            .result
            .ok_or_else(|| ToolServiceError::Protocol("No result from tool call".to_string()))?;

        if result.get("isError").and_then(Value::as_bool).unwrap_or(false) {
            let message = envelope::unwrap_payload(&result)
                .err()
                .unwrap_or_else(|| "tool reported an error".to_string());
            return Ok(ToolInvocationResult::failure(message));
        }
        Ok(ToolInvocationResult::success(result))
    }

    async fn send(&mut self, message: &Value) -> Result<(), ToolServiceError> {
        let stdin = self
            .process
            .stdin
            .as_mut()
            .ok_or_else(|| ToolServiceError::Protocol("Failed to get stdin".to_string()))?;

        let json = serde_json::to_string(message)?;
        stdin.write_all(json.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;

        Ok(())
    }

    /// Read lines until the response with `id`, skipping notifications and log noise.
    async fn read_response(&mut self, id: u64) -> Result<MCPResponse, ToolServiceError> {
        loop {
            let mut line = String::new();
            if self.stdout.read_line(&mut line).await? == 0 {
                return Err(ToolServiceError::Transport(
                    "MCP server closed its output".to_string(),
                ));
            }
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<MCPResponse>(line) {
                Ok(response) if response.id == Some(id) => return Ok(response),
                Ok(_) => tracing::debug!("[MCPClient] Skipping message: {}", line),
                Err(_) => tracing::debug!("[MCPClient] Skipping non-JSON line: {}", line),
            }
        }
    }

    fn next_id(&mut self) -> u64 {
        self.request_id += 1;
        self.request_id
    }
}

impl Drop for MCPClient {
    fn drop(&mut self) {
        let _ = self.process.start_kill();
    }
}

/// Tool Invocation Service backed by a data server spawned on demand.
///
/// The session is kept between calls and respawned after a transport failure.
pub struct McpStdioService {
    command: String,
    args: Vec<String>,
    client: Mutex<Option<MCPClient>>,
}

impl McpStdioService {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            client: Mutex::new(None),
        }
    }

    async fn connected<'a>(
        &self,
        slot: &'a mut Option<MCPClient>,
    ) -> Result<&'a mut MCPClient, ToolServiceError> {
        if slot.is_none() {
            tracing::info!(
                "[McpStdioService] Starting MCP server: {} {}",
                self.command,
                self.args.join(" ")
            );
            *slot = Some(MCPClient::new(&self.command, &self.args).await?);
        }
        slot.as_mut()
            .ok_or_else(|| ToolServiceError::Protocol("MCP session unavailable".to_string()))
    }

    /// Tools the server itself advertises.
    pub async fn list_remote_tools(&self) -> Result<Vec<MCPTool>, ToolServiceError> {
        let mut slot = self.client.lock().await;
        let result = self.connected(&mut slot).await?.list_tools().await;
        if result.is_err() {
            *slot = None;
        }
        result
    }
}

#[async_trait]
impl ToolInvocationService for McpStdioService {
    async fn invoke(
        &self,
        name: &str,
        arguments: &Arguments,
    ) -> Result<ToolInvocationResult, ToolServiceError> {
        let mut slot = self.client.lock().await;
        let result = self.connected(&mut slot).await?.call_tool(name, arguments).await;
        if let Err(e) = &result {
            tracing::warn!("[McpStdioService] Dropping MCP session after error: {}", e);
            *slot = None;
        }
        result
    }
}
