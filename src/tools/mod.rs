//! Tool System - the remote F1 data operations and the boundary used to call them
//!
//! Information Hiding:
//! - Transport details (HTTP bridge, MCP stdio) hidden behind `ToolInvocationService`
//! - Parameter schemas live in the catalog, not in callers
//! - Retry and caching layered on as decorators of the same trait

pub mod catalog;
pub mod executor;

use crate::error::ToolServiceError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Arguments of a tool call, keyed by parameter name.
pub type Arguments = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    Number,
    String,
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamType::Number => write!(f, "number"),
            ParamType::String => write!(f, "string"),
        }
    }
}

/// How a parameter's value is laid out on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamShape {
    /// A single token, e.g. one session name.
    Single,
    /// Several tokens joined with commas, e.g. `"VER,NOR"`.
    CommaJoined,
}

/// Tool parameter schema definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolParameter {
    pub name: String,
    pub param_type: ParamType,
    pub shape: ParamShape,
    pub description: String,
    pub required: bool,
}

/// Tool descriptor - describes what a remote tool does and how to call it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ToolParameter>,
}

impl ToolDescriptor {
    pub fn parameter(&self, name: &str) -> Option<&ToolParameter> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn required_parameters(&self) -> impl Iterator<Item = &ToolParameter> {
        self.parameters.iter().filter(|p| p.required)
    }
}

impl fmt::Display for ToolDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.description)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Success,
    Error,
}

/// Result of a tool invocation as produced by the data service.
///
/// `data` is opaque and may wrap further envelopes; see `execution::envelope`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocationResult {
    pub status: ToolStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "message")]
    pub error: Option<String>,
}

impl ToolInvocationResult {
    pub fn success(data: Value) -> Self {
        Self {
            status: ToolStatus::Success,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            status: ToolStatus::Error,
            data: None,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ToolStatus::Success
    }

    /// Success at the top level *and* at every nested envelope inside `data`.
    pub fn is_success_deep(&self) -> bool {
        self.is_success() && self.payload().is_ok()
    }

    /// The innermost structured payload, or the first error message found on the way down.
    pub fn payload(&self) -> Result<Value, String> {
        if !self.is_success() {
            return Err(self
                .error
                .clone()
                .unwrap_or_else(|| "unknown tool error".to_string()));
        }
        match &self.data {
            Some(data) => crate::execution::envelope::unwrap_payload(data),
            None => Err("tool returned no data".to_string()),
        }
    }

    /// Build a result from a raw service response that carries its own `status` field.
    pub fn from_envelope(value: Value) -> Self {
        let status = value.get("status").and_then(Value::as_str);
        match status {
            Some("error") => Self::failure(
                crate::execution::envelope::error_message(&value)
                    .unwrap_or_else(|| "unknown tool error".to_string()),
            ),
            Some("success") => match value.get("data") {
                Some(data) => Self::success(data.clone()),
                None => Self::success(value),
            },
            _ => Self::success(value),
        }
    }
}

/// The remote data service, reachable by tool name and arguments.
///
/// Information Hiding: implementations hide their transport, process management and
/// framing. Network failures are `Err`; tool-level failures are an error `ToolInvocationResult`.
#[async_trait]
pub trait ToolInvocationService: Send + Sync {
    async fn invoke(
        &self,
        name: &str,
        arguments: &Arguments,
    ) -> Result<ToolInvocationResult, ToolServiceError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_envelope_success() {
        let result = ToolInvocationResult::from_envelope(json!({
            "status": "success",
            "data": {"drivers": []}
        }));
        assert!(result.is_success());
        assert_eq!(result.data, Some(json!({"drivers": []})));
    }

    #[test]
    fn test_from_envelope_error_uses_message() {
        let result = ToolInvocationResult::from_envelope(json!({
            "status": "error",
            "message": "Session not found"
        }));
        assert!(!result.is_success());
        assert_eq!(result.error.as_deref(), Some("Session not found"));
    }

    #[test]
    fn test_nested_error_is_not_deep_success() {
        let result = ToolInvocationResult::success(json!({
            "status": "error",
            "error": "No data for 2031"
        }));
        assert!(result.is_success());
        assert!(!result.is_success_deep());
        assert_eq!(result.payload().unwrap_err(), "No data for 2031");
    }
}
