//! Envelope unwrapping
//!
//! The data service wraps payloads in `{status, data}` objects, and the bridge may wrap the
//! server's own envelope again, sometimes as an MCP `{"content": [{"type": "text", "text":
//! "<json>"}]}` block. Each layer is one `Envelope` variant; unwrapping stops after
//! `MAX_UNWRAP_DEPTH` layers and returns whatever is left as the payload.

use serde_json::Value;

pub const MAX_UNWRAP_DEPTH: usize = 4;

#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    Success(Value),
    Wrapped(Box<Envelope>),
    Error(String),
}

impl Envelope {
    pub fn parse(value: &Value) -> Self {
        parse_at(value, 0)
    }

    /// Walk to the innermost layer.
    pub fn into_payload(self) -> Result<Value, String> {
        let mut current = self;
        loop {
            match current {
                Envelope::Success(value) => return Ok(value),
                Envelope::Wrapped(inner) => current = *inner,
                Envelope::Error(message) => return Err(message),
            }
        }
    }

    /// Number of envelope layers above the payload.
    pub fn depth(&self) -> usize {
        match self {
            Envelope::Wrapped(inner) => 1 + inner.depth(),
            _ => 0,
        }
    }
}

fn parse_at(value: &Value, depth: usize) -> Envelope {
    if depth >= MAX_UNWRAP_DEPTH {
        return Envelope::Success(value.clone());
    }

    match value {
        Value::Object(map) => {
            if let Some(status) = map.get("status").and_then(Value::as_str) {
                match status {
                    "error" | "failure" | "failed" => {
                        return Envelope::Error(
                            error_message(value).unwrap_or_else(|| "unknown tool error".into()),
                        );
                    }
                    "success" | "ok" => {
                        if let Some(data) = map.get("data") {
                            return Envelope::Wrapped(Box::new(parse_at(data, depth + 1)));
                        }
                    }
                    _ => {}
                }
            }

            if map.get("isError").and_then(Value::as_bool) == Some(true) {
                let text = content_text(value).unwrap_or("tool reported an error");
                return Envelope::Error(text.to_string());
            }

            if let Some(text) = content_text(value) {
                return match serde_json::from_str::<Value>(text) {
                    Ok(inner) => Envelope::Wrapped(Box::new(parse_at(&inner, depth + 1))),
                    Err(_) => Envelope::Success(Value::String(text.to_string())),
                };
            }

            Envelope::Success(value.clone())
        }
        Value::String(text) => {
            let trimmed = text.trim_start();
            if trimmed.starts_with('{') || trimmed.starts_with('[') {
                if let Ok(inner) = serde_json::from_str::<Value>(text) {
                    return Envelope::Wrapped(Box::new(parse_at(&inner, depth + 1)));
                }
            }
            Envelope::Success(value.clone())
        }
        _ => Envelope::Success(value.clone()),
    }
}

/// Text of the first MCP content block.
fn content_text(value: &Value) -> Option<&str> {
    value
        .get("content")?
        .as_array()?
        .first()?
        .get("text")?
        .as_str()
}

/// Best-effort error message of an error envelope.
pub fn error_message(value: &Value) -> Option<String> {
    ["error", "message", "detail"].iter().find_map(|key| match value.get(*key) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Object(_)) => value[*key]
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    })
}

pub fn unwrap_payload(value: &Value) -> Result<Value, String> {
    Envelope::parse(value).into_payload()
}
