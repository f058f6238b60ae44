use crate::tools::Arguments;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tool name meaning "answer directly, call nothing".
pub const CONVERSATIONAL: &str = "conversational";

/// Placeholder the planner emits for "the most recent completed race".
pub const LAST_RACE: &str = "LAST_RACE";
/// Placeholder for "the event of the current race weekend".
pub const CURRENT_WEEKEND: &str = "CURRENT_WEEKEND";
/// Placeholder for "the top three of the championship".
pub const TOP_THREE: &str = "Top 3";

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*(driver\s*\d+|top\s*\d+|last[_ ]race|current[_ ]weekend|next[_ ]race|latest|most recent|tbd|unknown|n/?a|none|null|\?+|<[^>]*>|\{[^}]*\})\s*$",
    )
    .unwrap()
});

/// The follow-up invocation of a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FollowUp {
    pub tool: String,
    #[serde(default)]
    pub arguments: Arguments,
}

/// Which tool(s) to call for one question, and with what.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryPlan {
    pub tool: String,
    #[serde(default)]
    pub arguments: Arguments,
    #[serde(rename = "followUp", default, skip_serializing_if = "Option::is_none")]
    pub follow_up: Option<FollowUp>,
    #[serde(default)]
    pub reasoning: String,
}

impl QueryPlan {
    pub fn new(tool: impl Into<String>, arguments: Arguments, reasoning: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            arguments,
            follow_up: None,
            reasoning: reasoning.into(),
        }
    }

    pub fn conversational(reasoning: impl Into<String>) -> Self {
        Self::new(CONVERSATIONAL, Arguments::new(), reasoning)
    }

    pub fn with_follow_up(mut self, tool: impl Into<String>, arguments: Arguments) -> Self {
        self.follow_up = Some(FollowUp {
            tool: tool.into(),
            arguments,
        });
        self
    }

    /// No remote call is needed.
    pub fn is_conversational(&self) -> bool {
        let tool = self.tool.trim();
        tool.is_empty() || tool == CONVERSATIONAL
    }

    pub fn year(&self) -> Option<i64> {
        self.arguments.get("year").and_then(as_year)
    }
}

/// What the previous exchanges of a conversation were about.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationContext {
    pub last_year: Option<i64>,
    pub last_race_name: Option<String>,
    pub last_driver_code: Option<String>,
    pub last_tool: Option<String>,
    pub last_session: Option<String>,
}

impl ConversationContext {
    /// Fold one executed call into the context. Placeholders never overwrite known values.
    pub fn record(&mut self, tool: &str, arguments: &Arguments) {
        let concrete = |key: &str| {
            arguments
                .get(key)
                .filter(|v| !is_placeholder(v))
                .and_then(Value::as_str)
                .map(str::to_string)
        };

        self.last_tool = Some(tool.to_string());
        if let Some(year) = arguments.get("year").and_then(as_year) {
            self.last_year = Some(year);
        }
        if let Some(race) = concrete("event_identifier").or_else(|| concrete("identifier")) {
            self.last_race_name = Some(race);
        }
        if let Some(session) = concrete("session_name") {
            self.last_session = Some(session);
        }
        if let Some(driver) = concrete("driver_identifier")
            .or_else(|| concrete("drivers").and_then(|d| d.split(',').next().map(str::to_string)))
        {
            self.last_driver_code = Some(driver.trim().to_string());
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Build an argument map from `(name, value)` pairs.
pub fn args<I, K, V>(pairs: I) -> Arguments
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// A year given as a number or a numeric string.
pub fn as_year(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Whether a single value is a stand-in for data the planner did not have.
pub fn is_placeholder(value: &Value) -> bool {
    match value {
        Value::String(s) => {
            s.trim().is_empty()
                || PLACEHOLDER.is_match(s)
                || s.split(',').any(|part| PLACEHOLDER.is_match(part))
        }
        Value::Array(items) => items.is_empty() || items.iter().any(is_placeholder),
        Value::Null => true,
        _ => false,
    }
}

/// Names of arguments still holding placeholders.
pub fn placeholder_arguments(arguments: &Arguments) -> Vec<String> {
    arguments
        .iter()
        .filter(|(_, v)| is_placeholder(v))
        .map(|(k, _)| k.clone())
        .collect()
}
