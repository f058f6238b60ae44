//! Prompting the language oracle for a plan, and validating what comes back.

use super::entities;
use super::plan::{ConversationContext, FollowUp, QueryPlan, CONVERSATIONAL};
use super::temporal::TemporalContext;
use crate::tools::catalog::ToolCatalog;
use crate::tools::{Arguments, ParamType};
use serde_json::{json, Value};

pub fn build_prompt(
    text: &str,
    catalog: &ToolCatalog,
    temporal: &TemporalContext,
    year: i32,
    conversation: Option<&ConversationContext>,
) -> String {
    let context = match conversation.filter(|c| !c.is_empty()) {
        Some(ctx) => format!(
            "Previous exchange: year={}, race={}, driver={}, tool={}, session={}\n\n",
            display(&ctx.last_year),
            display(&ctx.last_race_name),
            display(&ctx.last_driver_code),
            display(&ctx.last_tool),
            display(&ctx.last_session),
        ),
        None => String::new(),
    };

    format!(
        "You plan Formula 1 data lookups. Choose ONE tool and, only when needed, ONE follow-up tool.\n\n\
         Today is {today}. Unless the question says otherwise, use year {year}.\n\n\
         Available tools:\n{tools}\n\n\
         {context}\
         IMPORTANT: You MUST respond in this EXACT JSON format:\n\
         {{\n  \
           \"tool\": \"tool_name\",\n  \
           \"arguments\": {{\"year\": {year}}},\n  \
           \"followUp\": {{\"tool\": \"tool_name\", \"arguments\": {{}}}},\n  \
           \"reasoning\": \"one sentence\"\n\
         }}\n\n\
         Guidelines:\n\
         - Omit \"followUp\" when one call answers the question\n\
         - Drivers are three-letter codes (VER, HAM, NOR); several drivers are comma separated\n\
         - Events are full names such as \"British Grand Prix\"; sessions are Race, Qualifying, Sprint, FP1, FP2, FP3\n\
         - For the most recent race call get_event_schedule first and use \"LAST_RACE\" as the follow-up event_identifier\n\
         - For the current weekend use \"CURRENT_WEEKEND\" the same way\n\
         - Never invent values you do not know; use the placeholders above instead\n\
         - For greetings or questions that need no data use tool \"{conversational}\"\n\n\
         Question: {text}\n\n\
         Respond with valid JSON only. No extra text.",
        today = temporal.today(),
        year = year,
        tools = catalog.tools_description(),
        context = context,
        conversational = CONVERSATIONAL,
        text = text,
    )
}

fn display<T: std::fmt::Display>(value: &Option<T>) -> String {
    value
        .as_ref()
        .map(|v| v.to_string())
        .unwrap_or_else(|| "-".to_string())
}

/// First JSON object in a model response, tolerating prose or code fences around it.
pub fn extract_json(response: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(response.trim()) {
        return value.is_object().then_some(value);
    }
    let start = response.find('{')?;
    let end = response.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str::<Value>(&response[start..=end])
        .ok()
        .filter(Value::is_object)
}

/// Validate an oracle response into a plan. `None` means it cannot be used.
///
/// An unusable follow-up is dropped rather than rejecting the whole plan.
pub fn parse_plan(response: &str, catalog: &ToolCatalog, default_year: i32) -> Option<QueryPlan> {
    let value = extract_json(response)?;

    let tool = value.get("tool").and_then(Value::as_str)?.trim().to_string();
    if tool.is_empty() {
        return None;
    }
    let reasoning = value
        .get("reasoning")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    if tool == CONVERSATIONAL {
        return Some(QueryPlan::conversational(reasoning));
    }
    if !catalog.has_tool(&tool) {
        tracing::warn!("[Planner] Oracle chose unknown tool '{}'", tool);
        return None;
    }

    let arguments = normalize_arguments(&tool, object(value.get("arguments")), catalog, default_year);
    let mut plan = QueryPlan::new(tool, arguments, reasoning);

    let follow_up = value.get("followUp").or_else(|| value.get("follow_up"));
    if let Some(follow_up) = follow_up.filter(|f| f.is_object()) {
        match follow_up.get("tool").and_then(Value::as_str).map(str::trim) {
            Some(name) if catalog.has_tool(name) => {
                let arguments =
                    normalize_arguments(name, object(follow_up.get("arguments")), catalog, default_year);
                plan.follow_up = Some(FollowUp {
                    tool: name.to_string(),
                    arguments,
                });
            }
            other => {
                tracing::debug!("[Planner] Dropping unusable follow-up {:?}", other);
            }
        }
    }

    Some(plan)
}

fn object(value: Option<&Value>) -> Arguments {
    value
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

/// Canonicalise driver and event references and fill a missing year.
pub fn normalize_arguments(
    tool: &str,
    mut arguments: Arguments,
    catalog: &ToolCatalog,
    default_year: i32,
) -> Arguments {
    if let Some(Value::String(driver)) = arguments.get("driver_identifier") {
        if let Some(code) = entities::resolve_driver(driver) {
            arguments.insert("driver_identifier".to_string(), json!(code));
        }
    }

    if let Some(drivers) = arguments.get("drivers") {
        let parts: Vec<String> = match drivers {
            Value::String(s) => s.split(',').map(|p| p.trim().to_string()).collect(),
            Value::Array(items) => items
                .iter()
                .filter_map(Value::as_str)
                .map(|p| p.trim().to_string())
                .collect(),
            _ => Vec::new(),
        };
        if !parts.is_empty() && parts.iter().all(|p| entities::resolve_driver(p).is_some()) {
            let codes: Vec<String> = parts.iter().filter_map(|p| entities::resolve_driver(p)).collect();
            arguments.insert("drivers".to_string(), json!(codes.join(",")));
        }
    }

    for key in ["event_identifier", "identifier"] {
        if let Some(Value::String(event)) = arguments.get(key) {
            if let Some(canonical) = entities::resolve_grand_prix(event) {
                arguments.insert(key.to_string(), json!(canonical));
            }
        }
    }

    let wants_year = catalog
        .get(tool)
        .and_then(|d| d.parameter("year"))
        .map(|p| p.param_type == ParamType::Number)
        .unwrap_or(false);
    if wants_year && !arguments.contains_key("year") {
        arguments.insert("year".to_string(), json!(default_year));
    }

    arguments
}
