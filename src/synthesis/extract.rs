//! Structural fact extraction from tool payloads.
//!
//! Every fact produced here is read directly from the payload or the dispatched arguments.

use crate::execution::payload::{self, ResultRow, ScheduleEvent, StandingRow};
use crate::execution::ToolCall;
use crate::planning::plan::as_year;
use crate::planning::temporal;
use crate::tools::catalog::*;
use chrono::{Datelike, NaiveDate};
use serde_json::Value;

const MAX_GENERIC_LINES: usize = 15;
const MAX_SCHEDULE_LINES: usize = 30;

/// A headline plus supporting lines.
#[derive(Debug, Clone, PartialEq)]
pub struct Facts {
    pub headline: String,
    pub lines: Vec<String>,
}

impl Facts {
    fn new(headline: impl Into<String>, lines: Vec<String>) -> Self {
        Self {
            headline: headline.into(),
            lines,
        }
    }

    pub fn render(&self) -> String {
        if self.lines.is_empty() {
            return self.headline.clone();
        }
        format!("{}\n{}", self.headline, self.lines.join("\n"))
    }
}

/// What the question asks for, as far as formatting is concerned.
#[derive(Debug, Clone, Copy, Default)]
pub struct Focus {
    pub fastest_lap: bool,
    pub podium_only: bool,
    pub next: bool,
    pub last: bool,
}

impl Focus {
    pub fn from_question(question: &str) -> Self {
        let lower = question.to_lowercase();
        let has = |needle: &str| lower.contains(needle);
        Self {
            fastest_lap: has("fastest lap"),
            podium_only: has("won") || has("winner") || has("win ") || has("podium") || has("pole"),
            next: temporal::mentions_next_race(question) || has("next"),
            last: temporal::mentions_last_race(question),
        }
    }
}

pub fn extract(call: &ToolCall, payload: &Value, focus: Focus, today: NaiveDate) -> Option<Facts> {
    let scope = Scope::of(call);
    match call.tool.as_str() {
        GET_SESSION_RESULTS => session_results(&scope, payload, focus),
        GET_CHAMPIONSHIP_STANDINGS => standings(&scope, payload, today),
        GET_EVENT_SCHEDULE => schedule(&scope, payload, focus, today),
        _ => generic(&scope, &call.tool, payload),
    }
}

/// Year, event and session a call was made for.
struct Scope {
    year: Option<i64>,
    event: Option<String>,
    session: Option<String>,
    subject: Option<String>,
}

impl Scope {
    fn of(call: &ToolCall) -> Self {
        let text = |key: &str| call.arguments.get(key).and_then(Value::as_str).map(str::to_string);
        Self {
            year: call.arguments.get("year").and_then(as_year),
            event: text("event_identifier").or_else(|| text("identifier")),
            session: text("session_name"),
            subject: text("driver_identifier").or_else(|| text("drivers")),
        }
    }

    fn event_label(&self) -> String {
        match (self.year, &self.event) {
            (Some(year), Some(event)) => format!("the {} {}", year, event),
            (None, Some(event)) => format!("the {}", event),
            (Some(year), None) => format!("the {} season", year),
            (None, None) => "this event".to_string(),
        }
    }

    fn session(&self) -> &str {
        self.session.as_deref().unwrap_or("Race")
    }
}

fn driver_label(name: &Option<String>, code: &Option<String>) -> String {
    match (name, code) {
        (Some(name), Some(code)) => format!("{} ({})", name, code),
        (Some(name), None) => name.clone(),
        (None, Some(code)) => code.clone(),
        (None, None) => "Unknown driver".to_string(),
    }
}

fn points(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{:.1}", value)
    }
}

fn result_line(row: &ResultRow) -> String {
    let mut line = match row.position {
        Some(position) => format!("P{} {}", position, driver_label(&row.name, &row.code)),
        None => driver_label(&row.name, &row.code),
    };
    if let Some(team) = &row.team {
        line.push_str(&format!(", {}", team));
    }
    if let Some(time) = &row.time {
        line.push_str(&format!(" - {}", time));
    } else if let Some(status) = &row.status {
        line.push_str(&format!(" - {}", status));
    }
    line
}

fn session_results(scope: &Scope, payload: &Value, focus: Focus) -> Option<Facts> {
    let rows = payload::result_rows(payload);
    if rows.is_empty() {
        return None;
    }

    if focus.fastest_lap {
        let fastest = rows
            .iter()
            .filter(|r| r.fastest_lap.is_some())
            .min_by(|a, b| a.fastest_lap.cmp(&b.fastest_lap));
        return Some(match fastest {
            Some(row) => Facts::new(
                format!(
                    "Fastest lap at {} {}: {} with {}",
                    scope.event_label(),
                    scope.session(),
                    driver_label(&row.name, &row.code),
                    row.fastest_lap.as_deref().unwrap_or_default()
                ),
                Vec::new(),
            ),
            None => Facts::new(
                format!(
                    "Fastest lap data is not available in the {} results for {}.",
                    scope.session(),
                    scope.event_label()
                ),
                Vec::new(),
            ),
        });
    }

    let leader = rows.first()?;
    let who = driver_label(&leader.name, &leader.code);
    let headline = match (leader.position, scope.session()) {
        (Some(1), "Race") => format!("{} won {}.", who, scope.event_label()),
        (Some(1), "Sprint") => format!("{} won the Sprint at {}.", who, scope.event_label()),
        (Some(1), session) if session.contains("Qualifying") => {
            format!("{} took pole in {} {}.", who, scope.event_label(), session)
        }
        (Some(1), session) => format!("{} topped {} {}.", who, scope.event_label(), session),
        _ => format!("{} results for {}:", scope.session(), scope.event_label()),
    };
    let shown = if focus.podium_only { 3 } else { 10 };
    Some(Facts::new(
        headline,
        rows.iter().take(shown).map(result_line).collect(),
    ))
}

fn standing_line(row: &StandingRow) -> String {
    let mut line = format!(
        "{}. {}",
        row.position.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string()),
        driver_label(&row.name, &row.code)
    );
    if let Some(team) = &row.team {
        line.push_str(&format!(", {}", team));
    }
    if let Some(pts) = row.points {
        line.push_str(&format!(" - {} pts", points(pts)));
    }
    line
}

fn standings(scope: &Scope, payload: &Value, today: NaiveDate) -> Option<Facts> {
    let rows = payload::standings_rows(payload);
    let leader = rows.first()?;
    let who = driver_label(&leader.name, &leader.code);
    let year = scope.year.unwrap_or_else(|| today.year().into());
    let pts = leader
        .points
        .map(|p| format!(" with {} points", points(p)))
        .unwrap_or_default();
    let headline = if year < i64::from(today.year()) {
        format!("{} won the {} championship{}.", who, year, pts)
    } else {
        format!("{} leads the {} championship{}.", who, year, pts)
    };
    Some(Facts::new(headline, rows.iter().take(10).map(standing_line).collect()))
}

fn event_line(event: &ScheduleEvent) -> String {
    let round = event.round.map(|r| format!("R{} ", r)).unwrap_or_default();
    let date = event
        .date
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "date TBC".to_string());
    let sprint = if event.is_sprint_weekend() { " (sprint)" } else { "" };
    format!("{}{} - {}{}", round, event.name, date, sprint)
}

fn schedule(scope: &Scope, payload: &Value, focus: Focus, today: NaiveDate) -> Option<Facts> {
    let events = payload::schedule_events(payload);
    let races: Vec<&ScheduleEvent> = events
        .iter()
        .filter(|e| !e.is_non_race() && !e.is_cancelled())
        .collect();
    if races.is_empty() {
        return None;
    }
    let season = scope
        .year
        .map(|y| y.to_string())
        .unwrap_or_else(|| "this".to_string());

    if focus.next {
        return Some(match temporal::next_event(&events, today) {
            Some(event) => Facts::new(format!("The next race is the {}.", event.name), vec![event_line(event)]),
            None => Facts::new(format!("There are no races left in the {} season.", season), Vec::new()),
        });
    }
    if focus.last {
        return temporal::last_completed_event(&events, today)
            .map(|event| Facts::new(format!("The most recent race was the {}.", event.name), vec![event_line(event)]));
    }

    Some(Facts::new(
        format!("The {} season has {} races.", season, races.len()),
        races.iter().take(MAX_SCHEDULE_LINES).map(|e| event_line(e)).collect(),
    ))
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// `key: value` pairs of an object's scalar fields, in payload order.
fn scalar_fields(object: &serde_json::Map<String, Value>) -> Vec<String> {
    object
        .iter()
        .filter(|(key, _)| key.as_str() != "status")
        .filter_map(|(key, value)| scalar(value).map(|v| format!("{}: {}", key, v)))
        .collect()
}

fn generic_lines(payload: &Value) -> Vec<String> {
    match payload {
        Value::Object(object) => {
            let mut lines = scalar_fields(object);
            for (key, value) in object {
                match value {
                    Value::Object(inner) => {
                        let fields = scalar_fields(inner);
                        if !fields.is_empty() {
                            lines.push(format!("{}: {}", key, fields.join(", ")));
                        }
                    }
                    Value::Array(items) => {
                        lines.extend(items.iter().filter_map(Value::as_object).map(|o| scalar_fields(o).join(", ")));
                    }
                    _ => {}
                }
            }
            lines
        }
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::Object(o) => Some(scalar_fields(o).join(", ")),
                other => scalar(other),
            })
            .collect(),
        other => scalar(other).into_iter().collect(),
    }
}

fn generic(scope: &Scope, tool: &str, payload: &Value) -> Option<Facts> {
    let lines: Vec<String> = generic_lines(payload)
        .into_iter()
        .filter(|l| !l.is_empty())
        .take(MAX_GENERIC_LINES)
        .collect();
    if lines.is_empty() {
        return None;
    }
    let label = match tool {
        COMPARE_DRIVERS => "Driver comparison",
        ANALYZE_DRIVER_PERFORMANCE => "Performance analysis",
        GET_DRIVER_INFO => "Driver result",
        GET_TELEMETRY => "Telemetry",
        GET_EVENT_INFO => "Event information",
        _ => "Data",
    };
    let subject = scope
        .subject
        .as_deref()
        .map(|s| format!(" for {}", s))
        .unwrap_or_default();
    let session = scope
        .session
        .as_deref()
        .map(|s| format!(" {}", s))
        .unwrap_or_default();
    Some(Facts::new(
        format!("{}{} at {}{}:", label, subject, scope.event_label(), session),
        lines,
    ))
}
