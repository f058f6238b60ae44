//! Typed views over the data service's payloads.
//!
//! The server exposes pandas-style column names (`EventName`, `Abbreviation`) for schedules and
//! results, and Ergast-style camel case (`driverCode`, `familyName`) for standings. Both spellings
//! and the snake_case variants are accepted.

use crate::planning::entities;
use chrono::NaiveDate;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleEvent {
    pub name: String,
    pub date: Option<NaiveDate>,
    pub round: Option<u32>,
    pub format: Option<String>,
    pub country: Option<String>,
}

impl ScheduleEvent {
    /// Pre-season testing and other sessions that are not a championship round.
    pub fn is_non_race(&self) -> bool {
        let name = self.name.to_lowercase();
        let format = self.format.as_deref().unwrap_or("").to_lowercase();
        format.contains("testing")
            || name.contains("testing")
            || name.contains("test session")
            || self.round == Some(0)
    }

    pub fn is_cancelled(&self) -> bool {
        let format = self.format.as_deref().unwrap_or("").to_lowercase();
        format.contains("cancel") || self.name.to_lowercase().contains("cancelled")
    }

    pub fn is_sprint_weekend(&self) -> bool {
        self.format
            .as_deref()
            .map(|f| f.to_lowercase().contains("sprint"))
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StandingRow {
    pub position: Option<u32>,
    pub code: Option<String>,
    pub name: Option<String>,
    pub points: Option<f64>,
    pub wins: Option<u32>,
    pub team: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    pub position: Option<u32>,
    pub code: Option<String>,
    pub name: Option<String>,
    pub team: Option<String>,
    pub status: Option<String>,
    pub points: Option<f64>,
    pub time: Option<String>,
    pub fastest_lap: Option<String>,
}

/// First array found at the top level or under one of the usual container keys.
fn rows<'a>(payload: &'a Value, keys: &[&str]) -> Vec<&'a Value> {
    if let Some(array) = payload.as_array() {
        return array.iter().collect();
    }
    for key in keys {
        if let Some(array) = payload.get(*key).and_then(Value::as_array) {
            return array.iter().collect();
        }
    }
    Vec::new()
}

fn field<'a>(row: &'a Value, names: &[&str]) -> Option<&'a Value> {
    names
        .iter()
        .filter_map(|n| row.get(*n))
        .find(|v| !v.is_null())
}

fn text(row: &Value, names: &[&str]) -> Option<String> {
    match field(row, names)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Array(items) => {
            let joined = items
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(", ");
            (!joined.is_empty()).then_some(joined)
        }
        _ => None,
    }
}

fn number(row: &Value, names: &[&str]) -> Option<f64> {
    match field(row, names)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn whole(row: &Value, names: &[&str]) -> Option<u32> {
    number(row, names)
        .filter(|n| n.is_finite() && *n >= 0.0)
        .map(|n| n as u32)
}

/// Accepts `2024-07-28`, `2024-07-28T13:00:00` and `2024-07-28 13:00:00`.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let head = raw.trim().get(..10)?;
    NaiveDate::parse_from_str(head, "%Y-%m-%d").ok()
}

pub fn schedule_events(payload: &Value) -> Vec<ScheduleEvent> {
    rows(payload, &["events", "schedule", "races", "data"])
        .into_iter()
        .filter_map(|row| {
            let name = text(row, &["EventName", "event_name", "name", "raceName"])?;
            Some(ScheduleEvent {
                name,
                date: text(row, &["EventDate", "event_date", "date", "Session5Date"])
                    .as_deref()
                    .and_then(parse_date),
                round: whole(row, &["RoundNumber", "round_number", "round"]),
                format: text(row, &["EventFormat", "event_format", "format"]),
                country: text(row, &["Country", "country"]),
            })
        })
        .collect()
}

pub fn standings_rows(payload: &Value) -> Vec<StandingRow> {
    let mut rows: Vec<StandingRow> = rows(payload, &["drivers", "driver_standings", "standings"])
        .into_iter()
        .map(|row| {
            let name = match (
                text(row, &["givenName", "given_name", "FirstName"]),
                text(row, &["familyName", "family_name", "LastName"]),
            ) {
                (Some(given), Some(family)) => Some(format!("{} {}", given, family)),
                (None, Some(family)) => Some(family),
                _ => text(row, &["FullName", "full_name", "driver", "name"]),
            };
            let code = text(row, &["driverCode", "driver_code", "code", "Abbreviation"])
                .filter(|c| entities::is_driver_code(c))
                .or_else(|| name.as_deref().and_then(entities::resolve_driver));
            StandingRow {
                position: whole(row, &["position", "Position", "pos"]),
                code,
                name,
                points: number(row, &["points", "Points"]),
                wins: whole(row, &["wins", "Wins"]),
                team: text(row, &["constructorNames", "constructor", "team", "TeamName"]),
            }
        })
        .collect();
    sort_by_position(&mut rows, |r| r.position);
    rows
}

pub fn result_rows(payload: &Value) -> Vec<ResultRow> {
    let mut rows: Vec<ResultRow> = rows(payload, &["results", "Results", "drivers", "data"])
        .into_iter()
        .map(|row| {
            let name = text(row, &["FullName", "full_name", "BroadcastName", "driver", "name"]);
            let code = text(row, &["Abbreviation", "abbreviation", "driverCode", "code"])
                .filter(|c| entities::is_driver_code(c))
                .or_else(|| name.as_deref().and_then(entities::resolve_driver));
            ResultRow {
                position: whole(row, &["Position", "position", "ClassifiedPosition"]),
                code,
                name,
                team: text(row, &["TeamName", "team_name", "team", "constructor"]),
                status: text(row, &["Status", "status"]),
                points: number(row, &["Points", "points"]),
                time: text(row, &["Time", "time"]),
                fastest_lap: text(row, &["FastestLapTime", "fastest_lap_time", "fastest_lap", "LapTime"]),
            }
        })
        .collect();
    sort_by_position(&mut rows, |r| r.position);
    rows
}

/// Unpositioned rows keep their relative order after all positioned ones.
fn sort_by_position<T>(rows: &mut [T], position: impl Fn(&T) -> Option<u32>) {
    rows.sort_by_key(|r| position(r).unwrap_or(u32::MAX));
}
