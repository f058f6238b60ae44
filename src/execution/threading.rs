//! Argument threading: filling a follow-up call's placeholders from the primary call's payload.
//!
//! Threaders are registered per `(primary tool, follow-up tool)` pair. They only ever replace
//! arguments that are absent or hold a placeholder; concrete values from the plan are kept.

use super::payload::{self, ScheduleEvent};
use crate::error::ToolServiceError;
use crate::planning::plan::{args, as_year, is_placeholder, CURRENT_WEEKEND, LAST_RACE};
use crate::planning::temporal;
use crate::tools::catalog::*;
use crate::tools::{Arguments, ToolDescriptor, ToolInvocationService};
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

static TOP_N: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)top\s*(\d+)").unwrap());

const DEFAULT_TOP_N: usize = 3;

/// What a threader may consult besides the primary payload.
///
/// Service errors met while fetching extra data are returned to the caller; error envelopes only
/// leave the affected arguments unfilled.
pub struct ThreadingContext<'a> {
    pub service: &'a dyn ToolInvocationService,
    pub today: NaiveDate,
    /// Descriptor of the call being filled, when the catalog knows it.
    pub follow_up: Option<&'a ToolDescriptor>,
}

impl ThreadingContext<'_> {
    fn declares(&self, key: &str) -> bool {
        self.follow_up.map(|d| d.parameter(key).is_some()).unwrap_or(false)
    }
}

/// The finished primary call.
pub struct Primary<'a> {
    pub arguments: &'a Arguments,
    pub payload: &'a Value,
}

#[async_trait]
pub trait ArgumentThreader: Send + Sync {
    async fn thread(
        &self,
        primary: &Primary<'_>,
        follow_up: &mut Arguments,
        ctx: &ThreadingContext<'_>,
    ) -> Result<(), ToolServiceError>;
}

pub struct ThreadingRegistry {
    threaders: HashMap<(String, String), Arc<dyn ArgumentThreader>>,
}

impl ThreadingRegistry {
    pub fn new() -> Self {
        Self {
            threaders: HashMap::new(),
        }
    }

    pub fn register(&mut self, primary: &str, follow_up: &str, threader: Arc<dyn ArgumentThreader>) {
        self.threaders
            .insert((primary.to_string(), follow_up.to_string()), threader);
    }

    pub fn get(&self, primary: &str, follow_up: &str) -> Option<&Arc<dyn ArgumentThreader>> {
        self.threaders.get(&(primary.to_string(), follow_up.to_string()))
    }

    /// Run the threader for this pair, if any. Unregistered pairs pass arguments through.
    pub async fn thread(
        &self,
        primary_tool: &str,
        follow_up_tool: &str,
        primary: &Primary<'_>,
        follow_up: &mut Arguments,
        ctx: &ThreadingContext<'_>,
    ) -> Result<(), ToolServiceError> {
        match self.get(primary_tool, follow_up_tool) {
            Some(threader) => {
                tracing::debug!("[Threading] {} -> {}", primary_tool, follow_up_tool);
                threader.thread(primary, follow_up, ctx).await
            }
            None => {
                tracing::debug!("[Threading] No threader for {} -> {}", primary_tool, follow_up_tool);
                Ok(())
            }
        }
    }

    /// The pairs the planner emits.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();

        let event = Arc::new(ScheduleThreader::new("event_identifier"));
        for follow_up in [
            GET_SESSION_RESULTS,
            GET_DRIVER_INFO,
            ANALYZE_DRIVER_PERFORMANCE,
            COMPARE_DRIVERS,
            GET_TELEMETRY,
        ] {
            registry.register(GET_EVENT_SCHEDULE, follow_up, event.clone());
        }
        registry.register(
            GET_EVENT_SCHEDULE,
            GET_EVENT_INFO,
            Arc::new(ScheduleThreader::new("identifier")),
        );

        let standings = Arc::new(StandingsThreader);
        for follow_up in [
            COMPARE_DRIVERS,
            ANALYZE_DRIVER_PERFORMANCE,
            GET_DRIVER_INFO,
            GET_SESSION_RESULTS,
            GET_TELEMETRY,
        ] {
            registry.register(GET_CHAMPIONSHIP_STANDINGS, follow_up, standings.clone());
        }

        registry
    }
}

impl Default for ThreadingRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Schedule → event-scoped call: the placeholder event becomes a concrete event name.
pub struct ScheduleThreader {
    key: &'static str,
}

impl ScheduleThreader {
    pub fn new(key: &'static str) -> Self {
        Self { key }
    }
}

#[async_trait]
impl ArgumentThreader for ScheduleThreader {
    async fn thread(
        &self,
        primary: &Primary<'_>,
        follow_up: &mut Arguments,
        ctx: &ThreadingContext<'_>,
    ) -> Result<(), ToolServiceError> {
        let year = follow_up_year(primary, follow_up, ctx.today);

        if needs_value(follow_up, self.key) {
            let selector = selector(follow_up.get(self.key));
            let events = payload::schedule_events(primary.payload);
            if let Some((resolved_year, name)) = resolve_event(ctx, year, &selector, Some(events)).await? {
                tracing::info!("[Threading] {} {} -> {} ({})", self.key, selector, name, resolved_year);
                follow_up.insert(self.key.to_string(), json!(name));
                follow_up.insert("year".to_string(), json!(resolved_year));
            }
        }

        if wants(follow_up, "drivers", ctx) {
            fill_top_drivers(ctx, year, follow_up, None).await?;
        }
        Ok(())
    }
}

/// Standings → driver-scoped call: drivers from the top of the table, event from the schedule.
pub struct StandingsThreader;

#[async_trait]
impl ArgumentThreader for StandingsThreader {
    async fn thread(
        &self,
        primary: &Primary<'_>,
        follow_up: &mut Arguments,
        ctx: &ThreadingContext<'_>,
    ) -> Result<(), ToolServiceError> {
        let year = follow_up_year(primary, follow_up, ctx.today);

        if wants(follow_up, "drivers", ctx) {
            fill_top_drivers(ctx, year, follow_up, Some(primary.payload)).await?;
        }

        if wants(follow_up, "driver_identifier", ctx) {
            if let Some(leader) = codes(payload::standings_rows(primary.payload)).into_iter().next() {
                follow_up.insert("driver_identifier".to_string(), json!(leader));
            }
        }

        if needs_value(follow_up, "event_identifier") {
            let selector = selector(follow_up.get("event_identifier"));
            if let Some((resolved_year, name)) = resolve_event(ctx, year, &selector, None).await? {
                tracing::info!("[Threading] event_identifier {} -> {} ({})", selector, name, resolved_year);
                follow_up.insert("event_identifier".to_string(), json!(name));
                follow_up.insert("year".to_string(), json!(resolved_year));
            }
        }
        Ok(())
    }
}

fn needs_value(arguments: &Arguments, key: &str) -> bool {
    arguments.get(key).map(is_placeholder).unwrap_or(true)
}

/// A driver argument to fill: present as a placeholder, or absent from a call that takes it.
fn wants(arguments: &Arguments, key: &str, ctx: &ThreadingContext<'_>) -> bool {
    needs_value(arguments, key) && (arguments.contains_key(key) || ctx.declares(key))
}

fn follow_up_year(primary: &Primary<'_>, follow_up: &Arguments, today: NaiveDate) -> i64 {
    follow_up
        .get("year")
        .and_then(as_year)
        .or_else(|| primary.arguments.get("year").and_then(as_year))
        .unwrap_or_else(|| today.year().into())
}

/// Normalised placeholder token; a missing value means the last race.
fn selector(value: Option<&Value>) -> String {
    value
        .and_then(Value::as_str)
        .map(|s| s.trim().to_uppercase().replace(' ', "_"))
        .filter(|s| s == CURRENT_WEEKEND || s == "NEXT_RACE")
        .unwrap_or_else(|| LAST_RACE.to_string())
}

fn select_event<'a>(events: &'a [ScheduleEvent], selector: &str, today: NaiveDate) -> Option<&'a ScheduleEvent> {
    match selector {
        CURRENT_WEEKEND => temporal::current_weekend_event(events, today),
        "NEXT_RACE" => temporal::next_event(events, today),
        _ => temporal::last_completed_event(events, today),
    }
}

/// `Ok(None)` for an error envelope; service failures propagate.
async fn fetch(
    ctx: &ThreadingContext<'_>,
    tool: &str,
    arguments: Arguments,
) -> Result<Option<Value>, ToolServiceError> {
    let result = ctx.service.invoke(tool, &arguments).await?;
    match result.payload() {
        Ok(payload) => Ok(Some(payload)),
        Err(e) => {
            tracing::warn!("[Threading] {} returned an error: {}", tool, e);
            Ok(None)
        }
    }
}

async fn fetch_schedule(ctx: &ThreadingContext<'_>, year: i64) -> Result<Option<Vec<ScheduleEvent>>, ToolServiceError> {
    let Some(payload) = fetch(ctx, GET_EVENT_SCHEDULE, args([("year", json!(year))])).await? else {
        return Ok(None);
    };
    let events = payload::schedule_events(&payload);
    Ok((!events.is_empty()).then_some(events))
}

/// Resolve an event selector to `(year, event name)`.
///
/// When the season has no completed race yet, the previous season's last race is used.
async fn resolve_event(
    ctx: &ThreadingContext<'_>,
    year: i64,
    selector: &str,
    schedule: Option<Vec<ScheduleEvent>>,
) -> Result<Option<(i64, String)>, ToolServiceError> {
    let events = match schedule.filter(|e| !e.is_empty()) {
        Some(events) => events,
        None => fetch_schedule(ctx, year).await?.unwrap_or_default(),
    };
    if let Some(event) = select_event(&events, selector, ctx.today) {
        return Ok(Some((year, event.name.clone())));
    }
    if selector == "NEXT_RACE" {
        return Ok(None);
    }

    tracing::info!("[Threading] No completed event in {}, falling back to {}", year, year - 1);
    let Some(previous) = fetch_schedule(ctx, year - 1).await? else {
        return Ok(None);
    };
    Ok(temporal::last_completed_event(&previous, ctx.today).map(|e| (year - 1, e.name.clone())))
}

fn codes<I, R>(rows: I) -> Vec<String>
where
    I: IntoIterator<Item = R>,
    R: HasCode,
{
    rows.into_iter().filter_map(|r| r.code()).collect()
}

trait HasCode {
    fn code(self) -> Option<String>;
}

impl HasCode for payload::StandingRow {
    fn code(self) -> Option<String> {
        self.code
    }
}

impl HasCode for payload::ResultRow {
    fn code(self) -> Option<String> {
        self.code
    }
}

fn top_n(value: Option<&Value>) -> usize {
    value
        .and_then(Value::as_str)
        .and_then(|s| TOP_N.captures(s))
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .map(|n: usize| n.clamp(2, 10))
        .unwrap_or(DEFAULT_TOP_N)
}

/// Replace a placeholder `drivers` list with the championship top N, or failing that the top N
/// finishers of the last race.
async fn fill_top_drivers(
    ctx: &ThreadingContext<'_>,
    year: i64,
    follow_up: &mut Arguments,
    standings: Option<&Value>,
) -> Result<(), ToolServiceError> {
    let n = top_n(follow_up.get("drivers"));

    let from_standings = match standings {
        Some(payload) => codes(payload::standings_rows(payload)),
        None => match fetch(ctx, GET_CHAMPIONSHIP_STANDINGS, args([("year", json!(year))])).await? {
            Some(payload) => codes(payload::standings_rows(&payload)),
            None => Vec::new(),
        },
    };

    let drivers = if from_standings.len() >= 2 {
        from_standings
    } else {
        tracing::info!("[Threading] Standings have no usable codes, using last race finishers");
        top_finishers(ctx, year).await?
    };

    if drivers.len() >= 2 {
        let joined = drivers.into_iter().take(n).collect::<Vec<_>>().join(",");
        tracing::info!("[Threading] drivers -> {}", joined);
        follow_up.insert("drivers".to_string(), json!(joined));
    }
    Ok(())
}

async fn top_finishers(ctx: &ThreadingContext<'_>, year: i64) -> Result<Vec<String>, ToolServiceError> {
    let Some((event_year, event)) = resolve_event(ctx, year, LAST_RACE, None).await? else {
        return Ok(Vec::new());
    };
    let arguments = args([
        ("year", json!(event_year)),
        ("event_identifier", json!(event)),
        ("session_name", json!("Race")),
    ]);
    Ok(match fetch(ctx, GET_SESSION_RESULTS, arguments).await? {
        Some(payload) => codes(payload::result_rows(&payload)),
        None => Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolInvocationResult;
    use std::sync::Mutex;

    /// Answers schedules per year and records every call.
    struct ScheduleService {
        schedules: HashMap<i64, Value>,
        calls: Mutex<Vec<(String, Arguments)>>,
        unreachable: bool,
    }

    #[async_trait]
    impl ToolInvocationService for ScheduleService {
        async fn invoke(&self, name: &str, arguments: &Arguments) -> Result<ToolInvocationResult, ToolServiceError> {
            self.calls.lock().unwrap().push((name.to_string(), arguments.clone()));
            if self.unreachable {
                return Err(ToolServiceError::Transport("connection refused".to_string()));
            }
            let year = arguments.get("year").and_then(as_year).unwrap_or_default();
            Ok(match (name, self.schedules.get(&year)) {
                (GET_EVENT_SCHEDULE, Some(schedule)) => ToolInvocationResult::success(schedule.clone()),
                _ => ToolInvocationResult::failure("no data"),
            })
        }
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn schedule_2024() -> Value {
        json!([
            {"RoundNumber": 0, "EventName": "Pre-Season Testing", "EventDate": "2024-02-23", "EventFormat": "testing"},
            {"RoundNumber": 13, "EventName": "Hungarian Grand Prix", "EventDate": "2024-07-21", "EventFormat": "conventional"},
            {"RoundNumber": 14, "EventName": "Belgian Grand Prix", "EventDate": "2024-07-28", "EventFormat": "conventional"},
            {"RoundNumber": 15, "EventName": "Dutch Grand Prix", "EventDate": "2024-08-25", "EventFormat": "conventional"}
        ])
    }

    fn service(schedules: Vec<(i64, Value)>) -> ScheduleService {
        ScheduleService {
            schedules: schedules.into_iter().collect(),
            calls: Mutex::new(Vec::new()),
            unreachable: false,
        }
    }

    #[tokio::test]
    async fn test_schedule_threads_last_race() {
        let svc = service(vec![]);
        let ctx = ThreadingContext { service: &svc, today: day(2024, 8, 10), follow_up: None };
        let primary_args = args([("year", json!(2024))]);
        let schedule = schedule_2024();
        let primary = Primary { arguments: &primary_args, payload: &schedule };
        let mut follow_up = args([
            ("year", json!(2024)),
            ("event_identifier", json!(LAST_RACE)),
            ("session_name", json!("Race")),
        ]);

        ThreadingRegistry::with_defaults()
            .thread(GET_EVENT_SCHEDULE, GET_SESSION_RESULTS, &primary, &mut follow_up, &ctx)
            .await
            .unwrap();

        assert_eq!(follow_up["event_identifier"], "Belgian Grand Prix");
        assert!(svc.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concrete_event_is_kept() {
        let svc = service(vec![]);
        let ctx = ThreadingContext { service: &svc, today: day(2024, 8, 10), follow_up: None };
        let primary_args = args([("year", json!(2024))]);
        let schedule = schedule_2024();
        let primary = Primary { arguments: &primary_args, payload: &schedule };
        let mut follow_up = args([("year", json!(2024)), ("event_identifier", json!("Monaco Grand Prix"))]);

        ScheduleThreader::new("event_identifier").thread(&primary, &mut follow_up, &ctx).await.unwrap();
        assert_eq!(follow_up["event_identifier"], "Monaco Grand Prix");
    }

    #[tokio::test]
    async fn test_current_weekend() {
        let svc = service(vec![]);
        let ctx = ThreadingContext { service: &svc, today: day(2024, 8, 24), follow_up: None };
        let primary_args = args([("year", json!(2024))]);
        let schedule = schedule_2024();
        let primary = Primary { arguments: &primary_args, payload: &schedule };
        let mut follow_up = args([("year", json!(2024)), ("event_identifier", json!(CURRENT_WEEKEND))]);

        ScheduleThreader::new("event_identifier").thread(&primary, &mut follow_up, &ctx).await.unwrap();
        assert_eq!(follow_up["event_identifier"], "Dutch Grand Prix");
    }

    #[tokio::test]
    async fn test_early_season_falls_back_to_previous_year() {
        let svc = service(vec![(2024, schedule_2024())]);
        let ctx = ThreadingContext { service: &svc, today: day(2025, 2, 20), follow_up: None };
        let primary_args = args([("year", json!(2025))]);
        let schedule_2025 = json!([
            {"RoundNumber": 1, "EventName": "Australian Grand Prix", "EventDate": "2025-03-16", "EventFormat": "conventional"}
        ]);
        let primary = Primary { arguments: &primary_args, payload: &schedule_2025 };
        let mut follow_up = args([("year", json!(2025)), ("event_identifier", json!(LAST_RACE))]);

        ScheduleThreader::new("event_identifier").thread(&primary, &mut follow_up, &ctx).await.unwrap();

        assert_eq!(follow_up["event_identifier"], "Dutch Grand Prix");
        assert_eq!(follow_up["year"], 2024);
    }

    #[tokio::test]
    async fn test_standings_thread_top_three_and_event() {
        let svc = service(vec![(2024, schedule_2024())]);
        let ctx = ThreadingContext { service: &svc, today: day(2024, 8, 10), follow_up: None };
        let primary_args = args([("year", json!(2024))]);
        let standings = json!({"drivers": [
            {"position": 3, "driverCode": "LEC", "points": 177},
            {"position": 1, "driverCode": "VER", "points": 277},
            {"position": 2, "driverCode": "NOR", "points": 199},
            {"position": 4, "driverCode": "PIA", "points": 167}
        ]});
        let primary = Primary { arguments: &primary_args, payload: &standings };
        let mut follow_up = args([
            ("year", json!(2024)),
            ("event_identifier", json!(LAST_RACE)),
            ("session_name", json!("Race")),
            ("drivers", json!("Top 3")),
        ]);

        ThreadingRegistry::with_defaults()
            .thread(GET_CHAMPIONSHIP_STANDINGS, COMPARE_DRIVERS, &primary, &mut follow_up, &ctx)
            .await
            .unwrap();

        assert_eq!(follow_up["drivers"], "VER,NOR,LEC");
        assert_eq!(follow_up["event_identifier"], "Belgian Grand Prix");
    }

    #[tokio::test]
    async fn test_explicit_drivers_are_kept() {
        let svc = service(vec![(2024, schedule_2024())]);
        let ctx = ThreadingContext { service: &svc, today: day(2024, 8, 10), follow_up: None };
        let primary_args = args([("year", json!(2024))]);
        let standings = json!([{"position": 1, "driverCode": "VER"}, {"position": 2, "driverCode": "NOR"}]);
        let primary = Primary { arguments: &primary_args, payload: &standings };
        let mut follow_up = args([
            ("year", json!(2024)),
            ("event_identifier", json!("Monaco Grand Prix")),
            ("drivers", json!("HAM,RUS")),
        ]);

        StandingsThreader.thread(&primary, &mut follow_up, &ctx).await.unwrap();
        assert_eq!(follow_up["drivers"], "HAM,RUS");
        assert_eq!(follow_up["event_identifier"], "Monaco Grand Prix");
        assert!(svc.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_standings_fill_absent_drivers() {
        let svc = service(vec![(2024, schedule_2024())]);
        let catalog = ToolCatalog::f1_defaults();
        let ctx = ThreadingContext {
            service: &svc,
            today: day(2024, 8, 10),
            follow_up: catalog.get(COMPARE_DRIVERS),
        };
        let primary_args = args([("year", json!(2024))]);
        let standings = json!({"drivers": [
            {"position": 1, "driverCode": "VER", "points": 277},
            {"position": 2, "driverCode": "NOR", "points": 199},
            {"position": 3, "driverCode": "LEC", "points": 177}
        ]});
        let primary = Primary { arguments: &primary_args, payload: &standings };
        let mut follow_up = args([
            ("year", json!(2024)),
            ("event_identifier", json!(LAST_RACE)),
            ("session_name", json!("Race")),
        ]);

        StandingsThreader.thread(&primary, &mut follow_up, &ctx).await.unwrap();

        assert_eq!(follow_up["drivers"], "VER,NOR,LEC");
        assert_eq!(follow_up["event_identifier"], "Belgian Grand Prix");
        // compare_drivers takes no single driver
        assert!(!follow_up.contains_key("driver_identifier"));
    }

    #[tokio::test]
    async fn test_absent_drivers_left_alone_for_undeclared_tool() {
        let svc = service(vec![(2024, schedule_2024())]);
        let catalog = ToolCatalog::f1_defaults();
        let ctx = ThreadingContext {
            service: &svc,
            today: day(2024, 8, 10),
            follow_up: catalog.get(GET_SESSION_RESULTS),
        };
        let primary_args = args([("year", json!(2024))]);
        let standings = json!([{"position": 1, "driverCode": "VER"}, {"position": 2, "driverCode": "NOR"}]);
        let primary = Primary { arguments: &primary_args, payload: &standings };
        let mut follow_up = args([("year", json!(2024)), ("event_identifier", json!("Monaco Grand Prix"))]);

        StandingsThreader.thread(&primary, &mut follow_up, &ctx).await.unwrap();

        assert!(!follow_up.contains_key("drivers"));
        assert!(!follow_up.contains_key("driver_identifier"));
    }

    #[tokio::test]
    async fn test_unreachable_service_is_an_error() {
        let mut svc = service(vec![]);
        svc.unreachable = true;
        let ctx = ThreadingContext { service: &svc, today: day(2024, 8, 10), follow_up: None };
        let primary_args = args([("year", json!(2024))]);
        let standings = json!([{"position": 1, "driverCode": "VER"}, {"position": 2, "driverCode": "NOR"}]);
        let primary = Primary { arguments: &primary_args, payload: &standings };
        let mut follow_up = args([
            ("year", json!(2024)),
            ("event_identifier", json!(LAST_RACE)),
            ("drivers", json!("VER,NOR")),
        ]);

        let threaded = StandingsThreader.thread(&primary, &mut follow_up, &ctx).await;

        assert!(matches!(threaded, Err(ToolServiceError::Transport(_))));
        assert_eq!(follow_up["event_identifier"], LAST_RACE);
    }

    #[test]
    fn test_top_n() {
        assert_eq!(top_n(Some(&json!("Top 3"))), 3);
        assert_eq!(top_n(Some(&json!("TOP5"))), 5);
        assert_eq!(top_n(Some(&json!("DRIVER1,DRIVER2"))), DEFAULT_TOP_N);
        assert_eq!(top_n(None), DEFAULT_TOP_N);
    }

    #[test]
    fn test_unregistered_pair() {
        let registry = ThreadingRegistry::with_defaults();
        assert!(registry.get(GET_TELEMETRY, GET_EVENT_SCHEDULE).is_none());
        assert!(registry.get(GET_EVENT_SCHEDULE, GET_SESSION_RESULTS).is_some());
    }
}
