//! Recursive Tool Executor
//!
//! Runs a `QueryPlan`: validates and normalises arguments, calls the primary tool, threads the
//! primary payload into the follow-up and recurses, bounded by `max_depth`.
//!
//! Plan-level problems (invalid tool, depth exhausted, unresolved arguments) come back as error
//! results without a remote call. Transport failures propagate as `Err`.

use super::threading::{Primary, ThreadingContext, ThreadingRegistry};
use crate::error::ToolServiceError;
use crate::planning::plan::{args, placeholder_arguments, QueryPlan};
use crate::planning::temporal::Clock;
use crate::tools::catalog::{ToolCatalog, GET_EVENT_SCHEDULE};
use crate::tools::{
    Arguments, ParamShape, ParamType, ToolDescriptor, ToolInvocationResult, ToolInvocationService,
};
use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

pub const DEFAULT_MAX_DEPTH: usize = 3;
const DEPTH_RANGE: (usize, usize) = (1, 5);

pub const INVALID_PLAN: &str = "invalid query plan";
pub const MAX_DEPTH_REACHED: &str = "max recursion depth reached";

/// One dispatched (or refused) tool call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolCall {
    pub tool: String,
    pub arguments: Arguments,
    pub result: ToolInvocationResult,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CombinedResult {
    pub primary: ToolCall,
    pub follow_up: ExecutionOutcome,
    pub combined: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ExecutionOutcome {
    Single(ToolCall),
    Combined(Box<CombinedResult>),
}

impl ExecutionOutcome {
    pub fn primary(&self) -> &ToolCall {
        match self {
            ExecutionOutcome::Single(call) => call,
            ExecutionOutcome::Combined(combined) => &combined.primary,
        }
    }

    /// Every call in dispatch order.
    pub fn calls(&self) -> Vec<&ToolCall> {
        match self {
            ExecutionOutcome::Single(call) => vec![call],
            ExecutionOutcome::Combined(combined) => {
                let mut calls = vec![&combined.primary];
                calls.extend(combined.follow_up.calls());
                calls
            }
        }
    }

    /// The deepest call, whose data answers the question.
    pub fn last(&self) -> &ToolCall {
        match self {
            ExecutionOutcome::Single(call) => call,
            ExecutionOutcome::Combined(combined) => combined.follow_up.last(),
        }
    }

    pub fn is_combined(&self) -> bool {
        matches!(self, ExecutionOutcome::Combined(_))
    }

    pub fn is_success(&self) -> bool {
        self.calls().iter().all(|c| c.result.is_success_deep())
    }
}

pub struct RecursiveExecutor {
    service: Arc<dyn ToolInvocationService>,
    catalog: Arc<ToolCatalog>,
    threading: ThreadingRegistry,
    clock: Arc<dyn Clock>,
    max_depth: usize,
}

impl RecursiveExecutor {
    pub fn new(
        service: Arc<dyn ToolInvocationService>,
        catalog: Arc<ToolCatalog>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            service,
            catalog,
            threading: ThreadingRegistry::with_defaults(),
            clock,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Bound on recursion, clamped to 1..=5.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.clamp(DEPTH_RANGE.0, DEPTH_RANGE.1);
        self
    }

    pub fn with_threading(mut self, threading: ThreadingRegistry) -> Self {
        self.threading = threading;
        self
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn execute<'a>(
        &'a self,
        plan: &'a QueryPlan,
        depth: usize,
    ) -> BoxFuture<'a, Result<ExecutionOutcome, ToolServiceError>> {
        Box::pin(async move {
            let tool = plan.tool.trim();

            if depth >= self.max_depth {
                tracing::warn!("[Executor] Depth {} reached limit {}, not calling {}", depth, self.max_depth, tool);
                return Ok(refused(tool, &plan.arguments, MAX_DEPTH_REACHED.to_string()));
            }

            let Some(descriptor) = self.catalog.get(tool).filter(|_| !tool.is_empty()) else {
                tracing::warn!("[Executor] Rejecting plan with tool '{}'", tool);
                return Ok(refused(tool, &plan.arguments, format!("{}: unknown tool '{}'", INVALID_PLAN, tool)));
            };

            let mut arguments = normalize_arguments(descriptor, &plan.arguments);
            if depth == 0 {
                self.resolve_primary_placeholders(tool, &mut arguments).await?;
            }

            if let Some(problem) = self.argument_problem(descriptor, &arguments) {
                tracing::warn!("[Executor] Not calling {}: {}", tool, problem);
                return Ok(refused(tool, &arguments, format!("{}: {}", INVALID_PLAN, problem)));
            }

            tracing::info!("[Executor] Calling {} (depth {})", tool, depth);
            let result = self.service.invoke(tool, &arguments).await?;
            let primary = ToolCall {
                tool: tool.to_string(),
                arguments,
                result,
            };

            let Some(follow_up) = &plan.follow_up else {
                return Ok(ExecutionOutcome::Single(primary));
            };

            let payload = match primary.result.payload() {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::info!("[Executor] {} failed ({}), skipping follow-up {}", tool, e, follow_up.tool);
                    return Ok(ExecutionOutcome::Single(primary));
                }
            };

            let follow_up_descriptor = self.catalog.get(follow_up.tool.trim());
            let mut follow_up_arguments = match follow_up_descriptor {
                Some(d) => normalize_arguments(d, &follow_up.arguments),
                None => follow_up.arguments.clone(),
            };
            let ctx = ThreadingContext {
                service: self.service.as_ref(),
                today: self.clock.today(),
                follow_up: follow_up_descriptor,
            };
            self.threading
                .thread(
                    tool,
                    follow_up.tool.trim(),
                    &Primary {
                        arguments: &primary.arguments,
                        payload: &payload,
                    },
                    &mut follow_up_arguments,
                    &ctx,
                )
                .await?;

            let problem = match follow_up_descriptor {
                Some(d) => self.argument_problem(d, &follow_up_arguments),
                None => unresolved_problem(&follow_up_arguments),
            };
            if let Some(problem) = problem {
                tracing::warn!(
                    "[Executor] Follow-up {} cannot be parameterised ({}), returning primary only",
                    follow_up.tool,
                    problem
                );
                return Ok(ExecutionOutcome::Single(primary));
            }

            let next = QueryPlan::new(follow_up.tool.clone(), follow_up_arguments, plan.reasoning.clone());
            let follow_up_outcome = self.execute(&next, depth + 1).await?;

            Ok(ExecutionOutcome::Combined(Box::new(CombinedResult {
                primary,
                follow_up: follow_up_outcome,
                combined: true,
            })))
        })
    }

    /// A primary call naming a placeholder event is resolved through the season schedule first.
    async fn resolve_primary_placeholders(
        &self,
        tool: &str,
        arguments: &mut Arguments,
    ) -> Result<(), ToolServiceError> {
        if placeholder_arguments(arguments).is_empty() || tool == GET_EVENT_SCHEDULE {
            return Ok(());
        }
        if self.threading.get(GET_EVENT_SCHEDULE, tool).is_none() {
            return Ok(());
        }
        let Some(year) = arguments.get("year").cloned() else {
            return Ok(());
        };

        tracing::info!("[Executor] Resolving placeholders of {} via the schedule", tool);
        let schedule_arguments = args([("year", year)]);
        let schedule = self.service.invoke(GET_EVENT_SCHEDULE, &schedule_arguments).await?;
        if let Ok(payload) = schedule.payload() {
            let ctx = ThreadingContext {
                service: self.service.as_ref(),
                today: self.clock.today(),
                follow_up: self.catalog.get(tool),
            };
            let primary = Primary {
                arguments: &schedule_arguments,
                payload: &payload,
            };
            self.threading
                .thread(GET_EVENT_SCHEDULE, tool, &primary, arguments, &ctx)
                .await?;
        }
        Ok(())
    }

    fn argument_problem(&self, descriptor: &ToolDescriptor, arguments: &Arguments) -> Option<String> {
        let missing = self.catalog.missing_required(&descriptor.name, arguments);
        if !missing.is_empty() {
            return Some(format!("missing required arguments: {}", missing.join(", ")));
        }
        unresolved_problem(arguments)
    }
}

fn unresolved_problem(arguments: &Arguments) -> Option<String> {
    let unresolved = placeholder_arguments(arguments);
    (!unresolved.is_empty()).then(|| format!("unresolved arguments: {}", unresolved.join(", ")))
}

fn refused(tool: &str, arguments: &Arguments, error: String) -> ExecutionOutcome {
    ExecutionOutcome::Single(ToolCall {
        tool: tool.to_string(),
        arguments: arguments.clone(),
        result: ToolInvocationResult::failure(error),
    })
}

/// Coerce values to the shape their parameter documents.
pub fn normalize_arguments(descriptor: &ToolDescriptor, arguments: &Arguments) -> Arguments {
    arguments
        .iter()
        .map(|(name, value)| {
            let normalized = match descriptor.parameter(name) {
                Some(param) => {
                    let value = match (param.shape, value) {
                        (ParamShape::Single, Value::Array(items)) => pick_single(name, items),
                        (ParamShape::CommaJoined, Value::Array(items)) => json!(items
                            .iter()
                            .filter_map(token)
                            .collect::<Vec<_>>()
                            .join(",")),
                        _ => value.clone(),
                    };
                    match (param.param_type, &value) {
                        (ParamType::Number, Value::String(s)) => s
                            .trim()
                            .parse::<i64>()
                            .map(|n| json!(n))
                            .unwrap_or(value),
                        _ => value,
                    }
                }
                None => value.clone(),
            };
            (name.clone(), normalized)
        })
        .collect()
}

fn token(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn pick_single(name: &str, items: &[Value]) -> Value {
    if name == "session_name" {
        if let Some(race) = items
            .iter()
            .find(|v| v.as_str().map(|s| s.eq_ignore_ascii_case("race")).unwrap_or(false))
        {
            return race.clone();
        }
    }
    items.first().cloned().unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planning::plan::{LAST_RACE, TOP_THREE};
    use crate::planning::temporal::FixedClock;
    use crate::tools::catalog::*;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::sync::Mutex;

    /// Replies per tool name and counts calls.
    struct StubService {
        replies: Vec<(&'static str, ToolInvocationResult)>,
        calls: Mutex<Vec<(String, Arguments)>>,
    }

    impl StubService {
        fn new(replies: Vec<(&'static str, ToolInvocationResult)>) -> Arc<Self> {
            Arc::new(Self {
                replies,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<(String, Arguments)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ToolInvocationService for StubService {
        async fn invoke(&self, name: &str, arguments: &Arguments) -> Result<ToolInvocationResult, ToolServiceError> {
            self.calls.lock().unwrap().push((name.to_string(), arguments.clone()));
            self.replies
                .iter()
                .find(|(tool, _)| *tool == name)
                .map(|(_, reply)| Ok(reply.clone()))
                .unwrap_or_else(|| Err(ToolServiceError::Transport("connection refused".into())))
        }
    }

    fn executor(service: Arc<StubService>) -> RecursiveExecutor {
        RecursiveExecutor::new(
            service,
            Arc::new(ToolCatalog::f1_defaults()),
            Arc::new(FixedClock(NaiveDate::from_ymd_opt(2024, 8, 10).unwrap())),
        )
    }

    fn schedule() -> ToolInvocationResult {
        ToolInvocationResult::success(json!({"status": "success", "data": [
            {"RoundNumber": 13, "EventName": "Hungarian Grand Prix", "EventDate": "2024-07-21", "EventFormat": "conventional"},
            {"RoundNumber": 14, "EventName": "Belgian Grand Prix", "EventDate": "2024-07-28", "EventFormat": "conventional"},
            {"RoundNumber": 15, "EventName": "Dutch Grand Prix", "EventDate": "2024-08-25", "EventFormat": "conventional"}
        ]}))
    }

    fn last_race_plan() -> QueryPlan {
        QueryPlan::new(GET_EVENT_SCHEDULE, args([("year", json!(2024))]), "last race").with_follow_up(
            GET_SESSION_RESULTS,
            args([
                ("year", json!(2024)),
                ("event_identifier", json!(LAST_RACE)),
                ("session_name", json!("Race")),
            ]),
        )
    }

    #[tokio::test]
    async fn test_depth_limit_makes_no_call() {
        let service = StubService::new(vec![(GET_EVENT_SCHEDULE, schedule())]);
        let executor = executor(service.clone());
        for depth in [3, 4, 10] {
            let outcome = executor.execute(&last_race_plan(), depth).await.unwrap();
            let error = outcome.primary().result.error.clone().unwrap();
            assert!(error.contains(MAX_DEPTH_REACHED));
        }
        assert!(service.calls().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_plan_makes_no_call() {
        let service = StubService::new(vec![]);
        let executor = executor(service.clone());
        for tool in ["", "   ", "conversational", "get_weather"] {
            let plan = QueryPlan::new(tool, Arguments::new(), "");
            let outcome = executor.execute(&plan, 0).await.unwrap();
            assert!(outcome.primary().result.error.as_deref().unwrap().starts_with(INVALID_PLAN));
        }
        assert!(service.calls().is_empty());
    }

    #[tokio::test]
    async fn test_missing_required_argument_makes_no_call() {
        let service = StubService::new(vec![]);
        let executor = executor(service.clone());
        let plan = QueryPlan::new(GET_SESSION_RESULTS, args([("year", json!(2024))]), "");
        let outcome = executor.execute(&plan, 0).await.unwrap();
        assert!(outcome.primary().result.error.as_deref().unwrap().contains("event_identifier"));
        assert!(service.calls().is_empty());
    }

    #[tokio::test]
    async fn test_failed_primary_skips_follow_up() {
        let service = StubService::new(vec![(
            GET_EVENT_SCHEDULE,
            ToolInvocationResult::failure("Season not available"),
        )]);
        let executor = executor(service.clone());
        let outcome = executor.execute(&last_race_plan(), 0).await.unwrap();
        assert!(!outcome.is_combined());
        assert_eq!(service.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_nested_error_envelope_skips_follow_up() {
        let service = StubService::new(vec![(
            GET_EVENT_SCHEDULE,
            ToolInvocationResult::success(json!({"status": "error", "message": "backend down"})),
        )]);
        let executor = executor(service.clone());
        let outcome = executor.execute(&last_race_plan(), 0).await.unwrap();
        assert!(!outcome.is_combined());
        assert_eq!(service.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_threaded_follow_up_is_combined() {
        let results = ToolInvocationResult::success(json!([{"Position": 1, "Abbreviation": "HAM"}]));
        let service = StubService::new(vec![(GET_EVENT_SCHEDULE, schedule()), (GET_SESSION_RESULTS, results)]);
        let executor = executor(service.clone());

        let outcome = executor.execute(&last_race_plan(), 0).await.unwrap();

        assert!(outcome.is_combined());
        let calls = service.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].1["event_identifier"], "Belgian Grand Prix");
        assert_eq!(outcome.last().tool, GET_SESSION_RESULTS);
        let serialized = serde_json::to_value(&outcome).unwrap();
        assert_eq!(serialized["combined"], true);
    }

    #[tokio::test]
    async fn test_unresolvable_follow_up_returns_primary() {
        let standings = ToolInvocationResult::success(json!({"drivers": []}));
        let service = StubService::new(vec![
            (GET_CHAMPIONSHIP_STANDINGS, standings),
            (GET_EVENT_SCHEDULE, ToolInvocationResult::failure("no schedule")),
        ]);
        let executor = executor(service.clone());
        let plan = QueryPlan::new(GET_CHAMPIONSHIP_STANDINGS, args([("year", json!(2024))]), "")
            .with_follow_up(
                COMPARE_DRIVERS,
                args([
                    ("year", json!(2024)),
                    ("event_identifier", json!(LAST_RACE)),
                    ("session_name", json!("Race")),
                    ("drivers", json!(TOP_THREE)),
                ]),
            );

        let outcome = executor.execute(&plan, 0).await.unwrap();
        assert!(!outcome.is_combined());
        assert!(service.calls().iter().all(|(tool, _)| tool != COMPARE_DRIVERS));
    }

    #[tokio::test]
    async fn test_follow_up_missing_required_returns_primary() {
        let service = StubService::new(vec![(GET_EVENT_SCHEDULE, schedule())]);
        let executor = executor(service.clone());
        // nothing can supply session_name
        let plan = QueryPlan::new(GET_EVENT_SCHEDULE, args([("year", json!(2024))]), "").with_follow_up(
            GET_SESSION_RESULTS,
            args([("year", json!(2024)), ("event_identifier", json!(LAST_RACE))]),
        );

        let outcome = executor.execute(&plan, 0).await.unwrap();

        assert!(!outcome.is_combined());
        assert!(outcome.primary().result.is_success());
        assert_eq!(service.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_absent_drivers_threaded_from_standings() {
        let standings = ToolInvocationResult::success(json!({"drivers": [
            {"position": 1, "driverCode": "VER", "points": 277},
            {"position": 2, "driverCode": "NOR", "points": 199},
            {"position": 3, "driverCode": "LEC", "points": 177}
        ]}));
        let compare = ToolInvocationResult::success(json!({"fastest": "NOR"}));
        let service = StubService::new(vec![
            (GET_CHAMPIONSHIP_STANDINGS, standings),
            (GET_EVENT_SCHEDULE, schedule()),
            (COMPARE_DRIVERS, compare),
        ]);
        let executor = executor(service.clone());
        let plan = QueryPlan::new(GET_CHAMPIONSHIP_STANDINGS, args([("year", json!(2024))]), "").with_follow_up(
            COMPARE_DRIVERS,
            args([
                ("year", json!(2024)),
                ("event_identifier", json!(LAST_RACE)),
                ("session_name", json!("Race")),
            ]),
        );

        let outcome = executor.execute(&plan, 0).await.unwrap();

        assert!(outcome.is_combined());
        let calls = service.calls();
        let (tool, arguments) = calls.last().unwrap();
        assert_eq!(tool, COMPARE_DRIVERS);
        assert_eq!(arguments["drivers"], "VER,NOR,LEC");
        assert_eq!(arguments["event_identifier"], "Belgian Grand Prix");
    }

    #[tokio::test]
    async fn test_transport_error_while_threading_propagates() {
        let standings = ToolInvocationResult::success(json!([
            {"position": 1, "driverCode": "VER"},
            {"position": 2, "driverCode": "NOR"}
        ]));
        // no schedule reply: the stub answers with a transport error
        let service = StubService::new(vec![(GET_CHAMPIONSHIP_STANDINGS, standings)]);
        let executor = executor(service.clone());
        let plan = QueryPlan::new(GET_CHAMPIONSHIP_STANDINGS, args([("year", json!(2024))]), "").with_follow_up(
            COMPARE_DRIVERS,
            args([
                ("year", json!(2024)),
                ("event_identifier", json!(LAST_RACE)),
                ("session_name", json!("Race")),
                ("drivers", json!("VER,NOR")),
            ]),
        );

        let outcome = executor.execute(&plan, 0).await;

        assert!(matches!(outcome, Err(ToolServiceError::Transport(_))));
        assert!(service.calls().iter().all(|(tool, _)| tool != COMPARE_DRIVERS));
    }

    #[tokio::test]
    async fn test_follow_up_at_depth_limit_reports_exhaustion() {
        let service = StubService::new(vec![(GET_EVENT_SCHEDULE, schedule())]);
        let executor = executor(service.clone()).with_max_depth(1);
        let outcome = executor.execute(&last_race_plan(), 0).await.unwrap();
        let ExecutionOutcome::Combined(combined) = outcome else {
            panic!("expected combined outcome");
        };
        assert_eq!(combined.follow_up.primary().result.error.as_deref(), Some(MAX_DEPTH_REACHED));
        assert_eq!(service.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_transport_error_propagates() {
        let service = StubService::new(vec![]);
        let executor = executor(service);
        let plan = QueryPlan::new(GET_CHAMPIONSHIP_STANDINGS, args([("year", json!(2024))]), "");
        assert!(matches!(
            executor.execute(&plan, 0).await,
            Err(ToolServiceError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn test_primary_placeholder_resolved_via_schedule() {
        let results = ToolInvocationResult::success(json!([]));
        let service = StubService::new(vec![(GET_EVENT_SCHEDULE, schedule()), (GET_SESSION_RESULTS, results)]);
        let executor = executor(service.clone());
        let plan = QueryPlan::new(
            GET_SESSION_RESULTS,
            args([
                ("year", json!(2024)),
                ("event_identifier", json!("LAST_RACE")),
                ("session_name", json!("Race")),
            ]),
            "",
        );
        executor.execute(&plan, 0).await.unwrap();
        let calls = service.calls();
        assert_eq!(calls.last().unwrap().1["event_identifier"], "Belgian Grand Prix");
    }

    #[test]
    fn test_normalize_arguments() {
        let catalog = ToolCatalog::f1_defaults();
        let descriptor = catalog.get(COMPARE_DRIVERS).unwrap();
        let normalized = normalize_arguments(
            descriptor,
            &args([
                ("year", json!("2024")),
                ("event_identifier", json!("Monaco Grand Prix")),
                ("session_name", json!(["Qualifying", "Race"])),
                ("drivers", json!(["VER", "NOR"])),
            ]),
        );
        assert_eq!(normalized["year"], 2024);
        assert_eq!(normalized["session_name"], "Race");
        assert_eq!(normalized["drivers"], "VER,NOR");

        let descriptor = catalog.get(GET_EVENT_INFO).unwrap();
        let normalized = normalize_arguments(descriptor, &args([("identifier", json!(["Monaco Grand Prix", "x"]))]));
        assert_eq!(normalized["identifier"], "Monaco Grand Prix");
    }
}
