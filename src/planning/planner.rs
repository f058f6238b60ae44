//! Question → plan.
//!
//! Precedence, first success wins:
//! 1. follow-up phrasing answered from the conversation context
//! 2. deterministic high-confidence patterns
//! 3. the language oracle, when one is configured
//! 4. keyword fallback, then championship standings for the resolved year
//!
//! `plan` never fails. With no oracle the result depends only on the question, the temporal
//! context and the conversation context.

use super::oracle;
use super::plan::{ConversationContext, QueryPlan};
use super::rules::{self, PlanInput};
use super::temporal::TemporalContext;
use crate::core::llm::LanguageOracle;
use crate::tools::catalog::ToolCatalog;
use std::sync::Arc;

pub struct QueryPlanner {
    catalog: Arc<ToolCatalog>,
    oracle: Option<Arc<dyn LanguageOracle>>,
}

impl QueryPlanner {
    pub fn new(catalog: Arc<ToolCatalog>) -> Self {
        Self {
            catalog,
            oracle: None,
        }
    }

    pub fn with_oracle(mut self, oracle: Arc<dyn LanguageOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    pub fn catalog(&self) -> &ToolCatalog {
        &self.catalog
    }

    pub async fn plan(
        &self,
        text: &str,
        temporal: &TemporalContext,
        conversation: Option<&ConversationContext>,
    ) -> QueryPlan {
        let input = PlanInput::new(text, temporal, conversation);

        if let Some((rule, plan)) = rules::first_match(rules::FOLLOW_UP_RULES, &input) {
            tracing::info!("[Planner] Follow-up rule '{}' -> {}", rule, plan.tool);
            return plan;
        }

        if let Some((rule, plan)) = rules::first_match(rules::DETERMINISTIC_RULES, &input) {
            tracing::info!("[Planner] Deterministic rule '{}' -> {}", rule, plan.tool);
            return plan;
        }

        if let Some(plan) = self.ask_oracle(&input).await {
            tracing::info!(
                "[Planner] Oracle plan -> {} (follow-up: {})",
                plan.tool,
                plan.follow_up.as_ref().map(|f| f.tool.as_str()).unwrap_or("none")
            );
            return plan;
        }

        match rules::first_match(rules::FALLBACK_RULES, &input) {
            Some((rule, plan)) => {
                tracing::info!("[Planner] Keyword rule '{}' -> {}", rule, plan.tool);
                plan
            }
            None => {
                tracing::info!("[Planner] No rule matched, defaulting to standings");
                rules::default_plan(&input)
            }
        }
    }

    async fn ask_oracle(&self, input: &PlanInput<'_>) -> Option<QueryPlan> {
        let oracle = self.oracle.as_ref()?;
        let prompt = oracle::build_prompt(
            input.text,
            &self.catalog,
            input.temporal,
            input.year,
            input.conversation,
        );

        let response = match oracle.generate_json(&prompt).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("[Planner] Oracle unavailable, using keyword fallback: {}", e);
                return None;
            }
        };

        let plan = oracle::parse_plan(&response, &self.catalog, input.year);
        if plan.is_none() {
            tracing::warn!("[Planner] Oracle response unusable: {}", response);
        }
        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planning::plan::LAST_RACE;
    use crate::tools::catalog::*;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedOracle {
        reply: Option<&'static str>,
        calls: AtomicUsize,
    }

    impl ScriptedOracle {
        fn new(reply: Option<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                reply,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl LanguageOracle for ScriptedOracle {
        async fn generate(&self, _prompt: &str) -> anyhow::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply
                .map(str::to_string)
                .ok_or_else(|| anyhow::anyhow!("oracle offline"))
        }
    }

    fn temporal() -> TemporalContext {
        TemporalContext::from_date(NaiveDate::from_ymd_opt(2025, 8, 10).unwrap())
    }

    fn planner() -> QueryPlanner {
        QueryPlanner::new(Arc::new(ToolCatalog::f1_defaults()))
    }

    #[tokio::test]
    async fn test_plan_without_oracle_is_deterministic() {
        let planner = planner();
        let t = temporal();
        for question in [
            "Who won the 2023 British Grand Prix?",
            "what's the championship standings",
            "compare Verstappen and Norris",
            "something entirely unrelated",
        ] {
            let first = planner.plan(question, &t, None).await;
            let second = planner.plan(question, &t, None).await;
            assert_eq!(first, second);
            assert!(!first.tool.is_empty());
        }
    }

    #[tokio::test]
    async fn test_standings_question_uses_current_year() {
        let plan = planner().plan("what's the championship standings", &temporal(), None).await;
        assert_eq!(plan.tool, GET_CHAMPIONSHIP_STANDINGS);
        assert_eq!(plan.arguments["year"], 2025);
        assert!(plan.follow_up.is_none());
    }

    #[tokio::test]
    async fn test_deterministic_rule_skips_oracle() {
        let oracle = ScriptedOracle::new(Some(r#"{"tool": "get_event_schedule", "arguments": {"year": 1999}}"#));
        let planner = planner().with_oracle(oracle.clone());
        let plan = planner.plan("Who won the 2023 British Grand Prix?", &temporal(), None).await;
        assert_eq!(plan.tool, GET_SESSION_RESULTS);
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_oracle_plan_is_used() {
        let oracle = ScriptedOracle::new(Some(
            r#"{"tool": "get_event_schedule", "arguments": {"year": 2025},
                "followUp": {"tool": "get_session_results", "arguments": {"year": 2025,
                "event_identifier": "LAST_RACE", "session_name": "Race"}}, "reasoning": "latest"}"#,
        ));
        let planner = planner().with_oracle(oracle.clone());
        let plan = planner.plan("how did the weekend go", &temporal(), None).await;
        assert_eq!(plan.tool, GET_EVENT_SCHEDULE);
        assert_eq!(plan.follow_up.unwrap().arguments["event_identifier"], LAST_RACE);
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failing_or_garbled_oracle_falls_back() {
        let t = temporal();
        for oracle in [ScriptedOracle::new(None), ScriptedOracle::new(Some("no idea, sorry"))] {
            let planner = planner().with_oracle(oracle);
            let plan = planner.plan("show me the calendar", &t, None).await;
            assert_eq!(plan.tool, GET_EVENT_SCHEDULE);
            assert_eq!(plan.arguments["year"], 2025);
        }
    }

    #[tokio::test]
    async fn test_follow_up_uses_context() {
        let ctx = ConversationContext {
            last_year: Some(2024),
            last_race_name: Some("Belgian Grand Prix".to_string()),
            last_tool: Some(GET_SESSION_RESULTS.to_string()),
            ..Default::default()
        };
        let plan = planner().plan("what about Hamilton?", &temporal(), Some(&ctx)).await;
        assert_eq!(plan.tool, GET_DRIVER_INFO);
        assert_eq!(plan.arguments["driver_identifier"], "HAM");
        assert_eq!(plan.arguments["session_name"], "Race");
    }
}
