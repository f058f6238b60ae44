//! Result Synthesis - execution outcome → answer text
//!
//! Information Hiding:
//! - Payload shapes handled by structural extraction in `extract`
//! - The oracle only ever sees extracted facts, never raw payloads
//!
//! No answer states a number, name or result that is not in a payload.

pub mod extract;

use crate::core::llm::LanguageOracle;
use crate::error::ToolServiceError;
use crate::execution::recursive::{ExecutionOutcome, MAX_DEPTH_REACHED};
use crate::planning::QueryPlan;
use chrono::NaiveDate;
use extract::{Facts, Focus};
use std::sync::Arc;

pub const DEFAULT_MAX_ANSWER_CHARS: usize = 800;

const HELP: &str = "I can answer Formula 1 questions about race and qualifying results, championship \
standings, the season calendar, driver performance and head-to-head comparisons. Try \"Who won the \
2023 British Grand Prix?\" or \"compare Verstappen and Norris\".";

pub struct Synthesizer {
    oracle: Option<Arc<dyn LanguageOracle>>,
    max_answer_chars: usize,
}

impl Synthesizer {
    pub fn new(max_answer_chars: usize) -> Self {
        Self {
            oracle: None,
            max_answer_chars: max_answer_chars.max(80),
        }
    }

    pub fn with_oracle(mut self, oracle: Arc<dyn LanguageOracle>) -> Self {
        self.oracle = Some(oracle);
        self
    }

    pub fn with_max_answer_chars(mut self, max_answer_chars: usize) -> Self {
        self.max_answer_chars = max_answer_chars.max(80);
        self
    }

    /// Reply to a plan that needs no data.
    pub fn conversational(&self, question: &str) -> String {
        let lower = question.to_lowercase();
        if lower.contains("thank") || lower.contains("cheers") {
            "You're welcome! Ask me anything else about Formula 1.".to_string()
        } else if lower.contains("help") || lower.contains("what can you do") || lower.contains("who are you") {
            HELP.to_string()
        } else {
            format!("Hi! {}", HELP)
        }
    }

    /// Honest message for a request whose data service could not be reached.
    pub fn service_failure(&self, error: &ToolServiceError) -> String {
        format!(
            "I couldn't reach the F1 data service ({}), so I can't answer that right now. \
             I won't guess at results.",
            error
        )
    }

    pub async fn synthesize(
        &self,
        question: &str,
        plan: &QueryPlan,
        outcome: &ExecutionOutcome,
        today: NaiveDate,
    ) -> String {
        let focus = Focus::from_question(question);
        let last = outcome.last();

        let payload = match last.result.payload() {
            Ok(payload) => payload,
            Err(error) => return self.failure_answer(outcome, &error, focus, today),
        };

        let Some(facts) = extract::extract(last, &payload, focus, today) else {
            tracing::info!("[Synthesizer] No usable data in {} payload", last.tool);
            return unavailable(&last.tool);
        };

        // a planned follow-up that was never dispatched means the answer is partial
        if plan.follow_up.is_some() && !outcome.is_combined() {
            let skipped = plan
                .follow_up
                .as_ref()
                .map(|f| f.tool.as_str())
                .unwrap_or_default();
            tracing::info!("[Synthesizer] Answering from primary only, {} was skipped", skipped);
            return self.truncate(format!(
                "I couldn't work out the details needed for the follow-up lookup ({}), so this is \
                 only part of the answer.\n{}",
                skipped,
                facts.render()
            ));
        }

        if outcome.is_combined() {
            return self.truncate(facts.render());
        }

        match &self.oracle {
            Some(oracle) => self.phrase(oracle.as_ref(), question, &facts).await,
            None => self.truncate(facts.render()),
        }
    }

    fn failure_answer(&self, outcome: &ExecutionOutcome, error: &str, focus: Focus, today: NaiveDate) -> String {
        if error.contains(MAX_DEPTH_REACHED) {
            return "I stopped before fetching all the data needed (too many chained lookups), so I \
                    can't give a complete answer."
                .to_string();
        }

        let last = outcome.last();
        let primary = outcome.primary();
        if outcome.is_combined() {
            // primary facts are real, the follow-up is what is missing
            let context = primary
                .result
                .payload()
                .ok()
                .and_then(|payload| extract::extract(primary, &payload, focus, today));
            if let Some(context) = context {
                return self.truncate(format!(
                    "{}\nBut I couldn't retrieve the {} data: {}",
                    context.headline,
                    last.tool.replace('_', " "),
                    error
                ));
            }
        }

        self.truncate(format!(
            "I couldn't get that data: {}. I don't have verified results to share.",
            error.trim_end_matches('.')
        ))
    }

    /// Let the oracle phrase extracted facts; deterministic text if it fails.
    async fn phrase(&self, oracle: &dyn LanguageOracle, question: &str, facts: &Facts) -> String {
        let prompt = format!(
            "Answer the Formula 1 question using ONLY the facts below.\n\n\
             Facts:\n{facts}\n\n\
             Rules:\n\
             - Do not add any driver, team, time, position, date or number that is not in the facts\n\
             - If the facts do not answer the question, say the data is unavailable\n\
             - At most {limit} characters, plain text\n\n\
             Question: {question}",
            facts = facts.render(),
            limit = self.max_answer_chars,
            question = question,
        );

        match oracle.generate(&prompt).await {
            Ok(answer) if !answer.trim().is_empty() => self.truncate(answer.trim().to_string()),
            Ok(_) => self.truncate(facts.render()),
            Err(e) => {
                tracing::warn!("[Synthesizer] Oracle phrasing failed, using extracted facts: {}", e);
                self.truncate(facts.render())
            }
        }
    }

    /// Cut to the length ceiling on a word boundary.
    fn truncate(&self, text: String) -> String {
        truncate_chars(text, self.max_answer_chars)
    }
}

impl Default for Synthesizer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ANSWER_CHARS)
    }
}

fn unavailable(tool: &str) -> String {
    format!(
        "The data service returned no usable {} data for that question, so I can't answer it \
         without guessing.",
        tool.replace('_', " ")
    )
}

pub fn truncate_chars(text: String, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text;
    }
    let cut: String = text.chars().take(limit.saturating_sub(3)).collect();
    let cut = match cut.rfind(char::is_whitespace) {
        Some(index) if index > limit / 2 => cut[..index].to_string(),
        _ => cut,
    };
    format!("{}...", cut.trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::recursive::{CombinedResult, ToolCall};
    use crate::planning::plan::args;
    use crate::tools::catalog::*;
    use crate::tools::{Arguments, ToolInvocationResult};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    struct EchoOracle {
        prompts: Mutex<Vec<String>>,
        reply: String,
    }

    #[async_trait]
    impl LanguageOracle for EchoOracle {
        async fn generate(&self, prompt: &str) -> anyhow::Result<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(self.reply.clone())
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 8, 10).unwrap()
    }

    fn results_call(result: ToolInvocationResult) -> ToolCall {
        ToolCall {
            tool: GET_SESSION_RESULTS.to_string(),
            arguments: args([
                ("year", json!(2024)),
                ("event_identifier", json!("Belgian Grand Prix")),
                ("session_name", json!("Race")),
            ]),
            result,
        }
    }

    fn plan() -> QueryPlan {
        QueryPlan::new(GET_SESSION_RESULTS, Arguments::new(), "")
    }

    #[tokio::test]
    async fn test_error_result_is_admitted() {
        let outcome = ExecutionOutcome::Single(results_call(ToolInvocationResult::failure("Session not found")));
        let answer = Synthesizer::default().synthesize("who won?", &plan(), &outcome, today()).await;
        assert!(answer.contains("Session not found"));
        assert!(answer.contains("couldn't"));
    }

    #[tokio::test]
    async fn test_empty_payload_is_unavailable() {
        let outcome = ExecutionOutcome::Single(results_call(ToolInvocationResult::success(json!([]))));
        let answer = Synthesizer::default().synthesize("who won?", &plan(), &outcome, today()).await;
        assert!(answer.contains("no usable"));
    }

    #[tokio::test]
    async fn test_combined_uses_structural_extraction() {
        let oracle = Arc::new(EchoOracle {
            prompts: Mutex::new(Vec::new()),
            reply: "Fernando Alonso won".to_string(),
        });
        let schedule = ToolCall {
            tool: GET_EVENT_SCHEDULE.to_string(),
            arguments: args([("year", json!(2024))]),
            result: ToolInvocationResult::success(json!([])),
        };
        let results = results_call(ToolInvocationResult::success(json!([
            {"Position": 1, "Abbreviation": "HAM", "FullName": "Lewis Hamilton"}
        ])));
        let outcome = ExecutionOutcome::Combined(Box::new(CombinedResult {
            primary: schedule,
            follow_up: ExecutionOutcome::Single(results),
            combined: true,
        }));
        let synthesizer = Synthesizer::default().with_oracle(oracle.clone());
        let answer = synthesizer.synthesize("who won the last race?", &plan(), &outcome, today()).await;
        assert!(answer.starts_with("Lewis Hamilton (HAM) won the 2024 Belgian Grand Prix."));
        assert!(oracle.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_oracle_sees_only_facts_and_is_truncated() {
        let oracle = Arc::new(EchoOracle {
            prompts: Mutex::new(Vec::new()),
            reply: "word ".repeat(100),
        });
        let outcome = ExecutionOutcome::Single(results_call(ToolInvocationResult::success(json!({
            "status": "success",
            "data": [{"Position": 1, "Abbreviation": "HAM", "FullName": "Lewis Hamilton", "Internal": "x"}]
        }))));
        let synthesizer = Synthesizer::new(100).with_oracle(oracle.clone());
        let answer = synthesizer.synthesize("who won?", &plan(), &outcome, today()).await;
        assert!(answer.chars().count() <= 100);
        let prompts = oracle.prompts.lock().unwrap();
        assert!(prompts[0].contains("Lewis Hamilton (HAM)"));
        assert!(!prompts[0].contains("Internal"));
    }

    #[tokio::test]
    async fn test_skipped_follow_up_is_flagged() {
        let standings = ToolCall {
            tool: GET_CHAMPIONSHIP_STANDINGS.to_string(),
            arguments: args([("year", json!(2024))]),
            result: ToolInvocationResult::success(json!([{"position": 1, "driverCode": "VER", "points": 277}])),
        };
        let plan = QueryPlan::new(GET_CHAMPIONSHIP_STANDINGS, Arguments::new(), "")
            .with_follow_up(COMPARE_DRIVERS, Arguments::new());
        let answer = Synthesizer::default()
            .synthesize("compare the top 3", &plan, &ExecutionOutcome::Single(standings), today())
            .await;
        assert!(answer.contains("only part of the answer"));
        assert!(answer.contains("VER"));
    }

    #[tokio::test]
    async fn test_depth_exhaustion_is_reported() {
        let outcome = ExecutionOutcome::Single(results_call(ToolInvocationResult::failure(MAX_DEPTH_REACHED)));
        let answer = Synthesizer::default().synthesize("who won?", &plan(), &outcome, today()).await;
        assert!(answer.contains("can't give a complete answer"));
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("short".to_string(), 10), "short");
        let cut = truncate_chars("one two three four five six".to_string(), 12);
        assert!(cut.chars().count() <= 12);
        assert!(cut.ends_with("..."));
    }

    #[test]
    fn test_conversational() {
        let synthesizer = Synthesizer::default();
        assert!(synthesizer.conversational("thanks!").contains("welcome"));
        assert!(synthesizer.conversational("hello").starts_with("Hi!"));
    }
}
